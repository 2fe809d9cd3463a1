use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        ConversationId, ConversationStatus, DeviceType, MemberStatus, MembersType, MessageId,
        NotificationKind, TeamType, TopicType, Visibility,
    },
    error::ApiError,
};

/// Filter sent with both the untrusted listing and the trusted unbox call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxQuery {
    pub compute_active_list: bool,
    pub read_only: bool,
    pub status: Vec<ConversationStatus>,
    pub tlf_visibility: Visibility,
    pub topic_type: TopicType,
    pub unread_only: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conv_ids: Vec<ConversationId>,
}

impl InboxQuery {
    /// Private chat conversations in every read state, minus the hidden statuses.
    pub fn inbox() -> Self {
        Self {
            compute_active_list: true,
            read_only: false,
            status: ConversationStatus::ALL
                .into_iter()
                .filter(|status| !status.is_hidden())
                .collect(),
            tlf_visibility: Visibility::Private,
            topic_type: TopicType::Chat,
            unread_only: false,
            conv_ids: Vec::new(),
        }
    }

    pub fn for_conversations(conv_ids: Vec<ConversationId>) -> Self {
        Self {
            conv_ids,
            ..Self::inbox()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeInfo {
    pub reset_user: String,
    #[serde(default)]
    pub reset_date: String,
    #[serde(default)]
    pub reset_full: String,
    #[serde(default)]
    pub reset_timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalMetadata {
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub writer_names: Vec<String>,
}

/// Coarse, unverified listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnverifiedInboxItem {
    pub conv_id: ConversationId,
    pub name: String,
    pub version: u64,
    #[serde(default)]
    pub max_msg_id: MessageId,
    #[serde(default)]
    pub members_type: MembersType,
    #[serde(default)]
    pub team_type: TeamType,
    #[serde(default)]
    pub status: ConversationStatus,
    #[serde(default)]
    pub member_status: MemberStatus,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub is_empty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_metadata: Option<LocalMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize_info: Option<FinalizeInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnverifiedInbox {
    #[serde(default)]
    pub items: Vec<UnverifiedInboxItem>,
}

/// Reply to the bulk listing: either an inbox or a terminal error sentinel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboxListing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox: Option<UnverifiedInbox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTriple {
    #[serde(default)]
    pub topic_type: TopicType,
}

/// Reference to a related conversation, as carried in supersede lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub id_triple: IdTriple,
    /// Base64 encoded raw conversation id.
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize_info: Option<FinalizeInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationNotificationInfo {
    #[serde(default)]
    pub channel_wide: bool,
    #[serde(default)]
    pub settings: HashMap<DeviceType, HashMap<NotificationKind, bool>>,
}

/// Verified conversation returned by the unbox call or embedded in push activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxUiItem {
    pub conv_id: ConversationId,
    pub name: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub full_names: HashMap<String, String>,
    pub version: u64,
    #[serde(default)]
    pub max_msg_id: MessageId,
    #[serde(default)]
    pub members_type: MembersType,
    #[serde(default)]
    pub team_type: TeamType,
    #[serde(default)]
    pub status: ConversationStatus,
    #[serde(default)]
    pub member_status: MemberStatus,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub is_empty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<ConversationNotificationInfo>,
    #[serde(default)]
    pub reset_participants: Vec<String>,
    #[serde(default)]
    pub supersedes: Vec<ConversationMetadata>,
    #[serde(default)]
    pub superseded_by: Vec<ConversationMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize_info: Option<FinalizeInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationErrorType {
    Permanent,
    Misc,
    SelfRekeyNeeded,
    OtherRekeyNeeded,
    Transient,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationErrorRekey {
    #[serde(default)]
    pub writer_names: Vec<String>,
    #[serde(default)]
    pub reader_names: Vec<String>,
    #[serde(default)]
    pub rekeyers: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReaderInfo {
    #[serde(default)]
    pub mtime: i64,
    #[serde(default)]
    pub max_msgid: MessageId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConversationSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reader_info: Option<ReaderInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationErrorLocal {
    pub typ: ConversationErrorType,
    pub message: String,
    #[serde(default)]
    pub unverified_tlf_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rekey_info: Option<ConversationErrorRekey>,
    #[serde(default)]
    pub remote_conv: RemoteConversationSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationFailure {
    pub conv_id: ConversationId,
    pub error: ConversationErrorLocal,
}

/// One streamed result of a trusted unbox batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum UnboxEvent {
    Conversation(InboxUiItem),
    Failed(ConversationFailure),
}

impl UnboxEvent {
    pub fn conv_id(&self) -> &ConversationId {
        match self {
            UnboxEvent::Conversation(item) => &item.conv_id,
            UnboxEvent::Failed(failure) => &failure.conv_id,
        }
    }
}

/// Per-conversation unread counters from the badge stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationBadge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conv_id: Option<ConversationId>,
    #[serde(default)]
    pub unread_messages: u32,
    #[serde(default)]
    pub badge_counts: HashMap<DeviceType, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadStaleUpdate {
    pub conv_id: ConversationId,
}

/// Push notifications about conversation activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChatActivity {
    IncomingMessage {
        conv_id: ConversationId,
        #[serde(default)]
        conv: Option<InboxUiItem>,
    },
    SetStatus {
        #[serde(default)]
        conv: Option<InboxUiItem>,
    },
    ReadMessage {
        #[serde(default)]
        conv: Option<InboxUiItem>,
    },
    TeamType,
    NewConversation {
        #[serde(default)]
        conv: Option<InboxUiItem>,
    },
    SetAppNotificationSettings {
        conv_id: ConversationId,
        settings: ConversationNotificationInfo,
    },
    MembersUpdate {
        #[serde(default)]
        conv_id: Option<ConversationId>,
    },
    FailedMessage,
}
