use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);
    };
}

id_newtype!(MessageId);

const PENDING_PREFIX: &str = "__PendingConversation__";

/// Hex conversation key as used by the inbox cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Placeholder key for a conversation the UI is composing but the
    /// remote has not created yet.
    pub fn new_pending() -> Self {
        Self(format!("{PENDING_PREFIX}{}", Uuid::new_v4().simple()))
    }

    pub fn is_pending(&self) -> bool {
        self.0.starts_with(PENDING_PREFIX)
    }

    /// Metadata entries reference conversations by base64 encoded raw ids.
    pub fn from_base64_id(raw: &str) -> Option<Self> {
        let bytes = STANDARD.decode(raw.trim()).ok()?;
        if bytes.is_empty() {
            return None;
        }
        let key = bytes.iter().map(|b| format!("{b:02x}")).collect::<String>();
        Some(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembersType {
    #[default]
    Kbfs,
    Team,
    ImpTeam,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamType {
    #[default]
    None,
    Simple,
    Complex,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Unfiled,
    Favorite,
    Ignored,
    Blocked,
    Muted,
    Reported,
}

impl ConversationStatus {
    pub const ALL: [ConversationStatus; 6] = [
        ConversationStatus::Unfiled,
        ConversationStatus::Favorite,
        ConversationStatus::Ignored,
        ConversationStatus::Blocked,
        ConversationStatus::Muted,
        ConversationStatus::Reported,
    ];

    /// Statuses that hide a conversation from the inbox.
    pub fn is_hidden(self) -> bool {
        matches!(
            self,
            ConversationStatus::Ignored | ConversationStatus::Blocked | ConversationStatus::Reported
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    #[default]
    Active,
    Removed,
    Left,
    Preview,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicType {
    None,
    #[default]
    Chat,
    Dev,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Desktop,
    Mobile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Generic,
    AtMention,
}

/// Converts a millisecond activity timestamp into a UTC time.
pub fn activity_time(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}
