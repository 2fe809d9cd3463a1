//! The cached conversation entity and its conversions from wire payloads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    domain::{
        activity_time, ConversationId, ConversationStatus, DeviceType, MemberStatus, MembersType,
        MessageId, NotificationKind, TeamType, TopicType, Visibility,
    },
    protocol::{
        ConversationFailure, ConversationMetadata, ConversationNotificationInfo, FinalizeInfo,
        InboxUiItem, UnverifiedInboxItem,
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotificationPrefs {
    pub at_mention: bool,
    pub generic: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotificationsState {
    pub channel_wide: bool,
    pub desktop: NotificationPrefs,
    pub mobile: NotificationPrefs,
}

impl NotificationsState {
    /// `None` when the remote sent no settings matrix at all.
    pub fn parse(info: &ConversationNotificationInfo) -> Option<Self> {
        if info.settings.is_empty() {
            return None;
        }
        let prefs = |device: DeviceType| {
            let kinds = info.settings.get(&device);
            let flag = |kind: NotificationKind| {
                kinds
                    .and_then(|kinds| kinds.get(&kind))
                    .copied()
                    .unwrap_or(false)
            };
            NotificationPrefs {
                at_mention: flag(NotificationKind::AtMention),
                generic: flag(NotificationKind::Generic),
            }
        };
        Some(Self {
            channel_wide: info.channel_wide,
            desktop: prefs(DeviceType::Desktop),
            mobile: prefs(DeviceType::Mobile),
        })
    }
}

/// Link to the conversation that replaced, or was replaced by, this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupersedeInfo {
    pub conversation_id: ConversationId,
    pub finalize_info: FinalizeInfo,
}

impl SupersedeInfo {
    /// First chat-topic entry that carries reset metadata.
    pub fn from_metadata(entries: &[ConversationMetadata]) -> Option<Self> {
        let entry = entries
            .iter()
            .find(|entry| entry.id_triple.topic_type == TopicType::Chat && entry.finalize_info.is_some())?;
        let finalize_info = entry.finalize_info.clone()?;
        let conversation_id = ConversationId::from_base64_id(&entry.conversation_id)
            .unwrap_or_else(|| ConversationId::new(entry.conversation_id.clone()));
        Some(Self {
            conversation_id,
            finalize_info,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationRecord {
    pub conversation_id: ConversationId,
    pub name: String,
    pub participants: Vec<String>,
    pub full_names: HashMap<String, String>,
    pub teamname: Option<String>,
    pub channelname: Option<String>,
    pub members_type: MembersType,
    pub team_type: TeamType,
    pub visibility: Visibility,
    pub status: ConversationStatus,
    pub member_status: MemberStatus,
    pub time: i64,
    pub max_msg_id: MessageId,
    pub version: u64,
    pub notifications: Option<NotificationsState>,
    pub is_empty: bool,
}

impl ConversationRecord {
    fn empty(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            name: String::new(),
            participants: Vec::new(),
            full_names: HashMap::new(),
            teamname: None,
            channelname: None,
            members_type: MembersType::Kbfs,
            team_type: TeamType::None,
            visibility: Visibility::Private,
            status: ConversationStatus::Unfiled,
            member_status: MemberStatus::Active,
            time: 0,
            max_msg_id: MessageId(0),
            version: 0,
            notifications: None,
            is_empty: false,
        }
    }

    /// Builds a record from the coarse listing. Participants come from the
    /// local metadata when present, otherwise from the folder name.
    pub fn from_untrusted(author: &str, item: &UnverifiedInboxItem) -> Option<Self> {
        if !is_storable(item.visibility, &item.name) {
            return None;
        }
        let is_team = item.members_type == MembersType::Team;
        let participants = match &item.local_metadata {
            Some(meta) => meta.writer_names.clone(),
            None => parse_folder_name(author, &item.name)
                .into_iter()
                .map(|user| user.username)
                .collect(),
        };
        let channelname = item
            .local_metadata
            .as_ref()
            .filter(|_| is_team)
            .map(|meta| meta.channel_name.clone())
            .filter(|name| !name.is_empty());

        Some(Self {
            name: item.name.clone(),
            participants,
            teamname: is_team.then(|| item.name.clone()),
            channelname,
            members_type: item.members_type,
            team_type: item.team_type,
            visibility: item.visibility,
            status: item.status,
            member_status: item.member_status,
            time: item.time,
            max_msg_id: item.max_msg_id,
            version: item.version,
            is_empty: item.is_empty,
            ..Self::empty(item.conv_id.clone())
        })
    }

    /// Builds a record from a verified payload; `None` for public or
    /// mixed reader/writer conversations.
    pub fn from_trusted(item: &InboxUiItem) -> Option<Self> {
        if !is_storable(item.visibility, &item.name) {
            return None;
        }
        let is_team = item.members_type == MembersType::Team;
        Some(Self {
            name: item.name.clone(),
            participants: item.participants.clone(),
            full_names: item.full_names.clone(),
            teamname: is_team.then(|| item.name.clone()),
            channelname: is_team.then(|| item.channel.clone()),
            members_type: item.members_type,
            team_type: item.team_type,
            visibility: item.visibility,
            status: item.status,
            member_status: item.member_status,
            time: item.time,
            max_msg_id: item.max_msg_id,
            version: item.version,
            notifications: item.notifications.as_ref().and_then(NotificationsState::parse),
            is_empty: item.is_empty,
            ..Self::empty(item.conv_id.clone())
        })
    }

    /// Minimal visible entry for a conversation that failed to unbox.
    pub fn placeholder_for_failure(failure: &ConversationFailure) -> Self {
        let error = &failure.error;
        let participants = match &error.rekey_info {
            Some(rekey) => rekey
                .writer_names
                .iter()
                .chain(rekey.reader_names.iter())
                .filter(|name| !name.is_empty())
                .cloned()
                .collect(),
            None => error
                .unverified_tlf_name
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        };
        Self {
            participants,
            status: ConversationStatus::Unfiled,
            time: error.remote_conv.reader_info.map(|info| info.mtime).unwrap_or(0),
            ..Self::empty(failure.conv_id.clone())
        }
    }

    pub fn is_big_team(&self) -> bool {
        self.team_type == TeamType::Complex
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        activity_time(self.time)
    }
}

fn is_storable(visibility: Visibility, name: &str) -> bool {
    visibility == Visibility::Private && !name.contains('#')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderUser {
    pub username: String,
    pub you: bool,
    pub read_only: bool,
}

/// Splits a folder name such as `alice,bob#carol` into writers and readers.
/// Conflict suffixes like ` (conflicted copy ...)` are ignored.
pub fn parse_folder_name(you: &str, folder_name: &str) -> Vec<FolderUser> {
    let base = folder_name
        .split(" (")
        .next()
        .unwrap_or_default()
        .trim();
    let (writers, readers) = match base.split_once('#') {
        Some((writers, readers)) => (writers, readers),
        None => (base, ""),
    };
    let parse = |list: &str, read_only: bool| {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| FolderUser {
                username: name.to_string(),
                you: name == you,
                read_only,
            })
            .collect::<Vec<_>>()
    };
    let mut users = parse(writers, false);
    users.extend(parse(readers, true));
    users
}

#[cfg(test)]
#[path = "tests/record_tests.rs"]
mod tests;
