use std::collections::HashMap;

use shared::{
    domain::{ConversationId, DeviceType},
    protocol::ConversationBadge,
};
use tracing::debug;

use crate::{cache::InboxCache, InboxEngine, InboxEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BadgeDelta {
    pub badge_changed: bool,
    pub total_changed: bool,
}

pub(crate) fn apply(
    cache: &mut InboxCache,
    conversations: &[ConversationBadge],
    device_type: DeviceType,
) -> BadgeDelta {
    let mut badges = HashMap::new();
    let mut totals = HashMap::new();
    for badge in conversations {
        let Some(id) = &badge.conv_id else {
            continue;
        };
        if badge.unread_messages > 0 {
            totals.insert(id.clone(), badge.unread_messages);
        }
        if let Some(count) = badge
            .badge_counts
            .get(&device_type)
            .copied()
            .filter(|count| *count > 0)
        {
            badges.insert(id.clone(), count);
        }
    }

    BadgeDelta {
        badge_changed: cache.replace_unread_badges(badges),
        total_changed: cache.replace_unread_totals(totals),
    }
}

impl InboxEngine {
    pub async fn on_unread_counts(&self, conversations: &[ConversationBadge]) -> BadgeDelta {
        let delta = {
            let mut cache = self.cache.lock().await;
            apply(&mut cache, conversations, self.settings.device_type)
        };
        debug!(
            badge_changed = delta.badge_changed,
            total_changed = delta.total_changed,
            "inbox: unread counts received"
        );
        if delta.badge_changed {
            self.emit(InboxEvent::UnreadBadgesChanged);
        }
        if delta.total_changed {
            self.emit(InboxEvent::UnreadTotalsChanged);
        }
        delta
    }

    pub async fn unread_badge(&self, conversation_id: &ConversationId) -> u32 {
        self.read_cache(|cache| {
            cache
                .unread_badges()
                .get(conversation_id)
                .copied()
                .unwrap_or(0)
        })
        .await
    }
}

#[cfg(test)]
#[path = "tests/badge_tests.rs"]
mod tests;
