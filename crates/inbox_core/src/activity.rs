use std::sync::Arc;

use shared::{domain::Visibility, protocol::ChatActivity};
use tracing::debug;

use crate::{unbox_queue::UnboxRequest, InboxEngine};

impl InboxEngine {
    /// Routes one push notification into the cache.
    pub async fn handle_activity(self: &Arc<Self>, activity: ChatActivity) {
        match activity {
            ChatActivity::IncomingMessage { conv_id, conv } => match conv {
                Some(conv) if conv.visibility != Visibility::Private => {
                    debug!(conversation_id = %conv_id, "inbox: ignoring public activity");
                }
                Some(conv) => self.push_trusted(conv).await,
                None => {
                    self.enqueue(UnboxRequest::new(vec![conv_id], "incoming message").forced())
                        .await;
                }
            },
            ChatActivity::SetStatus { conv } | ChatActivity::ReadMessage { conv } => {
                if let Some(conv) = conv {
                    self.push_trusted(conv).await;
                }
            }
            ChatActivity::TeamType => self.request_reload("team type changed").await,
            ChatActivity::NewConversation { conv } => match conv {
                Some(conv) => self.push_trusted(conv).await,
                None => self.request_reload("new conversation").await,
            },
            ChatActivity::SetAppNotificationSettings { conv_id, settings } => {
                self.update_notifications(&conv_id, &settings).await;
            }
            ChatActivity::MembersUpdate { conv_id } => {
                if let Some(conv_id) = conv_id {
                    self.enqueue(UnboxRequest::new(vec![conv_id], "members update").forced())
                        .await;
                }
            }
            ChatActivity::FailedMessage => {
                debug!("inbox: ignoring failed message activity");
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/activity_tests.rs"]
mod tests;
