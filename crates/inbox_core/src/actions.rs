use shared::domain::ConversationId;
use tracing::info;

use crate::{error::SyncError, InboxEngine, InboxEvent};

impl InboxEngine {
    pub async fn join_conversation(&self, conversation_id: &ConversationId) -> Result<(), SyncError> {
        info!(conversation_id = %conversation_id, "inbox: joining conversation");
        self.remote
            .join_conversation(conversation_id)
            .await
            .map_err(SyncError::Remote)
    }

    /// Previews a conversation without joining it, then opens it.
    pub async fn preview_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<(), SyncError> {
        self.remote
            .preview_conversation(conversation_id)
            .await
            .map_err(SyncError::Remote)?;
        self.select_conversation(Some(conversation_id.clone()), true)
            .await;
        Ok(())
    }

    /// Re-admits a user who reset their account.
    pub async fn reset_let_them_in(
        &self,
        conversation_id: &ConversationId,
        username: &str,
    ) -> Result<(), SyncError> {
        self.remote
            .add_member_after_reset(conversation_id, username)
            .await
            .map_err(SyncError::Remote)
    }

    /// Starts a new conversation with everyone except the reset user.
    pub async fn reset_chat_without_them(&self, conversation_id: &ConversationId, username: &str) {
        let participants = self
            .read_cache(|cache| {
                cache
                    .record(conversation_id)
                    .map(|record| {
                        record
                            .participants
                            .iter()
                            .filter(|participant| participant.as_str() != username)
                            .cloned()
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            })
            .await;
        if participants.is_empty() {
            return;
        }
        self.emit(InboxEvent::StartConversation { participants });
    }

    pub async fn select_conversation(&self, conversation_id: Option<ConversationId>, from_user: bool) {
        self.cache.lock().await.select(conversation_id.clone());
        self.emit(InboxEvent::SelectConversation {
            id: conversation_id,
            from_user,
        });
    }

    /// Moves the selection `direction` rows through `rows`, clamped to the
    /// ends. An unknown selection picks the first row.
    pub async fn select_next(
        &self,
        rows: &[ConversationId],
        direction: i32,
    ) -> Option<ConversationId> {
        let current = self.read_cache(|cache| cache.selected().cloned()).await;
        let position = current
            .as_ref()
            .and_then(|current| rows.iter().position(|row| row == current));
        let next = match position {
            Some(index) => {
                let last = rows.len().saturating_sub(1) as i64;
                let target = (index as i64 + i64::from(direction)).clamp(0, last);
                rows.get(target as usize).cloned()
            }
            None => rows.first().cloned(),
        }?;
        if current.as_ref() != Some(&next) {
            self.select_conversation(Some(next.clone()), false).await;
        }
        Some(next)
    }
}

#[cfg(test)]
#[path = "tests/actions_tests.rs"]
mod tests;
