use std::sync::Arc;

use shared::{
    domain::{ConversationId, MessageId},
    protocol::{ThreadStaleUpdate, UnverifiedInboxItem},
};
use tracing::{debug, info};

use crate::{
    error::SyncError,
    record::ConversationRecord,
    state::SyncingState,
    unbox_queue::UnboxRequest,
    version::VersionStamp,
    InboxEngine, InboxEvent, LoadMoreOptions,
};

/// How the selected thread catches up after a resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchUp {
    /// Too far behind; drop the thread and load it from scratch.
    FullReload,
    /// Fetch newer messages, exactly `count` of them when known.
    Append { count: Option<u64> },
}

impl CatchUp {
    pub fn plan(known_max: Option<MessageId>, last_shown: Option<MessageId>, threshold: u64) -> Self {
        match (known_max, last_shown) {
            (Some(known), Some(shown)) => {
                let backlog = known.0.saturating_sub(shown.0);
                if backlog > threshold {
                    CatchUp::FullReload
                } else {
                    CatchUp::Append {
                        count: Some(backlog),
                    }
                }
            }
            _ => CatchUp::Append { count: None },
        }
    }
}

impl InboxEngine {
    pub fn on_sync_started(&self) {
        self.set_syncing(SyncingState::Syncing);
    }

    /// Applies the conversations changed during an incremental sync and
    /// brings the selected thread up to date.
    pub async fn on_resync(
        self: &Arc<Self>,
        items: Vec<UnverifiedInboxItem>,
    ) -> Result<(), SyncError> {
        let author = self.username().await.ok_or(SyncError::NotLoggedIn)?;

        let (ids, selected) = {
            let mut cache = self.cache.lock().await;
            let stored_max = cache
                .selected()
                .and_then(|id| cache.record(id))
                .map(|record| record.max_msg_id)
                .filter(|msg_id| msg_id.0 > 0);
            let mut ids = Vec::with_capacity(items.len());
            for item in &items {
                let Some(record) = ConversationRecord::from_untrusted(&author, item) else {
                    continue;
                };
                cache.stamp(item.conv_id.clone(), VersionStamp::untrusted(item.version));
                cache.upsert_record(record);
                ids.push(item.conv_id.clone());
            }
            let selected = cache
                .selected()
                .filter(|id| ids.contains(id))
                .map(|id| {
                    let summary_max = items
                        .iter()
                        .find(|item| &item.conv_id == id)
                        .map(|item| item.max_msg_id)
                        .filter(|msg_id| msg_id.0 > 0);
                    (id.clone(), summary_max.or(stored_max))
                });
            (ids, selected)
        };
        info!(count = ids.len(), "resync: conversations replaced");
        for id in &ids {
            self.emit(InboxEvent::ConversationUpdated(id.clone()));
        }

        self.enqueue(UnboxRequest {
            ids,
            reason: "inbox sync".to_string(),
            force: true,
            for_inbox_sync: true,
            dismiss_syncing: true,
        })
        .await;

        let Some((selected, known_max)) = selected else {
            return Ok(());
        };
        let last_shown = self
            .pager
            .last_message_id(&selected)
            .await
            .map_err(SyncError::Remote)?;
        let plan = CatchUp::plan(known_max, last_shown, self.settings.full_reload_backlog);
        debug!(conversation_id = %selected, ?plan, "resync: catching up selected thread");
        match plan {
            CatchUp::FullReload => self.reload_thread(&selected).await,
            CatchUp::Append { count } => self
                .pager
                .load_more_messages(
                    &selected,
                    LoadMoreOptions {
                        want_newer: true,
                        number_override: count,
                        ..LoadMoreOptions::default()
                    },
                )
                .await
                .map_err(SyncError::Remote),
        }
    }

    /// Forces fresh trusted copies and reloads the open thread from scratch.
    pub async fn mark_threads_stale(
        self: &Arc<Self>,
        updates: Vec<ThreadStaleUpdate>,
    ) -> Result<(), SyncError> {
        let ids = updates
            .into_iter()
            .map(|update| update.conv_id)
            .collect::<Vec<_>>();
        info!(count = ids.len(), "resync: threads marked stale");
        self.enqueue(UnboxRequest::new(ids, "threads stale").forced())
            .await;

        let selected = self.cache.lock().await.selected().cloned();
        match selected {
            Some(selected) => self.reload_thread(&selected).await,
            None => Ok(()),
        }
    }

    async fn reload_thread(&self, conversation_id: &ConversationId) -> Result<(), SyncError> {
        self.pager
            .clear_messages(conversation_id)
            .await
            .map_err(SyncError::Remote)?;
        self.pager
            .load_more_messages(conversation_id, LoadMoreOptions::default())
            .await
            .map_err(SyncError::Remote)
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
