//! Trusted unboxing: work-set selection, serialized remote batches, and
//! the micro-queue that feeds trusted copies into the processor.

use std::{collections::{HashSet, VecDeque}, sync::Arc};

use futures::StreamExt;
use shared::{
    domain::ConversationId,
    protocol::{InboxQuery, InboxUiItem, UnboxEvent},
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{error::SyncError, state::Transition, InboxEngine, InboxEvent, SyncingState};

#[derive(Debug, Clone, Default)]
pub struct UnboxRequest {
    pub ids: Vec<ConversationId>,
    pub reason: String,
    /// Refresh conversations that already hold a trusted copy.
    pub force: bool,
    pub for_inbox_sync: bool,
    /// Clear the syncing indicator once this request settles.
    pub dismiss_syncing: bool,
}

impl UnboxRequest {
    pub fn new(ids: Vec<ConversationId>, reason: impl Into<String>) -> Self {
        Self {
            ids,
            reason: reason.into(),
            ..Self::default()
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub requested: usize,
    pub unboxed: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct PendingItems {
    items: VecDeque<InboxUiItem>,
    draining: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Activity {
    batches: usize,
    draining: bool,
}

impl Activity {
    fn is_idle(&self) -> bool {
        self.batches == 0 && !self.draining
    }
}

pub(crate) struct UnboxQueue {
    capacity: usize,
    batch_lock: Mutex<()>,
    pending: Mutex<PendingItems>,
    activity: watch::Sender<Activity>,
}

impl UnboxQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (activity, _) = watch::channel(Activity::default());
        Self {
            capacity: capacity.max(1),
            batch_lock: Mutex::new(()),
            pending: Mutex::new(PendingItems::default()),
            activity,
        }
    }

    fn batch_started(&self) {
        self.activity.send_modify(|activity| activity.batches += 1);
    }

    fn batch_finished(&self) {
        self.activity
            .send_modify(|activity| activity.batches = activity.batches.saturating_sub(1));
    }

    /// Queues `item`, returning the evicted oldest item and whether a drain
    /// loop has to be started.
    async fn push(&self, item: InboxUiItem) -> (Option<InboxUiItem>, bool) {
        let mut pending = self.pending.lock().await;
        let evicted = if pending.items.len() >= self.capacity {
            pending.items.pop_front()
        } else {
            None
        };
        pending.items.push_back(item);
        let start = !pending.draining;
        if start {
            pending.draining = true;
            self.activity.send_modify(|activity| activity.draining = true);
        }
        (evicted, start)
    }

    /// Newest item first; `None` ends the drain loop.
    async fn pop(&self) -> Option<InboxUiItem> {
        let mut pending = self.pending.lock().await;
        let item = pending.items.pop_back();
        if item.is_none() {
            pending.draining = false;
            self.activity.send_modify(|activity| activity.draining = false);
        }
        item
    }

    async fn finish_if_empty(&self) -> bool {
        let mut pending = self.pending.lock().await;
        if !pending.items.is_empty() {
            return false;
        }
        pending.draining = false;
        self.activity.send_modify(|activity| activity.draining = false);
        true
    }

    pub(crate) async fn len(&self) -> usize {
        self.pending.lock().await.items.len()
    }
}

impl InboxEngine {
    /// Marks the eligible ids and starts one trusted batch for them.
    /// Returns `None` when nothing needed unboxing.
    pub async fn enqueue(
        self: &Arc<Self>,
        request: UnboxRequest,
    ) -> Option<JoinHandle<Result<BatchSummary, SyncError>>> {
        let (work, auto_selected) = {
            let mut cache = self.cache.lock().await;
            let mut seen = HashSet::new();
            let mut work = Vec::new();
            for id in &request.ids {
                if !seen.insert(id.clone()) {
                    continue;
                }
                if id.is_pending() {
                    debug!(conversation_id = %id, "unbox: skipping pending conversation");
                    continue;
                }
                if cache.is_reset_superseded(id) {
                    debug!(conversation_id = %id, "unbox: skipping conversation left by a reset");
                    continue;
                }
                let current = cache.state(id);
                match current.begin_unbox(request.force) {
                    Some(next) => {
                        cache.set_state(id.clone(), next);
                        work.push(id.clone());
                    }
                    None => {
                        debug!(conversation_id = %id, state = ?current, "unbox: already handled");
                    }
                }
            }

            let auto_selected = match work.first() {
                Some(first) if self.settings.selects_first_unboxed() && cache.selected().is_none() => {
                    cache.select(Some(first.clone()));
                    Some(first.clone())
                }
                _ => None,
            };
            (work, auto_selected)
        };

        if let Some(id) = auto_selected {
            self.emit(InboxEvent::SelectConversation {
                id: Some(id),
                from_user: false,
            });
        }

        if work.is_empty() {
            if request.dismiss_syncing {
                self.set_syncing(SyncingState::NotSyncing);
            }
            return None;
        }

        self.queue.batch_started();
        let engine = Arc::clone(self);
        Some(tokio::spawn(async move {
            let result = engine.run_batch(&work, &request).await;
            if request.dismiss_syncing {
                engine.set_syncing(SyncingState::NotSyncing);
            }
            engine.queue.batch_finished();
            result
        }))
    }

    async fn run_batch(
        self: &Arc<Self>,
        ids: &[ConversationId],
        request: &UnboxRequest,
    ) -> Result<BatchSummary, SyncError> {
        let _serialized = self.queue.batch_lock.lock().await;
        let timeout = self.settings.unbox_timeout();
        info!(
            count = ids.len(),
            reason = %request.reason,
            force = request.force,
            "unbox: batch started"
        );

        match tokio::time::timeout(timeout, self.stream_batch(ids, request)).await {
            Ok(Ok(summary)) => {
                info!(
                    unboxed = summary.unboxed,
                    failed = summary.failed,
                    "unbox: batch finished"
                );
                Ok(summary)
            }
            Ok(Err(err)) => {
                let rolled_back = self.roll_back(ids).await;
                warn!(rolled_back, "unbox: batch failed: {err:#}");
                Err(SyncError::Remote(err))
            }
            Err(_) => {
                let rolled_back = self.roll_back(ids).await;
                warn!(rolled_back, ?timeout, "unbox: batch timed out");
                Err(SyncError::UnboxTimeout {
                    count: ids.len(),
                    timeout,
                })
            }
        }
    }

    async fn stream_batch(
        self: &Arc<Self>,
        ids: &[ConversationId],
        request: &UnboxRequest,
    ) -> anyhow::Result<BatchSummary> {
        let query = InboxQuery::for_conversations(ids.to_vec());
        let mut events = self
            .remote
            .unbox_conversations(query, request.for_inbox_sync)
            .await?;
        let mut summary = BatchSummary {
            requested: ids.len(),
            ..BatchSummary::default()
        };
        while let Some(event) = events.next().await {
            match event {
                UnboxEvent::Conversation(item) => {
                    summary.unboxed += 1;
                    self.push_trusted(item).await;
                }
                UnboxEvent::Failed(failure) => {
                    summary.failed += 1;
                    self.process_failure(failure).await;
                }
            }
        }
        Ok(summary)
    }

    /// Returns every id of the batch still in flight to `untrusted`.
    async fn roll_back(&self, ids: &[ConversationId]) -> usize {
        let mut cache = self.cache.lock().await;
        ids.iter()
            .filter(|id| cache.transition(id, Transition::RollBack))
            .count()
    }

    /// Hands a trusted copy to the micro-queue.
    pub(crate) async fn push_trusted(self: &Arc<Self>, item: InboxUiItem) {
        let (evicted, start_drain) = self.queue.push(item).await;
        if let Some(evicted) = evicted {
            let id = evicted.conv_id;
            let rolled_back = self.cache.lock().await.transition(&id, Transition::RollBack);
            warn!(conversation_id = %id, rolled_back, "unbox: pending queue full, dropped oldest item");
        }
        if start_drain {
            let engine = Arc::clone(self);
            tokio::spawn(async move { engine.drain_pending().await });
        }
    }

    async fn drain_pending(self: Arc<Self>) {
        let interval = self.settings.drain_interval();
        while let Some(item) = self.queue.pop().await {
            self.apply_trusted(item).await;
            if self.queue.finish_if_empty().await {
                break;
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Resolves once no batch is running and the micro-queue is drained.
    pub async fn wait_until_idle(&self) {
        let mut activity = self.queue.activity.subscribe();
        let _ = activity.wait_for(Activity::is_idle).await;
    }

    pub async fn pending_items(&self) -> usize {
        self.queue.len().await
    }
}

#[cfg(test)]
#[path = "tests/unbox_queue_tests.rs"]
mod tests;
