use std::{collections::HashSet, sync::Arc};

use shared::{
    domain::{ConversationId, MembersType},
    protocol::{InboxQuery, UnverifiedInboxItem},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    badge::BadgeDelta,
    cache::InboxCache,
    error::SyncError,
    record::ConversationRecord,
    snippet::SnippetFormatter,
    state::{InboxLoadStatus, Transition},
    unbox_queue::UnboxRequest,
    version::{self, VersionStamp, VersionedWrite},
    InboxEngine, InboxEvent,
};

/// Result of folding one untrusted listing into the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ListingOutcome {
    pub stored: Vec<ConversationId>,
    pub deleted: Vec<ConversationId>,
    /// Ids to unbox first: leading direct conversations, then every team.
    pub priority: Vec<ConversationId>,
    /// Unread maps that lost entries for deleted conversations.
    pub badges: BadgeDelta,
}

/// Applies a full listing in one pass. The caller holds the cache lock.
pub(crate) fn apply_listing(
    cache: &mut InboxCache,
    author: &str,
    items: &[UnverifiedInboxItem],
    snippets: &dyn SnippetFormatter,
    priority_count: usize,
) -> ListingOutcome {
    let incoming = items
        .iter()
        .map(|item| item.conv_id.clone())
        .collect::<HashSet<_>>();
    let mut deleted = cache
        .keys()
        .into_iter()
        .filter(|id| !incoming.contains(id))
        .collect::<Vec<_>>();
    deleted.sort();

    let mut outcome = ListingOutcome::default();
    let mut small = Vec::new();
    let mut teams = Vec::new();

    for item in items {
        let Some(record) = ConversationRecord::from_untrusted(author, item) else {
            debug!(conversation_id = %item.conv_id, "inbox: skipping public or mixed conversation");
            continue;
        };
        let id = item.conv_id.clone();
        if record.members_type == MembersType::Team {
            teams.push(id.clone());
        } else {
            small.push(id.clone());
        }

        if let Some(finalize_info) = &item.finalize_info {
            cache.set_finalized(id.clone(), finalize_info.clone());
        }

        let write = VersionedWrite {
            version: item.version,
            trusted: false,
            forced: false,
        };
        if let Err(err) = version::check(&id, cache.version(&id), write) {
            debug!("inbox: {err}");
            continue;
        }

        if let Some(meta) = item
            .local_metadata
            .as_ref()
            .filter(|meta| !meta.snippet.is_empty())
        {
            cache.set_snippet(id.clone(), snippets.format(&meta.snippet));
        }
        cache.stamp(id.clone(), VersionStamp::untrusted(item.version));
        cache.upsert_record(record);
        cache.transition(&id, Transition::Reloaded);
        outcome.stored.push(id);
    }

    for id in &deleted {
        let purged = cache.purge(id);
        outcome.badges.badge_changed |= purged.badge_changed;
        outcome.badges.total_changed |= purged.total_changed;
    }

    small.truncate(priority_count);
    small.extend(teams);
    outcome.priority = small;
    outcome.deleted = deleted;
    outcome
}

/// Puts the load status back to `unloaded` unless the load ran to completion.
struct LoadingGuard<'a> {
    status: &'a watch::Sender<InboxLoadStatus>,
    finished: bool,
}

impl<'a> LoadingGuard<'a> {
    fn start(status: &'a watch::Sender<InboxLoadStatus>) -> Self {
        status.send_replace(InboxLoadStatus::Loading);
        Self {
            status,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
        self.status.send_replace(InboxLoadStatus::Loaded);
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.status.send_replace(InboxLoadStatus::Unloaded);
        }
    }
}

impl InboxEngine {
    /// Replaces the cache with a fresh untrusted listing and schedules the
    /// priority subset for trusted unboxing.
    pub async fn reload(self: &Arc<Self>, reason: &str) -> Result<(), SyncError> {
        let author = self.username().await.ok_or(SyncError::NotLoggedIn)?;
        let guard = LoadingGuard::start(&self.load_status);
        info!(reason, "inbox: loading untrusted inbox");

        let result = self.load_listing(&author).await;
        guard.finish();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("inbox: untrusted load failed: {err}");
                return Err(err);
            }
        };

        info!(
            stored = outcome.stored.len(),
            deleted = outcome.deleted.len(),
            priority = outcome.priority.len(),
            "inbox: untrusted inbox applied"
        );
        for id in &outcome.deleted {
            self.emit(InboxEvent::ConversationRemoved(id.clone()));
        }
        if outcome.badges.badge_changed {
            self.emit(InboxEvent::UnreadBadgesChanged);
        }
        if outcome.badges.total_changed {
            self.emit(InboxEvent::UnreadTotalsChanged);
        }
        self.emit(InboxEvent::StoreLoaded {
            stored: outcome.stored.len(),
            deleted: outcome.deleted.len(),
        });

        self.enqueue(UnboxRequest {
            ids: outcome.priority,
            reason: "initial trusted load".to_string(),
            dismiss_syncing: true,
            ..UnboxRequest::default()
        })
        .await;
        Ok(())
    }

    async fn load_listing(&self, author: &str) -> Result<ListingOutcome, SyncError> {
        let listing = self
            .remote
            .list_conversations(InboxQuery::inbox())
            .await
            .map_err(SyncError::Remote)?;
        if let Some(error) = listing.error {
            return Err(SyncError::LoadFailed(error.message));
        }
        let inbox = listing
            .inbox
            .ok_or_else(|| SyncError::LoadFailed("listing carried no inbox".to_string()))?;

        let mut cache = self.cache.lock().await;
        Ok(apply_listing(
            &mut cache,
            author,
            &inbox.items,
            self.snippets.as_ref(),
            self.settings.priority_unbox_count,
        ))
    }

    /// Starts a reload in the background, aborting any load still running.
    pub async fn request_reload(self: &Arc<Self>, reason: impl Into<String>) {
        let reason = reason.into();
        let mut slot = self.reload_task.lock().await;
        if let Some(previous) = slot.take() {
            if !previous.is_finished() {
                debug!("inbox: superseding in-flight reload");
            }
            previous.abort();
            // The old load guard must drop before the new load reports `loading`.
            let _ = previous.await;
        }
        let engine = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            if let Err(err) = engine.reload(&reason).await {
                engine.emit(InboxEvent::GlobalError(err.to_string()));
            }
        }));
    }

    pub async fn cancel_reload(&self) {
        let task = self.reload_task.lock().await.take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }

    pub async fn load_inbox(self: &Arc<Self>) {
        self.request_reload("inbox view requested").await;
    }
}

#[cfg(test)]
#[path = "tests/loader_tests.rs"]
mod tests;
