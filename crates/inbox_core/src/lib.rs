use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::{
    domain::{ConversationId, MessageId},
    protocol::{InboxListing, InboxQuery, UnboxEvent},
};
use tokio::{
    sync::{broadcast, watch, Mutex, RwLock},
    task::JoinHandle,
};

mod actions;
mod activity;
mod badge;
pub mod cache;
pub mod config;
pub mod error;
mod loader;
mod processor;
mod reconciler;
pub mod record;
pub mod snippet;
pub mod state;
mod unbox_queue;
pub mod version;

pub use badge::BadgeDelta;
pub use cache::{InboxCache, RekeyState};
pub use config::{load_settings, EngineSettings};
pub use error::{SyncError, UnboxFailureKind};
pub use processor::ApplyOutcome;
pub use reconciler::CatchUp;
pub use snippet::{PlainSnippet, SnippetFormatter};
pub use state::{InboxLoadStatus, SyncingState, Transition, UntrustedState};
pub use unbox_queue::{BatchSummary, UnboxRequest};

use unbox_queue::UnboxQueue;

/// Transport used by the engine for both the cheap listing and the trusted
/// unbox calls.
#[async_trait]
pub trait InboxRemote: Send + Sync {
    async fn list_conversations(&self, query: InboxQuery) -> Result<InboxListing>;
    /// Streams one event per requested conversation; the stream ending means
    /// the batch is complete.
    async fn unbox_conversations(
        &self,
        query: InboxQuery,
        skip_unverified: bool,
    ) -> Result<BoxStream<'static, UnboxEvent>>;
    async fn mark_as_read(&self, conversation_id: &ConversationId, msg_id: MessageId)
        -> Result<()>;
    async fn join_conversation(&self, conversation_id: &ConversationId) -> Result<()>;
    async fn preview_conversation(&self, conversation_id: &ConversationId) -> Result<()>;
    async fn add_member_after_reset(
        &self,
        conversation_id: &ConversationId,
        username: &str,
    ) -> Result<()>;
}

pub struct MissingInboxRemote;

#[async_trait]
impl InboxRemote for MissingInboxRemote {
    async fn list_conversations(&self, _query: InboxQuery) -> Result<InboxListing> {
        Err(anyhow!("inbox remote is unavailable"))
    }

    async fn unbox_conversations(
        &self,
        query: InboxQuery,
        _skip_unverified: bool,
    ) -> Result<BoxStream<'static, UnboxEvent>> {
        Err(anyhow!(
            "inbox remote is unavailable for {} conversations",
            query.conv_ids.len()
        ))
    }

    async fn mark_as_read(
        &self,
        conversation_id: &ConversationId,
        _msg_id: MessageId,
    ) -> Result<()> {
        Err(anyhow!("inbox remote is unavailable for {conversation_id}"))
    }

    async fn join_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        Err(anyhow!("inbox remote is unavailable for {conversation_id}"))
    }

    async fn preview_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        Err(anyhow!("inbox remote is unavailable for {conversation_id}"))
    }

    async fn add_member_after_reset(
        &self,
        conversation_id: &ConversationId,
        _username: &str,
    ) -> Result<()> {
        Err(anyhow!("inbox remote is unavailable for {conversation_id}"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadMoreOptions {
    pub only_if_unloaded: bool,
    pub from_user: bool,
    pub want_newer: bool,
    /// Exact number of messages to fetch instead of the pager's page size.
    pub number_override: Option<u64>,
}

/// Message thread paging owned by the conversation view.
#[async_trait]
pub trait MessagePager: Send + Sync {
    async fn last_message_id(&self, conversation_id: &ConversationId) -> Result<Option<MessageId>>;
    async fn clear_messages(&self, conversation_id: &ConversationId) -> Result<()>;
    async fn load_more_messages(
        &self,
        conversation_id: &ConversationId,
        options: LoadMoreOptions,
    ) -> Result<()>;
}

/// Pager used when no conversation view is attached.
pub struct MissingMessagePager;

#[async_trait]
impl MessagePager for MissingMessagePager {
    async fn last_message_id(
        &self,
        _conversation_id: &ConversationId,
    ) -> Result<Option<MessageId>> {
        Ok(None)
    }

    async fn clear_messages(&self, _conversation_id: &ConversationId) -> Result<()> {
        Ok(())
    }

    async fn load_more_messages(
        &self,
        _conversation_id: &ConversationId,
        _options: LoadMoreOptions,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxEvent {
    StoreLoaded {
        stored: usize,
        deleted: usize,
    },
    ConversationUpdated(ConversationId),
    ConversationRemoved(ConversationId),
    ConversationFailed {
        id: ConversationId,
        kind: UnboxFailureKind,
    },
    RekeySelf(ConversationId),
    RekeyOthers {
        id: ConversationId,
        rekeyers: Vec<String>,
    },
    GlobalError(String),
    SelectConversation {
        id: Option<ConversationId>,
        from_user: bool,
    },
    StartConversation {
        participants: Vec<String>,
    },
    NotificationsUpdated(ConversationId),
    UnreadBadgesChanged,
    UnreadTotalsChanged,
}

pub struct InboxEngine {
    settings: EngineSettings,
    remote: Arc<dyn InboxRemote>,
    pager: Arc<dyn MessagePager>,
    snippets: Arc<dyn SnippetFormatter>,
    username: RwLock<Option<String>>,
    cache: Mutex<InboxCache>,
    queue: UnboxQueue,
    reload_task: Mutex<Option<JoinHandle<()>>>,
    load_status: watch::Sender<InboxLoadStatus>,
    syncing: watch::Sender<SyncingState>,
    events: broadcast::Sender<InboxEvent>,
}

impl InboxEngine {
    pub fn new(settings: EngineSettings) -> Arc<Self> {
        Self::new_with_remote(settings, Arc::new(MissingInboxRemote))
    }

    pub fn new_with_remote(settings: EngineSettings, remote: Arc<dyn InboxRemote>) -> Arc<Self> {
        let snippets = Arc::new(PlainSnippet {
            max_chars: settings.snippet_max_chars,
        });
        Self::new_with_dependencies(settings, remote, Arc::new(MissingMessagePager), snippets)
    }

    pub fn new_with_dependencies(
        settings: EngineSettings,
        remote: Arc<dyn InboxRemote>,
        pager: Arc<dyn MessagePager>,
        snippets: Arc<dyn SnippetFormatter>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let (load_status, _) = watch::channel(InboxLoadStatus::Unloaded);
        let (syncing, _) = watch::channel(SyncingState::NotSyncing);
        Arc::new(Self {
            queue: UnboxQueue::new(settings.max_pending_items),
            settings,
            remote,
            pager,
            snippets,
            username: RwLock::new(None),
            cache: Mutex::new(InboxCache::default()),
            reload_task: Mutex::new(None),
            load_status,
            syncing,
            events,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// `None` logs the session out; loads then fail with `NotLoggedIn`.
    pub async fn set_username(&self, username: Option<String>) {
        *self.username.write().await = username;
    }

    pub async fn username(&self) -> Option<String> {
        self.username.read().await.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<InboxEvent> {
        self.events.subscribe()
    }

    pub fn load_status(&self) -> watch::Receiver<InboxLoadStatus> {
        self.load_status.subscribe()
    }

    pub fn syncing_state(&self) -> watch::Receiver<SyncingState> {
        self.syncing.subscribe()
    }

    /// Runs `read` against a consistent view of the cache.
    pub async fn read_cache<R>(&self, read: impl FnOnce(&InboxCache) -> R) -> R {
        let cache = self.cache.lock().await;
        read(&cache)
    }

    fn emit(&self, event: InboxEvent) {
        let _ = self.events.send(event);
    }

    fn set_syncing(&self, state: SyncingState) {
        self.syncing.send_replace(state);
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
