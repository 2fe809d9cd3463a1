use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use shared::{
    domain::{
        ConversationId, ConversationStatus, MemberStatus, MembersType, MessageId, TeamType,
        Visibility,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        ConversationErrorLocal, ConversationErrorRekey, ConversationErrorType,
        ConversationFailure, InboxListing, InboxQuery, InboxUiItem, LocalMetadata,
        RemoteConversationSummary, UnboxEvent, UnverifiedInbox, UnverifiedInboxItem,
    },
};
use tokio::sync::{broadcast, Mutex};

use crate::{
    record::ConversationRecord, EngineSettings, InboxEngine, InboxEvent, InboxRemote,
    LoadMoreOptions, MessagePager, PlainSnippet,
};

pub(crate) const ME: &str = "bob";

enum ListingScript {
    Items(Vec<UnverifiedInboxItem>),
    Sentinel(String),
    Missing,
    Transport(String),
}

/// Scripted remote: answers unbox calls from a per-id table.
pub(crate) struct FakeRemote {
    listing: Mutex<ListingScript>,
    listing_delay: Mutex<Option<Duration>>,
    answers: Mutex<HashMap<ConversationId, UnboxEvent>>,
    hang_after_answers: Mutex<bool>,
    unbox_error: Mutex<Option<String>>,
    pub(crate) unbox_calls: Mutex<Vec<(Vec<ConversationId>, bool)>>,
    pub(crate) list_calls: Mutex<usize>,
    pub(crate) marked_read: Mutex<Vec<(ConversationId, MessageId)>>,
    pub(crate) joined: Mutex<Vec<ConversationId>>,
    pub(crate) previewed: Mutex<Vec<ConversationId>>,
    pub(crate) readded: Mutex<Vec<(ConversationId, String)>>,
}

impl FakeRemote {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            listing: Mutex::new(ListingScript::Items(Vec::new())),
            listing_delay: Mutex::new(None),
            answers: Mutex::new(HashMap::new()),
            hang_after_answers: Mutex::new(false),
            unbox_error: Mutex::new(None),
            unbox_calls: Mutex::new(Vec::new()),
            list_calls: Mutex::new(0),
            marked_read: Mutex::new(Vec::new()),
            joined: Mutex::new(Vec::new()),
            previewed: Mutex::new(Vec::new()),
            readded: Mutex::new(Vec::new()),
        })
    }

    pub(crate) async fn set_listing(&self, items: Vec<UnverifiedInboxItem>) {
        *self.listing.lock().await = ListingScript::Items(items);
    }

    pub(crate) async fn set_listing_sentinel(&self, message: &str) {
        *self.listing.lock().await = ListingScript::Sentinel(message.to_string());
    }

    pub(crate) async fn set_listing_missing(&self) {
        *self.listing.lock().await = ListingScript::Missing;
    }

    pub(crate) async fn set_listing_transport_error(&self, message: &str) {
        *self.listing.lock().await = ListingScript::Transport(message.to_string());
    }

    pub(crate) async fn delay_listing(&self, delay: Duration) {
        *self.listing_delay.lock().await = Some(delay);
    }

    pub(crate) async fn answer(&self, item: InboxUiItem) {
        self.answers
            .lock()
            .await
            .insert(item.conv_id.clone(), UnboxEvent::Conversation(item));
    }

    pub(crate) async fn answer_failure(&self, failure: ConversationFailure) {
        self.answers
            .lock()
            .await
            .insert(failure.conv_id.clone(), UnboxEvent::Failed(failure));
    }

    /// The unbox stream yields its answers and then never completes.
    pub(crate) async fn hang_unbox(&self) {
        *self.hang_after_answers.lock().await = true;
    }

    pub(crate) async fn fail_unbox(&self, message: &str) {
        *self.unbox_error.lock().await = Some(message.to_string());
    }

    pub(crate) async fn unboxed_ids(&self) -> Vec<Vec<ConversationId>> {
        self.unbox_calls
            .lock()
            .await
            .iter()
            .map(|(ids, _)| ids.clone())
            .collect()
    }
}

#[async_trait]
impl InboxRemote for FakeRemote {
    async fn list_conversations(&self, _query: InboxQuery) -> Result<InboxListing> {
        *self.list_calls.lock().await += 1;
        let delay = *self.listing_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match &*self.listing.lock().await {
            ListingScript::Items(items) => Ok(InboxListing {
                inbox: Some(UnverifiedInbox {
                    items: items.clone(),
                }),
                error: None,
            }),
            ListingScript::Sentinel(message) => Ok(InboxListing {
                inbox: None,
                error: Some(ApiError::new(ErrorCode::Internal, message.clone())),
            }),
            ListingScript::Missing => Ok(InboxListing::default()),
            ListingScript::Transport(message) => Err(anyhow!(message.clone())),
        }
    }

    async fn unbox_conversations(
        &self,
        query: InboxQuery,
        skip_unverified: bool,
    ) -> Result<BoxStream<'static, UnboxEvent>> {
        self.unbox_calls
            .lock()
            .await
            .push((query.conv_ids.clone(), skip_unverified));
        if let Some(message) = self.unbox_error.lock().await.clone() {
            return Err(anyhow!(message));
        }
        let answers = self.answers.lock().await;
        let events = query
            .conv_ids
            .iter()
            .filter_map(|id| answers.get(id).cloned())
            .collect::<Vec<_>>();
        let stream = tokio_stream::iter(events);
        if *self.hang_after_answers.lock().await {
            Ok(stream.chain(futures::stream::pending::<UnboxEvent>()).boxed())
        } else {
            Ok(stream.boxed())
        }
    }

    async fn mark_as_read(&self, conversation_id: &ConversationId, msg_id: MessageId) -> Result<()> {
        self.marked_read
            .lock()
            .await
            .push((conversation_id.clone(), msg_id));
        Err(anyhow!("mark as read rejected"))
    }

    async fn join_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        self.joined.lock().await.push(conversation_id.clone());
        Ok(())
    }

    async fn preview_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        self.previewed.lock().await.push(conversation_id.clone());
        Ok(())
    }

    async fn add_member_after_reset(
        &self,
        conversation_id: &ConversationId,
        username: &str,
    ) -> Result<()> {
        self.readded
            .lock()
            .await
            .push((conversation_id.clone(), username.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PagerCall {
    Clear(ConversationId),
    LoadMore(ConversationId, LoadMoreOptions),
}

pub(crate) struct RecordingPager {
    last_shown: Mutex<Option<MessageId>>,
    pub(crate) calls: Mutex<Vec<PagerCall>>,
}

impl RecordingPager {
    pub(crate) fn new(last_shown: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            last_shown: Mutex::new(last_shown.map(MessageId)),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl MessagePager for RecordingPager {
    async fn last_message_id(&self, _conversation_id: &ConversationId) -> Result<Option<MessageId>> {
        Ok(*self.last_shown.lock().await)
    }

    async fn clear_messages(&self, conversation_id: &ConversationId) -> Result<()> {
        self.calls
            .lock()
            .await
            .push(PagerCall::Clear(conversation_id.clone()));
        Ok(())
    }

    async fn load_more_messages(
        &self,
        conversation_id: &ConversationId,
        options: LoadMoreOptions,
    ) -> Result<()> {
        self.calls
            .lock()
            .await
            .push(PagerCall::LoadMore(conversation_id.clone(), options));
        Ok(())
    }
}

pub(crate) fn settings() -> EngineSettings {
    EngineSettings {
        auto_select_first: false,
        ..EngineSettings::default()
    }
}

pub(crate) async fn engine_with(
    settings: EngineSettings,
    remote: Arc<FakeRemote>,
    pager: Arc<RecordingPager>,
) -> Arc<InboxEngine> {
    let snippets = Arc::new(PlainSnippet {
        max_chars: settings.snippet_max_chars,
    });
    let engine = InboxEngine::new_with_dependencies(settings, remote, pager, snippets);
    engine.set_username(Some(ME.to_string())).await;
    engine
}

pub(crate) async fn engine(remote: Arc<FakeRemote>) -> Arc<InboxEngine> {
    engine_with(settings(), remote, RecordingPager::new(None)).await
}

pub(crate) fn id(key: &str) -> ConversationId {
    ConversationId::from(key)
}

pub(crate) fn unverified(key: &str, name: &str, version: u64) -> UnverifiedInboxItem {
    UnverifiedInboxItem {
        conv_id: id(key),
        name: name.to_string(),
        version,
        max_msg_id: MessageId(0),
        members_type: MembersType::Kbfs,
        team_type: TeamType::None,
        status: ConversationStatus::Unfiled,
        member_status: MemberStatus::Active,
        visibility: Visibility::Private,
        time: 1_000 + version as i64,
        is_empty: false,
        local_metadata: None,
        finalize_info: None,
    }
}

pub(crate) fn unverified_team(key: &str, team: &str, channel: &str, version: u64) -> UnverifiedInboxItem {
    UnverifiedInboxItem {
        members_type: MembersType::Team,
        team_type: TeamType::Complex,
        local_metadata: Some(LocalMetadata {
            channel_name: channel.to_string(),
            ..LocalMetadata::default()
        }),
        ..unverified(key, team, version)
    }
}

pub(crate) fn trusted(key: &str, name: &str, version: u64) -> InboxUiItem {
    InboxUiItem {
        conv_id: id(key),
        name: name.to_string(),
        channel: String::new(),
        participants: name.split(',').map(str::to_string).collect(),
        full_names: HashMap::new(),
        version,
        max_msg_id: MessageId(0),
        members_type: MembersType::Kbfs,
        team_type: TeamType::None,
        status: ConversationStatus::Unfiled,
        member_status: MemberStatus::Active,
        visibility: Visibility::Private,
        time: 2_000 + version as i64,
        is_empty: false,
        snippet: None,
        notifications: None,
        reset_participants: Vec::new(),
        supersedes: Vec::new(),
        superseded_by: Vec::new(),
        finalize_info: None,
    }
}

pub(crate) fn failure(
    key: &str,
    typ: ConversationErrorType,
    rekeyers: &[&str],
) -> ConversationFailure {
    ConversationFailure {
        conv_id: id(key),
        error: ConversationErrorLocal {
            typ,
            message: format!("unbox failed: {typ:?}"),
            unverified_tlf_name: format!("{ME},alice"),
            rekey_info: Some(ConversationErrorRekey {
                writer_names: vec![ME.to_string(), "alice".to_string()],
                reader_names: Vec::new(),
                rekeyers: rekeyers.iter().map(|name| name.to_string()).collect(),
            }),
            remote_conv: RemoteConversationSummary::default(),
        },
    }
}

pub(crate) fn small_record(key: &str, version: u64, time: i64) -> ConversationRecord {
    ConversationRecord {
        conversation_id: id(key),
        name: format!("{ME},alice"),
        participants: vec![ME.to_string(), "alice".to_string()],
        full_names: HashMap::new(),
        teamname: None,
        channelname: None,
        members_type: MembersType::Kbfs,
        team_type: TeamType::None,
        visibility: Visibility::Private,
        status: ConversationStatus::Unfiled,
        member_status: MemberStatus::Active,
        time,
        max_msg_id: MessageId(0),
        version,
        notifications: None,
        is_empty: false,
    }
}

pub(crate) fn drain_events(events: &mut broadcast::Receiver<InboxEvent>) -> Vec<InboxEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
