use std::{collections::HashMap, fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use futures::{stream::BoxStream, StreamExt};
use inbox_core::{
    config::load_settings_file, load_settings, EngineSettings, InboxEngine, InboxRemote,
    SyncError, UntrustedState,
};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{ConversationId, DeviceType, MessageId},
    error::{ApiError, ApiException},
    protocol::{
        ChatActivity, ConversationBadge, InboxListing, InboxQuery, ThreadStaleUpdate, UnboxEvent,
        UnverifiedInbox, UnverifiedInboxItem,
    },
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Replay a recorded inbox session against the sync engine")]
struct Args {
    /// JSON fixture with the listing, unbox answers and pushed activity.
    #[arg(long)]
    fixture: PathBuf,
    /// Settings file; defaults to ./inbox.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the configured device class.
    #[arg(long)]
    device: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    username: String,
    #[serde(default)]
    listing: Vec<UnverifiedInboxItem>,
    #[serde(default)]
    listing_error: Option<ApiError>,
    #[serde(default)]
    unboxed: Vec<UnboxEvent>,
    #[serde(default)]
    unbox_error: Option<ApiError>,
    #[serde(default)]
    activity: Vec<ChatActivity>,
    #[serde(default)]
    badges: Vec<ConversationBadge>,
    #[serde(default)]
    resync: Vec<UnverifiedInboxItem>,
    #[serde(default)]
    stale_threads: Vec<ConversationId>,
}

/// Serves the fixture's recorded answers.
struct FixtureRemote {
    listing: Vec<UnverifiedInboxItem>,
    listing_error: Option<ApiError>,
    unboxed: HashMap<ConversationId, UnboxEvent>,
    unbox_error: Option<ApiError>,
}

impl FixtureRemote {
    fn from_fixture(fixture: &Fixture) -> Self {
        Self {
            listing: fixture.listing.clone(),
            listing_error: fixture.listing_error.clone(),
            unboxed: fixture
                .unboxed
                .iter()
                .map(|event| (event.conv_id().clone(), event.clone()))
                .collect(),
            unbox_error: fixture.unbox_error.clone(),
        }
    }
}

#[async_trait]
impl InboxRemote for FixtureRemote {
    async fn list_conversations(&self, _query: InboxQuery) -> Result<InboxListing> {
        if let Some(error) = &self.listing_error {
            return Ok(InboxListing {
                inbox: None,
                error: Some(error.clone()),
            });
        }
        Ok(InboxListing {
            inbox: Some(UnverifiedInbox {
                items: self.listing.clone(),
            }),
            error: None,
        })
    }

    async fn unbox_conversations(
        &self,
        query: InboxQuery,
        _skip_unverified: bool,
    ) -> Result<BoxStream<'static, UnboxEvent>> {
        if let Some(error) = &self.unbox_error {
            return Err(ApiException::from(error.clone()).into());
        }
        let events = query
            .conv_ids
            .iter()
            .filter_map(|id| self.unboxed.get(id).cloned())
            .collect::<Vec<_>>();
        Ok(futures::stream::iter(events).boxed())
    }

    async fn mark_as_read(&self, conversation_id: &ConversationId, msg_id: MessageId) -> Result<()> {
        info!(conversation_id = %conversation_id, msg_id = msg_id.0, "replay: mark as read");
        Ok(())
    }

    async fn join_conversation(&self, _conversation_id: &ConversationId) -> Result<()> {
        Ok(())
    }

    async fn preview_conversation(&self, _conversation_id: &ConversationId) -> Result<()> {
        Ok(())
    }

    async fn add_member_after_reset(
        &self,
        _conversation_id: &ConversationId,
        _username: &str,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ConversationSummary {
    id: ConversationId,
    name: String,
    participants: Vec<String>,
    state: UntrustedState,
    version: Option<u64>,
    trusted: bool,
    big_team: bool,
    channel: Option<String>,
    snippet: Option<String>,
    badge: u32,
    unread: u32,
}

#[derive(Debug, Serialize)]
struct ReplaySummary {
    load_error: Option<String>,
    selected: Option<ConversationId>,
    conversations: Vec<ConversationSummary>,
}

fn settings_for(args: &Args) -> Result<EngineSettings> {
    let mut settings = match &args.config {
        Some(path) => load_settings_file(path)?
            .with_context(|| format!("settings file '{}' not found", path.display()))?,
        None => load_settings(),
    };
    match args.device.as_deref() {
        Some(device) if device.eq_ignore_ascii_case("mobile") => {
            settings.device_type = DeviceType::Mobile;
        }
        Some(device) if device.eq_ignore_ascii_case("desktop") => {
            settings.device_type = DeviceType::Desktop;
        }
        Some(other) => anyhow::bail!("unknown device class '{other}'"),
        None => {}
    }
    Ok(settings)
}

async fn summarize(engine: &InboxEngine, load_error: Option<String>) -> ReplaySummary {
    engine
        .read_cache(|cache| {
            let mut conversations = cache
                .records()
                .map(|record| {
                    let id = &record.conversation_id;
                    let stamp = cache.version(id);
                    ConversationSummary {
                        id: id.clone(),
                        name: record.name.clone(),
                        participants: record.participants.clone(),
                        state: cache.state(id),
                        version: stamp.map(|stamp| stamp.version),
                        trusted: stamp.is_some_and(|stamp| stamp.trusted),
                        big_team: cache.is_big_team(id),
                        channel: cache.big_channel(id).map(str::to_string),
                        snippet: cache.snippet(id).map(str::to_string),
                        badge: cache.unread_badges().get(id).copied().unwrap_or(0),
                        unread: cache.unread_totals().get(id).copied().unwrap_or(0),
                    }
                })
                .collect::<Vec<_>>();
            conversations.sort_by(|a, b| a.id.cmp(&b.id));
            ReplaySummary {
                load_error,
                selected: cache.selected().cloned(),
                conversations,
            }
        })
        .await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    let settings = settings_for(&args)?;

    let raw = fs::read_to_string(&args.fixture)
        .with_context(|| format!("failed to read fixture '{}'", args.fixture.display()))?;
    let fixture: Fixture = serde_json::from_str(&raw)
        .with_context(|| format!("invalid fixture '{}'", args.fixture.display()))?;

    let remote = Arc::new(FixtureRemote::from_fixture(&fixture));
    let engine = InboxEngine::new_with_remote(settings, remote);
    engine.set_username(Some(fixture.username.clone())).await;

    let load_error = match engine.reload("replay").await {
        Ok(()) => None,
        Err(err @ SyncError::LoadFailed(_)) | Err(err @ SyncError::Remote(_)) => {
            warn!("replay: inbox load failed: {err}");
            Some(err.to_string())
        }
        Err(err) => return Err(err.into()),
    };
    engine.wait_until_idle().await;

    for activity in fixture.activity {
        engine.handle_activity(activity).await;
    }
    engine.on_unread_counts(&fixture.badges).await;
    if !fixture.resync.is_empty() {
        engine.on_sync_started();
        engine.on_resync(fixture.resync).await?;
    }
    if !fixture.stale_threads.is_empty() {
        let updates = fixture
            .stale_threads
            .into_iter()
            .map(|conv_id| ThreadStaleUpdate { conv_id })
            .collect();
        engine.mark_threads_stale(updates).await?;
    }
    engine.wait_until_idle().await;

    let summary = summarize(&engine, load_error).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
