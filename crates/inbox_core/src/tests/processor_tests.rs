use shared::{
    domain::{ConversationStatus, DeviceType, NotificationKind, TeamType, TopicType},
    protocol::{ConversationErrorType, FinalizeInfo, IdTriple, ConversationMetadata, ReaderInfo},
};

use super::*;
use crate::{
    snippet::PlainSnippet,
    test_support::{drain_events, engine, failure, id, small_record, trusted, FakeRemote},
};

const SNIPPETS: PlainSnippet = PlainSnippet { max_chars: 100 };

fn reset_info() -> FinalizeInfo {
    FinalizeInfo {
        reset_user: "carol".to_string(),
        reset_date: "2024-02-01".to_string(),
        reset_full: "carol reset their account".to_string(),
        reset_timestamp: 10,
    }
}

#[test]
fn trusted_copy_is_stored_and_marked_unboxed() {
    let mut cache = InboxCache::default();
    cache.set_state(id("c1"), UntrustedState::FirstUnboxing);
    let mut item = trusted("c1", "bob,alice", 1);
    item.snippet = Some("hello\n  there".to_string());

    assert_eq!(apply(&mut cache, &item, &SNIPPETS), ApplyOutcome::Stored);
    assert_eq!(cache.state(&id("c1")), UntrustedState::Unboxed);
    assert_eq!(cache.version(&id("c1")), Some(VersionStamp::trusted(1)));
    assert!(cache.is_small_team(&id("c1")));
    assert_eq!(cache.snippet(&id("c1")), Some("hello there"));
}

#[test]
fn older_trusted_copy_leaves_cache_untouched() {
    let mut cache = InboxCache::default();
    cache.upsert_record(small_record("x", 2, 50));
    cache.stamp(id("x"), VersionStamp::trusted(2));
    cache.set_state(id("x"), UntrustedState::ReUnboxing);

    let mut item = trusted("x", "bob,alice", 1);
    item.snippet = Some("old".to_string());
    assert_eq!(apply(&mut cache, &item, &SNIPPETS), ApplyOutcome::Stale);

    let record = cache.record(&id("x")).expect("record kept");
    assert_eq!(record.version, 2);
    assert_eq!(record.time, 50);
    assert!(cache.snippet(&id("x")).is_none());
    assert_eq!(cache.state(&id("x")), UntrustedState::Unboxed);
}

#[test]
fn stale_copy_over_untrusted_stamp_settles_back_to_untrusted() {
    let mut cache = InboxCache::default();
    cache.stamp(id("x"), VersionStamp::untrusted(5));
    cache.set_state(id("x"), UntrustedState::FirstUnboxing);

    assert_eq!(
        apply(&mut cache, &trusted("x", "bob,alice", 4), &SNIPPETS),
        ApplyOutcome::Stale
    );
    assert_eq!(cache.state(&id("x")), UntrustedState::Untrusted);
}

#[test]
fn same_version_trusted_copy_replaces_untrusted_record() {
    let mut cache = InboxCache::default();
    cache.upsert_record(small_record("x", 3, 10));
    cache.stamp(id("x"), VersionStamp::untrusted(3));

    assert_eq!(
        apply(&mut cache, &trusted("x", "bob,alice", 3), &SNIPPETS),
        ApplyOutcome::Stored
    );
    assert_eq!(cache.version(&id("x")), Some(VersionStamp::trusted(3)));
    assert_eq!(cache.record(&id("x")).expect("record").time, 2_003);
}

#[test]
fn implicit_team_reset_updates_only_reset_participants() {
    let mut cache = InboxCache::default();
    cache.upsert_record(small_record("imp", 4, 10));
    cache.stamp(id("imp"), VersionStamp::trusted(4));
    cache.set_state(id("imp"), UntrustedState::Unboxed);

    let mut item = trusted("imp", "bob,carol", 4);
    item.members_type = MembersType::ImpTeam;
    item.reset_participants = vec!["carol".to_string()];
    item.snippet = Some("ignored".to_string());

    assert_eq!(apply(&mut cache, &item, &SNIPPETS), ApplyOutcome::Stale);
    assert_eq!(
        cache.reset_participants(&id("imp")),
        Some(&["carol".to_string()][..])
    );
    assert_eq!(cache.record(&id("imp")).expect("record").time, 10);
    assert!(cache.snippet(&id("imp")).is_none());
    assert!(cache.supersedes(&id("imp")).is_none());
    assert!(cache.superseded_by(&id("imp")).is_none());
    assert_eq!(cache.state(&id("imp")), UntrustedState::Unboxed);

    item.reset_participants.clear();
    apply(&mut cache, &item, &SNIPPETS);
    assert!(cache.reset_participants(&id("imp")).is_none());
}

#[test]
fn supersede_links_are_decoded_for_non_team_conversations() {
    let mut cache = InboxCache::default();
    let mut item = trusted("new", "bob,alice", 1);
    item.supersedes = vec![ConversationMetadata {
        id_triple: IdTriple {
            topic_type: TopicType::Chat,
        },
        conversation_id: "3q2+7w==".to_string(),
        finalize_info: Some(reset_info()),
    }];
    item.finalize_info = Some(reset_info());

    apply(&mut cache, &item, &SNIPPETS);
    let link = cache.supersedes(&id("new")).expect("supersedes");
    assert_eq!(link.conversation_id, id("deadbeef"));
    assert_eq!(cache.finalized(&id("new")), Some(&reset_info()));

    let mut team = trusted("team", "acme", 1);
    team.members_type = MembersType::Team;
    team.supersedes = item.supersedes.clone();
    apply(&mut cache, &team, &SNIPPETS);
    assert!(cache.supersedes(&id("team")).is_none());
}

#[test]
fn payload_without_reset_metadata_keeps_stored_links() {
    let mut cache = InboxCache::default();
    let mut item = trusted("new", "bob,alice", 1);
    item.superseded_by = vec![ConversationMetadata {
        id_triple: IdTriple {
            topic_type: TopicType::Chat,
        },
        conversation_id: "3q2+7w==".to_string(),
        finalize_info: Some(reset_info()),
    }];
    apply(&mut cache, &item, &SNIPPETS);
    assert!(cache.superseded_by(&id("new")).is_some());

    apply(&mut cache, &trusted("new", "bob,alice", 2), &SNIPPETS);
    let link = cache.superseded_by(&id("new")).expect("link kept");
    assert_eq!(link.conversation_id, id("deadbeef"));
    assert!(cache.is_reset_superseded(&id("new")));
}

#[test]
fn public_copy_is_rejected() {
    let mut cache = InboxCache::default();
    cache.set_state(id("pub"), UntrustedState::FirstUnboxing);
    let mut item = trusted("pub", "bob,alice", 1);
    item.visibility = shared::domain::Visibility::Public;

    assert_eq!(apply(&mut cache, &item, &SNIPPETS), ApplyOutcome::Rejected);
    assert!(cache.record(&id("pub")).is_none());
    assert_eq!(cache.state(&id("pub")), UntrustedState::Untrusted);
}

#[test]
fn blocked_conversation_leaves_visible_indices() {
    let mut cache = InboxCache::default();
    cache.upsert_record(small_record("c1", 1, 10));
    cache.stamp(id("c1"), VersionStamp::untrusted(1));

    let mut item = trusted("c1", "bob,alice", 2);
    item.status = ConversationStatus::Blocked;
    assert_eq!(apply(&mut cache, &item, &SNIPPETS), ApplyOutcome::Removed);
    assert!(cache.record(&id("c1")).is_none());
    assert!(!cache.is_small_team(&id("c1")));
    assert_eq!(cache.version(&id("c1")), Some(VersionStamp::trusted(2)));
}

#[test]
fn big_team_keeps_rekey_state_and_skips_snippet() {
    let mut cache = InboxCache::default();
    cache.set_rekey(id("big"), RekeyState::SelfNeeded);
    cache.set_rekey(id("dm"), RekeyState::SelfNeeded);

    let mut big = trusted("big", "acme", 1);
    big.members_type = MembersType::Team;
    big.team_type = TeamType::Complex;
    big.channel = "general".to_string();
    big.snippet = Some("hi".to_string());
    apply(&mut cache, &big, &SNIPPETS);
    assert!(cache.rekey(&id("big")).is_some());
    assert!(cache.snippet(&id("big")).is_none());
    assert_eq!(cache.big_channel(&id("big")), Some("general"));

    apply(&mut cache, &trusted("dm", "bob,alice", 1), &SNIPPETS);
    assert!(cache.rekey(&id("dm")).is_none());
}

#[test]
fn failure_builds_error_placeholder() {
    let mut cache = InboxCache::default();
    cache.set_state(id("bad"), UntrustedState::FirstUnboxing);

    let outcome = apply_failure(
        &mut cache,
        &failure("bad", ConversationErrorType::OtherRekeyNeeded, &["alice"]),
    );
    assert_eq!(
        outcome.kind,
        UnboxFailureKind::OtherRekeyNeeded {
            rekeyers: vec!["alice".to_string()]
        }
    );
    assert_eq!(outcome.mark_read, None);
    assert_eq!(cache.state(&id("bad")), UntrustedState::Error);
    assert_eq!(cache.snippet(&id("bad")), Some("unbox failed: OtherRekeyNeeded"));
    assert_eq!(
        cache.rekey(&id("bad")),
        Some(&RekeyState::OthersNeeded {
            rekeyers: vec!["alice".to_string()]
        })
    );
    assert!(cache.is_small_team(&id("bad")));
}

#[test]
fn selected_failure_requests_mark_as_read() {
    let mut cache = InboxCache::default();
    cache.select(Some(id("bad")));
    let mut failed = failure("bad", ConversationErrorType::Transient, &[]);
    failed.error.remote_conv.reader_info = Some(ReaderInfo {
        mtime: 5,
        max_msgid: MessageId(42),
    });

    let outcome = apply_failure(&mut cache, &failed);
    assert_eq!(outcome.kind, UnboxFailureKind::Transient);
    assert_eq!(outcome.mark_read, Some(MessageId(42)));
    assert!(cache.rekey(&id("bad")).is_none());
}

#[tokio::test]
async fn unclassified_failure_escalates_and_swallows_mark_as_read_errors() {
    let remote = FakeRemote::new();
    let engine = engine(remote.clone()).await;
    engine.select_conversation(Some(id("bad")), true).await;
    let mut events = engine.subscribe_events();

    let mut failed = failure("bad", ConversationErrorType::Misc, &[]);
    failed.error.remote_conv.reader_info = Some(ReaderInfo {
        mtime: 5,
        max_msgid: MessageId(7),
    });
    engine.process_failure(failed).await;

    assert_eq!(
        *remote.marked_read.lock().await,
        vec![(id("bad"), MessageId(7))]
    );
    let seen = drain_events(&mut events);
    assert!(seen.contains(&InboxEvent::ConversationFailed {
        id: id("bad"),
        kind: UnboxFailureKind::Unclassified,
    }));
    assert!(seen
        .iter()
        .any(|event| matches!(event, InboxEvent::GlobalError(_))));
}

#[tokio::test]
async fn self_rekey_failure_emits_rekey_event() {
    let engine = engine(FakeRemote::new()).await;
    let mut events = engine.subscribe_events();

    engine
        .process_failure(failure("bad", ConversationErrorType::SelfRekeyNeeded, &[]))
        .await;

    let seen = drain_events(&mut events);
    assert!(seen.contains(&InboxEvent::RekeySelf(id("bad"))));
    assert!(!seen
        .iter()
        .any(|event| matches!(event, InboxEvent::GlobalError(_))));
}

#[tokio::test]
async fn notification_settings_replace_record_preferences() {
    let engine = engine(FakeRemote::new()).await;
    engine.apply_trusted(trusted("c1", "bob,alice", 1)).await;
    let mut events = engine.subscribe_events();

    let settings = ConversationNotificationInfo {
        channel_wide: false,
        settings: std::collections::HashMap::from([(
            DeviceType::Desktop,
            std::collections::HashMap::from([(NotificationKind::Generic, true)]),
        )]),
    };
    assert!(engine.update_notifications(&id("c1"), &settings).await);
    assert!(!engine.update_notifications(&id("missing"), &settings).await);

    let prefs = engine
        .read_cache(|cache| cache.record(&id("c1")).and_then(|record| record.notifications))
        .await
        .expect("notifications stored");
    assert!(prefs.desktop.generic);
    assert!(!prefs.desktop.at_mention);
    assert_eq!(
        drain_events(&mut events),
        vec![InboxEvent::NotificationsUpdated(id("c1"))]
    );
}
