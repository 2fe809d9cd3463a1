use super::*;
use crate::{
    test_support::{drain_events, engine_with, id, settings, FakeRemote, RecordingPager},
    EngineSettings,
};

fn badge(key: &str, unread: u32, desktop: u32, mobile: u32) -> ConversationBadge {
    ConversationBadge {
        conv_id: Some(id(key)),
        unread_messages: unread,
        badge_counts: HashMap::from([(DeviceType::Desktop, desktop), (DeviceType::Mobile, mobile)]),
    }
}

#[test]
fn only_non_zero_counts_are_kept() {
    let mut cache = InboxCache::default();
    let delta = apply(
        &mut cache,
        &[
            badge("a", 3, 1, 0),
            badge("b", 0, 0, 4),
            ConversationBadge {
                conv_id: None,
                unread_messages: 9,
                badge_counts: HashMap::new(),
            },
        ],
        DeviceType::Desktop,
    );

    assert_eq!(
        delta,
        BadgeDelta {
            badge_changed: true,
            total_changed: true,
        }
    );
    assert_eq!(cache.unread_totals(), &HashMap::from([(id("a"), 3)]));
    assert_eq!(cache.unread_badges(), &HashMap::from([(id("a"), 1)]));
}

#[test]
fn device_class_selects_the_badge_column() {
    let mut cache = InboxCache::default();
    apply(&mut cache, &[badge("a", 3, 1, 0), badge("b", 1, 0, 4)], DeviceType::Mobile);
    assert_eq!(cache.unread_badges(), &HashMap::from([(id("b"), 4)]));
}

#[test]
fn identical_counts_are_not_rewritten() {
    let mut cache = InboxCache::default();
    let counts = [badge("a", 3, 1, 0)];
    apply(&mut cache, &counts, DeviceType::Desktop);
    assert_eq!(apply(&mut cache, &counts, DeviceType::Desktop), BadgeDelta::default());

    let delta = apply(&mut cache, &[badge("a", 4, 1, 0)], DeviceType::Desktop);
    assert!(!delta.badge_changed);
    assert!(delta.total_changed);
}

#[tokio::test]
async fn change_events_follow_rewritten_maps() {
    let settings = EngineSettings {
        device_type: DeviceType::Mobile,
        ..settings()
    };
    let engine = engine_with(settings, FakeRemote::new(), RecordingPager::new(None)).await;
    let mut events = engine.subscribe_events();

    engine.on_unread_counts(&[badge("a", 2, 0, 2)]).await;
    assert_eq!(
        drain_events(&mut events),
        vec![InboxEvent::UnreadBadgesChanged, InboxEvent::UnreadTotalsChanged]
    );

    engine.on_unread_counts(&[badge("a", 5, 0, 2)]).await;
    assert_eq!(
        drain_events(&mut events),
        vec![InboxEvent::UnreadTotalsChanged]
    );
    assert_eq!(engine.unread_badge(&id("a")).await, 2);
    assert_eq!(engine.unread_badge(&id("zzz")).await, 0);
}
