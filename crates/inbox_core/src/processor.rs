use shared::{
    domain::{ConversationId, MembersType, MessageId},
    protocol::{ConversationFailure, ConversationNotificationInfo, InboxUiItem},
};
use tracing::{debug, info, warn};

use crate::{
    cache::{InboxCache, RekeyState},
    error::UnboxFailureKind,
    record::{ConversationRecord, NotificationsState, SupersedeInfo},
    snippet::SnippetFormatter,
    state::{Transition, UntrustedState},
    version::{self, VersionStamp, VersionedWrite},
    InboxEngine, InboxEvent,
};

/// What a trusted copy did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Stored,
    /// Hidden status; the conversation left the visible indices.
    Removed,
    /// Public or mixed reader/writer conversation.
    Rejected,
    Stale,
}

/// Folds one trusted copy into the cache.
pub(crate) fn apply(
    cache: &mut InboxCache,
    item: &InboxUiItem,
    snippets: &dyn SnippetFormatter,
) -> ApplyOutcome {
    let id = item.conv_id.clone();

    if item.members_type == MembersType::ImpTeam {
        cache.set_reset_participants(id.clone(), item.reset_participants.clone());
    }

    if item.members_type != MembersType::Team {
        // A payload without reset metadata keeps the stored links.
        if let Some(info) = SupersedeInfo::from_metadata(&item.supersedes) {
            cache.set_supersedes(id.clone(), info);
        }
        if let Some(info) = SupersedeInfo::from_metadata(&item.superseded_by) {
            cache.set_superseded_by(id.clone(), info);
        }
        if let Some(finalize_info) = &item.finalize_info {
            cache.set_finalized(id.clone(), finalize_info.clone());
        }
    }

    let Some(record) = ConversationRecord::from_trusted(item) else {
        debug!(conversation_id = %id, "unbox: dropping public or mixed conversation");
        settle(cache, &id);
        return ApplyOutcome::Rejected;
    };

    let write = VersionedWrite {
        version: item.version,
        trusted: true,
        forced: cache.state(&id) == UntrustedState::ReUnboxing,
    };
    if let Err(err) = version::check(&id, cache.version(&id), write) {
        debug!("unbox: {err}");
        settle(cache, &id);
        return ApplyOutcome::Stale;
    }

    cache.transition(&id, Transition::Unboxed);
    cache.stamp(id.clone(), VersionStamp::trusted(item.version));

    if record.status.is_hidden() {
        cache.remove_visible(&id);
        return ApplyOutcome::Removed;
    }

    let big_team = record.is_big_team();
    cache.upsert_record(record);

    if !big_team {
        if let Some(snippet) = &item.snippet {
            cache.set_snippet(id.clone(), snippets.format(snippet));
        }
        cache.clear_rekey(&id);
    }
    ApplyOutcome::Stored
}

/// A stale or rejected copy still ends the unbox it answered.
fn settle(cache: &mut InboxCache, id: &ConversationId) {
    if !cache.state(id).is_in_flight() {
        return;
    }
    let settled = match cache.version(id) {
        Some(stamp) if stamp.trusted => UntrustedState::Unboxed,
        _ => UntrustedState::Untrusted,
    };
    cache.set_state(id.clone(), settled);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FailureOutcome {
    pub kind: UnboxFailureKind,
    /// Highest message the selected conversation should be marked read at.
    pub mark_read: Option<MessageId>,
}

pub(crate) fn apply_failure(cache: &mut InboxCache, failure: &ConversationFailure) -> FailureOutcome {
    let id = failure.conv_id.clone();
    let error = &failure.error;

    cache.upsert_record(ConversationRecord::placeholder_for_failure(failure));
    if !cache.transition(&id, Transition::Failed) {
        cache.set_state(id.clone(), UntrustedState::Error);
    }
    cache.set_snippet(id.clone(), error.message.clone());

    let mark_read = error
        .remote_conv
        .reader_info
        .map(|info| info.max_msgid)
        .filter(|msg_id| msg_id.0 > 0)
        .filter(|_| cache.selected() == Some(&id));

    let rekeyers = error
        .rekey_info
        .as_ref()
        .map(|rekey| rekey.rekeyers.as_slice())
        .unwrap_or_default();
    let kind = UnboxFailureKind::classify(error.typ, rekeyers);
    match &kind {
        UnboxFailureKind::SelfRekeyNeeded => cache.set_rekey(id, RekeyState::SelfNeeded),
        UnboxFailureKind::OtherRekeyNeeded { rekeyers } if !rekeyers.is_empty() => {
            cache.set_rekey(
                id,
                RekeyState::OthersNeeded {
                    rekeyers: rekeyers.clone(),
                },
            );
        }
        _ => {}
    }

    FailureOutcome { kind, mark_read }
}

impl InboxEngine {
    pub(crate) async fn apply_trusted(&self, item: InboxUiItem) -> ApplyOutcome {
        let outcome = {
            let mut cache = self.cache.lock().await;
            apply(&mut cache, &item, self.snippets.as_ref())
        };
        match outcome {
            ApplyOutcome::Stored => self.emit(InboxEvent::ConversationUpdated(item.conv_id)),
            ApplyOutcome::Removed => self.emit(InboxEvent::ConversationRemoved(item.conv_id)),
            ApplyOutcome::Rejected | ApplyOutcome::Stale => {}
        }
        outcome
    }

    pub(crate) async fn process_failure(&self, failure: ConversationFailure) {
        let id = failure.conv_id.clone();
        let outcome = {
            let mut cache = self.cache.lock().await;
            apply_failure(&mut cache, &failure)
        };
        info!(
            conversation_id = %id,
            kind = ?outcome.kind,
            "unbox: conversation failed to unbox"
        );

        if let Some(msg_id) = outcome.mark_read {
            if let Err(err) = self.remote.mark_as_read(&id, msg_id).await {
                debug!(conversation_id = %id, "unbox: mark as read failed: {err:#}");
            }
        }

        self.emit(InboxEvent::ConversationFailed {
            id: id.clone(),
            kind: outcome.kind.clone(),
        });
        match outcome.kind {
            UnboxFailureKind::SelfRekeyNeeded => self.emit(InboxEvent::RekeySelf(id)),
            UnboxFailureKind::OtherRekeyNeeded { rekeyers } if !rekeyers.is_empty() => {
                self.emit(InboxEvent::RekeyOthers { id, rekeyers });
            }
            UnboxFailureKind::Unclassified => {
                warn!(conversation_id = %id, "unbox: unclassified failure");
                self.emit(InboxEvent::GlobalError(failure.error.message));
            }
            UnboxFailureKind::OtherRekeyNeeded { .. }
            | UnboxFailureKind::Transient
            | UnboxFailureKind::Permanent => {}
        }
    }

    /// Replaces the notification preferences of a cached conversation.
    pub async fn update_notifications(
        &self,
        conversation_id: &ConversationId,
        settings: &ConversationNotificationInfo,
    ) -> bool {
        let Some(parsed) = NotificationsState::parse(settings) else {
            return false;
        };
        let updated = self
            .cache
            .lock()
            .await
            .set_notifications(conversation_id, parsed);
        if updated {
            self.emit(InboxEvent::NotificationsUpdated(conversation_id.clone()));
        }
        updated
    }
}

#[cfg(test)]
#[path = "tests/processor_tests.rs"]
mod tests;
