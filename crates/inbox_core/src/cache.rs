//! In-memory inbox state. Every field is written from a single critical
//! section under the engine's cache lock.

use std::collections::{HashMap, HashSet};

use shared::{
    domain::ConversationId,
    protocol::FinalizeInfo,
};

use crate::{
    badge::BadgeDelta,
    record::{ConversationRecord, NotificationsState, SupersedeInfo},
    state::{Transition, UntrustedState},
    version::VersionStamp,
};

/// Pending rekey work reported by a failed unbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RekeyState {
    SelfNeeded,
    OthersNeeded { rekeyers: Vec<String> },
}

#[derive(Debug, Default)]
pub struct InboxCache {
    records: HashMap<ConversationId, ConversationRecord>,
    states: HashMap<ConversationId, UntrustedState>,
    versions: HashMap<ConversationId, VersionStamp>,
    small_teams: HashMap<ConversationId, i64>,
    big_channels: HashMap<ConversationId, Option<String>>,
    big_to_team: HashMap<ConversationId, String>,
    empty: HashSet<ConversationId>,
    snippets: HashMap<ConversationId, String>,
    unread_badge: HashMap<ConversationId, u32>,
    unread_total: HashMap<ConversationId, u32>,
    reset_participants: HashMap<ConversationId, Vec<String>>,
    supersedes: HashMap<ConversationId, SupersedeInfo>,
    superseded_by: HashMap<ConversationId, SupersedeInfo>,
    finalized: HashMap<ConversationId, FinalizeInfo>,
    rekey: HashMap<ConversationId, RekeyState>,
    selected: Option<ConversationId>,
}

impl InboxCache {
    pub fn record(&self, id: &ConversationId) -> Option<&ConversationRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &ConversationRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.records.contains_key(id)
    }

    /// Conversations never seen are `untrusted`.
    pub fn state(&self, id: &ConversationId) -> UntrustedState {
        self.states.get(id).copied().unwrap_or_default()
    }

    pub fn version(&self, id: &ConversationId) -> Option<VersionStamp> {
        self.versions.get(id).copied()
    }

    /// Small-team and direct conversations, most recent first.
    pub fn small_team_ids(&self) -> Vec<ConversationId> {
        let mut entries = self
            .small_teams
            .iter()
            .map(|(id, time)| (id.clone(), *time))
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.into_iter().map(|(id, _)| id).collect()
    }

    pub fn is_small_team(&self, id: &ConversationId) -> bool {
        self.small_teams.contains_key(id)
    }

    pub fn is_big_team(&self, id: &ConversationId) -> bool {
        self.big_channels.contains_key(id)
    }

    pub fn big_channel(&self, id: &ConversationId) -> Option<&str> {
        self.big_channels.get(id).and_then(|name| name.as_deref())
    }

    pub fn big_team_name(&self, id: &ConversationId) -> Option<&str> {
        self.big_to_team.get(id).map(String::as_str)
    }

    pub fn is_empty_conversation(&self, id: &ConversationId) -> bool {
        self.empty.contains(id)
    }

    pub fn snippet(&self, id: &ConversationId) -> Option<&str> {
        self.snippets.get(id).map(String::as_str)
    }

    pub fn unread_badges(&self) -> &HashMap<ConversationId, u32> {
        &self.unread_badge
    }

    pub fn unread_totals(&self) -> &HashMap<ConversationId, u32> {
        &self.unread_total
    }

    pub fn reset_participants(&self, id: &ConversationId) -> Option<&[String]> {
        self.reset_participants.get(id).map(Vec::as_slice)
    }

    pub fn supersedes(&self, id: &ConversationId) -> Option<&SupersedeInfo> {
        self.supersedes.get(id)
    }

    pub fn superseded_by(&self, id: &ConversationId) -> Option<&SupersedeInfo> {
        self.superseded_by.get(id)
    }

    pub fn finalized(&self, id: &ConversationId) -> Option<&FinalizeInfo> {
        self.finalized.get(id)
    }

    pub fn rekey(&self, id: &ConversationId) -> Option<&RekeyState> {
        self.rekey.get(id)
    }

    pub fn selected(&self) -> Option<&ConversationId> {
        self.selected.as_ref()
    }

    /// A reset left this conversation behind; trusted work on it is pointless.
    pub fn is_reset_superseded(&self, id: &ConversationId) -> bool {
        self.reset_participants
            .get(id)
            .is_some_and(|users| !users.is_empty())
            || self.superseded_by.contains_key(id)
    }

    pub(crate) fn keys(&self) -> HashSet<ConversationId> {
        self.records.keys().cloned().collect()
    }

    pub(crate) fn set_state(&mut self, id: ConversationId, state: UntrustedState) {
        self.states.insert(id, state);
    }

    /// Applies `transition` if the table allows it and reports the move.
    pub(crate) fn transition(&mut self, id: &ConversationId, transition: Transition) -> bool {
        match self.state(id).next(transition) {
            Some(next) => {
                self.states.insert(id.clone(), next);
                true
            }
            None => false,
        }
    }

    pub(crate) fn stamp(&mut self, id: ConversationId, stamp: VersionStamp) {
        self.versions.insert(id, stamp);
    }

    /// Stores `record` and moves its key into exactly one team index.
    pub(crate) fn upsert_record(&mut self, record: ConversationRecord) {
        let id = record.conversation_id.clone();
        if record.is_big_team() {
            self.small_teams.remove(&id);
            let previous = self.big_channels.remove(&id).flatten();
            self.big_channels
                .insert(id.clone(), record.channelname.clone().or(previous));
            match &record.teamname {
                Some(team) => {
                    self.big_to_team.insert(id.clone(), team.clone());
                }
                None => {
                    self.big_to_team.remove(&id);
                }
            }
        } else {
            self.big_channels.remove(&id);
            self.big_to_team.remove(&id);
            self.small_teams.insert(id.clone(), record.time);
        }
        if record.is_empty {
            self.empty.insert(id.clone());
        } else {
            self.empty.remove(&id);
        }
        self.records.insert(id, record);
    }

    /// Drops a hidden conversation from the visible indices. Its state and
    /// stamp stay so later stale copies are still recognised.
    pub(crate) fn remove_visible(&mut self, id: &ConversationId) -> bool {
        let existed = self.records.remove(id).is_some();
        self.small_teams.remove(id);
        self.big_channels.remove(id);
        self.big_to_team.remove(id);
        existed
    }

    /// Removes a conversation that left the listing from every derived index.
    /// Reports which unread maps lost an entry.
    pub(crate) fn purge(&mut self, id: &ConversationId) -> BadgeDelta {
        self.remove_visible(id);
        self.states.remove(id);
        self.versions.remove(id);
        self.empty.remove(id);
        self.snippets.remove(id);
        self.reset_participants.remove(id);
        self.supersedes.remove(id);
        self.superseded_by.remove(id);
        self.finalized.remove(id);
        self.rekey.remove(id);
        BadgeDelta {
            badge_changed: self.unread_badge.remove(id).is_some(),
            total_changed: self.unread_total.remove(id).is_some(),
        }
    }

    pub(crate) fn set_snippet(&mut self, id: ConversationId, snippet: String) {
        self.snippets.insert(id, snippet);
    }

    pub(crate) fn set_notifications(
        &mut self,
        id: &ConversationId,
        notifications: NotificationsState,
    ) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                record.notifications = Some(notifications);
                true
            }
            None => false,
        }
    }

    /// An empty list clears the entry.
    pub(crate) fn set_reset_participants(&mut self, id: ConversationId, users: Vec<String>) {
        if users.is_empty() {
            self.reset_participants.remove(&id);
        } else {
            self.reset_participants.insert(id, users);
        }
    }

    pub(crate) fn set_supersedes(&mut self, id: ConversationId, info: SupersedeInfo) {
        self.supersedes.insert(id, info);
    }

    pub(crate) fn set_superseded_by(&mut self, id: ConversationId, info: SupersedeInfo) {
        self.superseded_by.insert(id, info);
    }

    pub(crate) fn set_finalized(&mut self, id: ConversationId, info: FinalizeInfo) {
        self.finalized.insert(id, info);
    }

    pub(crate) fn set_rekey(&mut self, id: ConversationId, rekey: RekeyState) {
        self.rekey.insert(id, rekey);
    }

    pub(crate) fn clear_rekey(&mut self, id: &ConversationId) {
        self.rekey.remove(id);
    }

    /// Replaces the badge map if it differs; reports whether it did.
    pub(crate) fn replace_unread_badges(&mut self, badges: HashMap<ConversationId, u32>) -> bool {
        if self.unread_badge == badges {
            return false;
        }
        self.unread_badge = badges;
        true
    }

    pub(crate) fn replace_unread_totals(&mut self, totals: HashMap<ConversationId, u32>) -> bool {
        if self.unread_total == totals {
            return false;
        }
        self.unread_total = totals;
        true
    }

    pub(crate) fn select(&mut self, id: Option<ConversationId>) {
        self.selected = id;
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
