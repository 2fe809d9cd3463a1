use serde::Serialize;

/// Freshness of a cached conversation relative to the trusted source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UntrustedState {
    #[default]
    Untrusted,
    FirstUnboxing,
    ReUnboxing,
    Unboxed,
    Error,
}

/// Why a cached state moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A queue pass wants a trusted copy.
    BeginUnbox { force: bool },
    /// A trusted copy was stored, from a batch or a push payload.
    Unboxed,
    /// The trusted call reported a per-conversation failure.
    Failed,
    /// The batch carrying the request timed out or failed as a whole.
    RollBack,
    /// An error state becomes eligible for another pass.
    Retry,
    /// A fresh untrusted record replaced the cached one.
    Reloaded,
}

impl UntrustedState {
    pub fn is_in_flight(self) -> bool {
        matches!(self, UntrustedState::FirstUnboxing | UntrustedState::ReUnboxing)
    }

    /// Next state for `transition`, or `None` when the table forbids it.
    pub fn next(self, transition: Transition) -> Option<UntrustedState> {
        use Transition as T;
        use UntrustedState as S;

        match (self, transition) {
            (S::Untrusted, T::BeginUnbox { .. }) => Some(S::FirstUnboxing),
            (S::Unboxed, T::BeginUnbox { force: true }) => Some(S::ReUnboxing),
            (_, T::Unboxed) => Some(S::Unboxed),
            (S::FirstUnboxing | S::ReUnboxing, T::Failed) => Some(S::Error),
            (S::FirstUnboxing | S::ReUnboxing, T::RollBack) => Some(S::Untrusted),
            (S::Error, T::Retry) => Some(S::Untrusted),
            (S::Untrusted | S::Unboxed | S::Error, T::Reloaded) => Some(S::Untrusted),
            _ => None,
        }
    }

    /// State a queue pass moves to, routing `error` back through `untrusted`.
    pub fn begin_unbox(self, force: bool) -> Option<UntrustedState> {
        let from = match self {
            UntrustedState::Error => self.next(Transition::Retry)?,
            other => other,
        };
        from.next(Transition::BeginUnbox { force })
    }
}

/// Global state of the untrusted bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxLoadStatus {
    #[default]
    Unloaded,
    Loading,
    Loaded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncingState {
    Syncing,
    #[default]
    NotSyncing,
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
