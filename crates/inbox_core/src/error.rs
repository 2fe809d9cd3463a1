use std::time::Duration;

use shared::{domain::ConversationId, protocol::ConversationErrorType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("inbox sync requires a logged in user")]
    NotLoggedIn,
    #[error("failed to load inbox: {0}")]
    LoadFailed(String),
    #[error("inbox remote call failed: {0}")]
    Remote(#[source] anyhow::Error),
    #[error("unbox batch of {count} conversations timed out after {timeout:?}")]
    UnboxTimeout { count: usize, timeout: Duration },
    #[error("stale write for conversation {conversation_id}: version {incoming} does not advance {stored}")]
    StaleWrite {
        conversation_id: ConversationId,
        incoming: u64,
        stored: u64,
    },
}

impl SyncError {
    /// Whether a later trigger may simply run the same step again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::LoadFailed(_) | SyncError::Remote(_) | SyncError::UnboxTimeout { .. }
        )
    }
}

/// Classification of a per-conversation unbox failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnboxFailureKind {
    SelfRekeyNeeded,
    OtherRekeyNeeded { rekeyers: Vec<String> },
    Transient,
    Permanent,
    Unclassified,
}

impl UnboxFailureKind {
    pub fn classify(typ: ConversationErrorType, rekeyers: &[String]) -> Self {
        match typ {
            ConversationErrorType::SelfRekeyNeeded => UnboxFailureKind::SelfRekeyNeeded,
            ConversationErrorType::OtherRekeyNeeded => UnboxFailureKind::OtherRekeyNeeded {
                rekeyers: rekeyers.to_vec(),
            },
            ConversationErrorType::Transient => UnboxFailureKind::Transient,
            ConversationErrorType::Permanent => UnboxFailureKind::Permanent,
            ConversationErrorType::Misc | ConversationErrorType::Unknown => {
                UnboxFailureKind::Unclassified
            }
        }
    }
}
