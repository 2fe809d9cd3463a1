use shared::domain::ConversationId;

use crate::error::SyncError;

/// Last version written for a conversation and whether it came from a
/// trusted unbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionStamp {
    pub version: u64,
    pub trusted: bool,
}

impl VersionStamp {
    pub fn untrusted(version: u64) -> Self {
        Self {
            version,
            trusted: false,
        }
    }

    pub fn trusted(version: u64) -> Self {
        Self {
            version,
            trusted: true,
        }
    }
}

/// A write proposed against the stored stamp.
#[derive(Debug, Clone, Copy)]
pub struct VersionedWrite {
    pub version: u64,
    pub trusted: bool,
    /// The write answers an explicit forced refresh.
    pub forced: bool,
}

/// Accepts strictly newer versions. An equal version only lands when a
/// trusted copy replaces an untrusted one or answers a forced refresh.
pub fn check(
    conversation_id: &ConversationId,
    stored: Option<VersionStamp>,
    write: VersionedWrite,
) -> Result<(), SyncError> {
    let Some(stored) = stored else {
        return Ok(());
    };
    let admitted = write.version > stored.version
        || (write.version == stored.version && write.trusted && (!stored.trusted || write.forced));
    if admitted {
        Ok(())
    } else {
        Err(SyncError::StaleWrite {
            conversation_id: conversation_id.clone(),
            incoming: write.version,
            stored: stored.version,
        })
    }
}
