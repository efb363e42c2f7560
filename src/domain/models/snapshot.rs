//! Opaque subordinate state captured at a phase checkpoint.

use serde::{Deserialize, Serialize};

use super::phase::ExecPhase;

/// Serialized state of every subordinate unit sharing one phase tag.
///
/// The engine never inspects the bytes; they round-trip through the
/// subordinate set unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBlob(pub Vec<u8>);

impl StateBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for StateBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Token identifying one captured backup.
///
/// `generation` counts outer steps; a handle from an earlier step no longer
/// matches the slot once the next backup overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotHandle {
    pub phase: ExecPhase,
    pub generation: u64,
}
