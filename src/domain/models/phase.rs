//! Execution phases at which subordinate units run during an outer step.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in the outer step at which subordinate units are executed.
///
/// Each phase also tags one snapshot slot in the
/// [`SnapshotManager`](crate::services::SnapshotManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecPhase {
    /// Start of every coupling iteration, ahead of the timestep-begin units.
    Begin,
    /// Immediately before the primary solve.
    TimestepBegin,
    /// Immediately after a successful primary solve.
    TimestepEnd,
    /// Once, after the coupling loop has converged.
    End,
}

impl ExecPhase {
    /// All phases in execution order.
    pub const ALL: [Self; 4] = [
        Self::Begin,
        Self::TimestepBegin,
        Self::TimestepEnd,
        Self::End,
    ];

    /// Dense slot index in `0..4`.
    pub const fn index(self) -> usize {
        match self {
            Self::Begin => 0,
            Self::TimestepBegin => 1,
            Self::TimestepEnd => 2,
            Self::End => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::TimestepBegin => "timestep_begin",
            Self::TimestepEnd => "timestep_end",
            Self::End => "end",
        }
    }
}

impl fmt::Display for ExecPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
