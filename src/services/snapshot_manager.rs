//! Phase-tagged backups of subordinate state.

use tracing::debug;

use crate::domain::errors::{CouplingError, CouplingResult};
use crate::domain::models::{ExecPhase, SnapshotHandle, StateBlob};
use crate::domain::ports::SubordinateSet;

#[derive(Debug, Clone)]
struct Slot {
    generation: u64,
    blob: StateBlob,
}

/// Fixed table of four snapshot slots, one per [`ExecPhase`].
///
/// A slot is immutable once captured until the next backup of the same phase
/// overwrites it. Restores are all-or-nothing per phase.
#[derive(Debug, Default)]
pub struct SnapshotManager {
    slots: [Option<Slot>; 4],
    generation: u64,
}

impl SnapshotManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outer-step counter stamped on every handle.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Capture one phase under the current generation.
    pub fn backup<S: SubordinateSet + ?Sized>(
        &mut self,
        subordinates: &mut S,
        phase: ExecPhase,
    ) -> SnapshotHandle {
        let blob = subordinates.backup(phase);
        debug!(phase = %phase, bytes = blob.len(), generation = self.generation, "backed up subordinates");
        self.slots[phase.index()] = Some(Slot {
            generation: self.generation,
            blob,
        });
        SnapshotHandle {
            phase,
            generation: self.generation,
        }
    }

    /// Start a new generation and capture all four phases.
    pub fn backup_all<S: SubordinateSet + ?Sized>(&mut self, subordinates: &mut S) -> [SnapshotHandle; 4] {
        self.generation += 1;
        ExecPhase::ALL.map(|phase| self.backup(subordinates, phase))
    }

    pub fn restore<S: SubordinateSet + ?Sized>(
        &self,
        subordinates: &mut S,
        phase: ExecPhase,
    ) -> CouplingResult<()> {
        let slot = self.slots[phase.index()]
            .as_ref()
            .ok_or(CouplingError::SnapshotMissing(phase))?;
        subordinates.restore(phase, &slot.blob);
        debug!(phase = %phase, generation = slot.generation, "restored subordinates");
        Ok(())
    }

    /// Restore every phase in execution order. Stops at the first missing slot.
    pub fn restore_all<S: SubordinateSet + ?Sized>(&self, subordinates: &mut S) -> CouplingResult<()> {
        ExecPhase::ALL
            .into_iter()
            .try_for_each(|phase| self.restore(subordinates, phase))
    }

    /// Handle of the snapshot currently held for `phase`.
    pub fn handle(&self, phase: ExecPhase) -> Option<SnapshotHandle> {
        self.slots[phase.index()].as_ref().map(|slot| SnapshotHandle {
            phase,
            generation: slot.generation,
        })
    }

    /// Whether `handle` still names the snapshot held in its slot.
    pub fn is_current(&self, handle: SnapshotHandle) -> bool {
        self.handle(handle.phase) == Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: [u8; 4],
        restored: Vec<ExecPhase>,
    }

    impl SubordinateSet for Counter {
        fn run_phase(&mut self, phase: ExecPhase, _auto_advance: bool) -> bool {
            self.value[phase.index()] += 1;
            true
        }

        fn backup(&mut self, phase: ExecPhase) -> StateBlob {
            StateBlob::new(vec![self.value[phase.index()]])
        }

        fn restore(&mut self, phase: ExecPhase, blob: &StateBlob) {
            self.value[phase.index()] = blob.as_bytes()[0];
            self.restored.push(phase);
        }

        fn has_units(&self, _phase: ExecPhase) -> bool {
            true
        }
    }

    #[test]
    fn test_restore_without_backup_fails() {
        let manager = SnapshotManager::new();
        let mut subs = Counter::default();
        let err = manager.restore(&mut subs, ExecPhase::End).unwrap_err();
        assert!(matches!(err, CouplingError::SnapshotMissing(ExecPhase::End)));
        assert!(subs.restored.is_empty());
    }

    #[test]
    fn test_restore_all_undoes_progress() {
        let mut manager = SnapshotManager::new();
        let mut subs = Counter::default();
        manager.backup_all(&mut subs);

        for phase in ExecPhase::ALL {
            subs.run_phase(phase, false);
        }
        manager.restore_all(&mut subs).unwrap();

        assert_eq!(subs.value, [0; 4]);
        assert_eq!(subs.restored, ExecPhase::ALL.to_vec());
    }

    #[test]
    fn test_new_generation_invalidates_old_handles() {
        let mut manager = SnapshotManager::new();
        let mut subs = Counter::default();
        let first = manager.backup_all(&mut subs);
        assert!(first.iter().all(|h| manager.is_current(*h)));

        let second = manager.backup_all(&mut subs);
        assert_eq!(second[0].generation, first[0].generation + 1);
        assert!(!manager.is_current(first[2]));
        assert!(manager.is_current(second[2]));
    }
}
