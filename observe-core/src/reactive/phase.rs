//! Observer Phase
//!
//! Composed observers can be re-entered: a callback may mutate the very
//! data the observer watches, or call `deliver` on it. Each observer keeps
//! a [`Phase`] and only starts delivering or discarding from `Idle`. The
//! [`PhaseGuard`] restores the previous phase on drop, including when a
//! callback unwinds.

use std::cell::Cell;

/// What an observer is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Running its own callback, or pulling sibling sources before doing so.
    Delivering,
    /// Dropping pending changes; callbacks must not fire.
    Discarding,
}

/// Lifecycle of an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObserverState {
    #[default]
    Unopened,
    Open,
    Closed,
}

/// RAII marker for a non-idle phase.
pub struct PhaseGuard<'a> {
    cell: &'a Cell<Phase>,
    previous: Phase,
}

impl<'a> PhaseGuard<'a> {
    /// Move `cell` from `Idle` to `phase`.
    ///
    /// Returns `None`, leaving the phase alone, if the observer is busy.
    pub fn enter(cell: &'a Cell<Phase>, phase: Phase) -> Option<Self> {
        if cell.get() != Phase::Idle {
            return None;
        }
        let previous = cell.replace(phase);
        Some(Self { cell, previous })
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.cell.set(self.previous);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_only_enters_from_idle() {
        let phase = Cell::new(Phase::Idle);
        {
            let _guard = PhaseGuard::enter(&phase, Phase::Delivering).unwrap();
            assert_eq!(phase.get(), Phase::Delivering);
            assert!(PhaseGuard::enter(&phase, Phase::Discarding).is_none());
            assert_eq!(phase.get(), Phase::Delivering);
        }
        assert_eq!(phase.get(), Phase::Idle);
    }

    #[test]
    fn guard_restores_on_unwind() {
        let phase = Cell::new(Phase::Idle);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = PhaseGuard::enter(&phase, Phase::Discarding);
            panic!("callback failed");
        }));
        assert!(result.is_err());
        assert_eq!(phase.get(), Phase::Idle);
    }
}
