use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

/// Lifecycle of a metrics aggregator.
///
/// `Created -> Running -> Draining -> Stopped`. No state is skipped and
/// `Stopped` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AggregatorState {
    Created,
    Running,
    Draining,
    Stopped,
}

impl AggregatorState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => AggregatorState::Created,
            1 => AggregatorState::Running,
            2 => AggregatorState::Draining,
            _ => AggregatorState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            AggregatorState::Created => 0,
            AggregatorState::Running => 1,
            AggregatorState::Draining => 2,
            AggregatorState::Stopped => 3,
        }
    }

    /// The only state this one may move to.
    pub fn next(self) -> Option<AggregatorState> {
        match self {
            AggregatorState::Created => Some(AggregatorState::Running),
            AggregatorState::Running => Some(AggregatorState::Draining),
            AggregatorState::Draining => Some(AggregatorState::Stopped),
            AggregatorState::Stopped => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == AggregatorState::Stopped
    }
}

impl fmt::Display for AggregatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregatorState::Created => "created",
            AggregatorState::Running => "running",
            AggregatorState::Draining => "draining",
            AggregatorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Lock-free holder for an [`AggregatorState`] shared between producers,
/// the flush worker and whoever drives shutdown.
#[derive(Debug)]
pub struct StateCell {
    raw: AtomicU8,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            raw: AtomicU8::new(AggregatorState::Created.as_u8()),
        }
    }

    pub fn get(&self) -> AggregatorState {
        AggregatorState::from_u8(self.raw.load(Ordering::Acquire))
    }

    pub fn is(&self, state: AggregatorState) -> bool {
        self.get() == state
    }

    /// Moves `from` to its successor. Returns `false` if the cell was not in
    /// `from`, in which case nothing changes.
    pub fn advance(&self, from: AggregatorState) -> bool {
        let Some(to) = from.next() else {
            return false;
        };

        let moved = self
            .raw
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if moved {
            debug!(%from, %to, "aggregator state transition");
        }
        moved
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let cell = StateCell::new();
        assert!(cell.is(AggregatorState::Created));

        assert!(cell.advance(AggregatorState::Created));
        assert!(cell.advance(AggregatorState::Running));
        assert!(cell.advance(AggregatorState::Draining));
        assert_eq!(cell.get(), AggregatorState::Stopped);
        assert!(cell.get().is_terminal());
    }

    #[test]
    fn test_no_skipping_or_restart() {
        let cell = StateCell::new();

        // Running -> Draining while still Created
        assert!(!cell.advance(AggregatorState::Running));
        assert!(cell.is(AggregatorState::Created));

        cell.advance(AggregatorState::Created);
        cell.advance(AggregatorState::Running);
        cell.advance(AggregatorState::Draining);

        assert!(!cell.advance(AggregatorState::Stopped));
        assert!(!cell.advance(AggregatorState::Created));
        assert!(cell.is(AggregatorState::Stopped));
    }

    #[test]
    fn test_only_one_caller_wins_a_transition() {
        let cell = StateCell::new();
        cell.advance(AggregatorState::Created);

        assert!(cell.advance(AggregatorState::Running));
        assert!(!cell.advance(AggregatorState::Running));
    }
}
