use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a polling instance.
///
/// Transitions are driven by `start()`, the windup timer, cycle completion
/// and `stop()`; a stop request is only ever observed at the decision points
/// entering `CycleRunning` or `CycleScheduled`, never mid-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScraperState {
    /// Constructed, never started.
    Idle,
    /// `start()` was called; the one-time windup timer is pending.
    WindupScheduled,
    /// A cycle is executing right now.
    CycleRunning,
    /// The last cycle finished; the interval timer for the next one is
    /// pending.
    CycleScheduled,
    /// A stop request was observed; no further cycles will run until
    /// `start()` is called again.
    Stopped,
}

/// Lock-free state holder shared between the driver task and observers.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ScraperState::Idle as u8))
    }

    pub(crate) fn set(&self, state: ScraperState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn get(&self) -> ScraperState {
        match self.0.load(Ordering::Acquire) {
            0 => ScraperState::Idle,
            1 => ScraperState::WindupScheduled,
            2 => ScraperState::CycleRunning,
            3 => ScraperState::CycleScheduled,
            _ => ScraperState::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_cell_starts_idle() {
        assert_eq!(StateCell::new().get(), ScraperState::Idle);
    }

    #[test]
    fn test_state_cell_round_trips_every_state() {
        let cell = StateCell::new();
        for state in [
            ScraperState::Idle,
            ScraperState::WindupScheduled,
            ScraperState::CycleRunning,
            ScraperState::CycleScheduled,
            ScraperState::Stopped,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }
}
