use crate::error::AppError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerState {
    Uninitialized,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl ScannerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScannerState::Stopped)
    }
}

/// Tracks the scanner lifecycle and enforces the legal transition table.
/// `Stopped` is terminal; a new machine is required to run again.
pub struct StateMachine {
    state: Arc<RwLock<ScannerState>>,
    state_tx: Sender<ScannerState>,
    state_rx: Receiver<ScannerState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(ScannerState::Uninitialized)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: ScannerState) -> Result<(), AppError> {
        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &new_state),
            (ScannerState::Uninitialized, ScannerState::Starting)
                | (ScannerState::Starting, ScannerState::Running)
                | (ScannerState::Starting, ScannerState::Stopped)
                | (ScannerState::Running, ScannerState::ShuttingDown)
                | (ScannerState::ShuttingDown, ScannerState::Stopped)
        );

        if !valid {
            return Err(AppError::InvalidTransition {
                from: format!("{:?}", *current),
                to: format!("{:?}", new_state),
            });
        }

        tracing::info!("State transition: {:?} -> {:?}", *current, new_state);
        *current = new_state.clone();
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> ScannerState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> Receiver<ScannerState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle_is_legal() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), ScannerState::Uninitialized);

        sm.transition(ScannerState::Starting).unwrap();
        sm.transition(ScannerState::Running).unwrap();
        sm.transition(ScannerState::ShuttingDown).unwrap();
        sm.transition(ScannerState::Stopped).unwrap();
        assert!(sm.current().is_terminal());
    }

    #[test]
    fn failed_startup_goes_straight_to_stopped() {
        let sm = StateMachine::new();
        sm.transition(ScannerState::Starting).unwrap();
        sm.transition(ScannerState::Stopped).unwrap();
        assert_eq!(sm.current(), ScannerState::Stopped);
    }

    #[test]
    fn stopped_is_terminal() {
        let sm = StateMachine::new();
        sm.transition(ScannerState::Starting).unwrap();
        sm.transition(ScannerState::Stopped).unwrap();

        let err = sm.transition(ScannerState::Starting).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[test]
    fn illegal_jumps_are_rejected() {
        let sm = StateMachine::new();
        assert!(sm.transition(ScannerState::Running).is_err());
        assert!(sm.transition(ScannerState::ShuttingDown).is_err());
        // state must be unchanged after a rejected transition
        assert_eq!(sm.current(), ScannerState::Uninitialized);
    }

    #[test]
    fn subscribers_observe_transitions() {
        let sm = StateMachine::new();
        let rx = sm.subscribe();

        sm.transition(ScannerState::Starting).unwrap();
        sm.transition(ScannerState::Running).unwrap();

        assert_eq!(rx.try_recv().unwrap(), ScannerState::Starting);
        assert_eq!(rx.try_recv().unwrap(), ScannerState::Running);
    }
}
