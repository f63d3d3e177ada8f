// src/strategies/lifecycle.rs
//! Strategy lifecycle state machine.
//!
//! ```text
//! Init --start--> Running <--pause/start--> Paused
//!   any --stop--> Stopped        any --fault--> Error
//! ```
//!
//! `Stopped` and `Error` are terminal for `start`/`pause`. Ticks are only
//! acted on while `Running`, account and order events while `Running` or
//! `Paused`; callers use [`Lifecycle::accepts_ticks`] and
//! [`Lifecycle::accepts_events`] to turn other calls into no-ops.

use crate::strategies::traits::StrategyError;
use crate::types::StrategyState;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: StrategyState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: StrategyState::Init,
        }
    }

    pub fn state(&self) -> StrategyState {
        self.state
    }

    /// Re-enters `Init`. Used by `Strategy::init`.
    pub fn reset(&mut self) {
        self.state = StrategyState::Init;
    }

    pub fn start(&mut self) -> Result<(), StrategyError> {
        if self.state.is_terminal() {
            return Err(StrategyError::InvalidTransition {
                from: self.state,
                action: "start",
            });
        }
        if self.state != StrategyState::Running {
            self.transition(StrategyState::Running);
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), StrategyError> {
        match self.state {
            StrategyState::Running => {
                self.transition(StrategyState::Paused);
                Ok(())
            }
            StrategyState::Paused => Ok(()),
            from => Err(StrategyError::InvalidTransition {
                from,
                action: "pause",
            }),
        }
    }

    pub fn stop(&mut self) {
        if self.state != StrategyState::Stopped {
            self.transition(StrategyState::Stopped);
        }
    }

    /// Records an unrecoverable fault. Stays in `Error` from then on.
    pub fn fault(&mut self, cause: &StrategyError) {
        if self.state != StrategyState::Error {
            error!(from = %self.state, error = %cause, "Strategy entered error state");
            self.state = StrategyState::Error;
        }
    }

    pub fn accepts_ticks(&self) -> bool {
        self.state == StrategyState::Running
    }

    /// Account and order callbacks still update bookkeeping while paused so
    /// a resumed strategy sees the fills that happened in between.
    pub fn accepts_events(&self) -> bool {
        matches!(self.state, StrategyState::Running | StrategyState::Paused)
    }

    fn transition(&mut self, to: StrategyState) {
        info!(from = %self.state, to = %to, "Strategy state change");
        self.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_pause_resume() {
        let mut lc = Lifecycle::new();
        assert_eq!(lc.state(), StrategyState::Init);
        assert!(!lc.accepts_ticks());

        lc.start().unwrap();
        assert_eq!(lc.state(), StrategyState::Running);
        assert!(lc.accepts_ticks());

        lc.pause().unwrap();
        assert_eq!(lc.state(), StrategyState::Paused);
        assert!(!lc.accepts_ticks());
        assert!(lc.accepts_events());

        lc.start().unwrap();
        assert_eq!(lc.state(), StrategyState::Running);
    }

    #[test]
    fn start_from_terminal_states_fails_without_change() {
        let mut lc = Lifecycle::new();
        lc.stop();
        assert_eq!(
            lc.start(),
            Err(StrategyError::InvalidTransition {
                from: StrategyState::Stopped,
                action: "start"
            })
        );
        assert_eq!(lc.state(), StrategyState::Stopped);

        let mut lc = Lifecycle::new();
        lc.start().unwrap();
        lc.fault(&StrategyError::Internal("boom".into()));
        assert!(lc.start().is_err());
        assert_eq!(lc.state(), StrategyState::Error);
        assert!(!lc.accepts_events());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut lc = Lifecycle::new();
        lc.start().unwrap();
        lc.stop();
        assert_eq!(lc.state(), StrategyState::Stopped);
        lc.stop();
        assert_eq!(lc.state(), StrategyState::Stopped);
    }

    #[test]
    fn pause_requires_running() {
        let mut lc = Lifecycle::new();
        assert!(lc.pause().is_err());
        assert_eq!(lc.state(), StrategyState::Init);
    }

    #[test]
    fn stop_reaches_stopped_even_from_error() {
        let mut lc = Lifecycle::new();
        lc.fault(&StrategyError::Internal("bad".into()));
        lc.stop();
        assert_eq!(lc.state(), StrategyState::Stopped);
    }
}
