//! Adapter state tracking.
//!
//! The adapter state is the gate for every radio operation: scans and
//! connects are only accepted while the adapter is `poweredOn`. The state is
//! changed only by transport notifications.

use bluecentral_types::AdapterState;

use crate::error::{Error, Result};

/// A state change applied to the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: AdapterState,
    pub to: AdapterState,
}

impl StateTransition {
    /// Whether this transition takes the radio away.
    pub fn lost_power(&self) -> bool {
        self.from.is_powered_on() && !self.to.is_powered_on()
    }
}

/// Current adapter state. Starts as [`AdapterState::Unknown`].
#[derive(Debug, Default)]
pub struct AdapterStateMachine {
    state: AdapterState,
}

impl AdapterStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// Apply a reported state. Returns `None` when the report repeats the
    /// current state, which is not a transition.
    pub fn apply(&mut self, next: AdapterState) -> Option<StateTransition> {
        if next == self.state {
            return None;
        }
        let transition = StateTransition {
            from: self.state,
            to: next,
        };
        self.state = next;
        Some(transition)
    }

    /// Fail with [`Error::NotReady`] unless the adapter is powered on.
    pub fn ensure_powered_on(&self) -> Result<()> {
        if self.state.is_powered_on() {
            Ok(())
        } else {
            Err(Error::NotReady { state: self.state })
        }
    }
}
