// Copyright (c) 2025 - Cowboy AI, Inc.
//! Connection Lifecycle State Machine
//!
//! Tracks the startup connection to the eventd server.
//!
//! # States
//!
//! - NotConnected: Initial state, no connection established yet
//! - Connected: A connect attempt succeeded (terminal)
//!
//! # Inputs (Attempt Outcomes)
//!
//! - Failed: NotConnected → NotConnected, retry after the fixed interval
//! - Succeeded: NotConnected → Connected, stop
//!
//! Once connected, reconnection is owned by the NATS client, so no input
//! leads back out of `Connected`.

use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// Startup connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionLifecycle {
    #[default]
    NotConnected,
    Connected,
}

/// Outcome of one connect attempt (FSM input)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Failed,
    Succeeded,
}

/// What the driver should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutput {
    /// Wait for the retry interval, then attempt again
    Retry,
    /// Stop attempting
    Done,
}

impl fmt::Display for ConnectionLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionLifecycle::NotConnected => write!(f, "not connected"),
            ConnectionLifecycle::Connected => write!(f, "connected"),
        }
    }
}

impl StateMachine for ConnectionLifecycle {
    type Input = AttemptOutcome;
    type Output = LifecycleOutput;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use AttemptOutcome::*;
        use ConnectionLifecycle::*;

        match (self, input) {
            (NotConnected, Failed) => Ok((NotConnected, LifecycleOutput::Retry)),
            (NotConnected, Succeeded) => Ok((Connected, LifecycleOutput::Done)),
            (Connected, input) => Err(TransitionError::InvalidTransition {
                from: self.to_string(),
                input: format!("{:?}", input),
            }),
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, ConnectionLifecycle::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_attempt_stays_not_connected() {
        let (state, output) = ConnectionLifecycle::NotConnected
            .transition(&AttemptOutcome::Failed)
            .unwrap();

        assert_eq!(state, ConnectionLifecycle::NotConnected);
        assert_eq!(output, LifecycleOutput::Retry);
    }

    #[test]
    fn test_successful_attempt_connects() {
        let (state, output) = ConnectionLifecycle::default()
            .transition(&AttemptOutcome::Succeeded)
            .unwrap();

        assert_eq!(state, ConnectionLifecycle::Connected);
        assert_eq!(output, LifecycleOutput::Done);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_connected_is_terminal() {
        let state = ConnectionLifecycle::Connected;

        assert!(!state.can_transition(&AttemptOutcome::Failed));
        assert!(!state.can_transition(&AttemptOutcome::Succeeded));
        assert_eq!(
            state.transition(&AttemptOutcome::Failed),
            Err(TransitionError::InvalidTransition {
                from: "connected".to_string(),
                input: "Failed".to_string(),
            })
        );
    }
}
