//! Envelope State Machine
//!
//! Tracks how far a single request/response exchange has progressed.
//! States only move forward; any unfinished state may jump straight to
//! `Responded` when the exchange is aborted with an error payload.

use thiserror::Error;

/// Lifecycle of a command envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeState {
    /// No bytes decoded yet
    #[default]
    Empty,
    /// Request line seen, waiting for the end of the header block
    ReceivingHeaders,
    /// Header block seen, waiting for the announced body
    ReceivingBody,
    /// Action classified, ready for dispatch
    Resolved,
    /// Response written; terminal
    Responded,
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeEvent {
    /// Complete request line decoded
    RequestLineReceived,
    /// Header block decoded
    HeadersReceived,
    /// Body decoded and action resolved
    ActionResolved,
    /// Dispatch finished and the response was stored
    ResponseWritten,
    /// Exchange failed; an error response was stored
    Aborted,
}

/// Returned when an event is not valid in the current state
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid envelope transition: {event:?} in state {from:?}")]
pub struct InvalidTransition {
    pub from: EnvelopeState,
    pub event: EnvelopeEvent,
}

/// Forward-only state machine for one envelope
#[derive(Debug, Default)]
pub struct EnvelopeStateMachine {
    current_state: EnvelopeState,
}

impl EnvelopeStateMachine {
    /// Create a new state machine in Empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> EnvelopeState {
        self.current_state
    }

    /// Process an event, changing state only when the transition is valid
    pub fn process_event(
        &mut self,
        event: EnvelopeEvent,
    ) -> Result<EnvelopeState, InvalidTransition> {
        match self.get_next_state(event) {
            Some(state) => {
                self.current_state = state;
                Ok(state)
            }
            None => Err(InvalidTransition {
                from: self.current_state,
                event,
            }),
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: EnvelopeEvent) -> Option<EnvelopeState> {
        use EnvelopeEvent::*;
        use EnvelopeState::*;

        match (self.current_state, event) {
            (Empty, RequestLineReceived) => Some(ReceivingHeaders),
            (ReceivingHeaders, HeadersReceived) => Some(ReceivingBody),
            (ReceivingBody, ActionResolved) => Some(Resolved),
            (Resolved, ResponseWritten) => Some(Responded),

            // Errors short-circuit from any unfinished state
            (Empty | ReceivingHeaders | ReceivingBody | Resolved, Aborted) => Some(Responded),

            _ => None,
        }
    }
}
