//! Interaction state machines for the assistant and diagnosis engines
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! `transition(state, context, event)` returns the next state plus the
//! effects the runtime must carry out (publishing, scheduling, cancelling).

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{ChatEffect, DiagnosisEffect};
pub use event::{ChatEvent, DiagnosisEvent, TurnStamp};
pub use state::{
    CasePhase, CaseStatus, ChatSnapshot, ChatState, DiagnosisSnapshot, DiagnosisState,
    FailedReply, SessionContext,
};
pub use transition::{chat_transition, diagnosis_transition, TransitionError, TransitionResult};
