//! Effects produced by state transitions

use crate::model::{ImageBlob, PlantType, Turn};
use std::time::Duration;

/// Effects the conversation runtime executes after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEffect {
    /// Stream a newly appended turn to subscribers
    PublishTurn { turn: Turn },

    /// Publish the new snapshot
    PublishState,

    /// Ask the reply service for an answer once `delay` has elapsed.
    /// Never cancelled.
    ScheduleReply {
        reply_to: String,
        text: String,
        delay: Duration,
    },

    /// All scheduled replies have landed
    NotifyReplyDone,

    /// Show a user-visible error
    NotifyError { message: String },
}

impl ChatEffect {
    pub fn publish_turn(turn: Turn) -> Self {
        ChatEffect::PublishTurn { turn }
    }

    pub fn notify_error(message: impl Into<String>) -> Self {
        ChatEffect::NotifyError {
            message: message.into(),
        }
    }
}

/// Effects the diagnosis runtime executes after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosisEffect {
    /// Publish the new snapshot
    PublishState,

    /// Run the diagnosis service once `delay` has elapsed. The completion
    /// event carries `generation` so it can be discarded if the case moved on.
    ScheduleAnalysis {
        generation: u64,
        image: ImageBlob,
        plant_type: PlantType,
        delay: Duration,
    },

    /// Abort the pending analysis timer, if any
    CancelAnalysis,

    /// The analysis for the current case finished
    NotifyAnalysisDone,

    /// Show a user-visible error
    NotifyError { message: String },
}
