//! Events that drive the engines

use crate::model::{DiagnosisResult, ImageBlob, PlantType};
use chrono::{DateTime, Utc};

/// Identity and time for a turn about to be appended.
///
/// Generated by the runtime so transitions stay pure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnStamp {
    pub id: String,
    pub at: DateTime<Utc>,
}

impl TurnStamp {
    pub fn new(id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { id: id.into(), at }
    }

    pub fn now() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), Utc::now())
    }
}

/// Events handled by the conversation engine
#[derive(Debug, Clone)]
pub enum ChatEvent {
    // User events
    /// Typed text or a clicked suggestion
    Submit { text: String, stamp: TurnStamp },
    RetryReply,

    // Scheduled reply events
    ReplyReady {
        reply_to: String,
        text: String,
        stamp: TurnStamp,
    },
    ReplyFailed {
        reply_to: String,
        user_text: String,
        message: String,
        retryable: bool,
    },
}

/// Events handled by the diagnosis engine
#[derive(Debug, Clone)]
pub enum DiagnosisEvent {
    // User events
    SelectImage { image: ImageBlob },
    SelectPlantType { plant_type: PlantType },
    Analyze,
    Reset,
    MarkTreated { detection_id: String },

    // Scheduled analysis events
    AnalysisComplete {
        generation: u64,
        result: DiagnosisResult,
        completed_at: DateTime<Utc>,
    },
    AnalysisFailed {
        generation: u64,
        message: String,
        retryable: bool,
    },
}
