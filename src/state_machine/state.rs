//! Engine state types

use crate::intent::GREETING;
use crate::model::{
    DetectionRecord, DiagnosisResult, ImageBlob, PlantType, Sender, Turn,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ts_rs::TS;

/// Id of the greeting turn every transcript starts with
pub const GREETING_TURN_ID: &str = "greeting";

/// Default number of entries kept in the recent detections list
pub const DEFAULT_RECENT_LIMIT: usize = 10;

// ============================================================================
// Session Context
// ============================================================================

/// Immutable per-session configuration shared by both engines
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    /// Simulated latency before the assistant answers
    pub reply_delay: Duration,
    /// Simulated latency before a diagnosis is available
    pub analysis_delay: Duration,
    /// Maximum entries kept in the recent detections list
    pub recent_limit: usize,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        reply_delay: Duration,
        analysis_delay: Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            reply_delay,
            analysis_delay,
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }
}

// ============================================================================
// Conversation
// ============================================================================

/// A reply the service could not produce; can be retried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FailedReply {
    /// User turn the reply was for
    pub reply_to: String,
    pub user_text: String,
    pub message: String,
    pub retryable: bool,
}

/// Conversation engine state.
///
/// The transcript is append-only; replies in flight are counted rather than
/// tracked individually because they can never be cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    pub transcript: Vec<Turn>,
    pub pending_replies: u32,
    /// Failed replies, oldest first
    pub failed_replies: Vec<FailedReply>,
}

impl ChatState {
    /// Fresh transcript holding only the assistant greeting
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            transcript: vec![Turn::new(
                GREETING_TURN_ID,
                GREETING,
                Sender::Assistant,
                started_at,
            )],
            pending_replies: 0,
            failed_replies: Vec::new(),
        }
    }

    pub fn awaiting_reply(&self) -> bool {
        self.pending_replies > 0
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            transcript: self.transcript.clone(),
            awaiting_reply: self.awaiting_reply(),
            pending_replies: self.pending_replies,
            failed_replies: self.failed_replies.clone(),
        }
    }
}

/// Read-only view of the conversation for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ChatSnapshot {
    pub transcript: Vec<Turn>,
    pub awaiting_reply: bool,
    pub pending_replies: u32,
    pub failed_replies: Vec<FailedReply>,
}

// ============================================================================
// Diagnosis
// ============================================================================

/// Where the case is in its lifecycle.
///
/// The result lives inside `Completed`, so a result can only exist while
/// the case is completed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CasePhase {
    /// Fields are being filled in; see `CaseStatus` for completeness
    #[default]
    Editing,

    /// Analysis scheduled for the current generation
    Analyzing,

    Completed { result: DiagnosisResult },

    /// Service failed; `analyze` retries with the same fields
    Failed { message: String, retryable: bool },
}

/// Status reported to the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CaseStatus {
    /// Nothing selected
    Empty,
    /// Image or plant type selected, but not both
    Incomplete,
    Ready,
    Analyzing,
    Completed,
    Failed,
}

/// The single diagnosis case of a session
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagnosisState {
    pub image: Option<ImageBlob>,
    pub plant_type: Option<PlantType>,
    pub phase: CasePhase,
    /// Bumped on every edit, analysis and reset; scheduled completions
    /// carrying an older value are discarded
    pub generation: u64,
    /// Newest first; survives `reset`
    pub recent: Vec<DetectionRecord>,
}

impl DiagnosisState {
    pub fn status(&self) -> CaseStatus {
        match &self.phase {
            CasePhase::Editing => match (self.image.is_some(), self.plant_type.is_some()) {
                (false, false) => CaseStatus::Empty,
                (true, true) => CaseStatus::Ready,
                _ => CaseStatus::Incomplete,
            },
            CasePhase::Analyzing => CaseStatus::Analyzing,
            CasePhase::Completed { .. } => CaseStatus::Completed,
            CasePhase::Failed { .. } => CaseStatus::Failed,
        }
    }

    pub fn result(&self) -> Option<&DiagnosisResult> {
        match &self.phase {
            CasePhase::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self.phase, CasePhase::Analyzing)
    }

    pub fn snapshot(&self) -> DiagnosisSnapshot {
        let failure = match &self.phase {
            CasePhase::Failed { message, .. } => Some(message.clone()),
            _ => None,
        };

        DiagnosisSnapshot {
            status: self.status(),
            plant_type: self.plant_type,
            file_name: self
                .image
                .as_ref()
                .and_then(|img| img.file_name().map(str::to_string)),
            media_type: self.image.as_ref().map(|img| img.media_type().to_string()),
            preview_url: self.image.as_ref().map(|img| img.preview_url().to_string()),
            result: self.result().cloned(),
            failure,
            recent_detections: self.recent.clone(),
            generation: self.generation,
        }
    }
}

/// Read-only view of the diagnosis case for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiagnosisSnapshot {
    pub status: CaseStatus,
    pub plant_type: Option<PlantType>,
    pub file_name: Option<String>,
    pub media_type: Option<String>,
    /// `data:` URL for the image preview
    pub preview_url: Option<String>,
    pub result: Option<DiagnosisResult>,
    pub failure: Option<String>,
    pub recent_detections: Vec<DetectionRecord>,
    pub generation: u64,
}

impl Default for DiagnosisSnapshot {
    fn default() -> Self {
        DiagnosisState::default().snapshot()
    }
}
