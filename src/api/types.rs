//! API request and response types

use crate::model::{PlantType, Suggestion};
use crate::state_machine::{ChatSnapshot, DiagnosisSnapshot};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Photo upload, as produced by a browser `FileReader`
#[derive(Debug, Deserialize)]
pub struct ImageUploadRequest {
    /// Bare base64 or a full `data:` URL
    pub data: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlantTypeRequest {
    pub plant_type: String,
}

/// Response for a new session
#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct SessionResponse {
    pub session_id: String,
    pub assistant: ChatSnapshot,
    pub diagnosis: DiagnosisSnapshot,
}

/// Response for actions handed to an engine
#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct QueuedResponse {
    pub queued: bool,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct PlantTypesResponse {
    pub plant_types: Vec<PlantType>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
