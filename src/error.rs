//! Boundary errors for the advisory engines
//!
//! These are raised where input enters the system (HTTP handlers, engine
//! handles). Rejections inside the state machines are `TransitionError`s and
//! are never surfaced to the user.

use thiserror::Error;

/// Errors raised when validating input or reaching an engine
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported file type: {0} (supported formats: JPG, PNG, WEBP)")]
    UnsupportedFileType(String),

    #[error("Image is {size} bytes, the limit is {max} bytes")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Invalid image encoding: {0}")]
    InvalidImageEncoding(String),

    #[error("Unknown plant type: {0}")]
    UnknownPlantType(String),

    #[error("Unknown suggestion: {0}")]
    UnknownSuggestion(String),

    #[error("Detection not found: {0}")]
    DetectionNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Engine for session {0} has stopped")]
    EngineStopped(String),
}
