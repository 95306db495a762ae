//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ChatRequest, ErrorResponse, ImageUploadRequest, PlantTypeRequest, PlantTypesResponse,
    QueuedResponse, SessionResponse, SuccessResponse, SuggestionsResponse,
};
use super::AppState;
use crate::error::AdvisorError;
use crate::intent;
use crate::model::{ImageBlob, PlantType};
use crate::runtime::{SessionHandle, SseEvent};
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.sessions.config().request_body_limit();

    Router::new()
        // Sessions
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id/close", post(close_session))
        // Assistant
        .route("/api/sessions/:id/assistant", get(get_assistant))
        .route("/api/sessions/:id/assistant/messages", post(send_message))
        .route(
            "/api/sessions/:id/assistant/suggestions/:suggestion_id",
            post(select_suggestion),
        )
        .route("/api/sessions/:id/assistant/retry", post(retry_reply))
        .route("/api/sessions/:id/assistant/stream", get(stream_assistant))
        // Diagnosis
        .route("/api/sessions/:id/diagnosis", get(get_diagnosis))
        .route("/api/sessions/:id/diagnosis/image", post(upload_image))
        .route("/api/sessions/:id/diagnosis/plant-type", post(select_plant_type))
        .route("/api/sessions/:id/diagnosis/analyze", post(analyze))
        .route("/api/sessions/:id/diagnosis/reset", post(reset_case))
        .route(
            "/api/sessions/:id/diagnosis/detections/:detection_id/treated",
            post(mark_treated),
        )
        .route("/api/sessions/:id/diagnosis/stream", get(stream_diagnosis))
        // Static data
        .route("/api/suggestions", get(list_suggestions))
        .route("/api/plant-types", get(list_plant_types))
        .route("/version", get(get_version))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn session(state: &AppState, id: &str) -> Result<SessionHandle, AppError> {
    Ok(state.sessions.get(id).await?)
}

// ============================================================
// Sessions
// ============================================================

async fn create_session(State(state): State<AppState>) -> Json<SessionResponse> {
    let session = state.sessions.create_session().await;

    Json(SessionResponse {
        session_id: session.id.clone(),
        assistant: session.chat.snapshot(),
        diagnosis: session.diagnosis.snapshot(),
    })
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.sessions.close(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Assistant
// ============================================================

async fn get_assistant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = session(&state, &id).await?;
    Ok(Json(session.chat.snapshot()))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<QueuedResponse>, AppError> {
    let session = session(&state, &id).await?;

    // Blank messages are dropped without an error
    if req.text.trim().is_empty() {
        return Ok(Json(QueuedResponse { queued: false }));
    }

    session.chat.submit(req.text).await?;
    Ok(Json(QueuedResponse { queued: true }))
}

async fn select_suggestion(
    State(state): State<AppState>,
    Path((id, suggestion_id)): Path<(String, String)>,
) -> Result<Json<QueuedResponse>, AppError> {
    let session = session(&state, &id).await?;
    session.chat.select_suggestion(&suggestion_id).await?;
    Ok(Json(QueuedResponse { queued: true }))
}

async fn retry_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QueuedResponse>, AppError> {
    let session = session(&state, &id).await?;
    let queued = !session.chat.snapshot().failed_replies.is_empty();
    session.chat.retry_reply().await?;
    Ok(Json(QueuedResponse { queued }))
}

async fn stream_assistant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = session(&state, &id).await?;

    // Subscribe before reading the snapshot so nothing falls in between
    let broadcast_rx = session.chat.subscribe();
    let init_event = SseEvent::Init {
        snapshot: serde_json::to_value(session.chat.snapshot()).unwrap_or(Value::Null),
    };

    Ok(sse_stream(init_event, broadcast_rx))
}

// ============================================================
// Diagnosis
// ============================================================

async fn get_diagnosis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = session(&state, &id).await?;
    Ok(Json(session.diagnosis.snapshot()))
}

async fn upload_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ImageUploadRequest>,
) -> Result<Json<QueuedResponse>, AppError> {
    let session = session(&state, &id).await?;

    let image = ImageBlob::from_base64(
        &req.data,
        req.media_type.as_deref(),
        req.file_name,
        state.sessions.config().max_image_bytes,
    )?;

    tracing::info!(
        session_id = %id,
        media_type = %image.media_type(),
        bytes = image.size(),
        "Image selected"
    );

    session.diagnosis.select_image(image).await?;
    Ok(Json(QueuedResponse { queued: true }))
}

async fn select_plant_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PlantTypeRequest>,
) -> Result<Json<QueuedResponse>, AppError> {
    let session = session(&state, &id).await?;
    let plant_type: PlantType = req.plant_type.parse()?;
    session.diagnosis.select_plant_type(plant_type).await?;
    Ok(Json(QueuedResponse { queued: true }))
}

async fn analyze(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QueuedResponse>, AppError> {
    let session = session(&state, &id).await?;
    session.diagnosis.analyze().await?;
    Ok(Json(QueuedResponse { queued: true }))
}

async fn reset_case(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QueuedResponse>, AppError> {
    let session = session(&state, &id).await?;
    session.diagnosis.reset().await?;
    Ok(Json(QueuedResponse { queued: true }))
}

async fn mark_treated(
    State(state): State<AppState>,
    Path((id, detection_id)): Path<(String, String)>,
) -> Result<Json<QueuedResponse>, AppError> {
    let session = session(&state, &id).await?;
    session.diagnosis.mark_treated(&detection_id).await?;
    Ok(Json(QueuedResponse { queued: true }))
}

async fn stream_diagnosis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = session(&state, &id).await?;

    let broadcast_rx = session.diagnosis.subscribe();
    let init_event = SseEvent::Init {
        snapshot: serde_json::to_value(session.diagnosis.snapshot()).unwrap_or(Value::Null),
    };

    Ok(sse_stream(init_event, broadcast_rx))
}

// ============================================================
// Static data
// ============================================================

async fn list_suggestions() -> Json<SuggestionsResponse> {
    Json(SuggestionsResponse {
        suggestions: intent::suggestions(),
    })
}

async fn list_plant_types() -> Json<PlantTypesResponse> {
    Json(PlantTypesResponse {
        plant_types: PlantType::ALL.to_vec(),
    })
}

async fn get_version() -> &'static str {
    concat!("agrismart ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    PayloadTooLarge(String),
    Internal(String),
}

impl From<AdvisorError> for AppError {
    fn from(err: AdvisorError) -> Self {
        let message = err.to_string();
        match err {
            AdvisorError::SessionNotFound(_) | AdvisorError::DetectionNotFound(_) => {
                AppError::NotFound(message)
            }
            AdvisorError::ImageTooLarge { .. } => AppError::PayloadTooLarge(message),
            AdvisorError::EngineStopped(_) => AppError::Internal(message),
            AdvisorError::InvalidInput(_)
            | AdvisorError::UnsupportedFileType(_)
            | AdvisorError::InvalidImageEncoding(_)
            | AdvisorError::UnknownPlantType(_)
            | AdvisorError::UnknownSuggestion(_) => AppError::BadRequest(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
