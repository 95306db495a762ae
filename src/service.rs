//! Advisory service abstraction
//!
//! The engines never compute answers themselves: once the simulated delay
//! elapses they ask a `ReplyService` or `DiagnosisService`. The shipped
//! implementations are deterministic mocks; a real inference backend only
//! has to implement these traits.

mod error;
mod mock;

pub use error::{ServiceError, ServiceErrorKind};
pub use mock::{KeywordReplyService, MockDiagnosisService};

use crate::model::{DiagnosisResult, ImageBlob, PlantType};
use async_trait::async_trait;
use std::sync::Arc;

/// Produces the assistant's answer to one user turn
#[async_trait]
pub trait ReplyService: Send + Sync {
    async fn reply(&self, text: &str) -> Result<String, ServiceError>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Diagnoses one plant photo
#[async_trait]
pub trait DiagnosisService: Send + Sync {
    async fn diagnose(
        &self,
        image: &ImageBlob,
        plant_type: PlantType,
    ) -> Result<DiagnosisResult, ServiceError>;

    /// Name used in logs
    fn name(&self) -> &str;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ReplyService + ?Sized> ReplyService for Arc<T> {
    async fn reply(&self, text: &str) -> Result<String, ServiceError> {
        (**self).reply(text).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<T: DiagnosisService + ?Sized> DiagnosisService for Arc<T> {
    async fn diagnose(
        &self,
        image: &ImageBlob,
        plant_type: PlantType,
    ) -> Result<DiagnosisResult, ServiceError> {
        (**self).diagnose(image, plant_type).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ============================================================================
// Logging wrappers
// ============================================================================

/// Logging wrapper for reply services
pub struct LoggingReplyService {
    inner: Arc<dyn ReplyService>,
    name: String,
}

impl LoggingReplyService {
    pub fn new(inner: Arc<dyn ReplyService>) -> Self {
        let name = inner.name().to_string();
        Self { inner, name }
    }
}

#[async_trait]
impl ReplyService for LoggingReplyService {
    async fn reply(&self, text: &str) -> Result<String, ServiceError> {
        let start = std::time::Instant::now();
        let result = self.inner.reply(text).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    service = %self.name,
                    duration_ms = %duration.as_millis(),
                    input_chars = text.chars().count(),
                    reply_chars = reply.chars().count(),
                    "Assistant reply generated"
                );
            }
            Err(e) => {
                tracing::error!(
                    service = %self.name,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Assistant reply failed"
                );
            }
        }

        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Logging wrapper for diagnosis services
pub struct LoggingDiagnosisService {
    inner: Arc<dyn DiagnosisService>,
    name: String,
}

impl LoggingDiagnosisService {
    pub fn new(inner: Arc<dyn DiagnosisService>) -> Self {
        let name = inner.name().to_string();
        Self { inner, name }
    }
}

#[async_trait]
impl DiagnosisService for LoggingDiagnosisService {
    async fn diagnose(
        &self,
        image: &ImageBlob,
        plant_type: PlantType,
    ) -> Result<DiagnosisResult, ServiceError> {
        let start = std::time::Instant::now();
        let result = self.inner.diagnose(image, plant_type).await;
        let duration = start.elapsed();

        match &result {
            Ok(diagnosis) => {
                tracing::info!(
                    service = %self.name,
                    duration_ms = %duration.as_millis(),
                    plant_type = %plant_type,
                    media_type = %image.media_type(),
                    image_bytes = image.size(),
                    disease = %diagnosis.disease_label,
                    confidence = diagnosis.confidence,
                    "Diagnosis completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    service = %self.name,
                    duration_ms = %duration.as_millis(),
                    plant_type = %plant_type,
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Diagnosis failed"
                );
            }
        }

        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}
