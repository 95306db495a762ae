//! Deterministic services shipped with the dashboard

use super::{DiagnosisService, ReplyService, ServiceError};
use crate::intent::{fallback_response, IntentTable};
use crate::model::{DiagnosisResult, ImageBlob, PlantType};
use async_trait::async_trait;
use std::sync::Arc;

/// Answers from the keyword intent table
pub struct KeywordReplyService {
    table: Arc<IntentTable>,
}

impl KeywordReplyService {
    pub fn new(table: Arc<IntentTable>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl ReplyService for KeywordReplyService {
    async fn reply(&self, text: &str) -> Result<String, ServiceError> {
        let reply = match self.table.classify(text) {
            Some(rule) => {
                tracing::debug!(keywords = ?rule.keywords(), "Matched intent");
                rule.response().to_string()
            }
            None => {
                tracing::debug!("No intent matched, using fallback");
                fallback_response(text)
            }
        };
        Ok(reply)
    }

    fn name(&self) -> &'static str {
        "keyword-intents"
    }
}

/// Returns the same diagnosis for every photo.
///
/// Stands in for a real classifier; nothing in the engines relies on the
/// result being constant.
pub struct MockDiagnosisService {
    result: DiagnosisResult,
}

impl MockDiagnosisService {
    pub fn new(result: DiagnosisResult) -> Self {
        Self { result }
    }

    /// The leaf-spot diagnosis the dashboard demo shows
    pub fn leaf_spot() -> Self {
        Self::new(DiagnosisResult::new(
            "Leaf Spot Disease",
            94.7,
            vec![
                "Apply copper-based fungicide every 7-10 days.".to_string(),
                "Ensure proper spacing between plants for better air circulation.".to_string(),
                "Remove and dispose of affected leaves properly.".to_string(),
                "Water at the base of plants to keep foliage dry.".to_string(),
                "Consider crop rotation for next season.".to_string(),
            ],
        ))
    }
}

impl Default for MockDiagnosisService {
    fn default() -> Self {
        Self::leaf_spot()
    }
}

#[async_trait]
impl DiagnosisService for MockDiagnosisService {
    async fn diagnose(
        &self,
        image: &ImageBlob,
        plant_type: PlantType,
    ) -> Result<DiagnosisResult, ServiceError> {
        tracing::debug!(
            plant_type = %plant_type,
            image_bytes = image.size(),
            "Mock diagnosis ignoring image content"
        );
        Ok(self.result.clone())
    }

    fn name(&self) -> &'static str {
        "mock-leaf-spot"
    }
}
