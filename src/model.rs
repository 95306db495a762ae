//! Domain data shared by the assistant and diagnosis engines

use crate::error::AdvisorError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use ts_rs::TS;

// ============================================================================
// Conversation
// ============================================================================

/// Author of a transcript turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Sender {
    User,
    Assistant,
}

/// One message in the assistant transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Turn {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    /// Display only; transcript order is append order
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        sender: Sender,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            sender,
            created_at,
        }
    }

    /// Wall-clock time for the chat bubble, e.g. `09:41`
    pub fn display_time(&self) -> String {
        self.created_at
            .with_timezone(&Local)
            .format("%H:%M")
            .to_string()
    }
}

/// A canned prompt offered under the chat input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Suggestion {
    pub id: String,
    pub text: String,
}

// ============================================================================
// Plant images
// ============================================================================

/// Image media types the triage tool accepts
pub const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Default upload cap (10 MiB)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// An uploaded plant photo with a validated media type.
///
/// Only constructible for JPEG, PNG and WEBP payloads, so the diagnosis
/// engine never sees an unsupported file. The `data:` URL preview is
/// rendered once at construction and shared by every snapshot.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBlob {
    bytes: Arc<[u8]>,
    media_type: String,
    file_name: Option<String>,
    preview_url: Arc<str>,
}

impl ImageBlob {
    /// Validate raw bytes.
    ///
    /// When `declared_type` is missing the type is guessed from `file_name`.
    pub fn new(
        bytes: Vec<u8>,
        declared_type: Option<&str>,
        file_name: Option<String>,
        max_bytes: usize,
    ) -> Result<Self, AdvisorError> {
        if bytes.is_empty() {
            return Err(AdvisorError::InvalidInput("image is empty".to_string()));
        }
        if bytes.len() > max_bytes {
            return Err(AdvisorError::ImageTooLarge {
                size: bytes.len(),
                max: max_bytes,
            });
        }

        let media_type = resolve_media_type(declared_type, file_name.as_deref())?;
        let preview_url = format!("data:{media_type};base64,{}", BASE64.encode(&bytes));

        Ok(Self {
            bytes: bytes.into(),
            media_type,
            file_name,
            preview_url: preview_url.into(),
        })
    }

    /// Decode a base64 payload, accepting either bare base64 or a full
    /// `data:<type>;base64,<payload>` URL as produced by a browser `FileReader`.
    pub fn from_base64(
        data: &str,
        declared_type: Option<&str>,
        file_name: Option<String>,
        max_bytes: usize,
    ) -> Result<Self, AdvisorError> {
        let (url_type, payload) = match data.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or_else(|| {
                    AdvisorError::InvalidImageEncoding("data URL has no payload".to_string())
                })?;
                let header_type = header.strip_suffix(";base64").ok_or_else(|| {
                    AdvisorError::InvalidImageEncoding("data URL is not base64".to_string())
                })?;
                (Some(header_type), payload)
            }
            None => (None, data),
        };

        // Reject early on size without decoding the whole payload
        let estimated = payload.trim().len() / 4 * 3;
        if estimated > max_bytes + 2 {
            return Err(AdvisorError::ImageTooLarge {
                size: estimated,
                max: max_bytes,
            });
        }

        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| AdvisorError::InvalidImageEncoding(e.to_string()))?;

        Self::new(bytes, declared_type.or(url_type), file_name, max_bytes)
    }

    #[cfg(test)]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Decoded size in bytes, never zero
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Renderable preview (`data:` URL)
    pub fn preview_url(&self) -> &str {
        &self.preview_url
    }
}

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBlob")
            .field("media_type", &self.media_type)
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

fn resolve_media_type(
    declared_type: Option<&str>,
    file_name: Option<&str>,
) -> Result<String, AdvisorError> {
    let declared = declared_type
        .map(|t| t.split(';').next().unwrap_or(t).trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty());

    let media_type = match declared {
        Some(t) => t,
        None => file_name
            .and_then(|name| mime_guess::from_path(name).first_raw())
            .map(str::to_string)
            .ok_or_else(|| AdvisorError::UnsupportedFileType("unknown".to_string()))?,
    };

    // Browsers occasionally send the non-standard `image/jpg`
    let media_type = if media_type == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        media_type
    };

    if SUPPORTED_IMAGE_TYPES.contains(&media_type.as_str()) {
        Ok(media_type)
    } else {
        Err(AdvisorError::UnsupportedFileType(media_type))
    }
}

// ============================================================================
// Plant types
// ============================================================================

/// Crops the triage tool knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum PlantType {
    Tomato,
    Potato,
    Corn,
    Apple,
    Grape,
    Rice,
    Wheat,
    Soybean,
    Cucumber,
    Strawberry,
    Coffee,
    Orange,
    Pepper,
    Cherry,
    Peach,
    Cotton,
}

impl PlantType {
    /// All plant types in dropdown order
    pub const ALL: [PlantType; 16] = [
        PlantType::Tomato,
        PlantType::Potato,
        PlantType::Corn,
        PlantType::Apple,
        PlantType::Grape,
        PlantType::Rice,
        PlantType::Wheat,
        PlantType::Soybean,
        PlantType::Cucumber,
        PlantType::Strawberry,
        PlantType::Coffee,
        PlantType::Orange,
        PlantType::Pepper,
        PlantType::Cherry,
        PlantType::Peach,
        PlantType::Cotton,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlantType::Tomato => "Tomato",
            PlantType::Potato => "Potato",
            PlantType::Corn => "Corn",
            PlantType::Apple => "Apple",
            PlantType::Grape => "Grape",
            PlantType::Rice => "Rice",
            PlantType::Wheat => "Wheat",
            PlantType::Soybean => "Soybean",
            PlantType::Cucumber => "Cucumber",
            PlantType::Strawberry => "Strawberry",
            PlantType::Coffee => "Coffee",
            PlantType::Orange => "Orange",
            PlantType::Pepper => "Pepper",
            PlantType::Cherry => "Cherry",
            PlantType::Peach => "Peach",
            PlantType::Cotton => "Cotton",
        }
    }
}

impl fmt::Display for PlantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlantType {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        PlantType::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AdvisorError::UnknownPlantType(s.to_string()))
    }
}

// ============================================================================
// Diagnosis results
// ============================================================================

/// Outcome of one successful analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiagnosisResult {
    pub disease_label: String,
    /// Percentage in `0.0..=100.0`
    pub confidence: f64,
    pub treatment_steps: Vec<String>,
}

impl DiagnosisResult {
    /// Build a result, clamping confidence into `0..=100`
    pub fn new(
        disease_label: impl Into<String>,
        confidence: f64,
        treatment_steps: Vec<String>,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 100.0)
        };
        Self {
            disease_label: disease_label.into(),
            confidence,
            treatment_steps,
        }
    }
}

/// Follow-up state of a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DetectionStatus {
    #[default]
    Monitoring,
    Treated,
}

/// Entry in the per-session "recent detections" list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DetectionRecord {
    pub id: String,
    pub plant_type: PlantType,
    pub disease_label: String,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    pub status: DetectionStatus,
}
