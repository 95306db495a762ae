//! Server configuration from the environment

use crate::model::DEFAULT_MAX_IMAGE_BYTES;
use crate::state_machine::state::DEFAULT_RECENT_LIMIT;
use crate::state_machine::SessionContext;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_REPLY_DELAY_MS: u64 = 1000;
const DEFAULT_ANALYSIS_DELAY_MS: u64 = 2000;
const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Settings shared by every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisorConfig {
    pub port: u16,
    /// Simulated latency before the assistant answers
    pub reply_delay: Duration,
    /// Simulated latency before a diagnosis is available
    pub analysis_delay: Duration,
    pub max_image_bytes: usize,
    pub recent_detections: usize,
    /// Sessions untouched for this long, with no open stream, are closed
    pub session_idle_timeout: Duration,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            reply_delay: Duration::from_millis(DEFAULT_REPLY_DELAY_MS),
            analysis_delay: Duration::from_millis(DEFAULT_ANALYSIS_DELAY_MS),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            recent_detections: DEFAULT_RECENT_LIMIT,
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        }
    }
}

impl AdvisorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset or unparseable values
    /// keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str, default_ms: u64| {
            Duration::from_millis(parse_var(&lookup, key).unwrap_or(default_ms))
        };

        Self {
            port: parse_var(&lookup, "AGRISMART_PORT").unwrap_or(defaults.port),
            reply_delay: read("AGRISMART_REPLY_DELAY_MS", DEFAULT_REPLY_DELAY_MS),
            analysis_delay: read("AGRISMART_ANALYSIS_DELAY_MS", DEFAULT_ANALYSIS_DELAY_MS),
            max_image_bytes: parse_var(&lookup, "AGRISMART_MAX_IMAGE_BYTES")
                .unwrap_or(defaults.max_image_bytes),
            recent_detections: parse_var(&lookup, "AGRISMART_RECENT_DETECTIONS")
                .unwrap_or(defaults.recent_detections),
            session_idle_timeout: parse_var(&lookup, "AGRISMART_SESSION_IDLE_SECS")
                .map_or(defaults.session_idle_timeout, Duration::from_secs),
        }
    }

    pub fn session_context(&self, session_id: impl Into<String>) -> SessionContext {
        SessionContext::new(session_id, self.reply_delay, self.analysis_delay)
            .with_recent_limit(self.recent_detections)
    }

    /// How often idle sessions are looked for
    pub fn sweep_interval(&self) -> Duration {
        (self.session_idle_timeout / 4).clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL)
    }

    /// Largest request body the image upload route accepts (base64 grows
    /// the payload by a third, plus room for the JSON envelope)
    pub fn request_body_limit(&self) -> usize {
        self.max_image_bytes.div_ceil(3) * 4 + 64 * 1024
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key = %key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}
