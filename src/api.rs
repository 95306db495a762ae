//! HTTP API for the AgriSmart dashboard

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::runtime::SessionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}
