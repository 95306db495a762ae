//! Runtime for the assistant and diagnosis engines
//!
//! Every session runs two engine tasks. Handles feed events in and read
//! snapshots out; only the owning task ever touches engine state.

mod executor;


pub use executor::{ChatRuntime, DiagnosisRuntime};

use crate::config::AdvisorConfig;
use crate::error::AdvisorError;
use crate::intent;
use crate::model::{ImageBlob, PlantType};
use crate::service::{DiagnosisService, ReplyService};
use crate::state_machine::{
    ChatEvent, ChatSnapshot, ChatState, DiagnosisEvent, DiagnosisSnapshot, DiagnosisState,
    SessionContext, TurnStamp,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const EVENT_QUEUE_CAPACITY: usize = 32;
const BROADCAST_CAPACITY: usize = 128;

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    /// Full snapshot, sent once when a client connects
    Init { snapshot: serde_json::Value },
    /// A turn appended to the transcript
    Turn { turn: serde_json::Value },
    StateChange { state: serde_json::Value },
    ReplyDone,
    AnalysisDone,
    Error { message: String },
}

// ============================================================================
// Handles
// ============================================================================

/// Handle to a running conversation engine
#[derive(Clone)]
pub struct ChatHandle {
    session_id: String,
    event_tx: mpsc::Sender<ChatEvent>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    snapshot_rx: watch::Receiver<ChatSnapshot>,
}

impl ChatHandle {
    /// Submit typed text. Blank text is accepted here and ignored by the engine.
    pub async fn submit(&self, text: impl Into<String>) -> Result<(), AdvisorError> {
        self.send(ChatEvent::Submit {
            text: text.into(),
            stamp: TurnStamp::now(),
        })
        .await
    }

    /// Submit the text of one of the canned suggestions
    pub async fn select_suggestion(&self, suggestion_id: &str) -> Result<(), AdvisorError> {
        let suggestion = intent::find_suggestion(suggestion_id)
            .ok_or_else(|| AdvisorError::UnknownSuggestion(suggestion_id.to_string()))?;
        self.submit(suggestion.text).await
    }

    pub async fn retry_reply(&self) -> Result<(), AdvisorError> {
        self.send(ChatEvent::RetryReply).await
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SseEvent> {
        self.broadcast_tx.subscribe()
    }

    #[cfg(test)]
    pub fn watch(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot_rx.clone()
    }

    async fn send(&self, event: ChatEvent) -> Result<(), AdvisorError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| AdvisorError::EngineStopped(self.session_id.clone()))
    }
}

/// Handle to a running diagnosis engine
#[derive(Clone)]
pub struct DiagnosisHandle {
    session_id: String,
    event_tx: mpsc::Sender<DiagnosisEvent>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    snapshot_rx: watch::Receiver<DiagnosisSnapshot>,
}

impl DiagnosisHandle {
    pub async fn select_image(&self, image: ImageBlob) -> Result<(), AdvisorError> {
        self.send(DiagnosisEvent::SelectImage { image }).await
    }

    pub async fn select_plant_type(&self, plant_type: PlantType) -> Result<(), AdvisorError> {
        self.send(DiagnosisEvent::SelectPlantType { plant_type }).await
    }

    pub async fn analyze(&self) -> Result<(), AdvisorError> {
        self.send(DiagnosisEvent::Analyze).await
    }

    pub async fn reset(&self) -> Result<(), AdvisorError> {
        self.send(DiagnosisEvent::Reset).await
    }

    /// Flag a recent detection as treated
    pub async fn mark_treated(&self, detection_id: &str) -> Result<(), AdvisorError> {
        if !self
            .snapshot()
            .recent_detections
            .iter()
            .any(|record| record.id == detection_id)
        {
            return Err(AdvisorError::DetectionNotFound(detection_id.to_string()));
        }
        self.send(DiagnosisEvent::MarkTreated {
            detection_id: detection_id.to_string(),
        })
        .await
    }

    pub fn snapshot(&self) -> DiagnosisSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SseEvent> {
        self.broadcast_tx.subscribe()
    }

    #[cfg(test)]
    pub fn watch(&self) -> watch::Receiver<DiagnosisSnapshot> {
        self.snapshot_rx.clone()
    }

    async fn send(&self, event: DiagnosisEvent) -> Result<(), AdvisorError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| AdvisorError::EngineStopped(self.session_id.clone()))
    }
}

/// Both engines of one dashboard session
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub chat: ChatHandle,
    pub diagnosis: DiagnosisHandle,
    shutdown: CancellationToken,
}

impl SessionHandle {
    /// Start both engine tasks for a new session
    pub fn spawn<R, D>(context: SessionContext, reply_service: R, diagnosis_service: D) -> Self
    where
        R: ReplyService + 'static,
        D: DiagnosisService + 'static,
    {
        let shutdown = CancellationToken::new();
        let session_id = context.session_id.clone();

        let chat_state = ChatState::new(Utc::now());
        let (chat_tx, chat_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (chat_broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (chat_snapshot_tx, chat_snapshot_rx) = watch::channel(chat_state.snapshot());

        let chat_runtime = ChatRuntime::new(
            context.clone(),
            chat_state,
            reply_service,
            chat_rx,
            chat_tx.clone(),
            chat_broadcast.clone(),
            chat_snapshot_tx,
            shutdown.clone(),
        );

        let diagnosis_state = DiagnosisState::default();
        let (diagnosis_tx, diagnosis_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (diagnosis_broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (diagnosis_snapshot_tx, diagnosis_snapshot_rx) =
            watch::channel(diagnosis_state.snapshot());

        let diagnosis_runtime = DiagnosisRuntime::new(
            context,
            diagnosis_state,
            diagnosis_service,
            diagnosis_rx,
            diagnosis_tx.clone(),
            diagnosis_broadcast.clone(),
            diagnosis_snapshot_tx,
            shutdown.clone(),
        );

        tokio::spawn(chat_runtime.run());
        tokio::spawn(diagnosis_runtime.run());

        Self {
            id: session_id.clone(),
            chat: ChatHandle {
                session_id: session_id.clone(),
                event_tx: chat_tx,
                broadcast_tx: chat_broadcast,
                snapshot_rx: chat_snapshot_rx,
            },
            diagnosis: DiagnosisHandle {
                session_id,
                event_tx: diagnosis_tx,
                broadcast_tx: diagnosis_broadcast,
                snapshot_rx: diagnosis_snapshot_rx,
            },
            shutdown,
        }
    }

    /// Stop both engines; pending replies and analyses are dropped
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Whether any client is streaming either engine
    pub fn has_subscribers(&self) -> bool {
        self.chat.broadcast_tx.receiver_count() > 0
            || self.diagnosis.broadcast_tx.receiver_count() > 0
    }
}

// ============================================================================
// Session Manager
// ============================================================================

struct SessionEntry {
    handle: SessionHandle,
    last_seen: Instant,
}

/// Owns every live session
pub struct SessionManager {
    config: AdvisorConfig,
    reply_service: Arc<dyn ReplyService>,
    diagnosis_service: Arc<dyn DiagnosisService>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionManager {
    pub fn new(
        config: AdvisorConfig,
        reply_service: Arc<dyn ReplyService>,
        diagnosis_service: Arc<dyn DiagnosisService>,
    ) -> Self {
        Self {
            config,
            reply_service,
            diagnosis_service,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub async fn create_session(&self) -> SessionHandle {
        let session_id = uuid::Uuid::new_v4().to_string();
        let handle = SessionHandle::spawn(
            self.config.session_context(session_id.clone()),
            self.reply_service.clone(),
            self.diagnosis_service.clone(),
        );

        self.sessions.write().await.insert(
            session_id.clone(),
            SessionEntry {
                handle: handle.clone(),
                last_seen: Instant::now(),
            },
        );

        tracing::info!(
            session_id = %session_id,
            reply_service = %self.reply_service.name(),
            diagnosis_service = %self.diagnosis_service.name(),
            "Session created"
        );
        handle
    }

    /// Look up a session and mark it as in use
    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, AdvisorError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| AdvisorError::SessionNotFound(session_id.to_string()))?;
        entry.last_seen = Instant::now();
        Ok(entry.handle.clone())
    }

    pub async fn close(&self, session_id: &str) -> Result<(), AdvisorError> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| AdvisorError::SessionNotFound(session_id.to_string()))?;
        entry.handle.close();
        tracing::info!(session_id = %session_id, "Session closed");
        Ok(())
    }

    /// Close sessions idle past the configured timeout. A session with an
    /// open event stream is never idle.
    pub async fn sweep_idle(&self) -> usize {
        let timeout = self.config.session_idle_timeout;
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        let idle: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| {
                !entry.handle.has_subscribers() && now.duration_since(entry.last_seen) >= timeout
            })
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in &idle {
            if let Some(entry) = sessions.remove(session_id) {
                entry.handle.close();
                tracing::info!(session_id = %session_id, "Idle session closed");
            }
        }
        idle.len()
    }

    /// Periodically close idle sessions until the manager is dropped
    pub fn spawn_idle_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let closed = manager.sweep_idle().await;
                if closed > 0 {
                    tracing::info!(closed, "Swept idle sessions");
                }
            }
        })
    }

    /// Stop every session, used on server shutdown
    pub async fn close_all(&self) {
        let sessions: Vec<SessionEntry> =
            self.sessions.write().await.drain().map(|(_, e)| e).collect();
        for entry in &sessions {
            entry.handle.close();
        }
        if !sessions.is_empty() {
            tracing::info!(count = sessions.len(), "Closed all sessions");
        }
    }
}
