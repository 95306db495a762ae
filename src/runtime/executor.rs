//! Engine runtime executors
//!
//! Each executor owns its engine state, applies events through the pure
//! transition functions, and carries out the resulting effects.

use super::SseEvent;

use crate::model::{ImageBlob, PlantType};
use crate::service::{DiagnosisService, ReplyService};
use crate::state_machine::{
    chat_transition, diagnosis_transition, ChatEffect, ChatEvent, ChatSnapshot, ChatState,
    DiagnosisEffect, DiagnosisEvent, DiagnosisSnapshot, DiagnosisState, SessionContext, TurnStamp,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Conversation
// ============================================================================

/// A reply waiting for its deadline
#[derive(Debug)]
struct ScheduledReply {
    deadline: Instant,
    reply_to: String,
    text: String,
}

/// Conversation runtime, generic over the reply backend
pub struct ChatRuntime<R>
where
    R: ReplyService + 'static,
{
    context: SessionContext,
    state: ChatState,
    reply_service: Arc<R>,
    event_rx: mpsc::Receiver<ChatEvent>,
    event_tx: mpsc::Sender<ChatEvent>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
    /// Replies are answered one at a time in scheduling order
    reply_queue: mpsc::UnboundedSender<ScheduledReply>,
    reply_queue_rx: Option<mpsc::UnboundedReceiver<ScheduledReply>>,
    shutdown: CancellationToken,
}

impl<R> ChatRuntime<R>
where
    R: ReplyService + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SessionContext,
        state: ChatState,
        reply_service: R,
        event_rx: mpsc::Receiver<ChatEvent>,
        event_tx: mpsc::Sender<ChatEvent>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        snapshot_tx: watch::Sender<ChatSnapshot>,
        shutdown: CancellationToken,
    ) -> Self {
        let (reply_queue, reply_queue_rx) = mpsc::unbounded_channel();
        Self {
            context,
            state,
            reply_service: Arc::new(reply_service),
            event_rx,
            event_tx,
            broadcast_tx,
            snapshot_tx,
            reply_queue,
            reply_queue_rx: Some(reply_queue_rx),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, "Starting chat runtime");

        if let Some(queue) = self.reply_queue_rx.take() {
            tokio::spawn(reply_worker(
                self.reply_service.clone(),
                queue,
                self.event_tx.clone(),
                self.shutdown.clone(),
            ));
        }

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                Some(event) = self.event_rx.recv() => self.process_event(event),

                else => break,
            }
        }

        tracing::info!(session_id = %self.context.session_id, "Chat runtime stopped");
    }

    fn process_event(&mut self, event: ChatEvent) {
        let result = match chat_transition(&self.state, &self.context, event) {
            Ok(result) => result,
            Err(e) => {
                // No-op events are not user errors
                tracing::debug!(
                    session_id = %self.context.session_id,
                    reason = %e,
                    "Ignoring chat event"
                );
                return;
            }
        };

        self.state = result.new_state;
        for effect in result.effects {
            self.execute_effect(effect);
        }
    }

    fn execute_effect(&mut self, effect: ChatEffect) {
        match effect {
            ChatEffect::PublishTurn { turn } => {
                let mut value = serde_json::to_value(&turn).unwrap_or(Value::Null);
                if let Value::Object(fields) = &mut value {
                    fields.insert("display_time".to_string(), Value::String(turn.display_time()));
                }
                let _ = self.broadcast_tx.send(SseEvent::Turn { turn: value });
            }

            ChatEffect::PublishState => {
                let snapshot = self.state.snapshot();
                let state = serde_json::to_value(&snapshot).unwrap_or(Value::Null);
                self.snapshot_tx.send_replace(snapshot);
                let _ = self.broadcast_tx.send(SseEvent::StateChange { state });
            }

            ChatEffect::ScheduleReply {
                reply_to,
                text,
                delay,
            } => {
                tracing::debug!(
                    session_id = %self.context.session_id,
                    reply_to = %reply_to,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Scheduling reply"
                );
                let scheduled = ScheduledReply {
                    deadline: Instant::now() + delay,
                    reply_to,
                    text,
                };
                if self.reply_queue.send(scheduled).is_err() {
                    tracing::error!(
                        session_id = %self.context.session_id,
                        "Reply worker gone, reply dropped"
                    );
                }
            }

            ChatEffect::NotifyReplyDone => {
                let _ = self.broadcast_tx.send(SseEvent::ReplyDone);
            }

            ChatEffect::NotifyError { message } => {
                let _ = self.broadcast_tx.send(SseEvent::Error { message });
            }
        }
    }
}

/// Answers scheduled replies in order.
///
/// Deadlines are fixed when a reply is scheduled, so overlapping submits
/// each wait the configured delay rather than queueing behind each other.
async fn reply_worker<R: ReplyService>(
    service: Arc<R>,
    mut queue: mpsc::UnboundedReceiver<ScheduledReply>,
    event_tx: mpsc::Sender<ChatEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let scheduled = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = queue.recv() => match next {
                Some(scheduled) => scheduled,
                None => break,
            },
        };

        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep_until(scheduled.deadline) => {}
        }

        let event = match service.reply(&scheduled.text).await {
            Ok(text) => ChatEvent::ReplyReady {
                reply_to: scheduled.reply_to,
                text,
                stamp: TurnStamp::now(),
            },
            Err(e) => ChatEvent::ReplyFailed {
                reply_to: scheduled.reply_to,
                user_text: scheduled.text,
                retryable: e.kind.is_retryable(),
                message: e.message,
            },
        };

        if event_tx.send(event).await.is_err() {
            break;
        }
    }
}

// ============================================================================
// Diagnosis
// ============================================================================

/// Diagnosis runtime, generic over the diagnosis backend
pub struct DiagnosisRuntime<D>
where
    D: DiagnosisService + 'static,
{
    context: SessionContext,
    state: DiagnosisState,
    service: Arc<D>,
    event_rx: mpsc::Receiver<DiagnosisEvent>,
    event_tx: mpsc::Sender<DiagnosisEvent>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    snapshot_tx: watch::Sender<DiagnosisSnapshot>,
    /// Token for the analysis in flight, if any
    analysis_cancel_token: Option<CancellationToken>,
    shutdown: CancellationToken,
}

impl<D> DiagnosisRuntime<D>
where
    D: DiagnosisService + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SessionContext,
        state: DiagnosisState,
        service: D,
        event_rx: mpsc::Receiver<DiagnosisEvent>,
        event_tx: mpsc::Sender<DiagnosisEvent>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        snapshot_tx: watch::Sender<DiagnosisSnapshot>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            context,
            state,
            service: Arc::new(service),
            event_rx,
            event_tx,
            broadcast_tx,
            snapshot_tx,
            analysis_cancel_token: None,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, "Starting diagnosis runtime");

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                Some(event) = self.event_rx.recv() => self.process_event(event),

                else => break,
            }
        }

        if let Some(token) = self.analysis_cancel_token.take() {
            token.cancel();
        }
        tracing::info!(session_id = %self.context.session_id, "Diagnosis runtime stopped");
    }

    fn process_event(&mut self, event: DiagnosisEvent) {
        let result = match diagnosis_transition(&self.state, &self.context, event) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(
                    session_id = %self.context.session_id,
                    generation = self.state.generation,
                    reason = %e,
                    "Ignoring diagnosis event"
                );
                return;
            }
        };

        self.state = result.new_state;
        for effect in result.effects {
            self.execute_effect(effect);
        }

        // A finished analysis has nothing left to cancel
        if !self.state.is_analyzing() {
            self.analysis_cancel_token = None;
        }
    }

    fn execute_effect(&mut self, effect: DiagnosisEffect) {
        match effect {
            DiagnosisEffect::PublishState => {
                let snapshot = self.state.snapshot();
                let state = serde_json::to_value(&snapshot).unwrap_or(Value::Null);
                self.snapshot_tx.send_replace(snapshot);
                let _ = self.broadcast_tx.send(SseEvent::StateChange { state });
            }

            DiagnosisEffect::ScheduleAnalysis {
                generation,
                image,
                plant_type,
                delay,
            } => {
                if let Some(previous) = self.analysis_cancel_token.take() {
                    previous.cancel();
                }

                let cancel_token = self.shutdown.child_token();
                self.analysis_cancel_token = Some(cancel_token.clone());

                let service = self.service.clone();
                let event_tx = self.event_tx.clone();
                let session_id = self.context.session_id.clone();

                tokio::spawn(async move {
                    tracing::info!(
                        session_id = %session_id,
                        generation,
                        plant_type = %plant_type,
                        "Analysis scheduled (background)"
                    );

                    // Race the delayed analysis against cancellation
                    tokio::select! {
                        biased;

                        () = cancel_token.cancelled() => {
                            tracing::info!(session_id = %session_id, generation, "Analysis cancelled");
                        }

                        event = run_analysis(service, image, plant_type, generation, delay) => {
                            let _ = event_tx.send(event).await;
                        }
                    }
                });
            }

            DiagnosisEffect::CancelAnalysis => {
                if let Some(token) = self.analysis_cancel_token.take() {
                    token.cancel();
                }
            }

            DiagnosisEffect::NotifyAnalysisDone => {
                let _ = self.broadcast_tx.send(SseEvent::AnalysisDone);
            }

            DiagnosisEffect::NotifyError { message } => {
                let _ = self.broadcast_tx.send(SseEvent::Error { message });
            }
        }
    }
}

async fn run_analysis<D: DiagnosisService>(
    service: Arc<D>,
    image: ImageBlob,
    plant_type: PlantType,
    generation: u64,
    delay: Duration,
) -> DiagnosisEvent {
    tokio::time::sleep(delay).await;

    match service.diagnose(&image, plant_type).await {
        Ok(result) => DiagnosisEvent::AnalysisComplete {
            generation,
            result,
            completed_at: Utc::now(),
        },
        Err(e) => DiagnosisEvent::AnalysisFailed {
            generation,
            retryable: e.kind.is_retryable(),
            message: e.message,
        },
    }
}
