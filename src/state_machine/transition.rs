//! Pure state transition functions
//!
//! Given the same state, context and event these always produce the same
//! result. Rejected events come back as `TransitionError`; the runtime treats
//! them as silent no-ops.

use super::{
    CasePhase, ChatEffect, ChatEvent, ChatState, DiagnosisEffect, DiagnosisEvent,
    DiagnosisState, FailedReply, SessionContext,
};
use crate::model::{DetectionRecord, DetectionStatus, Sender, Turn};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult<S, E> {
    pub new_state: S,
    pub effects: Vec<E>,
}

impl<S, E> TransitionResult<S, E> {
    pub fn new(state: S) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: E) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = E>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Reasons an event leaves the state untouched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Message is empty")]
    InvalidInput,
    #[error("Analysis needs both an image and a plant type")]
    IncompletePrecondition,
    #[error("Analysis already in progress")]
    AnalysisInProgress,
    #[error("Case already has a result; reset or change the inputs first")]
    AlreadyCompleted,
    #[error("No failed reply to retry")]
    NothingToRetry,
    #[error("Discarding completion for generation {completed}, case is at {current}")]
    StaleCompletion { completed: u64, current: u64 },
    #[error("No recent detection {0}")]
    UnknownDetection(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

// ============================================================================
// Conversation
// ============================================================================

/// Conversation engine transition
pub fn chat_transition(
    state: &ChatState,
    context: &SessionContext,
    event: ChatEvent,
) -> Result<TransitionResult<ChatState, ChatEffect>, TransitionError> {
    match event {
        ChatEvent::Submit { text, stamp } => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(TransitionError::InvalidInput);
            }

            // The transcript shows the trimmed text; the reply sees it as typed
            let turn = Turn::new(stamp.id, trimmed, Sender::User, stamp.at);
            let mut new_state = state.clone();
            new_state.transcript.push(turn.clone());
            new_state.pending_replies = new_state.pending_replies.saturating_add(1);

            Ok(TransitionResult::new(new_state)
                .with_effect(ChatEffect::ScheduleReply {
                    reply_to: turn.id.clone(),
                    text,
                    delay: context.reply_delay,
                })
                .with_effect(ChatEffect::publish_turn(turn))
                .with_effect(ChatEffect::PublishState))
        }

        ChatEvent::ReplyReady {
            reply_to,
            text,
            stamp,
        } => {
            if state.pending_replies == 0 {
                return Err(TransitionError::InvalidTransition(format!(
                    "reply to {reply_to} arrived with no reply pending"
                )));
            }

            let turn = Turn::new(stamp.id, text, Sender::Assistant, stamp.at);
            let mut new_state = state.clone();
            new_state.transcript.push(turn.clone());
            new_state.pending_replies -= 1;

            let done = !new_state.awaiting_reply();
            Ok(TransitionResult::new(new_state)
                .with_effect(ChatEffect::publish_turn(turn))
                .with_effect(ChatEffect::PublishState)
                .with_effects(done.then_some(ChatEffect::NotifyReplyDone)))
        }

        ChatEvent::ReplyFailed {
            reply_to,
            user_text,
            message,
            retryable,
        } => {
            if state.pending_replies == 0 {
                return Err(TransitionError::InvalidTransition(format!(
                    "failure for {reply_to} arrived with no reply pending"
                )));
            }

            let mut new_state = state.clone();
            new_state.pending_replies -= 1;
            new_state.failed_replies.push(FailedReply {
                reply_to,
                user_text,
                message: message.clone(),
                retryable,
            });

            let done = !new_state.awaiting_reply();
            Ok(TransitionResult::new(new_state)
                .with_effect(ChatEffect::PublishState)
                .with_effect(ChatEffect::notify_error(message))
                .with_effects(done.then_some(ChatEffect::NotifyReplyDone)))
        }

        ChatEvent::RetryReply => {
            if state.failed_replies.is_empty() {
                return Err(TransitionError::NothingToRetry);
            }

            // Every failed reply goes back on the queue, oldest first
            let mut new_state = state.clone();
            let failed = std::mem::take(&mut new_state.failed_replies);
            let retried = u32::try_from(failed.len()).unwrap_or(u32::MAX);
            new_state.pending_replies = new_state.pending_replies.saturating_add(retried);

            Ok(TransitionResult::new(new_state)
                .with_effects(failed.into_iter().map(|f| ChatEffect::ScheduleReply {
                    reply_to: f.reply_to,
                    text: f.user_text,
                    delay: context.reply_delay,
                }))
                .with_effect(ChatEffect::PublishState))
        }
    }
}

// ============================================================================
// Diagnosis
// ============================================================================

/// Diagnosis engine transition
pub fn diagnosis_transition(
    state: &DiagnosisState,
    context: &SessionContext,
    event: DiagnosisEvent,
) -> Result<TransitionResult<DiagnosisState, DiagnosisEffect>, TransitionError> {
    match event {
        // Edits always invalidate the result and abandon any analysis in flight
        DiagnosisEvent::SelectImage { image } => Ok(edit_case(state, |case| {
            case.image = Some(image);
        })),

        DiagnosisEvent::SelectPlantType { plant_type } => Ok(edit_case(state, |case| {
            case.plant_type = Some(plant_type);
        })),

        DiagnosisEvent::Reset => {
            let new_state = DiagnosisState {
                image: None,
                plant_type: None,
                phase: CasePhase::Editing,
                generation: state.generation + 1,
                recent: state.recent.clone(),
            };

            Ok(TransitionResult::new(new_state)
                .with_effects(state.is_analyzing().then_some(DiagnosisEffect::CancelAnalysis))
                .with_effect(DiagnosisEffect::PublishState))
        }

        DiagnosisEvent::Analyze => {
            match &state.phase {
                CasePhase::Analyzing => return Err(TransitionError::AnalysisInProgress),
                CasePhase::Completed { .. } => return Err(TransitionError::AlreadyCompleted),
                CasePhase::Editing | CasePhase::Failed { .. } => {}
            }

            let (Some(image), Some(plant_type)) = (&state.image, state.plant_type) else {
                return Err(TransitionError::IncompletePrecondition);
            };

            let generation = state.generation + 1;
            let mut new_state = state.clone();
            new_state.phase = CasePhase::Analyzing;
            new_state.generation = generation;

            Ok(TransitionResult::new(new_state)
                .with_effect(DiagnosisEffect::ScheduleAnalysis {
                    generation,
                    image: image.clone(),
                    plant_type,
                    delay: context.analysis_delay,
                })
                .with_effect(DiagnosisEffect::PublishState))
        }

        // History only; the case itself is untouched
        DiagnosisEvent::MarkTreated { detection_id } => {
            let mut new_state = state.clone();
            let record = new_state
                .recent
                .iter_mut()
                .find(|record| record.id == detection_id)
                .ok_or(TransitionError::UnknownDetection(detection_id))?;
            record.status = DetectionStatus::Treated;

            Ok(TransitionResult::new(new_state).with_effect(DiagnosisEffect::PublishState))
        }

        DiagnosisEvent::AnalysisComplete {
            generation,
            result,
            completed_at,
        } => {
            ensure_current(state, generation)?;
            let Some(plant_type) = state.plant_type else {
                return Err(TransitionError::InvalidTransition(
                    "analysis completed for a case without a plant type".to_string(),
                ));
            };

            let mut new_state = state.clone();
            new_state.recent.insert(
                0,
                DetectionRecord {
                    id: format!("detection-{generation}"),
                    plant_type,
                    disease_label: result.disease_label.clone(),
                    confidence: result.confidence,
                    detected_at: completed_at,
                    status: DetectionStatus::Monitoring,
                },
            );
            new_state.recent.truncate(context.recent_limit);
            new_state.phase = CasePhase::Completed { result };

            Ok(TransitionResult::new(new_state)
                .with_effect(DiagnosisEffect::PublishState)
                .with_effect(DiagnosisEffect::NotifyAnalysisDone))
        }

        DiagnosisEvent::AnalysisFailed {
            generation,
            message,
            retryable,
        } => {
            ensure_current(state, generation)?;

            let mut new_state = state.clone();
            new_state.phase = CasePhase::Failed {
                message: message.clone(),
                retryable,
            };

            Ok(TransitionResult::new(new_state)
                .with_effect(DiagnosisEffect::PublishState)
                .with_effect(DiagnosisEffect::NotifyError { message }))
        }
    }
}

fn edit_case(
    state: &DiagnosisState,
    apply: impl FnOnce(&mut DiagnosisState),
) -> TransitionResult<DiagnosisState, DiagnosisEffect> {
    let mut new_state = state.clone();
    apply(&mut new_state);
    new_state.phase = CasePhase::Editing;
    new_state.generation = state.generation + 1;

    TransitionResult::new(new_state)
        .with_effects(state.is_analyzing().then_some(DiagnosisEffect::CancelAnalysis))
        .with_effect(DiagnosisEffect::PublishState)
}

/// A completion applies only to the analysis the case is still waiting for
fn ensure_current(state: &DiagnosisState, generation: u64) -> Result<(), TransitionError> {
    if state.is_analyzing() && state.generation == generation {
        Ok(())
    } else {
        Err(TransitionError::StaleCompletion {
            completed: generation,
            current: state.generation,
        })
    }
}
