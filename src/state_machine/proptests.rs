//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::transition::*;
use super::*;
use crate::model::{DiagnosisResult, ImageBlob, PlantType, Sender};
use chrono::Utc;
use proptest::prelude::*;
use std::time::Duration;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> SessionContext {
    SessionContext::new(
        "test-session",
        Duration::from_millis(1000),
        Duration::from_millis(2000),
    )
    .with_recent_limit(3)
}

fn test_image(media_type: &str, len: usize) -> ImageBlob {
    ImageBlob::new(vec![7u8; len.max(1)], Some(media_type), None, 4096).unwrap()
}

fn leaf_spot() -> DiagnosisResult {
    DiagnosisResult::new("Leaf Spot Disease", 94.7, vec!["Remove affected leaves".into()])
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_plant_type() -> impl Strategy<Value = PlantType> {
    proptest::sample::select(PlantType::ALL.to_vec())
}

fn arb_image() -> impl Strategy<Value = ImageBlob> {
    (
        prop_oneof![Just("image/jpeg"), Just("image/png"), Just("image/webp")],
        1usize..64,
    )
        .prop_map(|(media_type, len)| test_image(media_type, len))
}

fn arb_user_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ]{1,30}",
        Just("What's the weather forecast?".to_string()),
        Just("   ".to_string()),
        Just(String::new()),
    ]
}

fn arb_chat_event() -> impl Strategy<Value = ChatEvent> {
    prop_oneof![
        3 => arb_user_text().prop_map(|text| ChatEvent::Submit {
            text,
            stamp: TurnStamp::now(),
        }),
        2 => "[a-z ]{1,20}".prop_map(|text| ChatEvent::ReplyReady {
            reply_to: "u".to_string(),
            text,
            stamp: TurnStamp::now(),
        }),
        1 => ("[a-z ]{1,20}", any::<bool>()).prop_map(|(message, retryable)| {
            ChatEvent::ReplyFailed {
                reply_to: "u".to_string(),
                user_text: "question".to_string(),
                message,
                retryable,
            }
        }),
        1 => Just(ChatEvent::RetryReply),
    ]
}

fn arb_diagnosis_event() -> impl Strategy<Value = DiagnosisEvent> {
    prop_oneof![
        2 => arb_image().prop_map(|image| DiagnosisEvent::SelectImage { image }),
        2 => arb_plant_type().prop_map(|plant_type| DiagnosisEvent::SelectPlantType { plant_type }),
        3 => Just(DiagnosisEvent::Analyze),
        1 => Just(DiagnosisEvent::Reset),
        1 => (0u64..12).prop_map(|generation| DiagnosisEvent::MarkTreated {
            detection_id: format!("detection-{generation}"),
        }),
        1 => (0u64..12).prop_map(|generation| DiagnosisEvent::AnalysisComplete {
            generation,
            result: leaf_spot(),
            completed_at: Utc::now(),
        }),
        1 => (0u64..12, any::<bool>()).prop_map(|(generation, retryable)| {
            DiagnosisEvent::AnalysisFailed {
                generation,
                message: "service unavailable".to_string(),
                retryable,
            }
        }),
    ]
}

/// A step in a simulated session: either a user event or the scheduler
/// delivering the oldest outstanding analysis
#[derive(Debug, Clone)]
enum SimStep {
    User(DiagnosisEvent),
    Deliver { success: bool },
}

fn arb_sim_step() -> impl Strategy<Value = SimStep> {
    prop_oneof![
        3 => prop_oneof![
            arb_image().prop_map(|image| DiagnosisEvent::SelectImage { image }),
            arb_plant_type().prop_map(|plant_type| DiagnosisEvent::SelectPlantType { plant_type }),
            Just(DiagnosisEvent::Analyze),
            Just(DiagnosisEvent::Reset),
        ]
        .prop_map(SimStep::User),
        2 => any::<bool>().prop_map(|success| SimStep::Deliver { success }),
    ]
}

// ============================================================================
// Invariant Checks
// ============================================================================

fn is_valid_case(state: &DiagnosisState) -> bool {
    let fields_present = state.image.is_some() && state.plant_type.is_some();
    match &state.phase {
        CasePhase::Editing => true,
        CasePhase::Analyzing | CasePhase::Completed { .. } | CasePhase::Failed { .. } => {
            fields_present
        }
    }
}

fn result_only_when_completed(state: &DiagnosisState) -> bool {
    state.result().is_some() == (state.status() == CaseStatus::Completed)
}

fn count_schedules(effects: &[DiagnosisEffect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, DiagnosisEffect::ScheduleAnalysis { .. }))
        .count()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Transcript only ever grows, and by at most one turn per event
    #[test]
    fn prop_transcript_is_append_only(events in proptest::collection::vec(arb_chat_event(), 0..30)) {
        let ctx = test_context();
        let mut state = ChatState::new(Utc::now());

        for event in events {
            let before = state.transcript.clone();
            if let Ok(result) = chat_transition(&state, &ctx, event) {
                state = result.new_state;
                prop_assert!(state.transcript.len() <= before.len() + 1);
                prop_assert_eq!(&state.transcript[..before.len()], &before[..]);
            }
        }
        prop_assert_eq!(state.transcript[0].sender, Sender::Assistant);
    }

    // Blank input never touches the transcript or schedules a reply
    #[test]
    fn prop_blank_submit_is_noop(blank in "[ \t\n]{0,8}") {
        let state = ChatState::new(Utc::now());
        let result = chat_transition(
            &state,
            &test_context(),
            ChatEvent::Submit { text: blank, stamp: TurnStamp::now() },
        );
        prop_assert_eq!(result.unwrap_err(), TransitionError::InvalidInput);
    }

    // Every accepted submit schedules exactly one reply for that turn
    #[test]
    fn prop_submit_schedules_one_reply(text in "[a-zA-Z]{1,20}") {
        let state = ChatState::new(Utc::now());
        let result = chat_transition(
            &state,
            &test_context(),
            ChatEvent::Submit { text, stamp: TurnStamp::now() },
        ).unwrap();

        let scheduled: Vec<_> = result.effects.iter().filter_map(|e| match e {
            ChatEffect::ScheduleReply { reply_to, .. } => Some(reply_to.clone()),
            _ => None,
        }).collect();
        prop_assert_eq!(scheduled, vec![result.new_state.transcript[1].id.clone()]);
        prop_assert!(result.new_state.awaiting_reply());
    }

    // Every accepted question is answered, in flight, or waiting for retry
    #[test]
    fn prop_every_question_accounted_for(events in proptest::collection::vec(arb_chat_event(), 0..50)) {
        let ctx = test_context();
        let mut state = ChatState::new(Utc::now());

        for event in events {
            if let Ok(result) = chat_transition(&state, &ctx, event) {
                state = result.new_state;
            }
            let questions = state.transcript.iter().filter(|t| t.sender == Sender::User).count();
            let answers = state.transcript.iter().filter(|t| t.sender == Sender::Assistant).count() - 1;
            let outstanding = state.pending_replies as usize + state.failed_replies.len();
            prop_assert_eq!(questions, answers + outstanding);
        }
    }

    // Case invariants hold after any event sequence
    #[test]
    fn prop_case_invariants_hold(events in proptest::collection::vec(arb_diagnosis_event(), 0..40)) {
        let ctx = test_context();
        let mut state = DiagnosisState::default();

        for event in events {
            let before_generation = state.generation;
            if let Ok(result) = diagnosis_transition(&state, &ctx, event) {
                state = result.new_state;
                prop_assert!(is_valid_case(&state), "Invalid case: {:?}", state);
                prop_assert!(result_only_when_completed(&state));
                prop_assert!(state.generation >= before_generation);
                prop_assert!(count_schedules(&result.effects) <= 1);
                prop_assert!(state.recent.len() <= ctx.recent_limit);
            }
        }
    }

    // Analyzing twice in a row schedules once
    #[test]
    fn prop_double_analyze_schedules_once(image in arb_image(), plant_type in arb_plant_type()) {
        let ctx = test_context();
        let state = DiagnosisState {
            image: Some(image),
            plant_type: Some(plant_type),
            ..Default::default()
        };

        let first = diagnosis_transition(&state, &ctx, DiagnosisEvent::Analyze).unwrap();
        prop_assert_eq!(count_schedules(&first.effects), 1);

        let second = diagnosis_transition(&first.new_state, &ctx, DiagnosisEvent::Analyze);
        prop_assert_eq!(second.unwrap_err(), TransitionError::AnalysisInProgress);
    }

    // Completions for any generation other than the current one are rejected
    #[test]
    fn prop_stale_completion_rejected(offset in 1u64..10, plant_type in arb_plant_type()) {
        let ctx = test_context();
        let state = DiagnosisState {
            image: Some(test_image("image/png", 4)),
            plant_type: Some(plant_type),
            ..Default::default()
        };
        let analyzing = diagnosis_transition(&state, &ctx, DiagnosisEvent::Analyze)
            .unwrap()
            .new_state;

        let stale = DiagnosisEvent::AnalysisComplete {
            generation: analyzing.generation.wrapping_sub(offset),
            result: leaf_spot(),
            completed_at: Utc::now(),
        };
        let result = diagnosis_transition(&analyzing, &ctx, stale);
        let is_stale = matches!(result, Err(TransitionError::StaleCompletion { .. }));
        prop_assert!(is_stale);
    }

    // Reset always lands on an empty case and keeps the history
    #[test]
    fn prop_reset_always_empties(events in proptest::collection::vec(arb_diagnosis_event(), 0..20)) {
        let ctx = test_context();
        let mut state = DiagnosisState::default();
        for event in events {
            if let Ok(result) = diagnosis_transition(&state, &ctx, event) {
                state = result.new_state;
            }
        }

        let reset = diagnosis_transition(&state, &ctx, DiagnosisEvent::Reset).unwrap();
        prop_assert_eq!(reset.new_state.status(), CaseStatus::Empty);
        prop_assert_eq!(&reset.new_state.recent, &state.recent);
        prop_assert_eq!(
            reset.effects.contains(&DiagnosisEffect::CancelAnalysis),
            state.is_analyzing()
        );
    }

    // With a scheduler delivering every analysis eventually, only the
    // analysis for the current generation can ever produce a result
    #[test]
    fn prop_scheduler_only_applies_current(steps in proptest::collection::vec(arb_sim_step(), 0..40)) {
        let ctx = test_context();
        let mut state = DiagnosisState::default();
        let mut outstanding: Vec<u64> = Vec::new();

        for step in steps {
            match step {
                SimStep::User(event) => {
                    if let Ok(result) = diagnosis_transition(&state, &ctx, event) {
                        for effect in &result.effects {
                            if let DiagnosisEffect::ScheduleAnalysis { generation, .. } = effect {
                                outstanding.push(*generation);
                            }
                        }
                        state = result.new_state;
                    }
                }
                SimStep::Deliver { success } => {
                    if outstanding.is_empty() {
                        continue;
                    }
                    let generation = outstanding.remove(0);
                    let event = if success {
                        DiagnosisEvent::AnalysisComplete {
                            generation,
                            result: leaf_spot(),
                            completed_at: Utc::now(),
                        }
                    } else {
                        DiagnosisEvent::AnalysisFailed {
                            generation,
                            message: "offline".to_string(),
                            retryable: true,
                        }
                    };

                    let current = state.is_analyzing() && state.generation == generation;
                    let result = diagnosis_transition(&state, &ctx, event);
                    prop_assert_eq!(result.is_ok(), current);
                    if let Ok(result) = result {
                        state = result.new_state;
                        prop_assert!(matches!(
                            state.status(),
                            CaseStatus::Completed | CaseStatus::Failed
                        ));
                    }
                }
            }
        }
    }
}
