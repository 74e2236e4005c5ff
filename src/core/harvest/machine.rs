//! Pure transition layer of the harvest state machine. Given a machine
//! position and a device response it computes the next position and the
//! effects to perform; no I/O happens here, which keeps the whole phase
//! walk testable without any device.

use serde_json::{Value, json};

use super::actions::HarvestAction;
use super::types::HarvestPhase;

/// Machine position: the current phase plus the harvesting action
/// cursor. The cursor lives here, not in a captured closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineState {
    pub phase: HarvestPhase,
    pub action_index: usize,
}

impl MachineState {
    pub fn start() -> Self {
        Self::at(HarvestPhase::Calibrating)
    }

    pub fn at(phase: HarvestPhase) -> Self {
        Self {
            phase,
            action_index: 0,
        }
    }
}

/// Side effects requested by the transition layer, executed in order by
/// the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write the phase-entry record: phase name plus its floor progress.
    EnterPhase(HarvestPhase),
    /// Advance progress from the phase floor to its ceiling: ramped one
    /// unit per tick in simulated mode, a single jump when a real device
    /// round-trip accounts for the elapsed time.
    AdvanceProgress { floor: u8, ceiling: u8 },
    /// Absolute progress write, monotonic within the phase.
    SetProgress(u8),
    /// Store the device payload as the completed phase's response.
    RecordResponse { phase: HarvestPhase, payload: Value },
    /// Swap the single in-flight callback registration over to `event`.
    AwaitResponse { event: String },
    /// Send a command to the device.
    EmitCommand { event: String, payload: Value },
    /// Release the device session.
    ReleaseGateway,
    /// Hand the synthesized yield to the metrics collaborator.
    SubmitYieldMetric,
}

/// Everything the engine must do on entering `state`. The await/emit
/// pairing keeps exactly one callback registered per job; re-entering
/// the harvesting phase for a later action does not reset its floor.
pub fn entry_plan(
    state: MachineState,
    catalog: &[HarvestAction],
    smoker_duration_secs: u64,
) -> Vec<Effect> {
    let (floor, ceiling) = state.phase.progress_range();
    match state.phase {
        HarvestPhase::Calibrating => vec![
            Effect::EnterPhase(state.phase),
            Effect::AdvanceProgress { floor, ceiling },
            Effect::AwaitResponse {
                event: "needle_servo:response".to_string(),
            },
            Effect::EmitCommand {
                event: "needle_servo:angle".to_string(),
                payload: json!({ "angle": 90, "state": "calibrating" }),
            },
        ],
        HarvestPhase::StartingSmoker => vec![
            Effect::EnterPhase(state.phase),
            Effect::AdvanceProgress { floor, ceiling },
            Effect::AwaitResponse {
                event: "smoker:response".to_string(),
            },
            Effect::EmitCommand {
                event: "smoker:control".to_string(),
                payload: json!({
                    "on": true,
                    "duration_secs": smoker_duration_secs,
                    "state": "starting_smoker",
                }),
            },
        ],
        HarvestPhase::CapturingImages => vec![
            Effect::EnterPhase(state.phase),
            Effect::AdvanceProgress { floor, ceiling },
            Effect::AwaitResponse {
                event: "camera:response".to_string(),
            },
            Effect::EmitCommand {
                event: "camera:capture".to_string(),
                payload: json!({ "state": "capturing_images" }),
            },
        ],
        // Local processing only: no device emission, no awaited event.
        HarvestPhase::AnalyzingHoneypots => vec![
            Effect::EnterPhase(state.phase),
            Effect::AdvanceProgress { floor, ceiling },
        ],
        HarvestPhase::Harvesting => {
            let mut effects = Vec::new();
            if state.action_index == 0 {
                effects.push(Effect::EnterPhase(state.phase));
            }
            if let Some(action) = catalog.get(state.action_index) {
                effects.push(Effect::AwaitResponse {
                    event: action.response_event(),
                });
                effects.push(Effect::EmitCommand {
                    event: action.event.to_string(),
                    payload: action.payload.clone(),
                });
            }
            effects
        }
        HarvestPhase::Cleanup => vec![
            Effect::EnterPhase(state.phase),
            Effect::AwaitResponse {
                event: "needle_servo:response".to_string(),
            },
            Effect::EmitCommand {
                event: "needle_servo:angle".to_string(),
                payload: json!({ "angle": -90, "state": "cleanup" }),
            },
        ],
        HarvestPhase::Completed => vec![
            Effect::EnterPhase(state.phase),
            Effect::ReleaseGateway,
            Effect::SubmitYieldMetric,
        ],
        HarvestPhase::Failed => Vec::new(),
    }
}

/// Response event the machine is waiting on at `state`, if any.
pub fn expected_response(state: MachineState, catalog: &[HarvestAction]) -> Option<String> {
    match state.phase {
        HarvestPhase::Calibrating | HarvestPhase::Cleanup => {
            Some("needle_servo:response".to_string())
        }
        HarvestPhase::StartingSmoker => Some("smoker:response".to_string()),
        HarvestPhase::CapturingImages => Some("camera:response".to_string()),
        HarvestPhase::Harvesting => catalog
            .get(state.action_index)
            .map(|action| action.response_event()),
        HarvestPhase::AnalyzingHoneypots | HarvestPhase::Completed | HarvestPhase::Failed => None,
    }
}

/// Applies the awaited response: next machine position plus effects.
pub fn on_response(
    state: MachineState,
    payload: Value,
    catalog: &[HarvestAction],
) -> (MachineState, Vec<Effect>) {
    match state.phase {
        HarvestPhase::Calibrating => (
            MachineState::at(HarvestPhase::StartingSmoker),
            vec![Effect::RecordResponse {
                phase: state.phase,
                payload,
            }],
        ),
        HarvestPhase::StartingSmoker => (
            MachineState::at(HarvestPhase::CapturingImages),
            vec![Effect::RecordResponse {
                phase: state.phase,
                payload,
            }],
        ),
        HarvestPhase::CapturingImages => (
            MachineState::at(HarvestPhase::AnalyzingHoneypots),
            vec![Effect::RecordResponse {
                phase: state.phase,
                payload,
            }],
        ),
        HarvestPhase::AnalyzingHoneypots => (MachineState::at(HarvestPhase::Harvesting), Vec::new()),
        HarvestPhase::Harvesting => {
            let completed = state.action_index + 1;
            let effects = vec![
                Effect::SetProgress(harvesting_progress(completed, catalog.len())),
                Effect::RecordResponse {
                    phase: state.phase,
                    payload,
                },
            ];
            if completed < catalog.len() {
                (
                    MachineState {
                        phase: HarvestPhase::Harvesting,
                        action_index: completed,
                    },
                    effects,
                )
            } else {
                (MachineState::at(HarvestPhase::Cleanup), effects)
            }
        }
        HarvestPhase::Cleanup => (
            MachineState::at(HarvestPhase::Completed),
            vec![Effect::RecordResponse {
                phase: state.phase,
                payload,
            }],
        ),
        HarvestPhase::Completed | HarvestPhase::Failed => (state, Vec::new()),
    }
}

/// Phase to enter when a phase with no device round-trip finishes its
/// local work.
pub fn advance_local(state: MachineState) -> MachineState {
    match state.phase {
        HarvestPhase::AnalyzingHoneypots => MachineState::at(HarvestPhase::Harvesting),
        _ => state,
    }
}

/// `floor + completed/total · (ceiling − floor)`, capped at 99.
pub fn harvesting_progress(completed: usize, total: usize) -> u8 {
    let (floor, ceiling) = HarvestPhase::Harvesting.progress_range();
    if total == 0 {
        return ceiling;
    }
    let span = f64::from(ceiling - floor);
    let progress = f64::from(floor) + (completed as f64 / total as f64) * span;
    (progress.floor() as u8).min(99)
}
