use serde_json::json;

use crate::core::harvest::HarvestPhase;
use crate::core::harvest::actions::HARVEST_ACTIONS;
use crate::core::harvest::machine::{
    Effect, MachineState, entry_plan, expected_response, harvesting_progress, on_response,
};

fn emitted_event(effects: &[Effect]) -> Option<&str> {
    effects.iter().find_map(|effect| match effect {
        Effect::EmitCommand { event, .. } => Some(event.as_str()),
        _ => None,
    })
}

fn awaited_event(effects: &[Effect]) -> Option<&str> {
    effects.iter().find_map(|effect| match effect {
        Effect::AwaitResponse { event } => Some(event.as_str()),
        _ => None,
    })
}

#[test]
fn calibrating_registers_its_callback_before_emitting() {
    let plan = entry_plan(MachineState::start(), &HARVEST_ACTIONS, 30);
    assert_eq!(plan[0], Effect::EnterPhase(HarvestPhase::Calibrating));

    let await_pos = plan
        .iter()
        .position(|e| matches!(e, Effect::AwaitResponse { .. }))
        .unwrap();
    let emit_pos = plan
        .iter()
        .position(|e| matches!(e, Effect::EmitCommand { .. }))
        .unwrap();
    assert!(await_pos < emit_pos, "callback must be in place before the command goes out");

    assert_eq!(awaited_event(&plan), Some("needle_servo:response"));
    let Some(Effect::EmitCommand { event, payload }) = plan.get(emit_pos) else {
        panic!("missing emit");
    };
    assert_eq!(event, "needle_servo:angle");
    assert_eq!(payload["angle"], json!(90));
}

#[test]
fn smoker_command_carries_the_configured_duration() {
    let plan = entry_plan(MachineState::at(HarvestPhase::StartingSmoker), &HARVEST_ACTIONS, 45);
    let emit = plan
        .iter()
        .find_map(|e| match e {
            Effect::EmitCommand { event, payload } => Some((event, payload)),
            _ => None,
        })
        .unwrap();
    assert_eq!(emit.0, "smoker:control");
    assert_eq!(emit.1["duration_secs"], json!(45));
    assert_eq!(awaited_event(&plan), Some("smoker:response"));
}

#[test]
fn analyzing_honeypots_is_local_only() {
    let state = MachineState::at(HarvestPhase::AnalyzingHoneypots);
    let plan = entry_plan(state, &HARVEST_ACTIONS, 30);
    assert!(emitted_event(&plan).is_none());
    assert!(awaited_event(&plan).is_none());
    assert!(expected_response(state, &HARVEST_ACTIONS).is_none());
}

#[test]
fn harvesting_walks_the_catalog_one_action_at_a_time() {
    let catalog = &HARVEST_ACTIONS;
    let mut state = MachineState::at(HarvestPhase::Harvesting);
    let mut emitted = Vec::new();
    let mut last_progress = 33u8;

    loop {
        let plan = entry_plan(state, catalog, 30);
        let entered = plan.iter().any(|e| matches!(e, Effect::EnterPhase(_)));
        assert_eq!(
            entered,
            state.action_index == 0,
            "only the first action re-enters the phase"
        );

        let event = emitted_event(&plan).expect("every action emits").to_string();
        assert_eq!(
            awaited_event(&plan).unwrap(),
            expected_response(state, catalog).unwrap(),
            "the registered callback matches the awaited event"
        );
        emitted.push(event);

        let (next, effects) = on_response(state, json!({ "success": true }), catalog);
        let progress = effects
            .iter()
            .find_map(|e| match e {
                Effect::SetProgress(p) => Some(*p),
                _ => None,
            })
            .expect("every completion advances progress");
        assert!(progress >= last_progress, "progress went backwards");
        assert!(progress <= 99);
        last_progress = progress;

        if next.phase == HarvestPhase::Cleanup {
            assert_eq!(progress, 99, "the final action lands on the ceiling");
            break;
        }
        assert_eq!(next.phase, HarvestPhase::Harvesting);
        assert_eq!(next.action_index, state.action_index + 1);
        state = next;
    }

    let expected: Vec<&str> = catalog.iter().map(|a| a.event).collect();
    assert_eq!(emitted, expected);
}

#[test]
fn harvesting_progress_follows_the_formula_and_caps_at_99() {
    let total = HARVEST_ACTIONS.len();
    assert_eq!(harvesting_progress(total, total), 99);
    assert_eq!(harvesting_progress(0, total), 33);
    let mut previous = 0;
    for completed in 0..=total {
        let progress = harvesting_progress(completed, total);
        assert!(progress >= previous);
        previous = progress;
    }
}

#[test]
fn cleanup_returns_the_needle_home() {
    let state = MachineState::at(HarvestPhase::Cleanup);
    let plan = entry_plan(state, &HARVEST_ACTIONS, 30);
    let emit = plan
        .iter()
        .find_map(|e| match e {
            Effect::EmitCommand { event, payload } => Some((event, payload)),
            _ => None,
        })
        .unwrap();
    assert_eq!(emit.0, "needle_servo:angle");
    assert_eq!(emit.1["angle"], json!(-90));

    let (next, effects) = on_response(state, json!({ "success": true }), &HARVEST_ACTIONS);
    assert_eq!(next.phase, HarvestPhase::Completed);
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::RecordResponse { phase: HarvestPhase::Cleanup, .. })));
}

#[test]
fn completed_releases_the_gateway_and_submits_the_yield() {
    let plan = entry_plan(MachineState::at(HarvestPhase::Completed), &HARVEST_ACTIONS, 30);
    assert_eq!(
        plan,
        vec![
            Effect::EnterPhase(HarvestPhase::Completed),
            Effect::ReleaseGateway,
            Effect::SubmitYieldMetric,
        ]
    );
}
