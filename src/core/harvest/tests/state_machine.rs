use crate::core::harvest::{HarvestPhase, can_transition};

#[test]
fn success_path_transitions_are_allowed() {
    let path = [
        (HarvestPhase::Calibrating, HarvestPhase::StartingSmoker),
        (HarvestPhase::StartingSmoker, HarvestPhase::CapturingImages),
        (HarvestPhase::CapturingImages, HarvestPhase::AnalyzingHoneypots),
        (HarvestPhase::AnalyzingHoneypots, HarvestPhase::Harvesting),
        (HarvestPhase::Harvesting, HarvestPhase::Cleanup),
        (HarvestPhase::Cleanup, HarvestPhase::Completed),
    ];
    for (from, to) in path {
        assert!(
            can_transition(from, to),
            "expected transition {:?} -> {:?} to be allowed",
            from,
            to
        );
    }
}

#[test]
fn phases_cannot_be_skipped() {
    assert!(!can_transition(
        HarvestPhase::Calibrating,
        HarvestPhase::CapturingImages
    ));
    assert!(!can_transition(
        HarvestPhase::StartingSmoker,
        HarvestPhase::Harvesting
    ));
    assert!(!can_transition(
        HarvestPhase::Harvesting,
        HarvestPhase::Completed
    ));
}

#[test]
fn phases_cannot_be_revisited() {
    assert!(!can_transition(
        HarvestPhase::Harvesting,
        HarvestPhase::Calibrating
    ));
    assert!(!can_transition(
        HarvestPhase::Cleanup,
        HarvestPhase::Harvesting
    ));
}

#[test]
fn failed_is_reachable_from_every_active_phase() {
    let active = [
        HarvestPhase::Calibrating,
        HarvestPhase::StartingSmoker,
        HarvestPhase::CapturingImages,
        HarvestPhase::AnalyzingHoneypots,
        HarvestPhase::Harvesting,
        HarvestPhase::Cleanup,
    ];
    for from in active {
        assert!(
            can_transition(from, HarvestPhase::Failed),
            "expected failure from {:?}",
            from
        );
    }
}

#[test]
fn phase_names_roundtrip_through_their_wire_form() {
    let phases = [
        HarvestPhase::Calibrating,
        HarvestPhase::StartingSmoker,
        HarvestPhase::CapturingImages,
        HarvestPhase::AnalyzingHoneypots,
        HarvestPhase::Harvesting,
        HarvestPhase::Cleanup,
        HarvestPhase::Completed,
        HarvestPhase::Failed,
    ];
    for phase in phases {
        assert_eq!(HarvestPhase::from_status(phase.as_str()), Some(phase));
    }
    assert_eq!(HarvestPhase::from_status("swarming"), None);
}

#[test]
fn terminal_phases_never_transition_away() {
    for to in [
        HarvestPhase::Calibrating,
        HarvestPhase::Harvesting,
        HarvestPhase::Failed,
    ] {
        assert!(!can_transition(HarvestPhase::Completed, to));
    }
    assert!(!can_transition(HarvestPhase::Failed, HarvestPhase::Completed));
}
