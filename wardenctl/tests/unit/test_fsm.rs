//! Pipeline FSM tests

use wardenctl::deploy::fsm::{PipelineEvent, PipelineFsm, PipelineStatus};
use wardenctl::models::step::StepName;

#[test]
fn test_fsm_initial_state() {
    let fsm = PipelineFsm::new();
    assert_eq!(fsm.state(), PipelineStatus::Pending);
    assert!(fsm.error().is_none());
    assert!(!fsm.is_terminal());
}

#[test]
fn test_fsm_failure_in_edge_step() {
    let mut fsm = PipelineFsm::new();
    fsm.process(PipelineEvent::Begin).unwrap();
    for _ in 0..4 {
        fsm.process(PipelineEvent::StepSucceeded).unwrap();
    }
    assert_eq!(fsm.state(), PipelineStatus::Running(StepName::ConfigureEdge));

    fsm.process(PipelineEvent::StepFailed("certbot: rate limited".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), PipelineStatus::Failed(StepName::ConfigureEdge));

    // No step runs after a failure
    assert!(fsm.process(PipelineEvent::StepSucceeded).is_err());
    fsm.process(PipelineEvent::RollbackDone).unwrap();
    assert_eq!(fsm.state(), PipelineStatus::RolledBack(StepName::ConfigureEdge));
}

#[test]
fn test_fsm_terminal_states_reject_events() {
    let mut fsm = PipelineFsm::new();
    fsm.process(PipelineEvent::Begin).unwrap();
    while matches!(fsm.state(), PipelineStatus::Running(_)) {
        fsm.process(PipelineEvent::StepSucceeded).unwrap();
    }
    assert!(fsm.process(PipelineEvent::Begin).is_err());
    assert!(fsm.process(PipelineEvent::RollbackDone).is_err());
    assert_eq!(fsm.state(), PipelineStatus::Succeeded);
}
