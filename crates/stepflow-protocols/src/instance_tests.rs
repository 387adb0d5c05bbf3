use super::*;
use crate::workflow::NewWorkflow;

fn definition(steps: usize) -> WorkflowDefinition {
    let types: Vec<String> = (1..=steps).map(|i| format!("task_{i}")).collect();
    NewWorkflow::new("wf", "wf", types)
        .into_definition(1, Utc::now())
        .unwrap()
}

fn instance(steps: usize) -> WorkflowInstance {
    WorkflowInstance::new("exec-1", &definition(steps), serde_json::json!({"text": "hi"}))
}

#[test]
fn test_new_instance_is_pending() {
    let inst = instance(3);
    assert_eq!(inst.status, InstanceStatus::Pending);
    assert_eq!(inst.current_step, 0);
    assert_eq!(inst.total_steps, 3);
    assert_eq!(inst.trigger, "wf");
    assert!(inst.error.is_none());
}

#[test]
fn test_status_machine_edges() {
    use InstanceStatus::*;
    assert!(Pending.can_transition_to(Running));
    assert!(Pending.can_transition_to(Failed));
    assert!(Running.can_transition_to(Completed));
    assert!(Running.can_transition_to(Failed));
    assert!(!Running.can_transition_to(Pending));
    for terminal in InstanceStatus::TERMINAL {
        for next in [Pending, Running, Completed, Failed] {
            assert!(!terminal.can_transition_to(next));
        }
    }
}

#[test]
fn test_record_step_promotes_pending() {
    let mut inst = instance(3);
    assert!(inst.record_step(1, Utc::now()));
    assert_eq!(inst.current_step, 1);
    assert_eq!(inst.status, InstanceStatus::Running);
}

#[test]
fn test_record_step_never_regresses() {
    let mut inst = instance(3);
    inst.record_step(2, Utc::now());
    inst.record_step(1, Utc::now());
    assert_eq!(inst.current_step, 2);
}

#[test]
fn test_record_step_is_bounded_by_total() {
    let mut inst = instance(3);
    inst.record_step(9, Utc::now());
    assert_eq!(inst.current_step, 3);
}

#[test]
fn test_record_step_ignored_when_terminal() {
    let mut inst = instance(3);
    inst.transition(InstanceStatus::Completed, None, Utc::now()).unwrap();
    assert!(!inst.record_step(2, Utc::now()));
    assert_eq!(inst.current_step, 0);
}

#[test]
fn test_transition_keeps_failure_reason() {
    let mut inst = instance(3);
    inst.record_step(2, Utc::now());
    assert!(inst.transition(InstanceStatus::Failed, Some("tts error"), Utc::now()).unwrap());
    assert_eq!(inst.status, InstanceStatus::Failed);
    assert_eq!(inst.error.as_deref(), Some("tts error"));
}

#[test]
fn test_transition_to_same_status_is_noop() {
    let mut inst = instance(3);
    inst.transition(InstanceStatus::Completed, None, Utc::now()).unwrap();
    assert!(!inst.transition(InstanceStatus::Completed, None, Utc::now()).unwrap());
}

#[test]
fn test_transition_out_of_terminal_rejected() {
    let mut inst = instance(3);
    inst.transition(InstanceStatus::Failed, Some("boom"), Utc::now()).unwrap();
    let err = inst
        .transition(InstanceStatus::Running, None, Utc::now())
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
    assert_eq!(inst.status, InstanceStatus::Failed);
}

#[test]
fn test_status_string_forms() {
    assert_eq!(InstanceStatus::Running.to_string(), "RUNNING");
    assert_eq!("FAILED".parse::<InstanceStatus>().unwrap(), InstanceStatus::Failed);
    assert!("running".parse::<InstanceStatus>().is_err());
    assert_eq!("COMPLETED".parse::<StepStatus>().unwrap(), StepStatus::Completed);
    assert_eq!(
        serde_json::to_value(InstanceStatus::Pending).unwrap(),
        serde_json::json!("PENDING")
    );
}
