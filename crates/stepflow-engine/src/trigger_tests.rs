use super::*;

use serde_json::json;

use stepflow_channel::{MemoryBroker, Topics};
use stepflow_protocols::{DefinitionStatus, DefinitionStore, NewWorkflow, StepStatus};
use stepflow_store::MemoryStore;

use crate::progression::ProgressionEngine;
use crate::testing::FailingPublisher;

struct Fixture {
    store: Arc<MemoryStore>,
    broker: MemoryBroker,
    publisher: Arc<FailingPublisher>,
    service: TriggerService,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    store
        .register(
            NewWorkflow::new("Audio pipeline", "audio_pipeline", ["extract_text", "generate_audio"])
                .with_message("Audio generation started"),
        )
        .await
        .unwrap();
    store
        .register(NewWorkflow::new("Report", "build_report", ["collect"]))
        .await
        .unwrap();
    let broker = MemoryBroker::new(4);
    let publisher = Arc::new(FailingPublisher::new(broker.clone()));
    let service = TriggerService::new(
        store.clone(),
        store.clone(),
        EventProducer::new(publisher.clone(), Topics::default()),
    );
    Fixture {
        store,
        broker,
        publisher,
        service,
    }
}

fn input() -> Payload {
    let mut input = Payload::new();
    input.insert("document".to_string(), json!("s3://bucket/doc.pdf"));
    input
}

fn dispatched(broker: &MemoryBroker) -> Vec<TaskEvent> {
    broker
        .records("task-queue")
        .iter()
        .map(|d| serde_json::from_slice(&d.payload).unwrap())
        .collect()
}

#[tokio::test]
async fn test_trigger_starts_instance_and_dispatches_first_step() {
    let f = fixture().await;
    let receipt = f.service.trigger("audio_pipeline", input()).await.unwrap();

    assert!(Uuid::parse_str(&receipt.execution_id).is_ok());
    assert_eq!(receipt.workflow, "Audio pipeline");
    assert_eq!(receipt.status, InstanceStatus::Running);
    assert_eq!(receipt.message, "Audio generation started");

    let instance = f.store.get(&receipt.execution_id).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Running);
    assert_eq!(instance.current_step, 0);
    assert_eq!(instance.total_steps, 2);
    assert_eq!(instance.trigger, "audio_pipeline");
    assert_eq!(instance.variables, json!({"document": "s3://bucket/doc.pdf"}));

    let tasks = dispatched(&f.broker);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].execution_id, receipt.execution_id);
    assert_eq!(tasks[0].step, 1);
    assert_eq!(tasks[0].task_type, "extract_text");
    assert_eq!(tasks[0].input, input());
}

#[tokio::test]
async fn test_default_message() {
    let f = fixture().await;
    let receipt = f.service.trigger("build_report", Payload::new()).await.unwrap();
    assert_eq!(receipt.message, "Workflow started");
}

#[tokio::test]
async fn test_unknown_trigger() {
    let f = fixture().await;
    let err = f.service.trigger("nope", Payload::new()).await.unwrap_err();
    assert!(matches!(err, TriggerError::WorkflowNotFound(ref t) if t == "nope"));
    assert!(dispatched(&f.broker).is_empty());
}

#[tokio::test]
async fn test_inactive_workflow_rejected() {
    let f = fixture().await;
    f.store
        .set_status("audio_pipeline", DefinitionStatus::Inactive)
        .await
        .unwrap();

    let err = f.service.trigger("audio_pipeline", input()).await.unwrap_err();
    assert!(matches!(err, TriggerError::Inactive(_)));
    assert!(dispatched(&f.broker).is_empty());
}

#[tokio::test]
async fn test_duplicate_execution_id() {
    let f = fixture().await;
    f.service
        .trigger_with_id("exec-1", "audio_pipeline", input())
        .await
        .unwrap();
    let err = f
        .service
        .trigger_with_id("exec-1", "audio_pipeline", input())
        .await
        .unwrap_err();
    assert!(matches!(err, TriggerError::DuplicateExecution(ref id) if id == "exec-1"));
    assert_eq!(dispatched(&f.broker).len(), 1);
}

#[tokio::test]
async fn test_empty_execution_id() {
    let f = fixture().await;
    let err = f
        .service
        .trigger_with_id("", "audio_pipeline", input())
        .await
        .unwrap_err();
    assert!(matches!(err, TriggerError::InvalidInput(_)));
}

#[tokio::test]
async fn test_dispatch_failure_leaves_instance_pending() {
    let f = fixture().await;
    f.publisher.set_failing(true);

    let err = f
        .service
        .trigger_with_id("exec-1", "audio_pipeline", input())
        .await
        .unwrap_err();
    assert!(matches!(err, TriggerError::Dispatch(_)));

    let instance = f.store.get("exec-1").await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Pending);
}

#[tokio::test]
async fn test_status_includes_step_ledger() {
    let f = fixture().await;
    let receipt = f.service.trigger("audio_pipeline", input()).await.unwrap();

    let engine = ProgressionEngine::new(
        f.store.clone(),
        f.store.clone(),
        EventProducer::new(f.publisher.clone(), Topics::default()),
    );
    let task = dispatched(&f.broker).remove(0);
    engine
        .process_completion(&stepflow_protocols::CompletionEvent::success(&task, Payload::new()))
        .await
        .unwrap();

    let status = f.service.status(&receipt.execution_id).await.unwrap();
    assert_eq!(status.instance.current_step, 1);
    assert_eq!(status.steps.len(), 1);
    assert_eq!(status.steps[0].step, 1);
    assert_eq!(status.steps[0].status, StepStatus::Completed);

    let body = serde_json::to_value(&status).unwrap();
    assert_eq!(body["execution_id"], json!(receipt.execution_id));
    assert_eq!(body["status"], json!("RUNNING"));
    assert!(body["steps"].is_array());
}

#[tokio::test]
async fn test_status_unknown_execution() {
    let f = fixture().await;
    let err = f.service.status("missing").await.unwrap_err();
    assert!(matches!(err, TriggerError::ExecutionNotFound(_)));
}
