use super::*;

use serde_json::json;
use tokio::task::JoinHandle;

use stepflow_channel::{EventProducer, MemoryBroker, PartitionAssignment, Topics, partition_for};
use stepflow_protocols::{
    DefinitionStore, EventPublisher, InstanceStatus, InstanceStore, NewWorkflow, Payload,
    TaskEvent, WorkflowDefinition, WorkflowInstance,
};
use stepflow_store::MemoryStore;

use crate::testing::{FailingPublisher, GatedPublisher};

const GROUP: &str = "orchestrator-group";
const COMPLETIONS: &str = "task-completions";

struct Fixture {
    store: Arc<MemoryStore>,
    broker: MemoryBroker,
    publisher: Arc<FailingPublisher>,
    definition: WorkflowDefinition,
    cancel: CancellationToken,
}

impl Fixture {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let definition = store
            .register(NewWorkflow::new(
                "Audio pipeline",
                "audio_pipeline",
                ["extract_text", "generate_audio"],
            ))
            .await
            .unwrap();
        let broker = MemoryBroker::new(4);
        Self {
            store,
            publisher: Arc::new(FailingPublisher::new(broker.clone())),
            broker,
            definition,
            cancel: CancellationToken::new(),
        }
    }

    fn spawn(&self) -> JoinHandle<ConsumerStats> {
        self.spawn_with(self.publisher.clone())
    }

    fn spawn_with(&self, publisher: Arc<dyn EventPublisher>) -> JoinHandle<ConsumerStats> {
        let producer = EventProducer::new(publisher, Topics::default());
        let engine = ProgressionEngine::new(self.store.clone(), self.store.clone(), producer)
            .with_ledger(self.store.clone());
        let subscriber = self
            .broker
            .subscribe(COMPLETIONS, GROUP, PartitionAssignment::sole());
        let consumer = CompletionConsumer::new(
            Arc::new(engine),
            Box::new(subscriber),
            ConsumerConfig {
                redelivery_backoff: Duration::from_millis(10),
            },
        );
        tokio::spawn(consumer.run(self.cancel.clone()))
    }

    async fn start(&self, execution_id: &str) {
        self.store
            .create(WorkflowInstance::new(execution_id, &self.definition, json!({})))
            .await
            .unwrap();
    }

    async fn complete(&self, execution_id: &str, step: u8) {
        let task = TaskEvent::new(
            execution_id,
            self.definition.id,
            "extract_text",
            step,
            Payload::new(),
        );
        let event = CompletionEvent::success(&task, Payload::new());
        self.broker
            .publish(COMPLETIONS, execution_id, serde_json::to_vec(&event).unwrap())
            .await
            .unwrap();
    }

    fn committed(&self, key: &str) -> u64 {
        self.broker
            .committed(GROUP, COMPLETIONS, partition_for(key, 4))
    }

    async fn stop(&self, handle: JoinHandle<ConsumerStats>) -> ConsumerStats {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("consumer should stop")
            .unwrap()
    }
}

async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_processes_and_commits() {
    let f = Fixture::new().await;
    f.start("exec-1").await;
    let handle = f.spawn();

    f.complete("exec-1", 1).await;
    eventually(|| f.committed("exec-1") == 1).await;

    let stats = f.stop(handle).await;
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.redeliveries, 0);

    let instance = f.store.get("exec-1").await.unwrap();
    assert_eq!(instance.current_step, 1);
    assert_eq!(f.broker.records("task-queue").len(), 1);
}

#[tokio::test]
async fn test_unparseable_payload_is_skipped() {
    let f = Fixture::new().await;
    f.start("exec-1").await;
    let handle = f.spawn();

    f.broker
        .publish(COMPLETIONS, "exec-1", b"{not json".to_vec())
        .await
        .unwrap();
    f.complete("exec-1", 1).await;
    eventually(|| f.committed("exec-1") == 2).await;

    let stats = f.stop(handle).await;
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.processed, 1);
}

#[tokio::test]
async fn test_unknown_instance_is_acknowledged() {
    let f = Fixture::new().await;
    let handle = f.spawn();

    f.complete("ghost", 1).await;
    eventually(|| f.committed("ghost") == 1).await;

    let stats = f.stop(handle).await;
    assert_eq!(stats.acknowledged_errors, 1);
    assert_eq!(stats.processed, 0);
    assert!(f.broker.records("task-queue").is_empty());
}

#[tokio::test]
async fn test_transient_failure_is_redelivered() {
    let f = Fixture::new().await;
    f.start("exec-1").await;
    f.publisher.set_failing(true);
    let handle = f.spawn();

    f.complete("exec-1", 1).await;
    eventually(|| f.publisher.attempts() >= 2).await;
    assert_eq!(f.committed("exec-1"), 0);

    f.publisher.set_failing(false);
    eventually(|| f.committed("exec-1") == 1).await;

    let stats = f.stop(handle).await;
    assert!(stats.redeliveries >= 2);
    assert_eq!(stats.processed, 1);
    assert_eq!(f.broker.records("task-queue").len(), 1);
    assert_eq!(
        f.store.get("exec-1").await.unwrap().status,
        InstanceStatus::Running
    );
}

#[tokio::test]
async fn test_completes_workflow_across_events() {
    let f = Fixture::new().await;
    f.start("exec-1").await;
    let handle = f.spawn();

    f.complete("exec-1", 1).await;
    f.complete("exec-1", 2).await;
    eventually(|| f.committed("exec-1") == 2).await;
    f.stop(handle).await;

    let instance = f.store.get("exec-1").await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Completed);
    assert_eq!(instance.current_step, 2);
}

#[tokio::test]
async fn test_null_output_failure_fails_instance() {
    let f = Fixture::new().await;
    f.start("e1").await;
    let handle = f.spawn();

    f.complete("e1", 1).await;
    let raw = format!(
        r#"{{"execution_id":"e1","workflow_id":{},"task_type":"generate_audio","step":2,"status":"failed","output":null,"error":"tts error","timestamp":"2024-05-01T12:00:00Z"}}"#,
        f.definition.id
    );
    f.broker
        .publish(COMPLETIONS, "e1", raw.into_bytes())
        .await
        .unwrap();
    eventually(|| f.committed("e1") == 2).await;

    let stats = f.stop(handle).await;
    assert_eq!(stats.malformed, 0);
    assert_eq!(stats.processed, 2);

    let instance = f.store.get("e1").await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Failed);
    assert_eq!(instance.error.as_deref(), Some("tts error"));
    assert_eq!(f.broker.records("task-queue").len(), 1);
}

#[tokio::test]
async fn test_cancel_during_event_finishes_it() {
    let f = Fixture::new().await;
    f.start("exec-1").await;
    let gated = Arc::new(GatedPublisher::new(f.broker.clone()));
    let handle = f.spawn_with(gated.clone());

    f.complete("exec-1", 1).await;
    tokio::time::timeout(Duration::from_secs(2), gated.entered())
        .await
        .expect("publish should start");

    f.cancel.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());
    assert_eq!(f.committed("exec-1"), 0);

    gated.release();
    let stats = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("consumer should stop")
        .unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.redeliveries, 0);
    assert_eq!(f.committed("exec-1"), 1);

    let tasks = f.broker.records("task-queue");
    assert_eq!(tasks.len(), 1);
    let next: TaskEvent = serde_json::from_slice(&tasks[0].payload).unwrap();
    assert_eq!(next.execution_id, "exec-1");
    assert_eq!(next.step, 2);
    assert_eq!(next.task_type, "generate_audio");
    assert_eq!(f.store.get("exec-1").await.unwrap().current_step, 1);
}

#[tokio::test]
async fn test_cancel_stops_idle_consumer() {
    let f = Fixture::new().await;
    let handle = f.spawn();
    let stats = f.stop(handle).await;
    assert_eq!(stats, ConsumerStats::default());
}

#[test]
fn test_default_config() {
    assert_eq!(
        ConsumerConfig::default().redelivery_backoff,
        Duration::from_millis(500)
    );
}
