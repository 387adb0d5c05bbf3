use super::*;

async fn new_store() -> SqliteStore {
    SqliteStore::in_memory().await.unwrap()
}

store_contract_tests!(new_store());

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stepflow.db");

    {
        let store = SqliteStore::open(&path).await.unwrap();
        let definition = store
            .register(NewWorkflow::new("audio", "generate_audio", ["a", "b"]))
            .await
            .unwrap();
        InstanceStore::create(
            &store,
            WorkflowInstance::new("exec-1", &definition, serde_json::json!({"k": 1})),
        )
        .await
        .unwrap();
        store.update_step("exec-1", 1, StepStatus::Completed).await.unwrap();
        store.mark_processed("exec-1", 1).await.unwrap();
    }

    let store = SqliteStore::open(&path).await.unwrap();
    let instance = store.get("exec-1").await.unwrap();
    assert_eq!(instance.current_step, 1);
    assert_eq!(instance.status, InstanceStatus::Running);
    assert_eq!(instance.variables, serde_json::json!({"k": 1}));
    assert!(store.is_processed("exec-1", 1).await.unwrap());
    assert_eq!(
        store.get_by_trigger("generate_audio").await.unwrap().step_task_types,
        vec!["a", "b"]
    );
}

#[tokio::test]
async fn test_definition_optional_fields_roundtrip() {
    let store = new_store().await;
    store
        .register(
            NewWorkflow::new("audio", "generate_audio", ["a"])
                .with_handler_url("http://worker:9000/tasks")
                .with_message("Audio generation started"),
        )
        .await
        .unwrap();
    let found = store.get_by_trigger("generate_audio").await.unwrap();
    assert_eq!(found.handler_url.as_deref(), Some("http://worker:9000/tasks"));
    assert_eq!(found.message.as_deref(), Some("Audio generation started"));
}

#[tokio::test]
async fn test_timestamps_roundtrip_as_rfc3339() {
    let store = new_store().await;
    let definition = store.register(NewWorkflow::new("wf", "wf", ["a"])).await.unwrap();
    let instance = WorkflowInstance::new("exec-1", &definition, serde_json::Value::Null);
    InstanceStore::create(&store, instance.clone()).await.unwrap();

    let loaded = store.get("exec-1").await.unwrap();
    assert_eq!(loaded.created_at.timestamp(), instance.created_at.timestamp());
    assert!(loaded.updated_at >= loaded.created_at);
}

async fn seed_file(path: &Path) {
    let store = SqliteStore::open(path).await.unwrap();
    let definition = store
        .register(NewWorkflow::new("audio", "generate_audio", ["a", "b"]))
        .await
        .unwrap();
    InstanceStore::create(
        &store,
        WorkflowInstance::new("exec-1", &definition, serde_json::json!({})),
    )
    .await
    .unwrap();
}

fn tamper(path: &Path, sql: &str) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute(sql, []).unwrap();
}

#[tokio::test]
async fn test_unknown_status_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stepflow.db");
    seed_file(&path).await;
    tamper(
        &path,
        "UPDATE workflow_instances SET status = 'BOGUS' WHERE execution_id = 'exec-1'",
    );

    let store = SqliteStore::open(&path).await.unwrap();
    let err = store.get("exec-1").await.unwrap_err();
    assert!(err.is_corrupt(), "unexpected error: {err}");
    let err = store
        .update_step("exec-1", 1, StepStatus::Completed)
        .await
        .unwrap_err();
    assert!(err.is_corrupt(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_unreadable_variables_are_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stepflow.db");
    seed_file(&path).await;
    tamper(
        &path,
        "UPDATE workflow_instances SET variables = '{not json' WHERE execution_id = 'exec-1'",
    );

    let store = SqliteStore::open(&path).await.unwrap();
    let err = store.get("exec-1").await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
    // Other rows stay readable.
    assert!(store.get_by_trigger("generate_audio").await.is_ok());
    assert!(store.get("exec-2").await.unwrap_err().is_not_found());
}
