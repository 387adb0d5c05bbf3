//! Database schema management.

use rusqlite::Connection;
use tokio_rusqlite::Error;

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Workflow definitions
CREATE TABLE IF NOT EXISTS workflows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    trigger_name TEXT NOT NULL UNIQUE,
    total_steps INTEGER NOT NULL,
    step_task_types TEXT NOT NULL,
    handler_url TEXT,
    message TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One row per execution
CREATE TABLE IF NOT EXISTS workflow_instances (
    execution_id TEXT PRIMARY KEY,
    workflow_id INTEGER NOT NULL,
    trigger_name TEXT NOT NULL,
    total_steps INTEGER NOT NULL,
    current_step INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    variables TEXT NOT NULL DEFAULT '{}',
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Step ledger
CREATE TABLE IF NOT EXISTS instance_steps (
    execution_id TEXT NOT NULL,
    step INTEGER NOT NULL,
    status TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (execution_id, step),
    FOREIGN KEY (execution_id) REFERENCES workflow_instances(execution_id) ON DELETE CASCADE
);

-- Completions whose effects were fully applied
CREATE TABLE IF NOT EXISTS processed_completions (
    execution_id TEXT NOT NULL,
    step INTEGER NOT NULL,
    processed_at TEXT NOT NULL,
    PRIMARY KEY (execution_id, step)
);

CREATE INDEX IF NOT EXISTS idx_instances_workflow ON workflow_instances(workflow_id);
CREATE INDEX IF NOT EXISTS idx_instances_status ON workflow_instances(status);
"#;
