//! SQLite store implementation.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;
use tracing::debug;

use stepflow_protocols::{
    CompletionLedger, DefinitionLookup, DefinitionStatus, DefinitionStore, InstanceStatus,
    InstanceStore, NewWorkflow, StepRecord, StepStatus, StoreError, WorkflowDefinition,
    WorkflowInstance,
};

use crate::schema::init_schema;

const INSTANCE_COLUMNS: &str = "execution_id, workflow_id, trigger_name, total_steps, \
     current_step, status, variables, error, created_at, updated_at";

const DEFINITION_COLUMNS: &str = "id, name, trigger_name, total_steps, step_task_types, \
     handler_url, message, status, created_at, updated_at";

/// SQLite-backed implementation of every store protocol.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;
        Self::init(conn).await
    }

    /// Open (or create) a file-backed database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening SQLite store at {}", path.display());
        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| Ok(init_schema(conn)?))
            .await
            .map_err(query_error)?;
        Ok(Self { conn })
    }
}

fn query_error(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(ref inner) if is_decode_error(inner) => {
            StoreError::Corrupt(e.to_string())
        }
        _ => StoreError::QueryError(e.to_string()),
    }
}

/// A row was read but one of its columns does not hold a valid value.
fn is_decode_error(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::Utf8Error(..)
    )
}

fn instance_not_found(execution_id: &str) -> StoreError {
    StoreError::NotFound(format!("instance {}", execution_id))
}

fn definition_not_found(trigger: &str) -> StoreError {
    StoreError::NotFound(format!("workflow with trigger {}", trigger))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value: String = row.get(idx)?;
    value.parse().map_err(|e| conversion_error(idx, e))
}

fn instance_from_row(row: &Row<'_>) -> rusqlite::Result<WorkflowInstance> {
    let workflow_id: i64 = row.get(1)?;
    let variables: String = row.get(6)?;
    Ok(WorkflowInstance {
        execution_id: row.get(0)?,
        workflow_id: workflow_id as u64,
        trigger: row.get(2)?,
        total_steps: row.get(3)?,
        current_step: row.get(4)?,
        status: parse_enum(row, 5)?,
        variables: serde_json::from_str(&variables).map_err(|e| conversion_error(6, e))?,
        error: row.get(7)?,
        created_at: parse_time(row, 8)?,
        updated_at: parse_time(row, 9)?,
    })
}

fn definition_from_row(row: &Row<'_>) -> rusqlite::Result<WorkflowDefinition> {
    let id: i64 = row.get(0)?;
    let step_task_types: String = row.get(4)?;
    Ok(WorkflowDefinition {
        id: id as u64,
        name: row.get(1)?,
        trigger: row.get(2)?,
        total_steps: row.get(3)?,
        step_task_types: serde_json::from_str(&step_task_types)
            .map_err(|e| conversion_error(4, e))?,
        handler_url: row.get(5)?,
        message: row.get(6)?,
        status: parse_enum(row, 7)?,
        created_at: parse_time(row, 8)?,
        updated_at: parse_time(row, 9)?,
    })
}

fn load_instance(
    conn: &rusqlite::Connection,
    execution_id: &str,
) -> rusqlite::Result<Option<WorkflowInstance>> {
    conn.query_row(
        &format!("SELECT {INSTANCE_COLUMNS} FROM workflow_instances WHERE execution_id = ?1"),
        [execution_id],
        instance_from_row,
    )
    .optional()
}

fn load_definition(
    conn: &rusqlite::Connection,
    trigger: &str,
) -> rusqlite::Result<Option<WorkflowDefinition>> {
    conn.query_row(
        &format!("SELECT {DEFINITION_COLUMNS} FROM workflows WHERE trigger_name = ?1"),
        [trigger],
        definition_from_row,
    )
    .optional()
}

enum StatusUpdate {
    Missing,
    Rejected(InstanceStatus),
    Applied(WorkflowInstance),
}

#[async_trait]
impl InstanceStore for SqliteStore {
    async fn create(&self, instance: WorkflowInstance) -> Result<(), StoreError> {
        let execution_id = instance.execution_id.clone();
        let variables = serde_json::to_string(&instance.variables)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    &format!(
                        "INSERT INTO workflow_instances ({INSTANCE_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                    ),
                    params![
                        instance.execution_id,
                        instance.workflow_id as i64,
                        instance.trigger,
                        instance.total_steps,
                        instance.current_step,
                        instance.status.as_str(),
                        variables,
                        instance.error,
                        instance.created_at.to_rfc3339(),
                        instance.updated_at.to_rfc3339(),
                    ],
                );
                match result {
                    Ok(_) => Ok(true),
                    Err(e) if is_constraint_violation(&e) => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(query_error)?;

        if !inserted {
            return Err(StoreError::Conflict(format!("instance {}", execution_id)));
        }
        Ok(())
    }

    async fn get(&self, execution_id: &str) -> Result<WorkflowInstance, StoreError> {
        let id = execution_id.to_string();
        self.conn
            .call(move |conn| Ok(load_instance(conn, &id)?))
            .await
            .map_err(query_error)?
            .ok_or_else(|| instance_not_found(execution_id))
    }

    async fn update_step(
        &self,
        execution_id: &str,
        step: u8,
        status: StepStatus,
    ) -> Result<WorkflowInstance, StoreError> {
        let id = execution_id.to_string();
        let now = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE workflow_instances
                     SET current_step = MAX(current_step, MIN(?2, total_steps)),
                         status = CASE status WHEN 'PENDING' THEN 'RUNNING' ELSE status END,
                         updated_at = ?3
                     WHERE execution_id = ?1 AND status NOT IN ('COMPLETED', 'FAILED')",
                    params![id, step, now],
                )?;
                if changed > 0 {
                    tx.execute(
                        "INSERT INTO instance_steps (execution_id, step, status, recorded_at)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(execution_id, step)
                         DO UPDATE SET status = excluded.status, recorded_at = excluded.recorded_at",
                        params![id, step, status.as_str(), now],
                    )?;
                }
                let instance = load_instance(&tx, &id)?;
                tx.commit()?;
                Ok(instance)
            })
            .await
            .map_err(query_error)?
            .ok_or_else(|| instance_not_found(execution_id))
    }

    async fn update_status(
        &self,
        execution_id: &str,
        status: InstanceStatus,
        reason: Option<&str>,
    ) -> Result<WorkflowInstance, StoreError> {
        let id = execution_id.to_string();
        let reason = reason.map(str::to_string);

        let update = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let Some(mut instance) = load_instance(&tx, &id)? else {
                    return Ok(StatusUpdate::Missing);
                };
                match instance.transition(status, reason.as_deref(), Utc::now()) {
                    Err(_) => return Ok(StatusUpdate::Rejected(instance.status)),
                    Ok(false) => return Ok(StatusUpdate::Applied(instance)),
                    Ok(true) => {}
                }
                tx.execute(
                    "UPDATE workflow_instances SET status = ?2, error = ?3, updated_at = ?4
                     WHERE execution_id = ?1",
                    params![
                        id,
                        instance.status.as_str(),
                        instance.error,
                        instance.updated_at.to_rfc3339(),
                    ],
                )?;
                tx.commit()?;
                Ok(StatusUpdate::Applied(instance))
            })
            .await
            .map_err(query_error)?;

        match update {
            StatusUpdate::Applied(instance) => Ok(instance),
            StatusUpdate::Missing => Err(instance_not_found(execution_id)),
            StatusUpdate::Rejected(from) => Err(StoreError::InvalidTransition {
                execution_id: execution_id.to_string(),
                from,
                to: status,
            }),
        }
    }

    async fn steps(&self, execution_id: &str) -> Result<Vec<StepRecord>, StoreError> {
        let id = execution_id.to_string();
        self.conn
            .call(move |conn| {
                if load_instance(conn, &id)?.is_none() {
                    return Ok(None);
                }
                let mut stmt = conn.prepare(
                    "SELECT step, status, recorded_at FROM instance_steps
                     WHERE execution_id = ?1 ORDER BY step",
                )?;
                let records = stmt
                    .query_map([&id], |row| {
                        Ok(StepRecord {
                            step: row.get(0)?,
                            status: parse_enum(row, 1)?,
                            recorded_at: parse_time(row, 2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(records))
            })
            .await
            .map_err(query_error)?
            .ok_or_else(|| instance_not_found(execution_id))
    }
}

#[async_trait]
impl DefinitionLookup for SqliteStore {
    async fn get_by_trigger(&self, trigger: &str) -> Result<WorkflowDefinition, StoreError> {
        let key = trigger.to_string();
        self.conn
            .call(move |conn| Ok(load_definition(conn, &key)?))
            .await
            .map_err(query_error)?
            .ok_or_else(|| definition_not_found(trigger))
    }
}

#[async_trait]
impl DefinitionStore for SqliteStore {
    async fn register(&self, workflow: NewWorkflow) -> Result<WorkflowDefinition, StoreError> {
        let mut definition = workflow.into_definition(0, Utc::now())?;
        let step_task_types = serde_json::to_string(&definition.step_task_types)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        let row = definition.clone();
        let id = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    "INSERT INTO workflows (name, trigger_name, total_steps, step_task_types,
                     handler_url, message, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        row.name,
                        row.trigger,
                        row.total_steps,
                        step_task_types,
                        row.handler_url,
                        row.message,
                        row.status.as_str(),
                        row.created_at.to_rfc3339(),
                        row.updated_at.to_rfc3339(),
                    ],
                );
                match result {
                    Ok(_) => Ok(Some(conn.last_insert_rowid())),
                    Err(e) if is_constraint_violation(&e) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(query_error)?;

        let Some(id) = id else {
            return Err(StoreError::Conflict(format!(
                "workflow {} ({})",
                definition.name, definition.trigger
            )));
        };
        definition.id = id as u64;
        Ok(definition)
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DEFINITION_COLUMNS} FROM workflows ORDER BY id"
                ))?;
                let definitions = stmt
                    .query_map([], definition_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(definitions)
            })
            .await
            .map_err(query_error)
    }

    async fn set_status(
        &self,
        trigger: &str,
        status: DefinitionStatus,
    ) -> Result<WorkflowDefinition, StoreError> {
        let key = trigger.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE workflows SET status = ?2, updated_at = ?3
                     WHERE trigger_name = ?1 AND status != ?2",
                    params![key, status.as_str(), now],
                )?;
                Ok(load_definition(conn, &key)?)
            })
            .await
            .map_err(query_error)?
            .ok_or_else(|| definition_not_found(trigger))
    }
}

#[async_trait]
impl CompletionLedger for SqliteStore {
    async fn is_processed(&self, execution_id: &str, step: u8) -> Result<bool, StoreError> {
        let id = execution_id.to_string();
        self.conn
            .call(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM processed_completions
                     WHERE execution_id = ?1 AND step = ?2)",
                    params![id, step],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(query_error)
    }

    async fn mark_processed(&self, execution_id: &str, step: u8) -> Result<(), StoreError> {
        let id = execution_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO processed_completions (execution_id, step, processed_at)
                     VALUES (?1, ?2, ?3)",
                    params![id, step, now],
                )?;
                Ok(())
            })
            .await
            .map_err(query_error)
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
