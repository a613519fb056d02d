//! Typed key/value metadata on tasks.

use crate::error::{Entity, Error, Result};
use crate::tasks::id::validate_identifier;
use crate::tasks::models::{MetadataType, MetadataValue, Task, TaskMetadata};
use crate::tasks::store::{
    audit_json, conversion_error, log_audit, now, parse_task, require_task, task_exists,
    SqliteTaskStore, TASK_COLUMNS,
};
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for task metadata operations.
#[allow(clippy::missing_errors_doc)]
pub trait MetadataStore {
    /// Set (insert or replace) a metadata entry.
    fn set_metadata(&self, task_id: &str, key: &str, value: MetadataValue) -> Result<TaskMetadata>;

    /// Get one metadata entry.
    fn get_metadata(&self, task_id: &str, key: &str) -> Result<TaskMetadata>;

    /// All metadata entries of a task, ordered by key.
    fn list_metadata(&self, task_id: &str) -> Result<Vec<TaskMetadata>>;

    /// Delete one metadata entry.
    fn delete_metadata(&self, task_id: &str, key: &str) -> Result<()>;

    /// Tasks whose `key` entry equals `raw_value`, interpreted in each entry's type.
    fn query_tasks_by_metadata(&self, key: &str, raw_value: &str) -> Result<Vec<Task>>;
}

const METADATA_COLUMNS: &str = "task_id, key, value_type, value_string, value_int, value_float, \
                                value_datetime, value_bool, value_json, created_at, updated_at";

fn parse_metadata(row: &rusqlite::Row) -> rusqlite::Result<TaskMetadata> {
    let value_type: String = row.get(2)?;
    let value_type = MetadataType::from_str(&value_type).map_err(|e| conversion_error(2, e))?;
    let value = match value_type {
        MetadataType::String => MetadataValue::String(row.get(3)?),
        MetadataType::Int => MetadataValue::Int(row.get(4)?),
        MetadataType::Float => MetadataValue::Float(row.get(5)?),
        MetadataType::Datetime => MetadataValue::Datetime(row.get(6)?),
        MetadataType::Bool => MetadataValue::Bool(row.get(7)?),
        MetadataType::Json => {
            let raw: String = row.get(8)?;
            MetadataValue::Json(serde_json::from_str(&raw).map_err(|e| conversion_error(8, e))?)
        }
    };
    Ok(TaskMetadata {
        task_id: row.get(0)?,
        key: row.get(1)?,
        value,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn fetch_metadata(conn: &Connection, task_id: &str, key: &str) -> Result<Option<TaskMetadata>> {
    let entry = conn
        .query_row(
            &format!("SELECT {METADATA_COLUMNS} FROM task_metadata WHERE task_id = ?1 AND key = ?2"),
            params![task_id, key],
            parse_metadata,
        )
        .optional()?;
    Ok(entry)
}

fn require_metadata(conn: &Connection, task_id: &str, key: &str) -> Result<TaskMetadata> {
    fetch_metadata(conn, task_id, key)?
        .ok_or_else(|| Error::not_found(Entity::Metadata, format!("{task_id}/{key}")))
}

impl MetadataStore for SqliteTaskStore {
    fn set_metadata(&self, task_id: &str, key: &str, value: MetadataValue) -> Result<TaskMetadata> {
        validate_identifier(key)?;
        if let MetadataValue::Float(f) = &value {
            if !f.is_finite() {
                return Err(Error::InvalidArgument(format!("metadata value {f} is not finite")));
            }
        }

        self.write(|conn| {
            require_task(conn, task_id)?;
            let old = fetch_metadata(conn, task_id, key)?;

            let (mut string, mut int, mut float, mut datetime, mut boolean, mut json) =
                (None, None, None, None, None, None);
            match &value {
                MetadataValue::String(s) => string = Some(s.clone()),
                MetadataValue::Int(i) => int = Some(*i),
                MetadataValue::Float(f) => float = Some(*f),
                MetadataValue::Datetime(d) => datetime = Some(d.clone()),
                MetadataValue::Bool(b) => boolean = Some(*b),
                MetadataValue::Json(v) => json = Some(v.to_string()),
            }

            let ts = now();
            conn.execute(
                "INSERT INTO task_metadata (task_id, key, value_type, value_string, value_int,
                                            value_float, value_datetime, value_bool, value_json,
                                            created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                 ON CONFLICT (task_id, key) DO UPDATE SET
                     value_type = excluded.value_type,
                     value_string = excluded.value_string,
                     value_int = excluded.value_int,
                     value_float = excluded.value_float,
                     value_datetime = excluded.value_datetime,
                     value_bool = excluded.value_bool,
                     value_json = excluded.value_json,
                     updated_at = excluded.updated_at",
                params![
                    task_id,
                    key,
                    value.value_type().as_str(),
                    string,
                    int,
                    float,
                    datetime,
                    boolean,
                    json,
                    ts
                ],
            )?;

            let entry = require_metadata(conn, task_id, key)?;
            log_audit(
                conn,
                "set_metadata",
                Some(task_id),
                old.as_ref().and_then(audit_json).as_deref(),
                audit_json(&entry).as_deref(),
                Some(key),
            )?;
            Ok(entry)
        })
    }

    fn get_metadata(&self, task_id: &str, key: &str) -> Result<TaskMetadata> {
        let conn = self.open()?;
        require_task(&conn, task_id)?;
        require_metadata(&conn, task_id, key)
    }

    fn list_metadata(&self, task_id: &str) -> Result<Vec<TaskMetadata>> {
        let conn = self.open()?;
        if !task_exists(&conn, task_id)? {
            return Err(Error::not_found(Entity::Task, task_id));
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT {METADATA_COLUMNS} FROM task_metadata WHERE task_id = ?1 ORDER BY key"
        ))?;
        let entries = stmt
            .query_map(params![task_id], parse_metadata)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn delete_metadata(&self, task_id: &str, key: &str) -> Result<()> {
        self.write(|conn| {
            require_task(conn, task_id)?;
            let entry = require_metadata(conn, task_id, key)?;
            conn.execute(
                "DELETE FROM task_metadata WHERE task_id = ?1 AND key = ?2",
                params![task_id, key],
            )?;
            log_audit(
                conn,
                "delete_metadata",
                Some(task_id),
                audit_json(&entry).as_deref(),
                None,
                Some(key),
            )?;
            Ok(())
        })
    }

    fn query_tasks_by_metadata(&self, key: &str, raw_value: &str) -> Result<Vec<Task>> {
        validate_identifier(key)?;
        let conn = self.open()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {METADATA_COLUMNS} FROM task_metadata WHERE key = ?1 ORDER BY task_id"
        ))?;
        let entries = stmt
            .query_map(params![key], parse_metadata)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tasks = Vec::new();
        for entry in entries {
            let matches = MetadataValue::parse(raw_value, Some(entry.value.value_type()))
                .is_ok_and(|wanted| wanted == entry.value);
            if matches {
                let task = conn.query_row(
                    &format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?1"),
                    params![&entry.task_id],
                    parse_task,
                )?;
                tasks.push(task);
            }
        }
        Ok(tasks)
    }
}
