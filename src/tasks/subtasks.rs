//! Subtasks: checklist items owned by a task.

use crate::error::{Entity, Error, Result};
use crate::tasks::models::{validate_name, Subtask, TaskStatus};
use crate::tasks::store::{
    audit_json, conversion_error, fresh_id, log_audit, now, require_task, task_exists,
    SqliteTaskStore,
};
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for subtask operations.
#[allow(clippy::missing_errors_doc)]
pub trait SubtaskStore {
    /// Create a subtask under `task_id`.
    fn create_subtask(
        &self,
        task_id: &str,
        name: &str,
        description: Option<&str>,
        required_for_completion: bool,
    ) -> Result<Subtask>;

    /// Get a subtask by ID.
    fn get_subtask(&self, id: &str) -> Result<Option<Subtask>>;

    /// List a task's subtasks in creation order.
    fn list_subtasks(&self, task_id: &str, status: Option<TaskStatus>) -> Result<Vec<Subtask>>;

    /// Update a subtask.
    fn update_subtask(&self, id: &str, update: SubtaskUpdate) -> Result<Subtask>;

    /// Delete a subtask.
    fn delete_subtask(&self, id: &str) -> Result<()>;
}

/// Fields that can be updated on a subtask.
#[derive(Debug, Default, Clone)]
pub struct SubtaskUpdate {
    /// New name (if Some).
    pub name: Option<String>,
    /// New description (if Some).
    pub description: Option<String>,
    /// New required flag (if Some).
    pub required_for_completion: Option<bool>,
    /// New status (if Some).
    pub status: Option<TaskStatus>,
}

const SUBTASK_COLUMNS: &str = "id, task_id, name, description, required_for_completion, status, \
                               created_at, updated_at";

fn parse_subtask(row: &rusqlite::Row) -> rusqlite::Result<Subtask> {
    let status: String = row.get(5)?;
    Ok(Subtask {
        id: row.get(0)?,
        task_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        required_for_completion: row.get(4)?,
        status: TaskStatus::from_str(&status).map_err(|e| conversion_error(5, e))?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn fetch_subtask(conn: &Connection, id: &str) -> Result<Option<Subtask>> {
    let subtask = conn
        .query_row(
            &format!("SELECT {SUBTASK_COLUMNS} FROM subtasks WHERE id = ?1"),
            params![id],
            parse_subtask,
        )
        .optional()?;
    Ok(subtask)
}

fn require_subtask(conn: &Connection, id: &str) -> Result<Subtask> {
    fetch_subtask(conn, id)?.ok_or_else(|| Error::not_found(Entity::Subtask, id))
}

impl SubtaskStore for SqliteTaskStore {
    fn create_subtask(
        &self,
        task_id: &str,
        name: &str,
        description: Option<&str>,
        required_for_completion: bool,
    ) -> Result<Subtask> {
        let name = validate_name(name)?;
        self.write(|conn| {
            require_task(conn, task_id)?;
            let id = fresh_id(conn, "subtasks", &name, "subtask")?;
            conn.execute(
                "INSERT INTO subtasks (id, task_id, name, description, required_for_completion,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![&id, task_id, &name, description, required_for_completion, now()],
            )?;
            let subtask = require_subtask(conn, &id)?;
            log_audit(conn, "create_subtask", Some(&id), None, audit_json(&subtask).as_deref(), None)?;
            Ok(subtask)
        })
    }

    fn get_subtask(&self, id: &str) -> Result<Option<Subtask>> {
        let conn = self.open()?;
        fetch_subtask(&conn, id)
    }

    fn list_subtasks(&self, task_id: &str, status: Option<TaskStatus>) -> Result<Vec<Subtask>> {
        let conn = self.open()?;
        if !task_exists(&conn, task_id)? {
            return Err(Error::not_found(Entity::Task, task_id));
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBTASK_COLUMNS} FROM subtasks
             WHERE task_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at, id"
        ))?;
        let subtasks = stmt
            .query_map(params![task_id, status.map(|s| s.as_str())], parse_subtask)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(subtasks)
    }

    fn update_subtask(&self, id: &str, update: SubtaskUpdate) -> Result<Subtask> {
        let name = update.name.as_deref().map(validate_name).transpose()?;
        self.write(|conn| {
            let old = require_subtask(conn, id)?;

            if let Some(name) = &name {
                conn.execute("UPDATE subtasks SET name = ?1 WHERE id = ?2", params![name, id])?;
            }
            if let Some(description) = &update.description {
                conn.execute(
                    "UPDATE subtasks SET description = ?1 WHERE id = ?2",
                    params![description, id],
                )?;
            }
            if let Some(required) = update.required_for_completion {
                conn.execute(
                    "UPDATE subtasks SET required_for_completion = ?1 WHERE id = ?2",
                    params![required, id],
                )?;
            }
            if let Some(status) = update.status {
                conn.execute(
                    "UPDATE subtasks SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), id],
                )?;
            }
            conn.execute("UPDATE subtasks SET updated_at = ?1 WHERE id = ?2", params![now(), id])?;

            let new = require_subtask(conn, id)?;
            log_audit(
                conn,
                "update_subtask",
                Some(id),
                audit_json(&old).as_deref(),
                audit_json(&new).as_deref(),
                None,
            )?;
            Ok(new)
        })
    }

    fn delete_subtask(&self, id: &str) -> Result<()> {
        self.write(|conn| {
            let subtask = require_subtask(conn, id)?;
            conn.execute("DELETE FROM subtasks WHERE id = ?1", params![id])?;
            log_audit(conn, "delete_subtask", Some(id), audit_json(&subtask).as_deref(), None, None)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tasks::models::Task;
    use crate::tasks::store::{NewTask, TaskStore, TaskUpdate};
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteTaskStore, Task) {
        let dir = TempDir::new().unwrap();
        let store = SqliteTaskStore::new(dir.path().join("test.db")).unwrap();
        let project = store.create_project("P", None, None).unwrap();
        let task = store
            .create_task(NewTask {
                project_id: project.id,
                name: "Release".to_string(),
                description: None,
                status: None,
            })
            .unwrap();
        (dir, store, task)
    }

    fn set_status(store: &SqliteTaskStore, id: &str, status: TaskStatus) -> Result<Task> {
        store.update_task(id, TaskUpdate { status: Some(status), ..Default::default() })
    }

    #[test]
    fn test_create_and_list_subtasks() {
        let (_dir, store, task) = create_test_store();
        let a = store.create_subtask(&task.id, "Tag", None, true).unwrap();
        let b = store.create_subtask(&task.id, "Announce", Some("blog"), false).unwrap();

        assert!(a.id.starts_with("tag-"));
        assert!(a.required_for_completion);
        assert_eq!(a.status, TaskStatus::NotStarted);
        assert!(!b.required_for_completion);

        let all = store.list_subtasks(&task.id, None).unwrap();
        assert_eq!(all.len(), 2);

        store
            .update_subtask(
                &a.id,
                SubtaskUpdate { status: Some(TaskStatus::Completed), ..Default::default() },
            )
            .unwrap();
        let done = store.list_subtasks(&task.id, Some(TaskStatus::Completed)).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, a.id);
    }

    #[test]
    fn test_subtask_on_missing_task() {
        let (_dir, store, _task) = create_test_store();
        let err = store.create_subtask("ghost-0000", "x", None, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = store.list_subtasks("ghost-0000", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_required_subtasks_gate_completion() {
        let (_dir, store, task) = create_test_store();
        let required = store.create_subtask(&task.id, "Tag", None, true).unwrap();
        store.create_subtask(&task.id, "Optional", None, false).unwrap();

        set_status(&store, &task.id, TaskStatus::InProgress).unwrap();
        let err = set_status(&store, &task.id, TaskStatus::Completed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert!(err.to_string().contains(&required.id));

        store
            .update_subtask(
                &required.id,
                SubtaskUpdate { status: Some(TaskStatus::Completed), ..Default::default() },
            )
            .unwrap();
        set_status(&store, &task.id, TaskStatus::Completed).unwrap();
    }

    #[test]
    fn test_update_and_delete_subtask() {
        let (_dir, store, task) = create_test_store();
        let sub = store.create_subtask(&task.id, "Draft", None, true).unwrap();

        let updated = store
            .update_subtask(
                &sub.id,
                SubtaskUpdate {
                    name: Some("Final draft".to_string()),
                    required_for_completion: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Final draft");
        assert!(!updated.required_for_completion);

        store.delete_subtask(&sub.id).unwrap();
        assert!(store.get_subtask(&sub.id).unwrap().is_none());
        assert_eq!(store.delete_subtask(&sub.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_subtasks_cascade_with_task() {
        let (_dir, store, task) = create_test_store();
        let sub = store.create_subtask(&task.id, "Tag", None, true).unwrap();
        store.delete_task(&task.id).unwrap();
        assert!(store.get_subtask(&sub.id).unwrap().is_none());
    }
}
