//! Notes attached to projects and tasks.

use crate::error::{Entity, Error, Result};
use crate::tasks::models::{Note, NoteEntity};
use crate::tasks::store::{
    audit_json, conversion_error, log_audit, now, task_exists, SqliteTaskStore,
};
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for note operations.
#[allow(clippy::missing_errors_doc)]
pub trait NoteStore {
    /// Attach a note to a project or task.
    fn add_note(
        &self,
        entity_type: NoteEntity,
        entity_id: &str,
        content: &str,
        author: Option<&str>,
    ) -> Result<Note>;

    /// Get a note by ID.
    fn get_note(&self, id: i64) -> Result<Note>;

    /// Notes attached to a record, in creation order.
    fn list_notes(&self, entity_type: NoteEntity, entity_id: &str) -> Result<Vec<Note>>;

    /// Change a note's content and/or author.
    fn update_note(&self, id: i64, content: Option<&str>, author: Option<&str>) -> Result<Note>;

    /// Delete a note.
    fn delete_note(&self, id: i64) -> Result<()>;
}

fn parse_note(row: &rusqlite::Row) -> rusqlite::Result<Note> {
    let entity_type: String = row.get(1)?;
    Ok(Note {
        id: row.get(0)?,
        entity_type: NoteEntity::from_str(&entity_type)
            .map_err(|e| conversion_error(1, e))?,
        entity_id: row.get(2)?,
        content: row.get(3)?,
        author: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn require_note(conn: &Connection, id: i64) -> Result<Note> {
    conn.query_row(
        "SELECT id, entity_type, entity_id, content, author, created_at, updated_at
         FROM notes WHERE id = ?1",
        params![id],
        parse_note,
    )
    .optional()?
    .ok_or_else(|| Error::not_found(Entity::Note, id.to_string()))
}

fn require_entity(conn: &Connection, entity_type: NoteEntity, entity_id: &str) -> Result<()> {
    let exists = match entity_type {
        NoteEntity::Task => task_exists(conn, entity_id)?,
        NoteEntity::Project => conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1)",
            params![entity_id],
            |row| row.get(0),
        )?,
    };
    if exists {
        Ok(())
    } else {
        let entity = match entity_type {
            NoteEntity::Task => Entity::Task,
            NoteEntity::Project => Entity::Project,
        };
        Err(Error::not_found(entity, entity_id))
    }
}

fn check_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::InvalidArgument("note content must not be empty".to_string()));
    }
    Ok(())
}

impl NoteStore for SqliteTaskStore {
    fn add_note(
        &self,
        entity_type: NoteEntity,
        entity_id: &str,
        content: &str,
        author: Option<&str>,
    ) -> Result<Note> {
        check_content(content)?;
        self.write(|conn| {
            require_entity(conn, entity_type, entity_id)?;
            conn.execute(
                "INSERT INTO notes (entity_type, entity_id, content, author, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![entity_type.as_str(), entity_id, content, author, now()],
            )?;
            let note = require_note(conn, conn.last_insert_rowid())?;
            log_audit(conn, "add_note", Some(entity_id), None, audit_json(&note).as_deref(), None)?;
            Ok(note)
        })
    }

    fn get_note(&self, id: i64) -> Result<Note> {
        let conn = self.open()?;
        require_note(&conn, id)
    }

    fn list_notes(&self, entity_type: NoteEntity, entity_id: &str) -> Result<Vec<Note>> {
        let conn = self.open()?;
        require_entity(&conn, entity_type, entity_id)?;
        let mut stmt = conn.prepare(
            "SELECT id, entity_type, entity_id, content, author, created_at, updated_at
             FROM notes WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY id",
        )?;
        let notes = stmt
            .query_map(params![entity_type.as_str(), entity_id], parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    fn update_note(&self, id: i64, content: Option<&str>, author: Option<&str>) -> Result<Note> {
        if let Some(content) = content {
            check_content(content)?;
        }
        self.write(|conn| {
            let old = require_note(conn, id)?;
            conn.execute(
                "UPDATE notes SET content = COALESCE(?1, content), author = COALESCE(?2, author),
                                  updated_at = ?3
                 WHERE id = ?4",
                params![content, author, now(), id],
            )?;
            let new = require_note(conn, id)?;
            log_audit(
                conn,
                "update_note",
                Some(&new.entity_id),
                audit_json(&old).as_deref(),
                audit_json(&new).as_deref(),
                None,
            )?;
            Ok(new)
        })
    }

    fn delete_note(&self, id: i64) -> Result<()> {
        self.write(|conn| {
            let note = require_note(conn, id)?;
            conn.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
            log_audit(
                conn,
                "delete_note",
                Some(&note.entity_id),
                audit_json(&note).as_deref(),
                None,
                None,
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tasks::models::{Project, Task};
    use crate::tasks::store::{NewTask, TaskStore};
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteTaskStore, Project, Task) {
        let dir = TempDir::new().unwrap();
        let store = SqliteTaskStore::new(dir.path().join("test.db")).unwrap();
        let project = store.create_project("P", None, None).unwrap();
        let task = store
            .create_task(NewTask {
                project_id: project.id.clone(),
                name: "T".to_string(),
                description: None,
                status: None,
            })
            .unwrap();
        (dir, store, project, task)
    }

    #[test]
    fn test_notes_on_tasks_and_projects() {
        let (_dir, store, project, task) = create_test_store();

        let first = store.add_note(NoteEntity::Task, &task.id, "first", Some("ana")).unwrap();
        let second = store.add_note(NoteEntity::Task, &task.id, "second", None).unwrap();
        store.add_note(NoteEntity::Project, &project.id, "kickoff", None).unwrap();

        let notes = store.list_notes(NoteEntity::Task, &task.id).unwrap();
        let ids: Vec<_> = notes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(notes[0].author.as_deref(), Some("ana"));

        assert_eq!(store.list_notes(NoteEntity::Project, &project.id).unwrap().len(), 1);
    }

    #[test]
    fn test_note_on_missing_entity() {
        let (_dir, store, _project, _task) = create_test_store();
        let err = store.add_note(NoteEntity::Task, "ghost-0000", "x", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = store.add_note(NoteEntity::Project, "ghost-0000", "x", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_empty_note_rejected() {
        let (_dir, store, _project, task) = create_test_store();
        let err = store.add_note(NoteEntity::Task, &task.id, "   ", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_update_and_delete_note() {
        let (_dir, store, _project, task) = create_test_store();
        let note = store.add_note(NoteEntity::Task, &task.id, "draft", None).unwrap();

        let updated = store.update_note(note.id, Some("final"), None).unwrap();
        assert_eq!(updated.content, "final");
        assert_eq!(updated.author, None);

        let updated = store.update_note(note.id, None, Some("lee")).unwrap();
        assert_eq!(updated.content, "final");
        assert_eq!(updated.author.as_deref(), Some("lee"));

        store.delete_note(note.id).unwrap();
        assert_eq!(store.get_note(note.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_deleting_task_deletes_its_notes() {
        let (_dir, store, _project, task) = create_test_store();
        let note = store.add_note(NoteEntity::Task, &task.id, "gone soon", None).unwrap();
        store.delete_task(&task.id).unwrap();
        assert_eq!(store.get_note(note.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_force_deleting_project_deletes_task_notes() {
        let (_dir, store, project, task) = create_test_store();
        let task_note = store.add_note(NoteEntity::Task, &task.id, "t", None).unwrap();
        let project_note = store.add_note(NoteEntity::Project, &project.id, "p", None).unwrap();

        store.delete_project(&project.id, true).unwrap();
        assert!(store.get_note(task_note.id).is_err());
        assert!(store.get_note(project_note.id).is_err());
    }
}
