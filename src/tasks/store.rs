//! Project/task store trait and `SQLite` implementation.
//!
//! The same [`SqliteTaskStore`] also implements the dependency, subtask,
//! metadata and note store traits (see the sibling modules); this module
//! owns the connection handling, the schema and the helpers they share.

use crate::error::{Entity, Error, Result};
use crate::tasks::dependencies::incomplete_prerequisites_on;
use crate::tasks::id::{generate_id, slug_for, unique_slug, validate_identifier};
use crate::tasks::models::{
    validate_name, AuditEntry, Project, ProjectStatus, Task, TaskStatus,
};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding the database and config, relative to the project root.
pub const PM_DIR: &str = ".pm";

/// Database filename inside [`PM_DIR`].
pub const DATABASE_FILENAME: &str = "pm.db";

/// Attempts at generating an unused random ID before giving up.
const MAX_ID_ATTEMPTS: usize = 16;

/// Trait for project and task storage operations.
///
/// All methods return a `Result` and may fail with database errors.
#[allow(clippy::missing_errors_doc)]
pub trait TaskStore {
    // Project operations
    /// Create a new project.
    fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
        status: Option<ProjectStatus>,
    ) -> Result<Project>;

    /// Get a project by ID.
    fn get_project(&self, id: &str) -> Result<Option<Project>>;

    /// Find a project by ID or slug.
    fn resolve_project(&self, ident: &str) -> Result<Project>;

    /// List projects ordered by name, optionally filtered by status.
    fn list_projects(&self, status: Option<ProjectStatus>) -> Result<Vec<Project>>;

    /// Update a project.
    fn update_project(&self, id: &str, update: ProjectUpdate) -> Result<Project>;

    /// Delete a project. Without `force`, fails if the project has tasks.
    fn delete_project(&self, id: &str, force: bool) -> Result<()>;

    // Task operations
    /// Create a new task.
    fn create_task(&self, new_task: NewTask) -> Result<Task>;

    /// Get a task by ID.
    fn get_task(&self, id: &str) -> Result<Option<Task>>;

    /// Find a task by ID, or by slug (within `project` when given).
    fn resolve_task(&self, ident: &str, project: Option<&str>) -> Result<Task>;

    /// List tasks matching the filter, ordered by name.
    fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>>;

    /// Update a task, enforcing status transition rules.
    fn update_task(&self, id: &str, update: TaskUpdate) -> Result<Task>;

    /// Delete a task along with its edges, subtasks, metadata and notes.
    fn delete_task(&self, id: &str) -> Result<()>;

    // Audit log
    /// Get audit log entries, newest first.
    fn get_audit_log(&self, entity_id: Option<&str>, limit: Option<usize>)
        -> Result<Vec<AuditEntry>>;
}

/// Fields that can be updated on a project.
#[derive(Debug, Default, Clone)]
pub struct ProjectUpdate {
    /// New name (if Some). The slug follows the name.
    pub name: Option<String>,
    /// New description (if Some).
    pub description: Option<String>,
    /// New status (if Some).
    pub status: Option<ProjectStatus>,
}

impl ProjectUpdate {
    /// Check if any fields are set for update.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.status.is_none()
    }
}

/// A task to be created.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Owning project ID.
    pub project_id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Initial status (defaults to `NOT_STARTED`).
    pub status: Option<TaskStatus>,
}

/// Fields that can be updated on a task.
#[derive(Debug, Default, Clone)]
pub struct TaskUpdate {
    /// New name (if Some). The slug follows the name.
    pub name: Option<String>,
    /// New description (if Some).
    pub description: Option<String>,
    /// New status (if Some).
    pub status: Option<TaskStatus>,
    /// Move the task to this project (if Some).
    pub project_id: Option<String>,
}

impl TaskUpdate {
    /// Check if any fields are set for update.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.project_id.is_none()
    }
}

/// Filter options for listing tasks.
#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    /// Only tasks in this project.
    pub project_id: Option<String>,
    /// Only tasks with this status. Overrides the include flags.
    pub status: Option<TaskStatus>,
    /// Include COMPLETED tasks.
    pub include_completed: bool,
    /// Include ABANDONED tasks.
    pub include_abandoned: bool,
    /// Include tasks whose project is not ACTIVE.
    pub include_inactive_project_tasks: bool,
}

/// Connection settings for [`SqliteTaskStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long a connection waits for a lock before failing.
    pub busy_timeout: Duration,
    /// Whether a task may depend on a task in another project.
    pub allow_cross_project_dependencies: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { busy_timeout: Duration::from_millis(5000), allow_cross_project_dependencies: true }
    }
}

/// SQLite-based store for projects, tasks and their attachments.
#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    db_path: PathBuf,
    options: StoreOptions,
}

impl SqliteTaskStore {
    /// Create a new `SQLite` store at the given database path with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(db_path, StoreOptions::default())
    }

    /// Create a new `SQLite` store with explicit connection options.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn with_options(db_path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let store = Self { db_path: db_path.as_ref().to_path_buf(), options };
        store.init_schema()?;
        Ok(store)
    }

    /// Create a new `SQLite` store in the `.pm` directory under `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_pm_dir(base_dir: &Path, options: StoreOptions) -> Result<Self> {
        Self::with_options(base_dir.join(PM_DIR).join(DATABASE_FILENAME), options)
    }

    /// Get the database path.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Get the connection options.
    #[must_use]
    pub const fn options(&self) -> StoreOptions {
        self.options
    }

    /// Open a connection to the database.
    pub(crate) fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(self.options.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        Ok(conn)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction, committing on success.
    ///
    /// The write lock is taken up front, so everything `f` reads is still
    /// true when it writes. Any error rolls the transaction back.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&*tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'ACTIVE'
                    CHECK (status IN ('ACTIVE', 'PROSPECTIVE', 'COMPLETED', 'ARCHIVED', 'CANCELLED')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                slug TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'NOT_STARTED'
                    CHECK (status IN ('NOT_STARTED', 'IN_PROGRESS', 'BLOCKED', 'PAUSED',
                                      'COMPLETED', 'ABANDONED')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (project_id, slug)
            );

            -- task_id depends on depends_on
            CREATE TABLE IF NOT EXISTS task_dependencies (
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                depends_on TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (task_id, depends_on),
                CHECK (task_id != depends_on)
            );

            CREATE TABLE IF NOT EXISTS subtasks (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT,
                required_for_completion INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'NOT_STARTED'
                    CHECK (status IN ('NOT_STARTED', 'IN_PROGRESS', 'BLOCKED', 'PAUSED',
                                      'COMPLETED', 'ABANDONED')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_metadata (
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                value_type TEXT NOT NULL
                    CHECK (value_type IN ('string', 'int', 'float', 'datetime', 'bool', 'json')),
                value_string TEXT,
                value_int INTEGER,
                value_float REAL,
                value_datetime TEXT,
                value_bool INTEGER,
                value_json TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (task_id, key)
            );

            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL CHECK (entity_type IN ('project', 'task')),
                entity_id TEXT NOT NULL,
                content TEXT NOT NULL,
                author TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                operation TEXT NOT NULL,
                entity_id TEXT,
                old_value TEXT,
                new_value TEXT,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
            CREATE INDEX IF NOT EXISTS idx_task_dependencies_depends_on
                ON task_dependencies(depends_on);
            CREATE INDEX IF NOT EXISTS idx_subtasks_task ON subtasks(task_id);
            CREATE INDEX IF NOT EXISTS idx_notes_entity ON notes(entity_type, entity_id);
            CREATE INDEX IF NOT EXISTS idx_audit_log_entity ON audit_log(entity_id);
            ",
        )?;

        Ok(())
    }
}

/// Current time as an RFC 3339 UTC timestamp with millisecond precision.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serialize a record for the audit log.
pub(crate) fn audit_json<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_string(value).ok()
}

/// Log an operation to the audit log.
pub(crate) fn log_audit(
    conn: &Connection,
    operation: &str,
    entity_id: Option<&str>,
    old_value: Option<&str>,
    new_value: Option<&str>,
    details: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_log (timestamp, operation, entity_id, old_value, new_value, details)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![now(), operation, entity_id, old_value, new_value, details],
    )?;
    Ok(())
}

/// Wrap a parse failure of column `idx` as a rusqlite conversion error.
pub(crate) fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

const PROJECT_COLUMNS: &str = "id, name, slug, description, status, created_at, updated_at";

/// Columns selected by [`parse_task`], qualified for joins.
pub(crate) const TASK_COLUMNS: &str = "t.id, t.project_id, t.name, t.slug, t.description, \
                                       t.status, t.created_at, t.updated_at";

fn parse_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    let status: String = row.get(4)?;
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        status: ProjectStatus::from_str(&status).map_err(|e| conversion_error(4, e))?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Parse a task from a row selected with [`TASK_COLUMNS`].
pub(crate) fn parse_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let status: String = row.get(5)?;
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        description: row.get(4)?,
        status: TaskStatus::from_str(&status).map_err(|e| conversion_error(5, e))?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn fetch_project(conn: &Connection, id: &str) -> Result<Option<Project>> {
    let project = conn
        .query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![id],
            parse_project,
        )
        .optional()?;
    Ok(project)
}

fn require_project(conn: &Connection, id: &str) -> Result<Project> {
    fetch_project(conn, id)?.ok_or_else(|| Error::not_found(Entity::Project, id))
}

/// Get a task by ID on an existing connection.
pub(crate) fn fetch_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?1"),
            params![id],
            parse_task,
        )
        .optional()?;
    Ok(task)
}

/// Get a task by ID, failing with `NotFound` if it does not exist.
pub(crate) fn require_task(conn: &Connection, id: &str) -> Result<Task> {
    fetch_task(conn, id)?.ok_or_else(|| Error::not_found(Entity::Task, id))
}

/// Whether a task with this ID exists.
pub(crate) fn task_exists(conn: &Connection, id: &str) -> Result<bool> {
    let exists =
        conn.query_row("SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1)", params![id], |row| {
            row.get(0)
        })?;
    Ok(exists)
}

/// Generate a random ID for `name` that is not yet used in `table`.
pub(crate) fn fresh_id(conn: &Connection, table: &str, name: &str, fallback: &str) -> Result<String> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)");
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = generate_id(name, fallback);
        let taken: bool = conn.query_row(&sql, params![&id], |row| row.get(0))?;
        if !taken {
            return Ok(id);
        }
    }
    Err(Error::AlreadyExists(format!("could not generate an unused {fallback} ID for '{name}'")))
}

fn project_slug(conn: &Connection, name: &str, exclude_id: Option<&str>) -> Result<String> {
    unique_slug(&slug_for(name), |candidate| {
        let taken = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE slug = ?1 AND id IS NOT ?2)",
            params![candidate, exclude_id],
            |row| row.get(0),
        )?;
        Ok(taken)
    })
}

fn task_slug(
    conn: &Connection,
    project_id: &str,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<String> {
    unique_slug(&slug_for(name), |candidate| {
        let taken = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tasks
                           WHERE project_id = ?1 AND slug = ?2 AND id IS NOT ?3)",
            params![project_id, candidate, exclude_id],
            |row| row.get(0),
        )?;
        Ok(taken)
    })
}

/// IDs of required subtasks of `task_id` that are not completed.
fn unfinished_required_subtasks(conn: &Connection, task_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM subtasks
         WHERE task_id = ?1 AND required_for_completion = 1 AND status != 'COMPLETED'
         ORDER BY id",
    )?;
    let ids = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Check that `task` may move to `next`.
///
/// Besides the transition table, starting or completing a task requires all
/// of its prerequisites to be closed, and completing it requires all of its
/// required subtasks to be completed.
fn check_transition(conn: &Connection, task: &Task, next: TaskStatus) -> Result<()> {
    if !task.status.can_transition_to(next) {
        return Err(Error::InvalidTransition(format!(
            "cannot move task {} from {} to {}",
            task.id, task.status, next
        )));
    }

    if next.requires_closed_prerequisites() {
        let open = incomplete_prerequisites_on(conn, &task.id)?;
        if !open.is_empty() {
            let ids: Vec<&str> = open.iter().map(|t| t.id.as_str()).collect();
            return Err(Error::InvalidTransition(format!(
                "cannot move task {} to {next}: prerequisites not completed: {}",
                task.id,
                ids.join(", ")
            )));
        }
    }

    if next == TaskStatus::Completed {
        let unfinished = unfinished_required_subtasks(conn, &task.id)?;
        if !unfinished.is_empty() {
            return Err(Error::InvalidTransition(format!(
                "cannot complete task {}: required subtasks not completed: {}",
                task.id,
                unfinished.join(", ")
            )));
        }
    }

    Ok(())
}

/// Fail if moving `task_id` into `project_id` would leave an edge between projects.
fn check_move_keeps_edges_local(conn: &Connection, task_id: &str, project_id: &str) -> Result<()> {
    let crossing: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM task_dependencies d
            JOIN tasks other ON other.id = CASE WHEN d.task_id = ?1 THEN d.depends_on
                                                ELSE d.task_id END
            WHERE (d.task_id = ?1 OR d.depends_on = ?1) AND other.project_id != ?2
        )",
        params![task_id, project_id],
        |row| row.get(0),
    )?;
    if crossing {
        return Err(Error::InvalidArgument(format!(
            "cannot move task {task_id}: it has dependencies outside project {project_id} \
             and cross-project dependencies are disabled"
        )));
    }
    Ok(())
}

fn delete_notes_for(conn: &Connection, entity_type: &str, entity_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM notes WHERE entity_type = ?1 AND entity_id = ?2",
        params![entity_type, entity_id],
    )?;
    Ok(())
}

impl TaskStore for SqliteTaskStore {
    fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
        status: Option<ProjectStatus>,
    ) -> Result<Project> {
        let name = validate_name(name)?;
        self.write(|conn| {
            let id = fresh_id(conn, "projects", &name, "project")?;
            let slug = project_slug(conn, &name, None)?;
            let ts = now();
            conn.execute(
                "INSERT INTO projects (id, name, slug, description, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![&id, &name, &slug, description, status.unwrap_or_default().as_str(), &ts],
            )?;
            let project = require_project(conn, &id)?;
            log_audit(conn, "create_project", Some(&id), None, audit_json(&project).as_deref(), None)?;
            Ok(project)
        })
    }

    fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.open()?;
        fetch_project(&conn, id)
    }

    fn resolve_project(&self, ident: &str) -> Result<Project> {
        validate_identifier(ident)?;
        let conn = self.open()?;
        if let Some(project) = fetch_project(&conn, ident)? {
            return Ok(project);
        }
        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE slug = ?1"),
            params![ident],
            parse_project,
        )
        .optional()?
        .ok_or_else(|| Error::not_found(Entity::Project, ident))
    }

    fn list_projects(&self, status: Option<ProjectStatus>) -> Result<Vec<Project>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY name COLLATE NOCASE, id"
        ))?;
        let projects = stmt
            .query_map(params![status.map(|s| s.as_str())], parse_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    fn update_project(&self, id: &str, update: ProjectUpdate) -> Result<Project> {
        let name = update.name.as_deref().map(validate_name).transpose()?;
        self.write(|conn| {
            let old = require_project(conn, id)?;
            if update.is_empty() {
                return Ok(old);
            }

            if let Some(name) = &name {
                let slug = project_slug(conn, name, Some(id))?;
                conn.execute(
                    "UPDATE projects SET name = ?1, slug = ?2 WHERE id = ?3",
                    params![name, slug, id],
                )?;
            }
            if let Some(description) = &update.description {
                conn.execute(
                    "UPDATE projects SET description = ?1 WHERE id = ?2",
                    params![description, id],
                )?;
            }
            if let Some(status) = update.status {
                conn.execute(
                    "UPDATE projects SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), id],
                )?;
            }
            conn.execute("UPDATE projects SET updated_at = ?1 WHERE id = ?2", params![now(), id])?;

            let new = require_project(conn, id)?;
            log_audit(
                conn,
                "update_project",
                Some(id),
                audit_json(&old).as_deref(),
                audit_json(&new).as_deref(),
                None,
            )?;
            Ok(new)
        })
    }

    fn delete_project(&self, id: &str, force: bool) -> Result<()> {
        self.write(|conn| {
            let project = require_project(conn, id)?;
            let task_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE project_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            if task_count > 0 && !force {
                return Err(Error::InvalidArgument(format!(
                    "project {id} still has {task_count} task(s); use --force to delete them too"
                )));
            }

            conn.execute(
                "DELETE FROM notes WHERE entity_type = 'task'
                 AND entity_id IN (SELECT id FROM tasks WHERE project_id = ?1)",
                params![id],
            )?;
            delete_notes_for(conn, "project", id)?;
            // Tasks, edges, subtasks and metadata go with the project via ON DELETE CASCADE.
            conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;

            let details = (task_count > 0).then(|| format!("deleted {task_count} task(s)"));
            log_audit(
                conn,
                "delete_project",
                Some(id),
                audit_json(&project).as_deref(),
                None,
                details.as_deref(),
            )?;
            Ok(())
        })
    }

    fn create_task(&self, new_task: NewTask) -> Result<Task> {
        let name = validate_name(&new_task.name)?;
        self.write(|conn| {
            require_project(conn, &new_task.project_id)?;
            let id = fresh_id(conn, "tasks", &name, "task")?;
            let slug = task_slug(conn, &new_task.project_id, &name, None)?;
            let ts = now();
            conn.execute(
                "INSERT INTO tasks (id, project_id, name, slug, description, status,
                                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    &id,
                    &new_task.project_id,
                    &name,
                    &slug,
                    new_task.description.as_deref(),
                    new_task.status.unwrap_or_default().as_str(),
                    &ts
                ],
            )?;
            let task = require_task(conn, &id)?;
            log_audit(conn, "create_task", Some(&id), None, audit_json(&task).as_deref(), None)?;
            Ok(task)
        })
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.open()?;
        fetch_task(&conn, id)
    }

    fn resolve_task(&self, ident: &str, project: Option<&str>) -> Result<Task> {
        validate_identifier(ident)?;
        let project_id = match project {
            Some(p) => Some(self.resolve_project(p)?.id),
            None => None,
        };

        let conn = self.open()?;
        if let Some(task) = fetch_task(&conn, ident)? {
            if project_id.as_ref().map_or(true, |p| *p == task.project_id) {
                return Ok(task);
            }
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks t
             WHERE t.slug = ?1 AND (?2 IS NULL OR t.project_id = ?2)
             ORDER BY t.id"
        ))?;
        let mut matches = stmt
            .query_map(params![ident, project_id], parse_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        match matches.len() {
            0 => Err(Error::not_found(Entity::Task, ident)),
            1 => Ok(matches.remove(0)),
            n => Err(Error::InvalidArgument(format!(
                "task slug '{ident}' matches {n} tasks in different projects; pass --project"
            ))),
        }
    }

    fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let conn = self.open()?;

        let mut conditions = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(project_id) = filter.project_id {
            conditions.push("t.project_id = ?");
            params_vec.push(Box::new(project_id));
        }

        if let Some(status) = filter.status {
            conditions.push("t.status = ?");
            params_vec.push(Box::new(status.as_str()));
        } else {
            if !filter.include_completed {
                conditions.push("t.status != 'COMPLETED'");
            }
            if !filter.include_abandoned {
                conditions.push("t.status != 'ABANDONED'");
            }
        }

        if !filter.include_inactive_project_tasks {
            conditions.push("p.status = 'ACTIVE'");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t JOIN projects p ON p.id = t.project_id
             {where_clause}
             ORDER BY t.name COLLATE NOCASE, t.id"
        );

        let params: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(AsRef::as_ref).collect();
        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params.as_slice(), parse_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tasks)
    }

    fn update_task(&self, id: &str, update: TaskUpdate) -> Result<Task> {
        let name = update.name.as_deref().map(validate_name).transpose()?;
        let allow_cross_project = self.options.allow_cross_project_dependencies;

        self.write(|conn| {
            let old = require_task(conn, id)?;
            if update.is_empty() {
                return Ok(old);
            }

            if let Some(status) = update.status {
                if status != old.status {
                    check_transition(conn, &old, status)?;
                }
            }

            let project_id = match &update.project_id {
                Some(p) if *p != old.project_id => {
                    require_project(conn, p)?;
                    if !allow_cross_project {
                        check_move_keeps_edges_local(conn, id, p)?;
                    }
                    p.clone()
                }
                _ => old.project_id.clone(),
            };

            if name.is_some() || project_id != old.project_id {
                let name = name.clone().unwrap_or_else(|| old.name.clone());
                let slug = task_slug(conn, &project_id, &name, Some(id))?;
                conn.execute(
                    "UPDATE tasks SET name = ?1, slug = ?2, project_id = ?3 WHERE id = ?4",
                    params![name, slug, project_id, id],
                )?;
            }
            if let Some(description) = &update.description {
                conn.execute(
                    "UPDATE tasks SET description = ?1 WHERE id = ?2",
                    params![description, id],
                )?;
            }
            if let Some(status) = update.status {
                conn.execute(
                    "UPDATE tasks SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), id],
                )?;
            }
            conn.execute("UPDATE tasks SET updated_at = ?1 WHERE id = ?2", params![now(), id])?;

            let new = require_task(conn, id)?;
            log_audit(
                conn,
                "update_task",
                Some(id),
                audit_json(&old).as_deref(),
                audit_json(&new).as_deref(),
                None,
            )?;
            Ok(new)
        })
    }

    fn delete_task(&self, id: &str) -> Result<()> {
        self.write(|conn| {
            let task = require_task(conn, id)?;
            let edges: i64 = conn.query_row(
                "SELECT COUNT(*) FROM task_dependencies WHERE task_id = ?1 OR depends_on = ?1",
                params![id],
                |row| row.get(0),
            )?;

            delete_notes_for(conn, "task", id)?;
            // Edges, subtasks and metadata go with the task via ON DELETE CASCADE.
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;

            let details = (edges > 0).then(|| format!("removed {edges} dependency edge(s)"));
            log_audit(
                conn,
                "delete_task",
                Some(id),
                audit_json(&task).as_deref(),
                None,
                details.as_deref(),
            )?;
            Ok(())
        })
    }

    #[allow(clippy::cast_possible_wrap)]
    fn get_audit_log(
        &self,
        entity_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEntry>> {
        let conn = self.open()?;
        // A negative LIMIT means no limit in SQLite.
        let limit = limit.map_or(-1, |l| l as i64);

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, operation, entity_id, old_value, new_value, details
             FROM audit_log WHERE ?1 IS NULL OR entity_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;

        let entries = stmt
            .query_map(params![entity_id, limit], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    operation: row.get(2)?,
                    entity_id: row.get(3)?,
                    old_value: row.get(4)?,
                    new_value: row.get(5)?,
                    details: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }
}
