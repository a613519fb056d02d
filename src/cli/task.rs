//! Task CLI subcommands.

use crate::cli::run::Reply;
use crate::error::{Error, Result};
use crate::tasks::{
    DependencyStore, MetadataStore, NewTask, NoteEntity, NoteStore, SqliteTaskStore, SubtaskStore,
    Task, TaskFilter, TaskStatus, TaskStore, TaskUpdate,
};
use clap::Subcommand;
use serde_json::json;

/// Task management commands.
///
/// Tasks belong to exactly one project. A task may be named by its ID, or
/// by its slug together with `--project`.
///
/// ## Status Transitions
///
/// - `NOT_STARTED` -> `IN_PROGRESS`, `ABANDONED`
/// - `IN_PROGRESS` -> `COMPLETED`, `BLOCKED`, `PAUSED`, `ABANDONED`
/// - `BLOCKED` -> `IN_PROGRESS`, `ABANDONED`
/// - `PAUSED` -> `IN_PROGRESS`, `BLOCKED`, `ABANDONED`
///
/// Starting or completing a task requires all of its prerequisites to be
/// `COMPLETED` or `ABANDONED`; completing it also requires its required
/// subtasks to be `COMPLETED`.
#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    /// Create a new task.
    Create {
        /// Task name (1-100 characters)
        name: String,

        /// Project ID or slug the task belongs to
        #[arg(short, long)]
        project: String,

        /// Longer description
        #[arg(short, long)]
        description: Option<String>,

        /// Initial status (default `NOT_STARTED`)
        #[arg(short, long)]
        status: Option<String>,

        /// Prerequisite task IDs or slugs; repeat or separate with commas
        #[arg(long, value_delimiter = ',')]
        depends_on: Vec<String>,
    },

    /// Show a task with its dependencies, subtasks, metadata and notes.
    Get {
        /// Task ID or slug
        task: String,

        /// Project ID or slug (needed to resolve a slug shared across projects)
        #[arg(short, long)]
        project: Option<String>,
    },

    /// List tasks ordered by name.
    ///
    /// Completed and abandoned tasks are hidden unless requested or
    /// filtered for with `--status`.
    List {
        /// Only tasks in this project
        #[arg(short, long)]
        project: Option<String>,

        /// Only tasks with this status
        #[arg(short, long)]
        status: Option<String>,

        /// Include completed tasks
        #[arg(long)]
        include_completed: bool,

        /// Include abandoned tasks
        #[arg(long)]
        include_abandoned: bool,

        /// Include tasks from projects that are not ACTIVE
        #[arg(long)]
        inactive: bool,
    },

    /// Update a task's fields or move it to another project.
    Update {
        /// Task ID or slug
        task: String,

        /// Project ID or slug the task currently belongs to
        #[arg(short, long)]
        project: Option<String>,

        /// New name
        #[arg(short, long)]
        name: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// New status
        #[arg(short, long)]
        status: Option<String>,

        /// Move the task into this project
        #[arg(long)]
        move_to: Option<String>,
    },

    /// Delete a task along with its dependencies, subtasks, metadata and notes.
    Delete {
        /// Task ID or slug
        task: String,

        /// Project ID or slug
        #[arg(short, long)]
        project: Option<String>,

        /// Confirm the deletion
        #[arg(long)]
        force: bool,
    },
}

impl TaskCommand {
    pub(super) const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "task create",
            Self::Get { .. } => "task get",
            Self::List { .. } => "task list",
            Self::Update { .. } => "task update",
            Self::Delete { .. } => "task delete",
        }
    }

    pub(super) fn execute(self, store: &SqliteTaskStore) -> Result<Reply> {
        match self {
            Self::Create { name, project, description, status, depends_on } => {
                task_create(store, name, &project, description, status.as_deref(), &depends_on)
            }
            Self::Get { task, project } => task_get(store, &task, project.as_deref()),
            Self::List { project, status, include_completed, include_abandoned, inactive } => {
                let project_id = match project {
                    Some(p) => Some(store.resolve_project(&p)?.id),
                    None => None,
                };
                let status = status.as_deref().map(TaskStatus::from_str).transpose()?;
                let tasks = store.list_tasks(TaskFilter {
                    project_id,
                    status,
                    include_completed,
                    include_abandoned,
                    include_inactive_project_tasks: inactive,
                })?;
                let message = format!("{} task(s)", tasks.len());
                Reply::new(&tasks, message)
            }
            Self::Update { task, project, name, description, status, move_to } => {
                let id = store.resolve_task(&task, project.as_deref())?.id;
                let status = status.as_deref().map(TaskStatus::from_str).transpose()?;
                let project_id = match move_to {
                    Some(p) => Some(store.resolve_project(&p)?.id),
                    None => None,
                };
                let updated = store.update_task(
                    &id,
                    TaskUpdate { name, description, status, project_id },
                )?;
                let message = format!("Updated task {id} ({})", updated.status.as_str());
                Reply::new(&updated, message)
            }
            Self::Delete { task, project, force } => {
                let id = store.resolve_task(&task, project.as_deref())?.id;
                if !force {
                    return Err(Error::InvalidArgument(format!(
                        "deleting task {id} also deletes its dependencies, subtasks, metadata \
                         and notes; pass --force to confirm"
                    )));
                }
                store.delete_task(&id)?;
                Reply::new(&json!({ "id": id }), format!("Deleted task {id}"))
            }
        }
    }
}

/// Create a task, then add each prerequisite.
///
/// A prerequisite that cannot be added does not undo the task; it is
/// reported as a warning instead.
fn task_create(
    store: &SqliteTaskStore,
    name: String,
    project: &str,
    description: Option<String>,
    status: Option<&str>,
    depends_on: &[String],
) -> Result<Reply> {
    let project_id = store.resolve_project(project)?.id;
    let status = status.map(TaskStatus::from_str).transpose()?;
    let task = store.create_task(NewTask { project_id, name, description, status })?;

    let mut warnings = Vec::new();
    let mut added = Vec::new();
    for ident in depends_on.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let result = resolve_prerequisite(store, ident, &task.project_id)
            .and_then(|prerequisite| {
                store.add_dependency(&task.id, &prerequisite.id)?;
                Ok(prerequisite.id)
            });
        match result {
            Ok(id) => added.push(id),
            Err(e) => warnings.push(format!("dependency on {ident} not added: {e}")),
        }
    }

    let message = format!("Created task {}", task.id);
    Ok(Reply::new(&json!({ "task": task, "depends_on": added }), message)?.with_warnings(warnings))
}

/// A prerequisite is looked up by ID anywhere, then by slug in `project_id`.
fn resolve_prerequisite(store: &SqliteTaskStore, ident: &str, project_id: &str) -> Result<Task> {
    match store.get_task(ident)? {
        Some(task) => Ok(task),
        None => store.resolve_task(ident, Some(project_id)),
    }
}

fn task_get(store: &SqliteTaskStore, ident: &str, project: Option<&str>) -> Result<Reply> {
    let task = store.resolve_task(ident, project)?;
    let prerequisites = store.list_prerequisites(&task.id)?;
    let blocked_by: Vec<String> =
        prerequisites.iter().filter(|t| !t.is_closed()).map(|t| t.id.clone()).collect();
    let dependents = store.list_dependents(&task.id)?;
    let subtasks = store.list_subtasks(&task.id, None)?;
    let metadata = store.list_metadata(&task.id)?;
    let notes = store.list_notes(NoteEntity::Task, &task.id)?;

    let message = if blocked_by.is_empty() {
        format!("Task {} ({})", task.id, task.status.as_str())
    } else {
        format!("Task {} ({}), blocked by {}", task.id, task.status.as_str(), blocked_by.join(", "))
    };

    let data = json!({
        "task": task,
        "prerequisites": prerequisites,
        "blocked_by": blocked_by,
        "dependents": dependents,
        "subtasks": subtasks,
        "metadata": metadata,
        "notes": notes,
    });
    Reply::new(&data, message)
}
