//! Subtask CLI subcommands.

use crate::cli::run::Reply;
use crate::error::{Entity, Error, Result};
use crate::tasks::{SqliteTaskStore, SubtaskStore, SubtaskUpdate, TaskStatus, TaskStore};
use clap::Subcommand;
use serde_json::json;

/// Subtask commands.
///
/// Subtasks are checklist items under a task. A task cannot be completed
/// while any of its required subtasks is unfinished.
#[derive(Subcommand, Debug, Clone)]
pub enum SubtaskCommand {
    /// Add a subtask to a task.
    Create {
        /// Parent task ID or slug
        task: String,

        /// Subtask name
        name: String,

        /// Project ID or slug for resolving the task slug
        #[arg(short, long)]
        project: Option<String>,

        /// Longer description
        #[arg(short, long)]
        description: Option<String>,

        /// Do not require this subtask before the task can be completed
        #[arg(long)]
        optional: bool,
    },

    /// Show a subtask.
    Get {
        /// Subtask ID
        id: String,
    },

    /// List a task's subtasks in creation order.
    List {
        /// Parent task ID or slug
        task: String,

        /// Project ID or slug for resolving the task slug
        #[arg(short, long)]
        project: Option<String>,

        /// Only subtasks with this status
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Update a subtask.
    Update {
        /// Subtask ID
        id: String,

        /// New name
        #[arg(short, long)]
        name: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// Whether the subtask must be completed first (true/false)
        #[arg(long)]
        required: Option<bool>,

        /// New status
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Delete a subtask.
    Delete {
        /// Subtask ID
        id: String,
    },
}

impl SubtaskCommand {
    pub(super) const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "subtask create",
            Self::Get { .. } => "subtask get",
            Self::List { .. } => "subtask list",
            Self::Update { .. } => "subtask update",
            Self::Delete { .. } => "subtask delete",
        }
    }

    pub(super) fn execute(self, store: &SqliteTaskStore) -> Result<Reply> {
        match self {
            Self::Create { task, name, project, description, optional } => {
                let task_id = store.resolve_task(&task, project.as_deref())?.id;
                let subtask =
                    store.create_subtask(&task_id, &name, description.as_deref(), !optional)?;
                let message = format!("Created subtask {} under {task_id}", subtask.id);
                Reply::new(&subtask, message)
            }
            Self::Get { id } => {
                let subtask =
                    store.get_subtask(&id)?.ok_or_else(|| Error::not_found(Entity::Subtask, &id))?;
                Reply::new(&subtask, format!("Subtask {id}"))
            }
            Self::List { task, project, status } => {
                let task_id = store.resolve_task(&task, project.as_deref())?.id;
                let status = status.as_deref().map(TaskStatus::from_str).transpose()?;
                let subtasks = store.list_subtasks(&task_id, status)?;
                let message = format!("{task_id} has {} subtask(s)", subtasks.len());
                Reply::new(&subtasks, message)
            }
            Self::Update { id, name, description, required, status } => {
                let status = status.as_deref().map(TaskStatus::from_str).transpose()?;
                let subtask = store.update_subtask(
                    &id,
                    SubtaskUpdate { name, description, required_for_completion: required, status },
                )?;
                Reply::new(&subtask, format!("Updated subtask {id}"))
            }
            Self::Delete { id } => {
                store.delete_subtask(&id)?;
                Reply::new(&json!({ "id": id }), format!("Deleted subtask {id}"))
            }
        }
    }
}
