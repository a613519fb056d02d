//! Project CLI subcommands.

use crate::cli::run::Reply;
use crate::error::Result;
use crate::tasks::{
    NoteEntity, NoteStore, ProjectStatus, ProjectUpdate, SqliteTaskStore, TaskFilter, TaskStore,
};
use clap::Subcommand;
use serde_json::json;

/// Project management commands.
///
/// Projects group tasks. Anywhere a project is expected, its ID or its slug
/// may be given.
#[derive(Subcommand, Debug, Clone)]
pub enum ProjectCommand {
    /// Create a new project.
    Create {
        /// Project name (1-100 characters)
        name: String,

        /// Longer description
        #[arg(short, long)]
        description: Option<String>,

        /// Initial status: ACTIVE (default), PROSPECTIVE, COMPLETED, ARCHIVED, CANCELLED
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show a project with its tasks and notes.
    Get {
        /// Project ID or slug
        project: String,
    },

    /// List projects ordered by name.
    List {
        /// Only show projects with this status
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Update a project's fields.
    ///
    /// Only specified fields are updated; others remain unchanged. Renaming
    /// a project also changes its slug.
    Update {
        /// Project ID or slug
        project: String,

        /// New name
        #[arg(short, long)]
        name: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// New status
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Delete a project.
    Delete {
        /// Project ID or slug
        project: String,

        /// Also delete the project's tasks
        #[arg(long)]
        force: bool,
    },
}

impl ProjectCommand {
    pub(super) const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "project create",
            Self::Get { .. } => "project get",
            Self::List { .. } => "project list",
            Self::Update { .. } => "project update",
            Self::Delete { .. } => "project delete",
        }
    }

    pub(super) fn execute(self, store: &SqliteTaskStore) -> Result<Reply> {
        match self {
            Self::Create { name, description, status } => {
                let status = status.as_deref().map(ProjectStatus::from_str).transpose()?;
                let project = store.create_project(&name, description.as_deref(), status)?;
                let message = format!("Created project {}", project.id);
                Reply::new(&project, message)
            }
            Self::Get { project } => {
                let project = store.resolve_project(&project)?;
                let tasks = store.list_tasks(TaskFilter {
                    project_id: Some(project.id.clone()),
                    include_completed: true,
                    include_abandoned: true,
                    include_inactive_project_tasks: true,
                    ..TaskFilter::default()
                })?;
                let notes = store.list_notes(NoteEntity::Project, &project.id)?;
                let message = format!("Project {} has {} task(s)", project.id, tasks.len());
                Reply::new(&json!({ "project": project, "tasks": tasks, "notes": notes }), message)
            }
            Self::List { status } => {
                let status = status.as_deref().map(ProjectStatus::from_str).transpose()?;
                let projects = store.list_projects(status)?;
                let message = format!("{} project(s)", projects.len());
                Reply::new(&projects, message)
            }
            Self::Update { project, name, description, status } => {
                let id = store.resolve_project(&project)?.id;
                let status = status.as_deref().map(ProjectStatus::from_str).transpose()?;
                let updated =
                    store.update_project(&id, ProjectUpdate { name, description, status })?;
                Reply::new(&updated, format!("Updated project {id}"))
            }
            Self::Delete { project, force } => {
                let id = store.resolve_project(&project)?.id;
                store.delete_project(&id, force)?;
                Reply::new(&json!({ "id": id }), format!("Deleted project {id}"))
            }
        }
    }
}
