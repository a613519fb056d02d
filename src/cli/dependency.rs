//! Dependency CLI subcommands.
//!
//! A dependency `task --depends-on prerequisite` means the task cannot be
//! started or completed until the prerequisite is closed. Every add is
//! checked against the whole graph and rejected if it would close a cycle.

use crate::cli::run::Reply;
use crate::error::{Entity, Error, Result};
use crate::tasks::bulk::add_deps_from_json;
use crate::tasks::{AddOutcome, DependencyStore, RemoveOutcome, SqliteTaskStore, TaskStore};
use clap::Subcommand;
use serde_json::json;

/// Dependency management commands.
///
/// With `--project`, task identifiers may be slugs within that project.
///
/// ## Import Format
///
/// `pm dependency import` reads JSON from stdin:
///
/// ```json
/// {"dependencies": [{"task": "build", "depends_on": "design"}]}
/// ```
#[derive(Subcommand, Debug, Clone)]
pub enum DependencyCommand {
    /// Make a task depend on a prerequisite.
    ///
    /// Adding an edge that already exists succeeds without changes.
    Add {
        /// The dependent task
        task: String,

        /// The prerequisite task
        #[arg(long)]
        depends_on: String,

        /// Project ID or slug for resolving slugs
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Remove a dependency. Removing a missing edge is not an error.
    Remove {
        /// The dependent task
        task: String,

        /// The prerequisite task
        #[arg(long)]
        depends_on: String,

        /// Project ID or slug for resolving slugs
        #[arg(short, long)]
        project: Option<String>,
    },

    /// List a task's direct prerequisites, ordered by ID.
    List {
        /// Task ID or slug
        task: String,

        /// Project ID or slug for resolving slugs
        #[arg(short, long)]
        project: Option<String>,
    },

    /// List the tasks that directly depend on a task.
    Dependents {
        /// Task ID or slug
        task: String,

        /// Project ID or slug for resolving slugs
        #[arg(short, long)]
        project: Option<String>,
    },

    /// List a task's prerequisites that are not yet completed or abandoned.
    Blockers {
        /// Task ID or slug
        task: String,

        /// Project ID or slug for resolving slugs
        #[arg(short, long)]
        project: Option<String>,
    },

    /// List every dependency edge and check the graph is acyclic.
    Edges,

    /// Add many dependencies from JSON on stdin.
    Import {
        /// Project ID or slug for resolving slugs
        #[arg(short, long)]
        project: Option<String>,
    },
}

impl DependencyCommand {
    pub(super) const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "dependency add",
            Self::Remove { .. } => "dependency remove",
            Self::List { .. } => "dependency list",
            Self::Dependents { .. } => "dependency dependents",
            Self::Blockers { .. } => "dependency blockers",
            Self::Edges => "dependency edges",
            Self::Import { .. } => "dependency import",
        }
    }

    pub(super) fn execute(self, store: &SqliteTaskStore, stdin: &str) -> Result<Reply> {
        match self {
            Self::Add { task, depends_on, project } => {
                let task_id = store.resolve_task(&task, project.as_deref())?.id;
                let depends_on = store.resolve_task(&depends_on, project.as_deref())?.id;
                let outcome = store.add_dependency(&task_id, &depends_on)?;
                let message = match outcome {
                    AddOutcome::Added => format!("{task_id} now depends on {depends_on}"),
                    AddOutcome::AlreadyPresent => {
                        format!("{task_id} already depends on {depends_on}")
                    }
                };
                let data = json!({
                    "task_id": task_id,
                    "depends_on": depends_on,
                    "outcome": outcome,
                });
                Reply::new(&data, message)
            }
            Self::Remove { task, depends_on, project } => {
                let task_id = resolve_or_raw(store, &task, project.as_deref())?;
                let depends_on = resolve_or_raw(store, &depends_on, project.as_deref())?;
                let outcome = store.remove_dependency(&task_id, &depends_on)?;
                let message = match outcome {
                    RemoveOutcome::Removed => {
                        format!("{task_id} no longer depends on {depends_on}")
                    }
                    RemoveOutcome::NotFound => {
                        format!("no dependency {task_id} -> {depends_on} to remove")
                    }
                };
                let data = json!({
                    "task_id": task_id,
                    "depends_on": depends_on,
                    "outcome": outcome,
                });
                Reply::new(&data, message)
            }
            Self::List { task, project } => {
                let task_id = store.resolve_task(&task, project.as_deref())?.id;
                let prerequisites = store.list_prerequisites(&task_id)?;
                let message = format!("{task_id} has {} prerequisite(s)", prerequisites.len());
                Reply::new(&prerequisites, message)
            }
            Self::Dependents { task, project } => {
                let task_id = store.resolve_task(&task, project.as_deref())?.id;
                let dependents = store.list_dependents(&task_id)?;
                let message = format!("{} task(s) depend on {task_id}", dependents.len());
                Reply::new(&dependents, message)
            }
            Self::Blockers { task, project } => {
                let task_id = store.resolve_task(&task, project.as_deref())?.id;
                let blockers = store.incomplete_prerequisites(&task_id)?;
                let message = if blockers.is_empty() {
                    format!("{task_id} is not blocked")
                } else {
                    format!("{task_id} is blocked by {} task(s)", blockers.len())
                };
                Reply::new(&blockers, message)
            }
            Self::Edges => {
                let edges = store.list_edges()?;
                let acyclic = !store.dependency_graph()?.has_cycle();
                let message = format!("{} dependency edge(s)", edges.len());
                Reply::new(&json!({ "edges": edges, "acyclic": acyclic }), message)
            }
            Self::Import { project } => {
                let output = add_deps_from_json(store, stdin, project.as_deref())?;
                let message = format!(
                    "Added {} dependency(ies), {} already present, {} failed",
                    output.added,
                    output.already_present,
                    output.errors.len()
                );
                let warnings = output.errors.clone();
                Ok(Reply::new(&output, message)?.with_warnings(warnings))
            }
        }
    }
}

/// Resolve a task for removal, keeping the identifier as typed when no such
/// task exists so that removing a stale edge still reports `not_found`.
fn resolve_or_raw(store: &SqliteTaskStore, ident: &str, project: Option<&str>) -> Result<String> {
    match store.resolve_task(ident, project) {
        Ok(task) => Ok(task.id),
        Err(Error::NotFound { entity: Entity::Task, .. }) => Ok(ident.to_string()),
        Err(e) => Err(e),
    }
}
