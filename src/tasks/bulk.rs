//! Bulk dependency import.
//!
//! Lets a caller wire up a whole plan in one call instead of one
//! `pm dependency add` per edge.
//!
//! # JSON Format
//!
//! ```json
//! {
//!   "dependencies": [
//!     {"task": "build-3f2a", "depends_on": "design-91c0"},
//!     {"task": "release", "depends_on": "build"}
//!   ]
//! }
//! ```
//!
//! Identifiers may be task IDs or, when a project is given, task slugs within
//! that project. Each edge is added independently in its own transaction: a
//! rejected edge is reported in `errors` and does not stop the others.

use crate::error::{Error, Result};
use crate::tasks::dependencies::DependencyStore;
use crate::tasks::models::AddOutcome;
use crate::tasks::store::TaskStore;
use serde::{Deserialize, Serialize};

/// A batch of edges to import.
#[derive(Debug, Deserialize)]
pub struct BulkAddDepsInput {
    /// Edges in the order they should be added.
    pub dependencies: Vec<DependencyInput>,
}

/// One edge: `task` depends on `depends_on`.
#[derive(Debug, Deserialize)]
pub struct DependencyInput {
    /// The dependent task's ID or slug.
    pub task: String,
    /// The prerequisite's ID or slug.
    pub depends_on: String,
}

/// Tally of an import.
#[derive(Debug, Default, Serialize)]
pub struct BulkAddDepsOutput {
    /// Number of edges written.
    pub added: usize,
    /// Number of dependencies that already existed.
    pub already_present: usize,
    /// Any errors that occurred, one per rejected edge.
    pub errors: Vec<String>,
}

/// Add every dependency in `input`, collecting per-edge failures.
pub fn bulk_add_dependencies<S: TaskStore + DependencyStore>(
    store: &S,
    input: &BulkAddDepsInput,
    project: Option<&str>,
) -> BulkAddDepsOutput {
    let mut output = BulkAddDepsOutput::default();

    for dep in &input.dependencies {
        let result = store.resolve_task(&dep.task, project).and_then(|task| {
            let prerequisite = store.resolve_task(&dep.depends_on, project)?;
            store.add_dependency(&task.id, &prerequisite.id)
        });

        match result {
            Ok(AddOutcome::Added) => output.added += 1,
            Ok(AddOutcome::AlreadyPresent) => output.already_present += 1,
            Err(e) => output.errors.push(format!("{} -> {}: {e}", dep.task, dep.depends_on)),
        }
    }

    output
}

/// Parse `json` and add the dependencies it lists.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the JSON is invalid. Failures of individual edges are
/// reported in the output instead.
pub fn add_deps_from_json<S: TaskStore + DependencyStore>(
    store: &S,
    json: &str,
    project: Option<&str>,
) -> Result<BulkAddDepsOutput> {
    let input: BulkAddDepsInput = serde_json::from_str(json)
        .map_err(|e| Error::InvalidArgument(format!("invalid dependency import: {e}")))?;
    Ok(bulk_add_dependencies(store, &input, project))
}
