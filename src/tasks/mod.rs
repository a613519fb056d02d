//! Project and task tracking.
//!
//! This module provides:
//! - Projects, and tasks that each belong to exactly one project
//! - Dependencies between tasks, kept acyclic on every insert
//! - Status transitions gated on prerequisites and required subtasks
//! - Subtasks, typed metadata and notes attached to tasks
//! - Audit logging for all mutations
//!
//! # Example
//!
//! ```no_run
//! use pm::tasks::{DependencyStore, NewTask, SqliteTaskStore, TaskStore};
//!
//! let store = SqliteTaskStore::new("/tmp/pm.db").unwrap();
//! let project = store.create_project("Website", None, None).unwrap();
//!
//! let new_task = |name: &str| NewTask {
//!     project_id: project.id.clone(),
//!     name: name.to_string(),
//!     description: None,
//!     status: None,
//! };
//! let design = store.create_task(new_task("Design")).unwrap();
//! let build = store.create_task(new_task("Build")).unwrap();
//!
//! // Build cannot start until Design is done.
//! store.add_dependency(&build.id, &design.id).unwrap();
//!
//! // The reverse edge would close a cycle and is rejected.
//! assert!(store.add_dependency(&design.id, &build.id).is_err());
//! ```

pub mod bulk;
pub mod dependencies;
pub mod graph;
pub mod id;
pub mod metadata;
pub mod models;
pub mod notes;
pub mod store;
pub mod subtasks;

pub use dependencies::DependencyStore;
pub use graph::DependencyGraph;
pub use metadata::MetadataStore;
pub use models::{
    AddOutcome, AuditEntry, DependencyEdge, InvalidStatus, MetadataType, MetadataValue, Note,
    NoteEntity, Project, ProjectStatus, RemoveOutcome, Subtask, Task, TaskMetadata, TaskStatus,
};
pub use notes::NoteStore;
pub use store::{
    NewTask, ProjectUpdate, SqliteTaskStore, StoreOptions, TaskFilter, TaskStore, TaskUpdate,
};
pub use subtasks::{SubtaskStore, SubtaskUpdate};
