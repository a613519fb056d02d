//! Error types for `pm`.

use serde::Serialize;
use std::fmt;

/// The kind of record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// A project.
    Project,
    /// A task.
    Task,
    /// A subtask.
    Subtask,
    /// A note.
    Note,
    /// A task metadata entry.
    Metadata,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Project => "project",
            Self::Task => "task",
            Self::Subtask => "subtask",
            Self::Note => "note",
            Self::Metadata => "metadata",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while managing projects and tasks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON parsing error occurred.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error occurred.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A `SQLite` database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What kind of record was looked up.
        entity: Entity,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// An argument was rejected before touching the database.
    #[error("{0}")]
    InvalidArgument(String),

    /// Adding a dependency would close a cycle in the dependency graph.
    #[error(
        "adding dependency {task_id} -> {depends_on} would create a cycle: {}",
        describe_cycle(.task_id, .path)
    )]
    CycleDetected {
        /// The task that would gain the dependency.
        task_id: String,
        /// The task that would be depended on.
        depends_on: String,
        /// Existing chain of prerequisites leading from `depends_on` back to `task_id`.
        path: Vec<String>,
    },

    /// A record that must be unique already exists.
    #[error("{0}")]
    AlreadyExists(String),

    /// A status change is not allowed from the current state.
    #[error("{0}")]
    InvalidTransition(String),
}

fn cycle_nodes<'a>(task_id: &'a str, path: &'a [String]) -> Vec<&'a str> {
    let mut nodes = Vec::with_capacity(path.len() + 1);
    nodes.push(task_id);
    nodes.extend(path.iter().map(String::as_str));
    nodes
}

fn describe_cycle(task_id: &str, path: &[String]) -> String {
    cycle_nodes(task_id, path).join(" -> ")
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] error.
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    /// Structured fields for errors that name specific records.
    ///
    /// Cycle errors carry both endpoints and the full loop; not-found errors
    /// carry the entity kind and the identifier as given.
    #[must_use]
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::CycleDetected { task_id, depends_on, path } => Some(serde_json::json!({
                "task_id": task_id,
                "depends_on": depends_on,
                "cycle": cycle_nodes(task_id, path),
            })),
            Self::NotFound { entity, id } => {
                Some(serde_json::json!({ "entity": entity.to_string(), "id": id }))
            }
            _ => None,
        }
    }

    /// Classify this error for callers that branch on the failure mode.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::CycleDetected { .. } => ErrorKind::CycleDetected,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::Io(_) | Self::Json(_) | Self::Yaml(_) | Self::Database(_) => {
                ErrorKind::StorageError
            }
        }
    }
}

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A referenced identifier does not exist.
    NotFound,
    /// The request was malformed or violates a policy.
    InvalidArgument,
    /// The requested dependency would create a cycle.
    CycleDetected,
    /// A unique record already exists.
    AlreadyExists,
    /// A status change is not allowed.
    InvalidTransition,
    /// The underlying store failed; the transaction was rolled back.
    StorageError,
}

impl ErrorKind {
    /// Stable snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::CycleDetected => "cycle_detected",
            Self::AlreadyExists => "already_exists",
            Self::InvalidTransition => "invalid_transition",
            Self::StorageError => "storage_error",
        }
    }

    /// Process exit code used by the CLI.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::StorageError => 1,
            Self::NotFound => 3,
            Self::InvalidArgument => 4,
            Self::CycleDetected => 5,
            Self::AlreadyExists => 6,
            Self::InvalidTransition => 7,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_the_full_loop() {
        let err = Error::CycleDetected {
            task_id: "t1".to_string(),
            depends_on: "t3".to_string(),
            path: vec!["t3".to_string(), "t2".to_string(), "t1".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("t1 -> t3 would create a cycle"));
        assert!(msg.ends_with("t1 -> t3 -> t2 -> t1"));
        assert_eq!(err.kind(), ErrorKind::CycleDetected);
    }

    #[test]
    fn test_details_name_the_records_involved() {
        let err = Error::CycleDetected {
            task_id: "a".to_string(),
            depends_on: "b".to_string(),
            path: vec!["b".to_string(), "a".to_string()],
        };
        let expected = serde_json::json!({
            "task_id": "a",
            "depends_on": "b",
            "cycle": ["a", "b", "a"],
        });
        assert_eq!(err.details(), Some(expected));

        let err = Error::not_found(Entity::Subtask, "gone");
        assert_eq!(err.details(), Some(serde_json::json!({"entity": "subtask", "id": "gone"})));
        assert_eq!(Error::InvalidArgument("bad".to_string()).details(), None);
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found(Entity::Task, "missing-0001");
        assert_eq!(err.to_string(), "task not found: missing-0001");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_storage_errors_share_a_kind() {
        let err = Error::from(std::io::Error::other("disk full"));
        assert_eq!(err.kind(), ErrorKind::StorageError);
        assert_eq!(err.kind().exit_code(), 1);
    }

    #[test]
    fn test_exit_codes_are_non_zero() {
        for kind in [
            ErrorKind::NotFound,
            ErrorKind::InvalidArgument,
            ErrorKind::CycleDetected,
            ErrorKind::AlreadyExists,
            ErrorKind::InvalidTransition,
            ErrorKind::StorageError,
        ] {
            assert_ne!(kind.exit_code(), 0, "{kind}");
        }
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::CycleDetected).unwrap();
        assert_eq!(json, "\"cycle_detected\"");
    }
}
