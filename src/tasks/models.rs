//! Record types for projects, tasks and everything attached to them.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Maximum length of a project, task or subtask name.
pub const MAX_NAME_LEN: usize = 100;

/// Trim a name and check it is 1-100 characters long.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for empty or overlong names.
pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument("name must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    /// Work is under way.
    #[default]
    Active,
    /// Planned but not started.
    Prospective,
    /// Finished.
    Completed,
    /// Kept for reference only.
    Archived,
    /// Dropped.
    Cancelled,
}

impl ProjectStatus {
    /// Parse a status from a string (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid status.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> std::result::Result<Self, InvalidStatus> {
        match normalize(s).as_str() {
            "ACTIVE" => Ok(Self::Active),
            "PROSPECTIVE" => Ok(Self::Prospective),
            "COMPLETED" => Ok(Self::Completed),
            "ARCHIVED" => Ok(Self::Archived),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(InvalidStatus {
                value: s.to_string(),
                allowed: "ACTIVE, PROSPECTIVE, COMPLETED, ARCHIVED, CANCELLED",
            }),
        }
    }

    /// Get the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Prospective => "PROSPECTIVE",
            Self::Completed => "COMPLETED",
            Self::Archived => "ARCHIVED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task (and subtask) status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Nobody has picked the task up yet.
    #[default]
    NotStarted,
    /// Being worked on.
    InProgress,
    /// Waiting on something outside the task.
    Blocked,
    /// Set aside for now.
    Paused,
    /// Done.
    Completed,
    /// Will not be done.
    Abandoned,
}

impl TaskStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::NotStarted,
        Self::InProgress,
        Self::Blocked,
        Self::Paused,
        Self::Completed,
        Self::Abandoned,
    ];

    /// Parse a status from a string (case-insensitive, `-` or `_` separated).
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid status.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> std::result::Result<Self, InvalidStatus> {
        match normalize(s).as_str() {
            "NOT_STARTED" => Ok(Self::NotStarted),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "BLOCKED" => Ok(Self::Blocked),
            "PAUSED" => Ok(Self::Paused),
            "COMPLETED" => Ok(Self::Completed),
            "ABANDONED" => Ok(Self::Abandoned),
            _ => Err(InvalidStatus {
                value: s.to_string(),
                allowed: "NOT_STARTED, IN_PROGRESS, BLOCKED, PAUSED, COMPLETED, ABANDONED",
            }),
        }
    }

    /// Get the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Blocked => "BLOCKED",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Abandoned => "ABANDONED",
        }
    }

    /// Completed or abandoned.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    /// Whether a task may move from `self` to `next`.
    ///
    /// Staying in the same status is not a transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use TaskStatus::{Abandoned, Blocked, Completed, InProgress, NotStarted, Paused};
        matches!(
            (self, next),
            (NotStarted, InProgress | Abandoned)
                | (InProgress, Completed | Blocked | Paused | Abandoned)
                | (Blocked, InProgress | Abandoned)
                | (Paused, InProgress | Blocked | Abandoned)
        )
    }

    /// Entering this status requires every prerequisite to be closed.
    #[must_use]
    pub const fn requires_closed_prerequisites(self) -> bool {
        matches!(self, Self::InProgress | Self::Completed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn normalize(s: &str) -> String {
    s.trim().replace('-', "_").to_ascii_uppercase()
}

/// Error when an invalid status string is provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidStatus {
    /// The rejected input.
    pub value: String,
    /// Human-readable list of accepted values.
    pub allowed: &'static str,
}

impl std::fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid status: '{}' (must be one of: {})",
            self.value, self.allowed
        )
    }
}

impl std::error::Error for InvalidStatus {}

impl From<InvalidStatus> for Error {
    fn from(err: InvalidStatus) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// A project groups tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier (slug from name + 4 random hex chars).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Unique across all projects.
    pub slug: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: ProjectStatus,
    /// ISO 8601 timestamp when the project was created.
    pub created_at: String,
    /// ISO 8601 timestamp when the project was last updated.
    pub updated_at: String,
}

/// A task belongs to exactly one project and is a node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (slug from name + 4 random hex chars).
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Display name.
    pub name: String,
    /// Unique within the owning project.
    pub slug: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Current status.
    pub status: TaskStatus,
    /// ISO 8601 timestamp when the task was created.
    pub created_at: String,
    /// ISO 8601 timestamp when the task was last updated.
    pub updated_at: String,
}

impl Task {
    /// Check if the task is complete or abandoned (terminal states).
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.status.is_closed()
    }
}

/// A checklist item inside a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    /// Unique identifier.
    pub id: String,
    /// Owning task.
    pub task_id: String,
    /// Display name.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Whether the owning task can only complete once this is completed.
    pub required_for_completion: bool,
    /// Current status.
    pub status: TaskStatus,
    /// ISO 8601 timestamp when the subtask was created.
    pub created_at: String,
    /// ISO 8601 timestamp when the subtask was last updated.
    pub updated_at: String,
}

/// What a note is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteEntity {
    /// Attached to a project.
    Project,
    /// Attached to a task.
    Task,
}

impl NoteEntity {
    /// Get the string representation stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Task => "task",
        }
    }

    /// Parse the stored representation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for anything other than `project` or `task`.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "task" => Ok(Self::Task),
            _ => Err(Error::InvalidArgument(format!(
                "invalid note target: '{s}' (must be project or task)"
            ))),
        }
    }
}

/// A free-form note attached to a project or task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier for the note.
    pub id: i64,
    /// Kind of record the note is attached to.
    pub entity_type: NoteEntity,
    /// ID of the record the note is attached to.
    pub entity_id: String,
    /// Note content.
    pub content: String,
    /// Who wrote it.
    pub author: Option<String>,
    /// ISO 8601 timestamp when the note was created.
    pub created_at: String,
    /// ISO 8601 timestamp when the note was last updated.
    pub updated_at: String,
}

/// Declared type of a metadata value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataType {
    /// Plain text.
    String,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// ISO 8601 date or date-time.
    Datetime,
    /// `true` or `false`.
    Bool,
    /// Arbitrary JSON document.
    Json,
}

impl MetadataType {
    /// Get the string representation stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Datetime => "datetime",
            Self::Bool => "bool",
            Self::Json => "json",
        }
    }

    /// Parse a type name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for unknown type names.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(Self::String),
            "int" | "integer" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "datetime" | "date" => Ok(Self::Datetime),
            "bool" | "boolean" => Ok(Self::Bool),
            "json" => Ok(Self::Json),
            _ => Err(Error::InvalidArgument(format!(
                "invalid metadata type: '{s}' (must be one of: string, int, float, datetime, bool, json)"
            ))),
        }
    }
}

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MetadataValue {
    /// Plain text.
    String(String),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// Date-time kept in the textual form it was given in.
    Datetime(String),
    /// Boolean.
    Bool(bool),
    /// JSON document.
    Json(serde_json::Value),
}

impl MetadataValue {
    /// Parse a raw string, either as the given type or by auto-detection.
    ///
    /// Auto-detection tries int, float, datetime, bool and JSON (objects and
    /// arrays only) in that order, falling back to a string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `raw` does not parse as the
    /// requested type.
    pub fn parse(raw: &str, value_type: Option<MetadataType>) -> Result<Self> {
        let Some(value_type) = value_type else {
            return Ok(Self::detect(raw));
        };
        let bad = || {
            Error::InvalidArgument(format!(
                "value '{raw}' is not a valid {}",
                value_type.as_str()
            ))
        };
        match value_type {
            MetadataType::String => Ok(Self::String(raw.to_string())),
            MetadataType::Int => raw.trim().parse().map(Self::Int).map_err(|_| bad()),
            MetadataType::Float => raw.trim().parse().map(Self::Float).map_err(|_| bad()),
            MetadataType::Datetime => {
                if is_datetime(raw.trim()) {
                    Ok(Self::Datetime(raw.trim().to_string()))
                } else {
                    Err(bad())
                }
            }
            MetadataType::Bool => parse_bool(raw).map(Self::Bool).ok_or_else(bad),
            MetadataType::Json => serde_json::from_str(raw).map(Self::Json).map_err(|_| bad()),
        }
    }

    fn detect(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        if is_datetime(trimmed) {
            return Self::Datetime(trimmed.to_string());
        }
        if let Some(b) = parse_bool(trimmed) {
            return Self::Bool(b);
        }
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(v) = serde_json::from_str(trimmed) {
                return Self::Json(v);
            }
        }
        Self::String(raw.to_string())
    }

    /// The declared type of this value.
    #[must_use]
    pub const fn value_type(&self) -> MetadataType {
        match self {
            Self::String(_) => MetadataType::String,
            Self::Int(_) => MetadataType::Int,
            Self::Float(_) => MetadataType::Float,
            Self::Datetime(_) => MetadataType::Datetime,
            Self::Bool(_) => MetadataType::Bool,
            Self::Json(_) => MetadataType::Json,
        }
    }

    /// Canonical text form, used for storage in the string column and for
    /// equality queries.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) | Self::Datetime(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Json(v) => v.to_string(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn is_datetime(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// A metadata entry on a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Owning task.
    pub task_id: String,
    /// Key, unique per task.
    pub key: String,
    /// Typed value.
    #[serde(flatten)]
    pub value: MetadataValue,
    /// ISO 8601 timestamp when the entry was created.
    pub created_at: String,
    /// ISO 8601 timestamp when the entry was last updated.
    pub updated_at: String,
}

/// A stored dependency edge: `task_id` depends on `depends_on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// The dependent task.
    pub task_id: String,
    /// The prerequisite task.
    pub depends_on: String,
    /// ISO 8601 timestamp when the edge was created.
    pub created_at: String,
}

/// Result of adding a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    /// A new edge was written.
    Added,
    /// The edge already existed; nothing changed.
    AlreadyPresent,
}

/// Result of removing a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveOutcome {
    /// The edge was deleted.
    Removed,
    /// There was no such edge.
    NotFound,
}

/// An entry in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique identifier for the entry.
    pub id: i64,
    /// ISO 8601 timestamp when the operation occurred.
    pub timestamp: String,
    /// Type of operation (e.g., `create_task`, `add_dependency`).
    pub operation: String,
    /// ID of the affected record (if applicable).
    pub entity_id: Option<String>,
    /// Previous value (JSON serialized, if applicable).
    pub old_value: Option<String>,
    /// New value (JSON serialized, if applicable).
    pub new_value: Option<String>,
    /// Additional details about the operation.
    pub details: Option<String>,
}
