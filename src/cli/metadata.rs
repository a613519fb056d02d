//! Metadata CLI subcommands.

use crate::cli::run::Reply;
use crate::error::Result;
use crate::tasks::{MetadataStore, MetadataType, MetadataValue, SqliteTaskStore, TaskStore};
use clap::Subcommand;
use serde_json::json;

/// Task metadata commands.
///
/// Values are typed. Without `--type` the type is detected from the value:
/// int, float, datetime, bool and JSON are tried in that order before
/// falling back to a string.
#[derive(Subcommand, Debug, Clone)]
pub enum MetadataCommand {
    /// Set a key on a task, replacing any previous value.
    Set {
        /// Task ID or slug
        task: String,

        /// Metadata key
        key: String,

        /// Value
        value: String,

        /// Value type: string, int, float, datetime, bool, json
        #[arg(short = 't', long = "type")]
        value_type: Option<String>,

        /// Project ID or slug for resolving the task slug
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Show one key, or every key when none is given.
    Get {
        /// Task ID or slug
        task: String,

        /// Metadata key
        key: Option<String>,

        /// Project ID or slug for resolving the task slug
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Delete a key from a task.
    Delete {
        /// Task ID or slug
        task: String,

        /// Metadata key
        key: String,

        /// Project ID or slug for resolving the task slug
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Find tasks whose key has the given value.
    Query {
        /// Metadata key
        key: String,

        /// Value to match, interpreted with each entry's stored type
        value: String,
    },
}

impl MetadataCommand {
    pub(super) const fn name(&self) -> &'static str {
        match self {
            Self::Set { .. } => "metadata set",
            Self::Get { .. } => "metadata get",
            Self::Delete { .. } => "metadata delete",
            Self::Query { .. } => "metadata query",
        }
    }

    pub(super) fn execute(self, store: &SqliteTaskStore) -> Result<Reply> {
        match self {
            Self::Set { task, key, value, value_type, project } => {
                let task_id = store.resolve_task(&task, project.as_deref())?.id;
                let value_type = value_type.as_deref().map(MetadataType::from_str).transpose()?;
                let value = MetadataValue::parse(&value, value_type)?;
                let entry = store.set_metadata(&task_id, &key, value)?;
                let message =
                    format!("Set {key} on {task_id} ({})", entry.value.value_type().as_str());
                Reply::new(&entry, message)
            }
            Self::Get { task, key: Some(key), project } => {
                let task_id = store.resolve_task(&task, project.as_deref())?.id;
                let entry = store.get_metadata(&task_id, &key)?;
                let message = format!("{key} = {}", entry.value.to_text());
                Reply::new(&entry, message)
            }
            Self::Get { task, key: None, project } => {
                let task_id = store.resolve_task(&task, project.as_deref())?.id;
                let entries = store.list_metadata(&task_id)?;
                let message = format!("{task_id} has {} metadata key(s)", entries.len());
                Reply::new(&entries, message)
            }
            Self::Delete { task, key, project } => {
                let task_id = store.resolve_task(&task, project.as_deref())?.id;
                store.delete_metadata(&task_id, &key)?;
                let message = format!("Deleted {key} from {task_id}");
                Reply::new(&json!({ "task_id": task_id, "key": key }), message)
            }
            Self::Query { key, value } => {
                let tasks = store.query_tasks_by_metadata(&key, &value)?;
                let message = format!("{} task(s) with {key} = {value}", tasks.len());
                Reply::new(&tasks, message)
            }
        }
    }
}
