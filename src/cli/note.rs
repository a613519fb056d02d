//! Note CLI subcommands.

use crate::cli::run::Reply;
use crate::error::{Error, Result};
use crate::tasks::{NoteEntity, NoteStore, SqliteTaskStore, TaskStore};
use clap::Subcommand;
use serde_json::json;

/// Note commands.
///
/// Notes attach free-form text to a project (`--project`) or to a task
/// (`--task`, with `--project` to resolve a task slug).
#[derive(Subcommand, Debug, Clone)]
pub enum NoteCommand {
    /// Add a note.
    Add {
        /// Note content
        content: String,

        /// Attach to this task
        #[arg(short, long)]
        task: Option<String>,

        /// Attach to this project, or resolve the task slug within it
        #[arg(short, long)]
        project: Option<String>,

        /// Who wrote the note
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Show a note.
    Get {
        /// Note ID
        id: i64,
    },

    /// List notes on a project or task, oldest first.
    List {
        /// Notes on this task
        #[arg(short, long)]
        task: Option<String>,

        /// Notes on this project, or resolve the task slug within it
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Update a note's content or author.
    Update {
        /// Note ID
        id: i64,

        /// New content
        #[arg(short, long)]
        content: Option<String>,

        /// New author
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Delete a note.
    Delete {
        /// Note ID
        id: i64,
    },
}

impl NoteCommand {
    pub(super) const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "note add",
            Self::Get { .. } => "note get",
            Self::List { .. } => "note list",
            Self::Update { .. } => "note update",
            Self::Delete { .. } => "note delete",
        }
    }

    pub(super) fn execute(self, store: &SqliteTaskStore) -> Result<Reply> {
        match self {
            Self::Add { content, task, project, author } => {
                let (entity_type, entity_id) = note_target(store, task, project)?;
                let note = store.add_note(entity_type, &entity_id, &content, author.as_deref())?;
                let message =
                    format!("Added note {} to {} {entity_id}", note.id, entity_type.as_str());
                Reply::new(&note, message)
            }
            Self::Get { id } => {
                let note = store.get_note(id)?;
                Reply::new(&note, format!("Note {id}"))
            }
            Self::List { task, project } => {
                let (entity_type, entity_id) = note_target(store, task, project)?;
                let notes = store.list_notes(entity_type, &entity_id)?;
                let message =
                    format!("{} {entity_id} has {} note(s)", entity_type.as_str(), notes.len());
                Reply::new(&notes, message)
            }
            Self::Update { id, content, author } => {
                if content.is_none() && author.is_none() {
                    return Err(Error::InvalidArgument(
                        "nothing to update: pass --content and/or --author".to_string(),
                    ));
                }
                let note = store.update_note(id, content.as_deref(), author.as_deref())?;
                Reply::new(&note, format!("Updated note {id}"))
            }
            Self::Delete { id } => {
                store.delete_note(id)?;
                Reply::new(&json!({ "id": id }), format!("Deleted note {id}"))
            }
        }
    }
}

/// Work out which record `--task` / `--project` name.
fn note_target(
    store: &SqliteTaskStore,
    task: Option<String>,
    project: Option<String>,
) -> Result<(NoteEntity, String)> {
    match (task, project) {
        (Some(task), project) => {
            Ok((NoteEntity::Task, store.resolve_task(&task, project.as_deref())?.id))
        }
        (None, Some(project)) => Ok((NoteEntity::Project, store.resolve_project(&project)?.id)),
        (None, None) => {
            Err(Error::InvalidArgument("pass --task or --project to choose a target".to_string()))
        }
    }
}
