//! Command-line interface for `pm`.
//!
//! This module provides the clap-based CLI structure and command dispatch.
//! Every command prints a single JSON envelope on stdout, so the binary can
//! be driven by scripts and AI assistants without screen scraping.

mod dependency;
mod metadata;
mod note;
mod project;
mod run;
mod subtask;
mod task;


pub use dependency::DependencyCommand;
pub use metadata::MetadataCommand;
pub use note::NoteCommand;
pub use project::ProjectCommand;
pub use run::{run, CliOutput};
pub use subtask::SubtaskCommand;
pub use task::TaskCommand;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Project and task tracking with a cycle-checked dependency graph.
#[derive(Parser, Debug)]
#[command(name = "pm")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the database file (overrides `PM_DB_PATH` and `.pm/` discovery)
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// The command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create `.pm/pm.db` and `.pm/config.yaml` in the current directory.
    Init,

    /// Manage projects.
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage tasks.
    #[command(subcommand)]
    Task(TaskCommand),

    /// Manage dependencies between tasks.
    #[command(subcommand, alias = "dep")]
    Dependency(DependencyCommand),

    /// Manage subtasks (checklist items under a task).
    #[command(subcommand)]
    Subtask(SubtaskCommand),

    /// Manage typed key/value metadata on tasks.
    #[command(subcommand, alias = "meta")]
    Metadata(MetadataCommand),

    /// Manage notes on projects and tasks.
    #[command(subcommand)]
    Note(NoteCommand),

    /// Show the audit log of mutations, newest first.
    #[command(name = "audit-log")]
    AuditLog {
        /// Only show entries for this project, task, subtask or note ID
        #[arg(long)]
        entity: Option<String>,

        /// Maximum number of entries to show
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show version information.
    Version,
}

impl Command {
    /// Returns true if this command reads its input from stdin.
    ///
    /// The binary only reads stdin for these, so interactive use never blocks.
    #[must_use]
    pub const fn needs_stdin(&self) -> bool {
        matches!(self, Self::Dependency(DependencyCommand::Import { .. }))
    }

    /// Name of the command as typed, used for the command log.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Project(cmd) => cmd.name(),
            Self::Task(cmd) => cmd.name(),
            Self::Dependency(cmd) => cmd.name(),
            Self::Subtask(cmd) => cmd.name(),
            Self::Metadata(cmd) => cmd.name(),
            Self::Note(cmd) => cmd.name(),
            Self::AuditLog { .. } => "audit-log",
            Self::Version => "version",
        }
    }
}
