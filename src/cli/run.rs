//! Command execution for the CLI.
//!
//! Each command produces a [`Reply`] or an [`Error`]; this module wraps
//! either into the JSON envelope, picks the exit code and writes the
//! command log.

use crate::cli::{Cli, Command};
use crate::command_logging;
use crate::config::Config;
use crate::error::{Error, ErrorKind, Result};
use crate::paths;
use crate::tasks::{SqliteTaskStore, TaskStore};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::process::ExitCode;

/// Output from running the CLI, with separate stdout and stderr messages.
#[derive(Debug)]
pub struct CliOutput {
    /// Exit code for the process.
    pub exit_code: ExitCode,
    /// Messages to print to stdout.
    pub stdout: Vec<String>,
    /// Messages to print to stderr.
    pub stderr: Vec<String>,
}

/// The successful result of a command, before it is wrapped in the envelope.
#[derive(Debug)]
pub(super) struct Reply {
    data: Value,
    message: String,
    warnings: Vec<String>,
}

impl Reply {
    /// A reply carrying `data`.
    pub(super) fn new<T: Serialize>(data: &T, message: impl Into<String>) -> Result<Self> {
        Ok(Self { data: serde_json::to_value(data)?, message: message.into(), warnings: vec![] })
    }

    /// Attach non-fatal warnings.
    pub(super) fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Envelope {
    Success {
        data: Value,
        message: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

/// Run a parsed command line.
///
/// `stdin` is only consulted by commands for which
/// [`Command::needs_stdin`] is true. `cwd` anchors `.pm/` discovery and
/// relative paths.
pub fn run(cli: Cli, stdin: &str, cwd: &Path) -> CliOutput {
    let name = cli.command.name();
    let root = if matches!(cli.command, Command::Init) {
        cwd.to_path_buf()
    } else {
        paths::find_project_root(cwd).unwrap_or_else(|| cwd.to_path_buf())
    };

    let (config, result) = match Config::resolve(&root) {
        Ok(config) => {
            let result = execute(cli, stdin, cwd, &config);
            (config, result)
        }
        Err(e) => (Config::default(), Err(e)),
    };

    command_logging::log_command(&config, &root, name, result.as_ref().err().map(Error::kind));
    render(result)
}

fn execute(cli: Cli, stdin: &str, cwd: &Path, config: &Config) -> Result<Reply> {
    let db_path = cli.db_path.as_deref();
    match cli.command {
        Command::Version => Ok(run_version()),
        Command::Init => run_init(db_path, cwd, config),
        Command::Project(cmd) => cmd.execute(&open_store(db_path, cwd, config)?),
        Command::Task(cmd) => cmd.execute(&open_store(db_path, cwd, config)?),
        Command::Dependency(cmd) => cmd.execute(&open_store(db_path, cwd, config)?, stdin),
        Command::Subtask(cmd) => cmd.execute(&open_store(db_path, cwd, config)?),
        Command::Metadata(cmd) => cmd.execute(&open_store(db_path, cwd, config)?),
        Command::Note(cmd) => cmd.execute(&open_store(db_path, cwd, config)?),
        Command::AuditLog { entity, limit } => {
            run_audit_log(&open_store(db_path, cwd, config)?, entity.as_deref(), limit)
        }
    }
}

fn open_store(db_path: Option<&Path>, cwd: &Path, config: &Config) -> Result<SqliteTaskStore> {
    let path = paths::resolve_db_path(db_path, cwd);
    SqliteTaskStore::with_options(path, config.store_options())
}

// === Utility Commands ===

fn run_version() -> Reply {
    Reply {
        data: serde_json::json!({ "name": "pm", "version": crate::VERSION }),
        message: format!("pm v{}", crate::VERSION),
        warnings: vec![],
    }
}

#[derive(Serialize)]
struct InitResult {
    db_path: String,
    config_path: String,
    config_created: bool,
}

/// Initialize a database in `cwd` (or at `--db-path`).
///
/// Unlike other commands this never walks up to a parent `.pm/`, so a
/// nested directory can be given a database of its own.
fn run_init(explicit: Option<&Path>, cwd: &Path, config: &Config) -> Result<Reply> {
    let db_path = match explicit {
        Some(path) => paths::resolve_db_path(Some(path), cwd),
        None => paths::default_db_path(cwd),
    };
    if db_path.exists() {
        return Err(Error::AlreadyExists(format!(
            "already initialized: {} exists",
            db_path.display()
        )));
    }

    SqliteTaskStore::with_options(&db_path, config.store_options())?;

    let config_path = Config::config_path(cwd);
    let config_created = !config_path.exists();
    if config_created {
        Config::default().save_to(cwd)?;
    }

    let result = InitResult {
        db_path: db_path.display().to_string(),
        config_path: config_path.display().to_string(),
        config_created,
    };
    Reply::new(&result, format!("Initialized pm database at {}", db_path.display()))
}

fn run_audit_log(
    store: &SqliteTaskStore,
    entity: Option<&str>,
    limit: Option<usize>,
) -> Result<Reply> {
    let entries = store.get_audit_log(entity, limit)?;
    let message = format!("{} audit log entries", entries.len());
    Reply::new(&entries, message)
}

// === Output ===

fn render(result: Result<Reply>) -> CliOutput {
    match result {
        Ok(reply) => {
            let stderr = reply.warnings.iter().map(|w| format!("warning: {w}")).collect();
            let envelope = Envelope::Success {
                data: reply.data,
                message: reply.message,
                warnings: reply.warnings,
            };
            CliOutput { exit_code: ExitCode::SUCCESS, stdout: vec![to_json(&envelope)], stderr }
        }
        Err(e) => error_output(&e),
    }
}

fn error_output(error: &Error) -> CliOutput {
    let kind = error.kind();
    let envelope =
        Envelope::Error { kind, message: error.to_string(), details: error.details() };
    CliOutput {
        exit_code: ExitCode::from(kind.exit_code()),
        stdout: vec![to_json(&envelope)],
        stderr: vec![],
    }
}

fn to_json(envelope: &Envelope) -> String {
    serde_json::to_string_pretty(envelope).unwrap_or_else(|e| {
        serde_json::json!({
            "status": "error",
            "kind": ErrorKind::StorageError,
            "message": e.to_string(),
        })
        .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let reply = Reply::new(&vec!["a", "b"], "2 things").unwrap();
        let output = render(Ok(reply));
        assert_eq!(output.exit_code, ExitCode::SUCCESS);
        let json: Value = serde_json::from_str(&output.stdout[0]).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"], serde_json::json!(["a", "b"]));
        assert_eq!(json["message"], "2 things");
        assert!(json.get("warnings").is_none());
    }

    #[test]
    fn test_warnings_go_to_envelope_and_stderr() {
        let reply =
            Reply::new(&Value::Null, "done").unwrap().with_warnings(vec!["careful".to_string()]);
        let output = render(Ok(reply));
        let json: Value = serde_json::from_str(&output.stdout[0]).unwrap();
        assert_eq!(json["warnings"][0], "careful");
        assert_eq!(json["data"], Value::Null);
        assert_eq!(output.stderr, vec!["warning: careful".to_string()]);
    }

    #[test]
    fn test_error_envelope_uses_kind_exit_code() {
        let output = render(Err(Error::InvalidTransition("nope".to_string())));
        assert_eq!(output.exit_code, ExitCode::from(7));
        let json: Value = serde_json::from_str(&output.stdout[0]).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "invalid_transition");
        assert_eq!(json["message"], "nope");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_cycle_error_envelope_carries_details() {
        let output = render(Err(Error::CycleDetected {
            task_id: "x".to_string(),
            depends_on: "y".to_string(),
            path: vec!["y".to_string(), "x".to_string()],
        }));
        assert_eq!(output.exit_code, ExitCode::from(5));
        let json: Value = serde_json::from_str(&output.stdout[0]).unwrap();
        assert_eq!(json["details"]["task_id"], "x");
        assert_eq!(json["details"]["depends_on"], "y");
        assert_eq!(json["details"]["cycle"], serde_json::json!(["x", "y", "x"]));
    }
}
