//! Debug command logging.
//!
//! When `debug_logging` is enabled in the config, every CLI invocation is
//! appended as a JSONL line to `.pm/command-log.jsonl`. The audit log in the
//! database records what changed; this file records what was asked for,
//! including requests that failed validation.

use crate::config::Config;
use crate::error::ErrorKind;
use crate::tasks::store::PM_DIR;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Log file name within the `.pm` directory.
pub const COMMAND_LOG_FILE: &str = "command-log.jsonl";

/// One line of the command log.
#[derive(Debug, Serialize)]
struct CommandEvent<'a> {
    timestamp: String,
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
}

/// Log a finished command if debug logging is enabled.
///
/// `error_kind` is `None` for successful commands. Errors are silently
/// ignored; logging never changes the outcome of a command.
pub fn log_command(config: &Config, base_dir: &Path, command: &str, error_kind: Option<ErrorKind>) {
    if !config.debug_logging {
        return;
    }

    let pm_dir = base_dir.join(PM_DIR);
    if std::fs::create_dir_all(&pm_dir).is_err() {
        return;
    }

    let event = CommandEvent {
        timestamp: chrono::Utc::now().to_rfc3339(),
        command,
        status: if error_kind.is_some() { "error" } else { "success" },
        error_kind,
    };
    let Ok(line) = serde_json::to_string(&event) else {
        return;
    };

    let Ok(mut file) =
        OpenOptions::new().create(true).append(true).open(pm_dir.join(COMMAND_LOG_FILE))
    else {
        return;
    };

    let _ = writeln!(file, "{line}");
}
