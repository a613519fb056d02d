//! # `pm`
//!
//! Project and task tracking for AI assistants, backed by `SQLite`.
//!
//! Tasks are linked by "depends on" edges that are checked for cycles on
//! every insert. All CLI output is a JSON envelope.

#[cfg(feature = "cli")]
pub mod cli;
pub mod command_logging;
pub mod config;
pub mod error;
pub mod paths;
pub mod tasks;

pub use error::{Error, ErrorKind, Result};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }
}
