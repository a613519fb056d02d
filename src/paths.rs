//! Path utilities for locating the database and config files.
//!
//! The database lives in `.pm/pm.db` under a project root. The root is the
//! nearest ancestor of the working directory that contains a `.pm/`
//! directory, so `pm` behaves the same from any subdirectory, much like git.

use crate::tasks::store::{DATABASE_FILENAME, PM_DIR};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable overriding the database location.
pub const DB_PATH_ENV: &str = "PM_DB_PATH";

/// Directory name under the user config dir holding the fallback config.
const USER_CONFIG_DIR: &str = "pm";

/// Find the nearest ancestor of `start` (inclusive) containing a `.pm/` directory.
#[must_use]
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start.ancestors().find(|dir| dir.join(PM_DIR).is_dir()).map(Path::to_path_buf)
}

/// The default database path for a project root.
#[must_use]
pub fn default_db_path(root: &Path) -> PathBuf {
    root.join(PM_DIR).join(DATABASE_FILENAME)
}

/// Resolve the database path.
///
/// Order: the explicit path, then `$PM_DB_PATH`, then `.pm/pm.db` under the
/// nearest project root above `cwd`, then `./.pm/pm.db`.
#[must_use]
pub fn resolve_db_path(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    resolve_db_path_with(explicit, std::env::var_os(DB_PATH_ENV), cwd)
}

/// Like [`resolve_db_path`] with the environment value passed in.
#[must_use]
pub fn resolve_db_path_with(explicit: Option<&Path>, env: Option<OsString>, cwd: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return absolutize(path, cwd);
    }
    if let Some(path) = env.filter(|v| !v.is_empty()) {
        return absolutize(Path::new(&path), cwd);
    }
    let root = find_project_root(cwd).unwrap_or_else(|| cwd.to_path_buf());
    default_db_path(&root)
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Fallback config file in the user's config directory.
///
/// Returns `None` if the config directory cannot be determined.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(USER_CONFIG_DIR).join("config.yaml"))
}
