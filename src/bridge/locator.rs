//! Agent executable discovery.
//!
//! Resolution order: explicit override, then the execution search path,
//! then a fixed list of common install locations. Failure reports every
//! location that was checked.

use crate::error::RunError;
use std::path::{Path, PathBuf};

/// Install locations probed after the search path, relative to `$HOME`
/// unless absolute.
const COMMON_INSTALL_DIRS: &[&str] = &[
    ".local/bin",
    ".claude/local",
    "/usr/local/bin",
    "/opt/homebrew/bin",
];

pub fn resolve_executable(override_path: Option<&Path>, name: &str) -> Result<PathBuf, RunError> {
    let mut searched = Vec::new();

    if let Some(path) = override_path {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        searched.push(path.to_path_buf());
    }

    searched.push(PathBuf::from("$PATH"));
    if let Ok(path) = which::which(name) {
        return Ok(path);
    }

    let home = dirs::home_dir();
    for dir in COMMON_INSTALL_DIRS {
        let base = if Path::new(dir).is_absolute() {
            PathBuf::from(dir)
        } else {
            match &home {
                Some(home) => home.join(dir),
                None => continue,
            }
        };
        let candidate = base.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
        searched.push(candidate);
    }

    Err(RunError::ExecutableNotFound {
        name: name.to_string(),
        searched,
    })
}
