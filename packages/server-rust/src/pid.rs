//! Process id file for external supervision.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::ServerError;

/// Writes the current process id followed by a newline.
///
/// # Errors
///
/// Returns [`ServerError::PidFile`] if the file cannot be written.
pub fn write(path: &Path) -> Result<(), ServerError> {
    fs::write(path, format!("{}\n", std::process::id())).map_err(|source| {
        ServerError::PidFile {
            path: path.to_path_buf(),
            source,
        }
    })?;
    debug!(path = %path.display(), "wrote pid file");
    Ok(())
}

/// Removes the pid file, logging instead of failing.
pub fn remove(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "failed to remove pid file");
    }
}
