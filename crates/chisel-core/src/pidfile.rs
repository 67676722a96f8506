//! PID file emission.

use std::path::{Path, PathBuf};

use crate::error::{ChiselError, Result};

/// File name of the PID file, relative to the working directory.
pub const PID_FILE_NAME: &str = "chisel.pid";

/// Writes the current process id to `chisel.pid` inside `dir`.
///
/// # Errors
/// Returns [`ChiselError::PidFile`] if the file cannot be written. Callers
/// treat this as fatal.
pub fn write_pid_file_in(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(PID_FILE_NAME);
    std::fs::write(&path, std::process::id().to_string()).map_err(|source| {
        ChiselError::PidFile {
            path: path.clone(),
            source,
        }
    })?;
    Ok(path)
}
