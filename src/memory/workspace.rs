//! Storage directory bootstrap.
//!
//! Creates the storage and runs directories on first use. `memory/` is
//! private to one user: created 0700 and explicitly chmod-ed after
//! creation because the process umask can mask the create mode.

use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::Result;

/// Create the storage directory (and its `sessions/` subdirectory) with
/// owner-only permissions. Returns true when the directory was created.
pub fn init_storage(storage_dir: &Path) -> Result<bool> {
    let created = !storage_dir.exists();
    fs::create_dir_all(storage_dir)?;
    fs::create_dir_all(storage_dir.join("sessions"))?;
    restrict_dir_mode(storage_dir)?;
    restrict_dir_mode(&storage_dir.join("sessions"))?;
    if created {
        info!("Created {}", storage_dir.display());
    }
    Ok(created)
}

/// Create the runs directory for checkpoint files.
pub fn init_runs_dir(runs_dir: &Path) -> Result<()> {
    fs::create_dir_all(runs_dir)?;
    restrict_dir_mode(runs_dir)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_dir_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_dir_mode(_path: &Path) -> Result<()> {
    Ok(())
}
