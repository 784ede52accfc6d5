//! Working tree layout - directory skeleton, file writes, removal

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::GeneratorError;

/// Subdirectories created under every module base path.
pub const SKELETON_DIRS: [&str; 8] = [
    "assets",
    "controllers",
    "models",
    "views",
    "views/default",
    "resources",
    "resources/js",
    "resources/css",
];

/// Create `base_path` and every [`SKELETON_DIRS`] entry below it.
///
/// Existing directories are left alone. Anything else in the way (a file
/// where a directory should be, missing permissions) is an I/O error.
pub fn build_skeleton(base_path: &Path) -> Result<(), GeneratorError> {
    let dirs = std::iter::once(base_path.to_path_buf())
        .chain(SKELETON_DIRS.iter().map(|dir| base_path.join(dir)));

    for dir in dirs {
        fs::create_dir_all(&dir).map_err(|e| GeneratorError::io(&dir, e))?;
    }

    debug!("Built module skeleton at {}", base_path.display());
    Ok(())
}

/// Seam for the file-writing step.
///
/// The pipeline writes every rendered file through this trait so callers can
/// redirect or fail writes.
pub trait FileWriter: Send + Sync {
    /// Replace the whole contents of `path` with `contents`.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// Writes straight to the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFileWriter;

impl FileWriter for FsFileWriter {
    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
    }
}

/// Remove a file or a whole directory tree.
///
/// Returns `Ok(false)` when nothing existed at `path`.
pub fn remove_path(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match removed {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
