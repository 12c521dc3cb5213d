use std::fs;
use std::path::{Component, Path, PathBuf};

use eyre::{Result, eyre};
use tracing::warn;

use crate::codegen::FileSet;

/// Resolve an extracted path below `base_dir`.
///
/// Returns `None` for absolute paths and paths that climb out with `..`.
pub fn resolve_within(base_dir: &Path, path: &str) -> Option<PathBuf> {
    let relative = Path::new(path);
    let safe = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));

    if !safe || relative.as_os_str().is_empty() {
        return None;
    }
    Some(base_dir.join(relative))
}

/// Create a file with the specified content, creating parent directories as needed.
///
/// An existing file is overwritten.
pub fn create_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| eyre!("Failed to create directory {}: {}", parent.display(), e))?;
        }
    }

    fs::write(path, content).map_err(|e| eyre!("Failed to write to file {}: {}", path.display(), e))?;
    Ok(())
}

/// Write every file of `files` below `base_dir`, skipping unsafe paths.
///
/// Returns the paths that were written.
pub fn write_files(base_dir: &Path, files: &FileSet) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(files.len());

    for (path, content) in files {
        let Some(target) = resolve_within(base_dir, path) else {
            warn!("Refusing to write outside the output directory: {}", path);
            continue;
        };
        create_file(&target, content)?;
        written.push(target);
    }

    Ok(written)
}
