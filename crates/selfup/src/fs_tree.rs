//! Whole-tree filesystem operations for clean installs.

use crate::error::Result;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Delete every top-level entry under `root` whose name is not in
/// `preserve`. Returns the number of entries removed.
pub fn remove_children_except(root: &Path, preserve: &HashSet<OsString>) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if preserve.contains(&entry.file_name()) {
            continue;
        }
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
        removed += 1;
    }
    Ok(removed)
}

/// Copy every top-level entry of `src` into `dest`, recursively, skipping
/// names in `skip`. `skip` keeps a staged release from clobbering preserved
/// paths like an environment file it happens to ship.
pub fn copy_children(src: &Path, dest: &Path, skip: &HashSet<OsString>) -> Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if skip.contains(&name) {
            warn!(entry = %name.to_string_lossy(), "staged release ships a preserved path; keeping the existing one");
            continue;
        }
        copy_recursive(&entry.path(), &dest.join(&name))?;
    }
    Ok(())
}

fn copy_recursive(src: &Path, dest: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(src)?;
    if metadata.is_dir() {
        fs::create_dir_all(dest)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else if metadata.is_file() {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        // fs::copy carries permissions along.
        fs::copy(src, dest)?;
    } else {
        warn!(path = %src.display(), "skipping non-regular file");
    }
    Ok(())
}

/// Copy the relative `paths` that exist under `root` into `dest`, keeping
/// their relative layout. Returns the paths actually copied.
pub fn copy_paths(root: &Path, paths: &[String], dest: &Path) -> Result<Vec<String>> {
    let mut copied = Vec::new();
    for rel in paths {
        let src = root.join(rel);
        if !src.exists() {
            warn!(path = %rel, "backup path missing; skipping");
            continue;
        }
        copy_recursive(&src, &dest.join(rel))?;
        copied.push(rel.clone());
    }
    Ok(copied)
}
