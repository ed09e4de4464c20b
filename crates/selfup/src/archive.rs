//! Zip pack/unpack for release assets and rollback snapshots.
//!
//! Exact-fidelity on the parts that matter for a clean install: directory
//! structure and (on unix) file permissions survive a pack/unpack cycle.

use crate::error::Result;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::{FileOptions, ZipWriter};
use zip::{CompressionMethod, ZipArchive};

/// Archive the tree under `src` into a zip at `dest`.
///
/// `exclude` lists top-level entry names (relative to `src`) whose whole
/// subtrees are left out — the preserve list, when snapshotting a project
/// root. Returns the number of files written.
pub fn pack_dir(src: &Path, dest: &Path, exclude: &HashSet<OsString>) -> Result<usize> {
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(file);
    let mut files = 0usize;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.depth() != 1 || !exclude.contains(e.file_name()));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| crate::error::UpdateError::FileSystem(e.to_string()))?;
        let name = rel.to_string_lossy().replace('\\', "/");

        let mut options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            options = options.unix_permissions(entry.metadata().map_err(io::Error::from)?.permissions().mode());
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            zip.add_directory(name, options)?;
        } else if file_type.is_file() {
            zip.start_file(name, options)?;
            let mut reader = File::open(entry.path())?;
            io::copy(&mut reader, &mut zip)?;
            files += 1;
        } else {
            // Symlinks do not survive the archive format we promise.
            warn!(path = %entry.path().display(), "skipping non-regular file");
        }
    }

    zip.finish()?;
    debug!(archive = %dest.display(), files, "directory packed");
    Ok(files)
}

/// Extract a zip archive into `dest`, creating it if missing.
pub fn unpack(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    std::fs::create_dir_all(dest)?;
    archive.extract(dest)?;
    debug!(archive = %archive_path.display(), dest = %dest.display(), "archive extracted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn pack_excludes_preserved_toplevel_entries() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("project");
        fs::create_dir_all(src.join("src")).unwrap();
        fs::create_dir_all(src.join(".git")).unwrap();
        fs::write(src.join("src/main.js"), "console.log(1)").unwrap();
        fs::write(src.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(src.join(".env"), "SECRET=1").unwrap();
        fs::write(src.join("index.js"), "x").unwrap();

        let exclude: HashSet<OsString> =
            [OsString::from(".git"), OsString::from(".env")].into();
        let archive_path = dir.path().join("snapshot.zip");
        let files = pack_dir(&src, &archive_path, &exclude).unwrap();
        assert_eq!(files, 2); // src/main.js + index.js

        let out = dir.path().join("restored");
        unpack(&archive_path, &out).unwrap();
        assert!(out.join("src/main.js").is_file());
        assert!(out.join("index.js").is_file());
        assert!(!out.join(".git").exists());
        assert!(!out.join(".env").exists());
    }

    #[cfg(unix)]
    #[test]
    fn permissions_survive_a_cycle() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("tree");
        fs::create_dir_all(&src).unwrap();
        let script = src.join("run.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let archive_path = dir.path().join("tree.zip");
        pack_dir(&src, &archive_path, &HashSet::new()).unwrap();
        let out = dir.path().join("out");
        unpack(&archive_path, &out).unwrap();

        let mode = fs::metadata(out.join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
