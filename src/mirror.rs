//! Directory mirroring and staleness detection
//!
//! Asset trees (images, JS template partials, module directories) are
//! mirrored wholesale into the cache. A cached tree is either exactly the
//! source tree or it is discarded and recopied; there is no partial
//! patching. Repeated mirroring of an unchanged tree performs zero writes.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PageplanResult;

/// What mirroring an asset tree did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// Cache matched the source, nothing written
    Fresh,
    /// No cache copy existed, tree copied
    Copied,
    /// Cache was stale, tree deleted and recopied
    Rebuilt,
}

/// Mirror `source` into `cache`, replacing the cached tree if stale
pub fn mirror_tree(source: &Path, cache: &Path) -> PageplanResult<MirrorOutcome> {
    if cache.is_dir() {
        if !trees_differ(source, cache)? {
            return Ok(MirrorOutcome::Fresh);
        }
        tracing::debug!(cache = %cache.display(), "stale asset tree, rebuilding");
        fs::remove_dir_all(cache)?;
        copy_tree(source, cache)?;
        return Ok(MirrorOutcome::Rebuilt);
    }

    copy_tree(source, cache)?;
    Ok(MirrorOutcome::Copied)
}

/// Whether two directory trees differ in membership or file content
pub fn trees_differ(source: &Path, cache: &Path) -> PageplanResult<bool> {
    let mut source_files = Vec::new();
    collect_files(source, Path::new(""), &mut source_files)?;
    let mut cache_files = Vec::new();
    collect_files(cache, Path::new(""), &mut cache_files)?;

    source_files.sort();
    cache_files.sort();

    if source_files != cache_files {
        return Ok(true);
    }

    for relative in &source_files {
        let left = fs::read(source.join(relative))?;
        let right = fs::read(cache.join(relative))?;
        if left != right {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Copy a directory tree, creating destination directories as needed
pub fn copy_tree(source: &Path, dest: &Path) -> PageplanResult<()> {
    fs::create_dir_all(dest)?;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

fn collect_files(root: &Path, prefix: &Path, out: &mut Vec<PathBuf>) -> PageplanResult<()> {
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let relative = prefix.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            collect_files(&entry.path(), &relative, out)?;
        } else {
            out.push(relative);
        }
    }
    Ok(())
}
