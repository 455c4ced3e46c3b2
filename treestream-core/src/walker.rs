use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, StreamError};

/// List every entry under `root` (files, directories, symlinks) as
/// root-relative paths, in deterministic lexical order. An entry whose
/// relative path contains any of the `excludes` substrings is dropped, and
/// an excluded directory is pruned without descending into it. The root
/// itself is never part of the list.
pub fn build_file_list(root: &Path, excludes: &[String]) -> Result<Vec<PathBuf>> {
    let mut list = Vec::new();
    let walk = WalkDir::new(root).min_depth(1).sort_by_file_name();
    for entry in walk
        .into_iter()
        .filter_entry(|e| !is_excluded(root, e.path(), excludes))
    {
        let entry =
            entry.map_err(|e| StreamError::io(format!("walk {}", root.display()), e.into()))?;
        let rel = pathdiff::diff_paths(entry.path(), root)
            .unwrap_or_else(|| entry.path().to_path_buf());
        list.push(rel);
    }
    Ok(list)
}

fn is_excluded(root: &Path, path: &Path, excludes: &[String]) -> bool {
    if excludes.is_empty() {
        return false;
    }
    let rel = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    let rel = rel.to_string_lossy().replace('\\', "/");
    excludes.iter().any(|x| rel.contains(x.as_str()))
}
