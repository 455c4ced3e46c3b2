use std::path::{Component, Path, PathBuf};

use crate::error::{Result, StreamError};

/// Join a stream-supplied relative path onto `dest`, rejecting anything
/// that could land outside it: absolute paths, root or drive prefixes, and
/// `..` traversal that survives lexical cleaning. A cancelable segment
/// like `sub/../ok.txt` resolves inside `dest` and is accepted. The check
/// applies to the record's own path; symlink targets are written verbatim
/// and deliberately not constrained.
pub fn sanitize_path(dest: &Path, rel: &str) -> Result<PathBuf> {
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return Err(StreamError::PathSafety {
            path: rel.to_string(),
            reason: "absolute paths are not allowed",
        });
    }

    let mut clean = PathBuf::new();
    for comp in rel_path.components() {
        match comp {
            Component::Normal(c) => clean.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return Err(StreamError::PathSafety {
                        path: rel.to_string(),
                        reason: "path escapes the destination",
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StreamError::PathSafety {
                    path: rel.to_string(),
                    reason: "absolute paths are not allowed",
                });
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(StreamError::PathSafety {
            path: rel.to_string(),
            reason: "empty path",
        });
    }
    Ok(dest.join(clean))
}
