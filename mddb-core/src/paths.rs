//! Relative-path guard.
//!
//! Every path that reaches the filesystem or the index passes through
//! here: commit, replay, reads, and reindex all revalidate.

use crate::errors::PathError;

/// Validate a caller-derived relative path.
///
/// Rejects absolute paths, uncleaned forms (empty segments, `.`),
/// any `..` segment, and paths not ending in `.md`. A path that passes
/// cannot escape the base directory after joining.
pub fn validate_rel_path(path: &str) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if path.starts_with('/') || std::path::Path::new(path).is_absolute() {
        return Err(PathError::Absolute {
            path: path.to_string(),
        });
    }
    if path.contains('\\') {
        return Err(PathError::NotCleaned {
            path: path.to_string(),
        });
    }
    for segment in path.split('/') {
        match segment {
            "" | "." => {
                return Err(PathError::NotCleaned {
                    path: path.to_string(),
                })
            }
            ".." => {
                return Err(PathError::Escapes {
                    path: path.to_string(),
                })
            }
            _ => {}
        }
    }
    // The final segment must be a markdown file, not bare ".md".
    let name = path.rsplit('/').next().unwrap_or(path);
    if !name.ends_with(".md") || name.len() == 3 {
        return Err(PathError::NotMarkdown {
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Check that the physical location of a document agrees with the
/// path derived from its id.
pub fn check_derivation(id: &str, derived: &str, actual: &str) -> Result<(), PathError> {
    if derived != actual {
        return Err(PathError::DerivationMismatch {
            id: id.to_string(),
            derived: derived.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}
