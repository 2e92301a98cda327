//! Lexical validation of requested asset paths against the served base directory.
//!
//! Validation never touches the filesystem: it only inspects the request string
//! and performs path algebra, so existence is the caller's concern.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Reason a requested path was refused. Rules are checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathRejection {
    #[error("empty path")]
    Empty,
    #[error("null byte")]
    NullByte,
    #[error("traversal")]
    Traversal,
    #[error("absolute path")]
    Absolute,
    #[error("escapes base directory")]
    EscapesBase,
}

/// A request path that is lexically contained in the base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    absolute: PathBuf,
    relative: String,
}

impl ResolvedPath {
    /// Base directory joined with the request, normalised.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// The request with empty and `.` segments removed, `/`-separated.
    pub fn relative(&self) -> &str {
        &self.relative
    }
}

/// Validate `requested` against `base_dir`, returning the resolved path on success.
pub fn validate(requested: &str, base_dir: &Path) -> Result<ResolvedPath, PathRejection> {
    if requested.trim().is_empty() {
        return Err(PathRejection::Empty);
    }
    if requested.contains('\0') {
        return Err(PathRejection::NullByte);
    }
    if segments(requested).any(|segment| segment == "..") {
        return Err(PathRejection::Traversal);
    }
    if requested.starts_with('/') || requested.starts_with('\\') {
        return Err(PathRejection::Absolute);
    }
    if has_drive_prefix(requested) {
        return Err(PathRejection::Absolute);
    }

    let base = normalize(base_dir);
    let mut absolute = base.clone();
    let mut kept = Vec::new();
    for segment in segments(requested).filter(|segment| !segment.is_empty() && *segment != ".") {
        // A segment that is not a plain name (a prefix or root on some platforms)
        // would replace the accumulated path on push.
        let plain = Path::new(segment)
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !plain {
            return Err(PathRejection::EscapesBase);
        }
        absolute.push(segment);
        kept.push(segment);
    }

    if absolute != base && !absolute.starts_with(&base) {
        return Err(PathRejection::EscapesBase);
    }

    Ok(ResolvedPath {
        absolute,
        relative: kept.join("/"),
    })
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\'])
}

fn has_drive_prefix(path: &str) -> bool {
    let mut chars = path.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

/// Collapse `.` and `..` components without consulting the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_name = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if last_is_name {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push(component.as_os_str());
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
