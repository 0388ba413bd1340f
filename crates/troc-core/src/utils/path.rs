//! Storage path confinement.
//!
//! Package names and versions come straight from request paths, so every
//! storage path is built through [`safe_join`] to keep it inside the
//! registry's storage directory.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

use crate::error::{TrocError, TrocResult};

/// Check that a single name (scope, package name, version) is usable as one
/// path segment
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}

/// Join a relative storage path onto `base`. Only plain segments are
/// accepted: no root, no `.` and no `..`.
pub fn safe_join(base: &Utf8Path, relative: &Utf8Path) -> TrocResult<Utf8PathBuf> {
    let mut joined = base.to_path_buf();
    for component in relative.components() {
        match component {
            Utf8Component::Normal(segment) if is_safe_segment(segment) => joined.push(segment),
            _ => return Err(TrocError::Validation(format!("unsafe storage path: {}", relative))),
        }
    }
    Ok(joined)
}
