//! Workspace path scoping.
//!
//! All tool paths are resolved relative to a configured working root;
//! traversal out of the root is rejected. The file may not exist yet (for
//! writes), in which case the nearest existing ancestor is canonicalized.

use std::path::{Path, PathBuf};

use quill_core::error::ToolError;

/// The working root the file and shell tools operate in.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        // Resolve the root itself once; tools compare against this form.
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool-supplied path against the root.
    ///
    /// Relative paths are joined onto the root; absolute paths are allowed
    /// only when they stay inside it. Returns the resolved path (which may
    /// not exist) or `PermissionDenied`.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        if path.is_empty() {
            return Err(ToolError::InvalidArguments("empty path".into()));
        }

        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let resolved = canonicalize_lenient(&joined)?;

        if !resolved.starts_with(&self.root) {
            return Err(ToolError::PermissionDenied(format!(
                "'{path}' is outside the workspace root"
            )));
        }

        Ok(resolved)
    }
}

/// Canonicalize a path that may not exist yet: resolve the deepest existing
/// ancestor and re-append the remaining components, rejecting any `..` left
/// in the non-existing tail.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf, ToolError> {
    if let Ok(resolved) = path.canonicalize() {
        return Ok(resolved);
    }

    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();

    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                if name == ".." {
                    return Err(ToolError::PermissionDenied(format!(
                        "path traversal in '{}'",
                        path.display()
                    )));
                }
                tail.push(name.to_os_string());
                existing.pop();
            }
            None => break,
        }
    }

    let mut resolved = existing
        .canonicalize()
        .map_err(|e| ToolError::Io(format!("cannot resolve '{}': {e}", path.display())))?;
    for component in tail.iter().rev() {
        resolved.push(component);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_joins_root() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());

        let resolved = workspace.resolve("notes/todo.txt").unwrap();
        assert!(resolved.starts_with(workspace.root()));
        assert!(resolved.ends_with("notes/todo.txt"));
    }

    #[test]
    fn absolute_path_inside_root_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();

        let inside = workspace.root().join("file.txt");
        let resolved = workspace.resolve(inside.to_str().unwrap()).unwrap();
        assert!(resolved.starts_with(workspace.root()));
    }

    #[test]
    fn escape_via_dotdot_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());

        let err = workspace.resolve("../../../etc/passwd").unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }

    #[test]
    fn absolute_path_outside_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());

        let err = workspace.resolve("/etc/passwd").unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }

    #[test]
    fn nonexistent_nested_path_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());

        let resolved = workspace.resolve("a/b/c/new.txt").unwrap();
        assert!(resolved.starts_with(workspace.root()));
        assert!(!resolved.exists());
    }

    #[test]
    fn empty_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        assert!(matches!(
            workspace.resolve(""),
            Err(ToolError::InvalidArguments(_))
        ));
    }
}
