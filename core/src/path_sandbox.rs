//! Per-session path containment.
//!
//! `resolve_read_path`/`resolve_write_path` both resolve a raw path against
//! the session's allowed roots and reject anything that escapes them,
//! including via a symlink planted inside an allowed root.

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::error::CoworkErr;
use crate::error::Result;

/// The set of roots a session may read from or write to: the project root
/// (parent of the `.agent` directory, if any), the working directory, and
/// the optional output/uploads directories.
#[derive(Debug, Clone)]
pub struct SandboxRoots {
    pub project_root: Option<PathBuf>,
    pub working_directory: PathBuf,
    pub output_directory: Option<PathBuf>,
    pub uploads_directory: Option<PathBuf>,
}

impl SandboxRoots {
    fn roots(&self) -> Vec<&Path> {
        let mut roots = vec![self.working_directory.as_path()];
        if let Some(p) = &self.project_root {
            roots.push(p.as_path());
        }
        if let Some(p) = &self.output_directory {
            roots.push(p.as_path());
        }
        if let Some(p) = &self.uploads_directory {
            roots.push(p.as_path());
        }
        roots
    }

    pub fn resolve_read_path(&self, raw: impl AsRef<Path>) -> Result<PathBuf> {
        self.resolve(raw.as_ref())
    }

    pub fn resolve_write_path(&self, raw: impl AsRef<Path>) -> Result<PathBuf> {
        self.resolve(raw.as_ref())
    }

    fn resolve(&self, raw: &Path) -> Result<PathBuf> {
        let abs = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.working_directory.join(raw)
        };
        let abs = normalize(&abs);
        let canonical = canonicalize_longest_existing_prefix(&abs)?;

        for root in self.roots() {
            let root_abs = normalize(&if root.is_absolute() {
                root.to_path_buf()
            } else {
                self.working_directory.join(root)
            });
            let root_canonical = canonicalize_longest_existing_prefix(&root_abs)?;
            if is_contained(&root_canonical, &canonical) {
                return Ok(abs);
            }
        }

        Err(CoworkErr::PathDenied(raw.display().to_string()))
    }
}

/// Removes `.` and resolves `..` lexically, without touching the file
/// system. Works even when the path does not exist yet.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalises the longest existing ancestor of `path`, then re-appends
/// whatever trailing components don't exist yet. Defends against a symlink
/// planted at any existing ancestor resolving outside the allowed roots.
fn canonicalize_longest_existing_prefix(path: &Path) -> Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        if existing.exists() {
            break;
        }
        match existing.file_name() {
            Some(name) => missing.push(name.to_os_string()),
            None => break,
        }
        existing = match existing.parent() {
            Some(p) => p,
            None => break,
        };
    }

    let mut canonical = if existing.as_os_str().is_empty() {
        PathBuf::from("/")
    } else {
        existing.canonicalize()?
    };
    for component in missing.into_iter().rev() {
        canonical.push(component);
    }
    Ok(canonical)
}

/// Containment via path-relative computation: accept iff the relative path
/// from `root` to `target` is empty or does not start with a parent-dir
/// traversal token.
fn is_contained(root: &Path, target: &Path) -> bool {
    match target.strip_prefix(root) {
        Ok(rel) => !rel
            .components()
            .next()
            .is_some_and(|c| matches!(c, Component::ParentDir)),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots(dir: &Path) -> SandboxRoots {
        SandboxRoots {
            project_root: None,
            working_directory: dir.to_path_buf(),
            output_directory: None,
            uploads_directory: None,
        }
    }

    #[test]
    fn accepts_path_inside_working_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let r = roots(tmp.path());
        let resolved = r.resolve_read_path("inner.txt").expect("resolves");
        assert_eq!(resolved, tmp.path().join("inner.txt"));
    }

    #[test]
    fn rejects_parent_traversal() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let r = roots(tmp.path());
        let err = r.resolve_read_path("../outside.txt").unwrap_err();
        assert!(matches!(err, CoworkErr::PathDenied(_)));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("tempdir");
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(outside.path(), &link).expect("symlink");

        let r = roots(tmp.path());
        let err = r.resolve_write_path("link/passwd").unwrap_err();
        assert!(matches!(err, CoworkErr::PathDenied(_)));
    }
}
