//! Filesystem discipline helpers: atomic writes, run directory
//! provisioning, and path containment checks.

use super::error::{RuntimeError, RuntimeResult};
use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `content` to `path` atomically (temp file in the same directory,
/// then rename).
pub fn write_atomic(path: &Path, content: &[u8]) -> RuntimeResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| RuntimeError::io(
            format!("writing {}", path.display()),
            std::io::Error::other("no parent directory"),
        ))?;
    std::fs::create_dir_all(dir)
        .map_err(|e| RuntimeError::io(format!("creating {}", dir.display()), e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| RuntimeError::io(format!("creating temp file in {}", dir.display()), e))?;
    tmp.write_all(content)
        .map_err(|e| RuntimeError::io(format!("writing {}", path.display()), e))?;
    tmp.persist(path)
        .map_err(|e| RuntimeError::io(format!("renaming into {}", path.display()), e.error))?;
    Ok(())
}

/// Create a fresh run directory `<parent>/<run_id>/` where `run_id` is
/// `YYYYMMDD_HHMMSS_<name>`, disambiguated with microseconds when a second
/// run lands within the same second.
pub fn provision_run_dir(parent: &Path, name: &str) -> RuntimeResult<(String, PathBuf)> {
    let now = Local::now();
    let stamp = now.format("%Y%m%d_%H%M%S").to_string();
    let run_id = format!("{}_{}", stamp, name);
    let dir = parent.join(&run_id);
    match std::fs::create_dir_all(parent)
        .and_then(|_| std::fs::create_dir(&dir))
    {
        Ok(_) => Ok((run_id, dir)),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let run_id = format!("{}_{}_{}", stamp, now.format("%6f"), name);
            let dir = parent.join(&run_id);
            std::fs::create_dir(&dir)
                .map_err(|e| RuntimeError::io(format!("creating {}", dir.display()), e))?;
            Ok((run_id, dir))
        }
        Err(e) => Err(RuntimeError::io(format!("creating {}", dir.display()), e)),
    }
}

/// Create an explicitly-named run directory, failing if it already exists.
pub fn provision_named_run_dir(parent: &Path, run_id: &str) -> RuntimeResult<PathBuf> {
    let dir = parent.join(run_id);
    std::fs::create_dir_all(parent)
        .map_err(|e| RuntimeError::io(format!("creating {}", parent.display()), e))?;
    std::fs::create_dir(&dir)
        .map_err(|e| RuntimeError::io(format!("creating {}", dir.display()), e))?;
    Ok(dir)
}

/// Whether `candidate`, after symlink resolution, lies strictly under
/// `base`.
pub fn contained_in(base: &Path, candidate: &Path) -> bool {
    let (base, candidate) = match (base.canonicalize(), candidate.canonicalize()) {
        (Ok(b), Ok(c)) => (b, c),
        _ => return false,
    };
    candidate.starts_with(&base)
}

/// Reject paths that climb out via `..` components.
pub fn has_uplevels(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let p = dir.path().join("sub").join("data.json");
        write_atomic(&p, b"{\"ok\":true}").unwrap();
        assert_eq!(std::fs::read_to_string(&p).unwrap(), "{\"ok\":true}");
        // overwrite in place
        write_atomic(&p, b"2").unwrap();
        assert_eq!(std::fs::read_to_string(&p).unwrap(), "2");
    }

    #[test]
    fn run_dir_naming() {
        let dir = tempfile::TempDir::new().unwrap();
        let (run_id, p1) = provision_run_dir(dir.path(), "hello").unwrap();
        assert!(run_id.ends_with("_hello"));
        assert!(p1.is_dir());
        // same second → microsecond disambiguation
        let (run_id2, p2) = provision_run_dir(dir.path(), "hello").unwrap();
        assert_ne!(run_id, run_id2);
        assert!(p2.is_dir());
    }

    #[test]
    fn containment() {
        let dir = tempfile::TempDir::new().unwrap();
        let inner = dir.path().join("inner");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(inner.join("f.txt"), "x").unwrap();
        assert!(contained_in(dir.path(), &inner.join("f.txt")));
        assert!(!contained_in(&inner, dir.path()));
    }

    #[test]
    fn uplevel_detection() {
        assert!(has_uplevels("a/../b"));
        assert!(has_uplevels("../x"));
        assert!(!has_uplevels("a/b/c"));
        assert!(!has_uplevels("a..b/c"));
    }
}
