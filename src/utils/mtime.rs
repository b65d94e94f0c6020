//! Modification-time helpers for cache staleness checks.

use std::io::{self, ErrorKind};
use std::path::Path;
use std::time::SystemTime;

/// Modification time of a file, `None` if it does not exist.
pub fn get_mtime(path: &Path) -> io::Result<Option<SystemTime>> {
    match path.metadata().and_then(|m| m.modified()) {
        Ok(time) => Ok(Some(time)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Whether `output` exists and was modified strictly after `source`.
///
/// Equal timestamps count as stale: a compile that finished within the same
/// clock tick as an edit must not hide that edit. A missing file is stale;
/// any other stat failure is returned.
pub fn is_fresh(output: &Path, source: &Path) -> io::Result<bool> {
    let (Some(out), Some(src)) = (get_mtime(output)?, get_mtime(source)?) else {
        return Ok(false);
    };
    Ok(out > src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch(path: &Path, time: SystemTime) {
        fs::write(path, "x").unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn test_is_fresh() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let out = dir.path().join("out");
        let now = SystemTime::now();

        touch(&src, now - Duration::from_secs(60));
        touch(&out, now);
        assert!(is_fresh(&out, &src).unwrap());
        assert!(!is_fresh(&src, &out).unwrap());

        touch(&src, now);
        assert!(!is_fresh(&out, &src).unwrap(), "equal mtimes are stale");
    }

    #[test]
    fn test_missing_is_stale() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::write(&src, "x").unwrap();
        assert!(!is_fresh(&dir.path().join("missing"), &src).unwrap());
        assert!(get_mtime(&dir.path().join("missing")).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_stat_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::write(&src, "x").unwrap();

        // A path below a regular file fails with ENOTDIR, not ENOENT
        let below_file = src.join("out");
        let err = is_fresh(&below_file, &src).unwrap_err();
        assert_ne!(err.kind(), ErrorKind::NotFound);
    }
}
