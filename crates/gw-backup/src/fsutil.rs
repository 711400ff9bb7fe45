//! File copy helpers shared by the staging strategies.

use gw_common::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Copy one file, creating the destination's parent directories.
/// An existing destination is overwritten.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
    }
    let bytes = fs::copy(src, dst).map_err(|e| Error::io_at(src, e))?;
    debug!(target: "fs.copy", src = %src.display(), dst = %dst.display(), bytes, "copied");
    Ok(bytes)
}

/// Regular files directly inside `dir` accepted by `filter`, sorted by
/// name. A missing directory has no files.
pub fn files_in<F>(dir: &Path, filter: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io_at(dir, e))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if filter(&entry.file_name().to_string_lossy()) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Copy the files of `src_dir` accepted by `filter` into `dst_dir`,
/// keeping their names. Returns the copied destination paths.
pub fn copy_files<F>(src_dir: &Path, dst_dir: &Path, filter: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut copied = Vec::new();
    for src in files_in(src_dir, filter)? {
        if let Some(name) = src.file_name() {
            let dst = dst_dir.join(name);
            copy_file(&src, &dst)?;
            copied.push(dst);
        }
    }
    Ok(copied)
}

/// Like [`copy_files`], but first removes the files of `dst_dir` accepted
/// by `filter`, so the result mirrors `src_dir` rather than accumulating.
pub fn replace_files<F>(src_dir: &Path, dst_dir: &Path, filter: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    for stale in files_in(dst_dir, &filter)? {
        remove_file(&stale)?;
    }
    copy_files(src_dir, dst_dir, &filter)
}

/// Recursively copy `src` into `dst`. Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    fs::create_dir_all(dst).map_err(|e| Error::io_at(dst, e))?;
    let mut count = 0;
    for entry in fs::read_dir(src).map_err(|e| Error::io_at(src, e))? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());
        if file_type.is_dir() {
            count += copy_tree(&entry.path(), &target)?;
        } else if file_type.is_file() {
            copy_file(&entry.path(), &target)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Remove a directory tree if it exists.
pub fn remove_tree(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(|e| Error::io_at(path, e))?;
    }
    Ok(())
}

/// Remove a file if it exists.
pub fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io_at(path, e)),
    }
}

/// `path` re-rooted under `root`. Absolute paths lose their leading `/`.
pub fn under_root(root: &Path, path: &Path) -> PathBuf {
    let rel: PathBuf = path
        .components()
        .filter(|c| matches!(c, std::path::Component::Normal(_)))
        .collect();
    root.join(rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_files_filters_and_sorts() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("b.jar"), "b").unwrap();
        fs::write(src.path().join("a.jar"), "a").unwrap();
        fs::write(src.path().join("notes.txt"), "n").unwrap();
        fs::create_dir(src.path().join("sub.jar")).unwrap();

        let copied = copy_files(src.path(), dst.path(), |n| n.ends_with(".jar")).unwrap();
        assert_eq!(
            copied,
            vec![dst.path().join("a.jar"), dst.path().join("b.jar")]
        );
        assert!(!dst.path().join("notes.txt").exists());
    }

    #[test]
    fn test_files_in_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(files_in(&dir.path().join("absent"), |_| true)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_copy_tree_and_overwrite() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("etc/deep")).unwrap();
        fs::write(src.path().join("etc/deep/f"), "new").unwrap();
        fs::create_dir_all(dst.path().join("out/etc/deep")).unwrap();
        fs::write(dst.path().join("out/etc/deep/f"), "old").unwrap();

        assert_eq!(copy_tree(src.path(), &dst.path().join("out")).unwrap(), 1);
        assert_eq!(
            fs::read_to_string(dst.path().join("out/etc/deep/f")).unwrap(),
            "new"
        );
    }

    #[test]
    fn test_replace_files_drops_stale_matches() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("a.jar"), "a").unwrap();
        fs::write(dst.path().join("gone.jar"), "old").unwrap();
        fs::write(dst.path().join("keep.txt"), "other owner").unwrap();

        let copied = replace_files(src.path(), dst.path(), |n| n.ends_with(".jar")).unwrap();
        assert_eq!(copied, vec![dst.path().join("a.jar")]);
        assert!(!dst.path().join("gone.jar").exists());
        assert!(dst.path().join("keep.txt").is_file());
    }

    #[test]
    fn test_under_root() {
        assert_eq!(
            under_root(Path::new("/sandbox"), Path::new("/etc/hosts")),
            PathBuf::from("/sandbox/etc/hosts")
        );
        assert_eq!(
            under_root(Path::new("/"), Path::new("/etc/hosts")),
            PathBuf::from("/etc/hosts")
        );
        // Parent components never escape the root.
        assert_eq!(
            under_root(Path::new("/sandbox"), Path::new("/etc/../../x")),
            PathBuf::from("/sandbox/etc/x")
        );
    }
}
