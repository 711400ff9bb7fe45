//! Image writer.
//!
//! Zips a staging directory. The `version` marker goes first, component
//! folders follow in sorted order and `manifest.log` is written last,
//! listing every entry before it.

use crate::manifest::{ManifestLog, MANIFEST_FILE_NAME};
use crate::naming::NamingPolicy;
use crate::{ImageError, Result};
use gw_common::layout::VERSION_FILE;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// A written image.
#[derive(Debug, Clone)]
pub struct BuiltImage {
    pub path: PathBuf,
    pub manifest: ManifestLog,
}

/// Builds local images under a naming policy.
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    policy: NamingPolicy,
}

impl ArchiveWriter {
    pub fn new(policy: NamingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &NamingPolicy {
        &self.policy
    }

    /// Resolve the final path for `requested` and check it is free.
    pub fn resolve_target(&self, requested: &str) -> Result<PathBuf> {
        let path = PathBuf::from(self.policy.image_name(requested)?);
        if path.exists() {
            return Err(ImageError::TargetExists { path });
        }
        Ok(path)
    }

    /// Zip `staging_root` into the image named by `requested`.
    pub fn build(&self, staging_root: &Path, requested: &str) -> Result<BuiltImage> {
        let path = self.resolve_target(requested)?;
        self.build_at(staging_root, path)
    }

    /// Zip `staging_root` into a target already returned by
    /// [`resolve_target`](Self::resolve_target). The name is not resolved
    /// again.
    pub fn build_at(&self, staging_root: &Path, path: PathBuf) -> Result<BuiltImage> {
        if path.exists() {
            return Err(ImageError::TargetExists { path });
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ImageError::io_at(parent, e))?;
        }
        let manifest = write_image(staging_root, &path)?;
        Ok(BuiltImage { path, manifest })
    }
}

/// Zip `staging_root` into exactly `path`, overwriting nothing else.
pub fn write_image(staging_root: &Path, path: &Path) -> Result<ManifestLog> {
    let version_path = staging_root.join(VERSION_FILE);
    if !version_path.is_file() {
        return Err(ImageError::MissingFile(VERSION_FILE.to_string()));
    }
    let marker =
        fs::read_to_string(&version_path).map_err(|e| ImageError::io_at(&version_path, e))?;

    let mut files = Vec::new();
    collect_files(staging_root, staging_root, &mut files)?;
    files.retain(|(name, _)| name != VERSION_FILE && name != MANIFEST_FILE_NAME);
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let file = File::create(path).map_err(|e| ImageError::io_at(path, e))?;
    let mut zip = ZipWriter::new(file);
    let options: FileOptions<'_, ()> = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut manifest = ManifestLog::new(Some(marker.trim().to_string()));
    let mut bytes = 0u64;

    zip.start_file(VERSION_FILE, options)?;
    zip.write_all(marker.as_bytes())?;
    manifest.add_entry(VERSION_FILE);

    for (name, source) in &files {
        zip.start_file(name.as_str(), options)?;
        let mut input = File::open(source).map_err(|e| ImageError::io_at(source, e))?;
        bytes += io::copy(&mut input, &mut zip)?;
        manifest.add_entry(name.clone());
        debug!(entry = %name, "added image entry");
    }

    zip.start_file(MANIFEST_FILE_NAME, options)?;
    zip.write_all(manifest.render().as_bytes())?;
    zip.finish()?;

    info!(
        path = %path.display(),
        entries = manifest.entry_count(),
        bytes,
        "image written"
    );
    Ok(manifest)
}

/// Regular files under `dir` as (`/`-joined entry name, source path).
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| ImageError::io_at(dir, e))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            out.push((entry_name(root, &path)?, path));
        } else {
            debug!(path = %path.display(), "skipping non-regular staged file");
        }
    }
    Ok(())
}

fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| ImageError::UnsafeEntry(path.display().to_string()))?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn staging() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("version"), "5.1.0\n").unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config/node.properties"), "a=b").unwrap();
        fs::create_dir_all(dir.path().join("os/etc/sysconfig")).unwrap();
        fs::write(dir.path().join("os/etc/sysconfig/network"), "HOSTNAME=gw").unwrap();
        dir
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_write_image_layout() {
        let staging = staging();
        let out = TempDir::new().unwrap();
        let path = out.path().join("image.zip");
        let manifest = write_image(staging.path(), &path).unwrap();

        let names = entry_names(&path);
        assert_eq!(
            names,
            vec![
                "version",
                "config/node.properties",
                "os/etc/sysconfig/network",
                "manifest.log"
            ]
        );
        assert_eq!(manifest.entries, &names[..3]);
        assert_eq!(manifest.product_version.as_deref(), Some("5.1.0"));
    }

    #[test]
    fn test_manifest_log_lists_entries() {
        let staging = staging();
        let out = TempDir::new().unwrap();
        let path = out.path().join("image.zip");
        write_image(staging.path(), &path).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut text = String::new();
        archive
            .by_name("manifest.log")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        let parsed = ManifestLog::parse(&text);
        assert!(parsed.contains("config/node.properties"));
        assert!(parsed.contains("os/etc/sysconfig/network"));
    }

    #[test]
    fn test_stale_manifest_replaced() {
        let staging = staging();
        fs::write(staging.path().join("manifest.log"), "stale\n").unwrap();
        let out = TempDir::new().unwrap();
        let path = out.path().join("image.zip");
        let manifest = write_image(staging.path(), &path).unwrap();
        assert!(!manifest.contains("stale"));
        let names = entry_names(&path);
        assert_eq!(names.iter().filter(|n| *n == "manifest.log").count(), 1);
    }

    #[test]
    fn test_missing_version_rejected() {
        let staging = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let err = write_image(staging.path(), &out.path().join("x.zip")).unwrap_err();
        assert!(matches!(err, ImageError::MissingFile(_)));
    }

    #[test]
    fn test_build_creates_parent_and_refuses_existing() {
        let staging = staging();
        let out = TempDir::new().unwrap();
        let requested = out.path().join("nested/dir/image.zip");
        let writer = ArchiveWriter::new(NamingPolicy::local(None).with_unique(false));

        let built = writer.build(staging.path(), requested.to_str().unwrap()).unwrap();
        assert_eq!(built.path, requested);
        assert!(requested.is_file());

        let err = writer
            .build(staging.path(), requested.to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, ImageError::TargetExists { .. }));
    }

    #[test]
    fn test_build_unique_name() {
        let staging = staging();
        let out = TempDir::new().unwrap();
        let requested = out.path().join("image.zip");
        let writer = ArchiveWriter::new(NamingPolicy::local(None));
        let built = writer.build(staging.path(), requested.to_str().unwrap()).unwrap();
        assert_ne!(built.path, requested);
        assert_eq!(built.path.parent(), Some(out.path()));
        assert!(built
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_image.zip"));
    }

    #[test]
    fn test_build_at_keeps_resolved_name() {
        let staging = staging();
        let out = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(NamingPolicy::local(None));
        let target = writer
            .resolve_target(out.path().join("image.zip").to_str().unwrap())
            .unwrap();

        let built = writer.build_at(staging.path(), target.clone()).unwrap();
        assert_eq!(built.path, target);
        assert!(target.is_file());
        assert!(matches!(
            writer.build_at(staging.path(), target).unwrap_err(),
            ImageError::TargetExists { .. }
        ));
    }
}
