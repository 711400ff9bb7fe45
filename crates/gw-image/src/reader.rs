//! Image reader.
//!
//! An [`Image`] owns a private extraction directory. Callers release it
//! with [`Image::release`] on every exit path; release is idempotent and
//! the directory is also removed if the image is dropped unreleased.

use crate::classify::{classify, Classification};
use crate::manifest::{ManifestLog, MANIFEST_FILE_NAME};
use crate::{ImageError, Result};
use gw_common::layout::{MAIN_DB_DUMP, VERSION_FILE};
use gw_common::{ComponentType, ImageVersion, ProductVersion};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};
use zip::ZipArchive;

/// Prefix of extraction directories.
pub const EXTRACT_PREFIX: &str = "gw-image-";

/// An opened, extracted image.
#[derive(Debug)]
pub struct Image {
    source: PathBuf,
    dir: Option<TempDir>,
    version: ImageVersion,
    classification: Classification,
    components: BTreeSet<ComponentType>,
    manifest: Option<ManifestLog>,
}

impl Image {
    /// Extract `path` into a fresh private directory and classify it.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ImageError::io_at(path, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| ImageError::InvalidImage {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let dir = tempfile::Builder::new().prefix(EXTRACT_PREFIX).tempdir()?;
        extract(&mut archive, dir.path())?;

        let root = dir.path();
        let marker = read_optional(&root.join(VERSION_FILE))?;
        let (version, classification) = classify(root, marker.as_deref())?;
        let manifest = read_optional(&root.join(MANIFEST_FILE_NAME))?
            .map(|text| ManifestLog::parse(&text));
        let components = scan_components(root, version)?;

        info!(
            path = %path.display(),
            version = %version,
            classification = ?classification,
            components = components.len(),
            "image opened"
        );

        Ok(Self {
            source: path.to_path_buf(),
            dir: Some(dir),
            version,
            classification,
            components,
            manifest,
        })
    }

    /// Archive this image was opened from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Extraction root. Fails once released.
    pub fn root(&self) -> Result<&Path> {
        self.dir
            .as_ref()
            .map(|d| d.path())
            .ok_or(ImageError::Released)
    }

    pub fn version(&self) -> ImageVersion {
        self.version
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Producing environment's version, when the marker parsed.
    pub fn product_version(&self) -> Option<ProductVersion> {
        match self.classification {
            Classification::Marker(v) => Some(v),
            _ => None,
        }
    }

    pub fn components_present(&self) -> &BTreeSet<ComponentType> {
        &self.components
    }

    pub fn has_component(&self, component: ComponentType) -> bool {
        self.components.contains(&component)
    }

    pub fn manifest(&self) -> Option<&ManifestLog> {
        self.manifest.as_ref()
    }

    /// Extracted folder of `component`, if the image has one.
    pub fn component_dir(&self, component: ComponentType) -> Result<Option<PathBuf>> {
        let root = self.root()?;
        Ok(component
            .folder()
            .map(|folder| root.join(folder))
            .filter(|p| p.is_dir()))
    }

    /// Extracted `config/` folder, if present.
    pub fn config_folder(&self) -> Result<Option<PathBuf>> {
        self.component_dir(ComponentType::Config)
    }

    /// Files under a component folder, relative to it, sorted.
    pub fn files_under(&self, component: ComponentType) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if let Some(dir) = self.component_dir(component)? {
            walk_relative(&dir, &dir, &mut files)?;
        }
        files.sort();
        Ok(files)
    }

    /// Delete the extraction directory. Safe to call more than once.
    pub fn release(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            dir.close().map_err(|e| ImageError::io_at(&path, e))?;
            debug!(path = %path.display(), "image released");
        }
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }
}

fn extract(archive: &mut ZipArchive<File>, dest: &Path) -> Result<()> {
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let rel = entry
            .enclosed_name()
            .ok_or_else(|| ImageError::UnsafeEntry(entry.name().to_string()))?;
        let out = dest.join(rel);
        if entry.is_dir() {
            fs::create_dir_all(&out).map_err(|e| ImageError::io_at(&out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| ImageError::io_at(parent, e))?;
        }
        let mut file = File::create(&out).map_err(|e| ImageError::io_at(&out, e))?;
        io::copy(&mut entry, &mut file)?;
    }
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|e| ImageError::io_at(path, e))
}

fn scan_components(root: &Path, version: ImageVersion) -> Result<BTreeSet<ComponentType>> {
    let mut components = BTreeSet::new();
    if root.join(VERSION_FILE).is_file() {
        components.insert(ComponentType::Version);
    }
    for entry in fs::read_dir(root).map_err(|e| ImageError::io_at(root, e))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(component) = ComponentType::from_folder(&name.to_string_lossy()) {
            components.insert(component);
        }
    }
    // Five-o images keep the main dump at the root.
    if version == ImageVersion::FiveO && root.join(MAIN_DB_DUMP).is_file() {
        components.insert(ComponentType::MainDb);
    }
    Ok(components)
}

fn walk_relative(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(|e| ImageError::io_at(dir, e))? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_relative(base, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            out.push(rel.to_path_buf());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::write_image;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    fn build(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("image.zip");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let options: FileOptions<'_, ()> = FileOptions::default();
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        (dir, path)
    }

    #[test]
    fn test_open_detects_components() {
        let (_dir, path) = build(&[
            ("version", "5.1.0"),
            ("config/node.properties", "a=b"),
            ("ca/custom.properties", "x"),
            ("os/etc/hosts", "127.0.0.1"),
            ("unknown/file", "?"),
        ]);
        let mut image = Image::open(&path).unwrap();
        assert_eq!(image.version(), ImageVersion::AfterFiveO);
        assert_eq!(image.product_version(), Some(ProductVersion::new(5, 1, 0)));
        let present: Vec<_> = image.components_present().iter().copied().collect();
        assert!(present.contains(&ComponentType::Config));
        assert!(present.contains(&ComponentType::Ca));
        assert!(present.contains(&ComponentType::Os));
        assert!(present.contains(&ComponentType::Version));
        assert!(!present.contains(&ComponentType::Ma));
        assert_eq!(
            image.files_under(ComponentType::Os).unwrap(),
            vec![PathBuf::from("etc/hosts")]
        );
        image.release().unwrap();
    }

    #[test]
    fn test_five_o_root_dump_is_maindb() {
        let (_dir, path) = build(&[("config/node.properties", "a"), ("main_backup.sql", "--")]);
        let mut image = Image::open(&path).unwrap();
        assert_eq!(image.version(), ImageVersion::FiveO);
        assert!(image.has_component(ComponentType::MainDb));
        assert!(image.product_version().is_none());
        image.release().unwrap();
    }

    #[test]
    fn test_release_idempotent() {
        let (_dir, path) = build(&[("version", "5.1")]);
        let mut image = Image::open(&path).unwrap();
        let root = image.root().unwrap().to_path_buf();
        assert!(root.is_dir());
        image.release().unwrap();
        assert!(!root.exists());
        image.release().unwrap();
        assert!(image.is_released());
        assert!(matches!(image.root(), Err(ImageError::Released)));
    }

    #[test]
    fn test_not_a_zip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bogus.zip");
        fs::write(&path, "not a zip").unwrap();
        let err = Image::open(&path).unwrap_err();
        assert!(matches!(err, ImageError::InvalidImage { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = Image::open(Path::new("/nonexistent/image.zip")).unwrap_err();
        assert!(matches!(err, ImageError::IoAt { .. }));
    }

    #[test]
    fn test_zip_slip_rejected() {
        let (_dir, path) = build(&[("version", "5.1"), ("../escape", "x")]);
        let err = Image::open(&path).unwrap_err();
        assert!(matches!(err, ImageError::UnsafeEntry(_)));
    }

    #[test]
    fn test_reads_written_manifest() {
        let staging = TempDir::new().unwrap();
        fs::write(staging.path().join("version"), "5.1.0").unwrap();
        fs::create_dir_all(staging.path().join("ma")).unwrap();
        fs::write(staging.path().join("ma/a.aar"), "aar").unwrap();
        let out = TempDir::new().unwrap();
        let path = out.path().join("image.zip");
        write_image(staging.path(), &path).unwrap();

        let mut image = Image::open(&path).unwrap();
        let manifest = image.manifest().unwrap();
        assert!(manifest.contains("ma/a.aar"));
        assert!(image.has_component(ComponentType::Ma));
        image.release().unwrap();
    }
}
