//! No-mock image integration tests.
//!
//! Exercises real staging directories and archives on disk:
//! - Write then open with every component folder present
//! - Legacy five-o images without a version marker
//! - Unique naming against a real output directory
//! - Extraction directory lifecycle

use gw_common::{ComponentType, ImageVersion};
use gw_image::{ArchiveWriter, Image, ImageError, NamingPolicy};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

fn put(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Staging tree shaped like a post-five-o export.
fn post_five_o_staging() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    put(root, "version", "5.1.0");
    put(root, "config/node.properties", "node.id=abc\n");
    put(root, "config/omp.dat", "secret");
    put(root, "config/ssglog.properties", "level=INFO");
    put(root, "config/system.properties", "x=y");
    put(root, "ca/custom.properties", "ca=1");
    put(root, "ca/custom.jar", "jar");
    put(root, "ma/echo.aar", "aar");
    put(root, "ext/driver.jar", "ext");
    put(root, "os/etc/sysconfig/network", "HOSTNAME=gw1");
    put(root, "maindb/main_backup.sql", "INSERT INTO t VALUES ('a\\\\b');");
    dir
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn write_then_open_preserves_files() {
    let staging = post_five_o_staging();
    let out = TempDir::new().unwrap();
    let requested = out.path().join("node1.zip");
    let writer = ArchiveWriter::new(NamingPolicy::local(None).with_unique(false));
    let built = writer
        .build(staging.path(), requested.to_str().unwrap())
        .expect("build image");

    let mut image = Image::open(&built.path).expect("open image");
    assert_eq!(image.version(), ImageVersion::AfterFiveO);
    for component in [
        ComponentType::Config,
        ComponentType::Ca,
        ComponentType::Ma,
        ComponentType::Ext,
        ComponentType::Os,
        ComponentType::MainDb,
    ] {
        assert!(image.has_component(component), "missing {}", component);
    }
    assert!(!image.has_component(ComponentType::Esm));

    let root = image.root().unwrap().to_path_buf();
    for rel in [
        "config/node.properties",
        "config/omp.dat",
        "ca/custom.jar",
        "os/etc/sysconfig/network",
        "maindb/main_backup.sql",
    ] {
        assert_eq!(
            fs::read(root.join(rel)).unwrap(),
            fs::read(staging.path().join(rel)).unwrap(),
            "{} differs",
            rel
        );
    }
    assert!(root.join("manifest.log").is_file());
    image.release().unwrap();
    assert!(!root.exists());
}

// ============================================================================
// Legacy images
// ============================================================================

#[test]
fn legacy_image_without_marker_is_five_o() {
    let staging = TempDir::new().unwrap();
    // An empty marker does not parse, so the layout rules decide.
    put(staging.path(), "version", "");
    put(staging.path(), "config/node.properties", "a=b");
    put(staging.path(), "config/custom.properties", "ca=1");
    put(staging.path(), "main_backup.sql", "--dump");
    let out = TempDir::new().unwrap();
    let path = out.path().join("legacy.zip");
    gw_image::write_image(staging.path(), &path).unwrap();

    let mut image = Image::open(&path).unwrap();
    assert_eq!(image.version(), ImageVersion::FiveO);
    assert!(image.has_component(ComponentType::MainDb));
    assert!(image.product_version().is_none());
    image.release().unwrap();
}

#[test]
fn old_marker_is_rejected() {
    let staging = TempDir::new().unwrap();
    put(staging.path(), "version", "4.6.5");
    let out = TempDir::new().unwrap();
    let path = out.path().join("old.zip");
    gw_image::write_image(staging.path(), &path).unwrap();

    let err = Image::open(&path).unwrap_err();
    assert!(matches!(err, ImageError::UnsupportedVersion(_)));
}

// ============================================================================
// Naming
// ============================================================================

#[test]
fn unique_names_land_in_default_dir() {
    let staging = post_five_o_staging();
    let home = TempDir::new().unwrap();
    let default_dir = home.path().join("config/backup/images");
    let writer = ArchiveWriter::new(NamingPolicy::local(Some(default_dir.clone())));

    let built = writer.build(staging.path(), "node1.zip").unwrap();
    assert_eq!(built.path.parent(), Some(default_dir.as_path()));
    let name = built.path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.ends_with("_node1.zip"));
    assert_ne!(name, "node1.zip");
}

#[test]
fn existing_target_is_refused() {
    let staging = post_five_o_staging();
    let out = TempDir::new().unwrap();
    let target = out.path().join("taken.zip");
    fs::write(&target, "occupied").unwrap();
    let writer = ArchiveWriter::new(NamingPolicy::local(None).with_unique(false));

    let err = writer
        .build(staging.path(), target.to_str().unwrap())
        .unwrap_err();
    assert!(matches!(err, ImageError::TargetExists { .. }));
    assert_eq!(fs::read_to_string(&target).unwrap(), "occupied");
}
