//! Image era classification.
//!
//! The `version` marker decides when it parses. Images whose marker is
//! missing or unreadable are classified by an ordered rule table over the
//! extracted layout; the first matching rule wins.

use gw_common::{ImageVersion, ProductVersion};
use std::path::Path;

use crate::{ImageError, Result};

/// Structural test over an extracted image root.
#[derive(Debug, Clone, Copy)]
pub enum LayoutProbe {
    /// A regular file at this root-relative path.
    File(&'static str),
    /// A directory at this root-relative path.
    Dir(&'static str),
}

impl LayoutProbe {
    fn matches(&self, root: &Path) -> bool {
        match self {
            LayoutProbe::File(rel) => root.join(rel).is_file(),
            LayoutProbe::Dir(rel) => root.join(rel).is_dir(),
        }
    }
}

/// One legacy classification rule.
#[derive(Debug, Clone, Copy)]
pub struct LegacyRule {
    pub name: &'static str,
    pub probe: LayoutProbe,
    pub version: ImageVersion,
}

/// Rules for images without a usable marker, in evaluation order.
pub const LEGACY_RULES: &[LegacyRule] = &[
    LegacyRule {
        name: "root database dump",
        probe: LayoutProbe::File(gw_common::layout::MAIN_DB_DUMP),
        version: ImageVersion::FiveO,
    },
    LegacyRule {
        name: "maindb folder",
        probe: LayoutProbe::Dir("maindb"),
        version: ImageVersion::AfterFiveO,
    },
];

/// Era assumed when no rule matches.
pub const LEGACY_DEFAULT: ImageVersion = ImageVersion::AfterFiveO;

/// How an image's era was decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// From the version marker.
    Marker(ProductVersion),
    /// From the named legacy rule.
    Rule(&'static str),
    /// No marker and no rule matched.
    Default,
}

/// Classify an extracted image.
///
/// `marker` is the content of the root `version` file, if present. A marker
/// naming a release older than 5.0 is rejected.
pub fn classify(root: &Path, marker: Option<&str>) -> Result<(ImageVersion, Classification)> {
    if let Some(version) = marker.and_then(ProductVersion::parse) {
        if !version.is_supported() {
            return Err(ImageError::UnsupportedVersion(version.to_string()));
        }
        return Ok((version.image_version(), Classification::Marker(version)));
    }
    classify_with(root, LEGACY_RULES)
}

/// Apply a legacy rule table.
pub fn classify_with(root: &Path, rules: &[LegacyRule]) -> Result<(ImageVersion, Classification)> {
    for rule in rules {
        if rule.probe.matches(root) {
            return Ok((rule.version, Classification::Rule(rule.name)));
        }
    }
    Ok((LEGACY_DEFAULT, Classification::Default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_marker_decides() {
        let dir = TempDir::new().unwrap();
        // Layout says five-o, marker says otherwise.
        fs::write(dir.path().join("main_backup.sql"), "x").unwrap();
        let (version, how) = classify(dir.path(), Some("5.1.0\n")).unwrap();
        assert_eq!(version, ImageVersion::AfterFiveO);
        assert_eq!(how, Classification::Marker(ProductVersion::new(5, 1, 0)));

        let (version, _) = classify(dir.path(), Some("5.0")).unwrap();
        assert_eq!(version, ImageVersion::FiveO);
    }

    #[test]
    fn test_old_marker_rejected() {
        let dir = TempDir::new().unwrap();
        let err = classify(dir.path(), Some("4.7.1")).unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedVersion(v) if v == "4.7.1"));
    }

    #[test]
    fn test_legacy_rules() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main_backup.sql"), "x").unwrap();
        let (version, how) = classify(dir.path(), None).unwrap();
        assert_eq!(version, ImageVersion::FiveO);
        assert_eq!(how, Classification::Rule("root database dump"));

        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("maindb")).unwrap();
        let (version, how) = classify(dir.path(), Some("garbage")).unwrap();
        assert_eq!(version, ImageVersion::AfterFiveO);
        assert_eq!(how, Classification::Rule("maindb folder"));
    }

    #[test]
    fn test_legacy_default() {
        let dir = TempDir::new().unwrap();
        let (version, how) = classify(dir.path(), None).unwrap();
        assert_eq!(version, LEGACY_DEFAULT);
        assert_eq!(how, Classification::Default);
    }

    #[test]
    fn test_custom_rule_table() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("legacy")).unwrap();
        let rules = [LegacyRule {
            name: "legacy dir",
            probe: LayoutProbe::Dir("legacy"),
            version: ImageVersion::FiveO,
        }];
        let (version, _) = classify_with(dir.path(), &rules).unwrap();
        assert_eq!(version, ImageVersion::FiveO);
    }
}
