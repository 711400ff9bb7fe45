//! Manifest files.
//!
//! Two plain-text list formats share one parser:
//! - `manifest.log` at the image root, listing every archived entry
//! - list files on the live gateway such as `config/backup/cfg/backup_manifest`
//!
//! Lines starting with `#` are comments. Remaining lines are trimmed, empty
//! lines are skipped and duplicates are dropped, keeping file order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{ImageError, Result};

/// Manifest file name at the image root.
pub const MANIFEST_FILE_NAME: &str = gw_common::layout::MANIFEST_LOG;

/// Parse list text into its entries.
pub fn parse_list(text: &str) -> Vec<String> {
    let mut entries: Vec<String> = Vec::new();
    for line in text.lines() {
        if line.starts_with('#') {
            continue;
        }
        let entry = line.trim();
        if entry.is_empty() || entries.iter().any(|e| e == entry) {
            continue;
        }
        entries.push(entry.to_string());
    }
    entries
}

/// Read a list file. A missing file, or a path that is not a regular file,
/// gives an empty list.
pub fn read_list_file(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path).map_err(|e| ImageError::io_at(path, e))?;
    Ok(parse_list(&text))
}

/// Listing of every entry written to an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestLog {
    /// When the image was written.
    pub created_at: DateTime<Utc>,
    /// Content of the version marker.
    pub product_version: Option<String>,
    /// Archive entry names, in write order.
    pub entries: Vec<String>,
}

impl ManifestLog {
    pub fn new(product_version: Option<String>) -> Self {
        Self {
            created_at: Utc::now(),
            product_version,
            entries: Vec::new(),
        }
    }

    /// Record an archived entry.
    pub fn add_entry(&mut self, name: impl Into<String>) {
        self.entries.push(name.into());
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e == name)
    }

    /// Render as `manifest.log` text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# gateway backup image manifest\n");
        out.push_str(&format!("# created {}\n", self.created_at.to_rfc3339()));
        if let Some(version) = &self.product_version {
            out.push_str(&format!("# version {}\n", version.trim()));
        }
        for entry in &self.entries {
            out.push_str(entry);
            out.push('\n');
        }
        out
    }

    /// Parse `manifest.log` text.
    ///
    /// Header comments are optional; images written by older gateways only
    /// carry the entry list.
    pub fn parse(text: &str) -> Self {
        let mut created_at = None;
        let mut product_version = None;
        for line in text.lines() {
            if let Some(ts) = line.strip_prefix("# created ") {
                created_at = DateTime::parse_from_rfc3339(ts.trim())
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc));
            } else if let Some(v) = line.strip_prefix("# version ") {
                product_version = Some(v.trim().to_string());
            }
        }
        Self {
            created_at: created_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            product_version,
            entries: parse_list(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_list_keeps_order() {
        let text = (1..=6)
            .map(|i| format!("audit_table_{}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let parsed = parse_list(&text);
        let expected: Vec<String> = (1..=6).map(|i| format!("audit_table_{}", i)).collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_list_skips_comments_blanks_and_duplicates() {
        let text = "# header\n/etc/hosts\n\n   \n  /etc/ntp.conf  \n/etc/hosts\n#/etc/skipped\n";
        assert_eq!(parse_list(text), vec!["/etc/hosts", "/etc/ntp.conf"]);
    }

    #[test]
    fn test_parse_list_indented_hash_is_not_comment() {
        // Only a leading '#' marks a comment.
        assert_eq!(parse_list("  #not-a-comment"), vec!["#not-a-comment"]);
    }

    #[test]
    fn test_read_list_file_missing_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let list = read_list_file(&dir.path().join("absent")).unwrap();
        assert!(list.is_empty());
        // A directory is not a list file either.
        assert!(read_list_file(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_read_list_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("backup_manifest");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# os files").unwrap();
        writeln!(f, "/etc/sysconfig/network").unwrap();
        writeln!(f, "/etc/resolv.conf").unwrap();
        drop(f);
        assert_eq!(
            read_list_file(&path).unwrap(),
            vec!["/etc/sysconfig/network", "/etc/resolv.conf"]
        );
    }

    #[test]
    fn test_manifest_render_parse() {
        let mut log = ManifestLog::new(Some("5.1.0".to_string()));
        log.add_entry("version");
        log.add_entry("config/node.properties");
        let parsed = ManifestLog::parse(&log.render());
        assert_eq!(parsed.entries, log.entries);
        assert_eq!(parsed.product_version.as_deref(), Some("5.1.0"));
        assert_eq!(parsed.created_at.timestamp(), log.created_at.timestamp());
    }

    #[test]
    fn test_manifest_parse_bare_listing() {
        let parsed = ManifestLog::parse("version\nconfig/omp.dat\n");
        assert_eq!(parsed.entries, vec!["version", "config/omp.dat"]);
        assert!(parsed.product_version.is_none());
    }
}
