//! Product and image versions.
//!
//! The on-disk layout changed after the 5.0 release. Images written by a
//! 5.0 gateway are `FiveO`; anything newer is `AfterFiveO`. Gateways older
//! than 5.0 are not supported at all.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Lowest supported major version.
pub const FIVE_O_MAJOR: u32 = 5;

/// Reported build version of a gateway, e.g. `5.1.2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductVersion {
    pub major: u32,
    pub minor: u32,
    pub sub_minor: u32,
}

impl ProductVersion {
    pub const fn new(major: u32, minor: u32, sub_minor: u32) -> Self {
        Self {
            major,
            minor,
            sub_minor,
        }
    }

    /// Parse a version string.
    ///
    /// Accepts `major.minor[.sub]` followed by any suffix (`5.0.1-beta`,
    /// `5.1 build 1234`). Surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
        let re = PATTERN.get_or_init(|| {
            regex::Regex::new(r"^\s*(\d+)\.(\d+)(?:\.(\d+))?").expect("version pattern is valid")
        });
        let caps = re.captures(s)?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        let sub_minor = match caps.get(3) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        Some(Self::new(major, minor, sub_minor))
    }

    /// True for 5.0 and later.
    pub fn is_supported(&self) -> bool {
        self.major >= FIVE_O_MAJOR
    }

    /// Layout era this version writes.
    pub fn image_version(&self) -> ImageVersion {
        if self.major == FIVE_O_MAJOR && self.minor == 0 {
            ImageVersion::FiveO
        } else {
            ImageVersion::AfterFiveO
        }
    }
}

impl std::fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.sub_minor)
    }
}

impl std::str::FromStr for ProductVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductVersion::parse(s).ok_or_else(|| format!("invalid product version: {}", s))
    }
}

/// Layout era of an image archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageVersion {
    /// Written by a 5.0 gateway.
    FiveO,
    /// Written by any later gateway.
    AfterFiveO,
}

impl std::fmt::Display for ImageVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageVersion::FiveO => write!(f, "five_o"),
            ImageVersion::AfterFiveO => write!(f, "after_five_o"),
        }
    }
}
