//! Gateway backup image writer/reader.
//!
//! An image is a ZIP archive holding one node's captured state:
//! - `version`: the producing environment's build version
//! - `manifest.log`: every entry written to the image
//! - one top-level folder per captured component (`config/`, `ca/`, `ma/`,
//!   `ext/`, `esm/`, `maindb/`, `audits/`)
//! - `os/<absolute path>` for operating-system files
//!
//! Images written before the `version` marker existed are classified by
//! their layout (see [`classify`]).
//!
//! # Example
//!
//! ```no_run
//! use gw_image::{ArchiveWriter, Image, NamingPolicy};
//! use std::path::Path;
//!
//! let writer = ArchiveWriter::new(NamingPolicy::local(None));
//! let built = writer.build(Path::new("/tmp/staging"), "/tmp/images/node1.zip").unwrap();
//!
//! let mut image = Image::open(&built.path).unwrap();
//! println!("{} {:?}", image.version(), image.components_present());
//! image.release().unwrap();
//! ```

pub mod classify;
pub mod error;
pub mod manifest;
pub mod naming;
pub mod reader;
pub mod writer;

pub use classify::{classify, Classification, LegacyRule, LEGACY_RULES};
pub use error::{ImageError, Result};
pub use manifest::{parse_list, read_list_file, ManifestLog, MANIFEST_FILE_NAME};
pub use naming::{dir_part, file_part, ImageTarget, NamingPolicy};
pub use reader::Image;
pub use writer::{write_image, ArchiveWriter, BuiltImage};
