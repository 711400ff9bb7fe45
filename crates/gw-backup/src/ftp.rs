//! FTP transport seam.

use crate::options::FtpConfig;
use gw_common::{Error, Result};
use std::path::Path;

/// External FTP transfer client.
pub trait FtpTransport {
    /// Upload `local` as `remote_name` on the configured server.
    fn upload(&self, local: &Path, config: &FtpConfig, remote_name: &str) -> Result<()>;

    /// Download `remote_name` into `local`.
    fn download(&self, config: &FtpConfig, remote_name: &str, local: &Path) -> Result<()>;
}

/// Transport used when no FTP client is linked in.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableFtp;

impl FtpTransport for UnavailableFtp {
    fn upload(&self, _local: &Path, config: &FtpConfig, remote_name: &str) -> Result<()> {
        Err(Error::Transfer(format!(
            "cannot upload {} to {}: no FTP client is available",
            remote_name,
            config.url()
        )))
    }

    fn download(&self, config: &FtpConfig, remote_name: &str, _local: &Path) -> Result<()> {
        Err(Error::Transfer(format!(
            "cannot download {} from {}: no FTP client is available",
            remote_name,
            config.url()
        )))
    }
}
