/*!
 * Remote filesystem abstraction
 *
 * The wire-level SMB client lives outside the engine; everything here is
 * defined against this method set. Paths handed to a `RemoteFs` are
 * forward-slashed and relative to the share root.
 */

pub mod local;
pub mod manifest;
pub mod scanner;

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::core::paths::UncPath;
use crate::error::Result;
use crate::keystore::Credentials;

/// One remote directory entry
#[derive(Debug, Clone)]
pub struct RemoteFileInfo {
    /// Share-relative path, forward-slashed
    pub path: String,
    pub name: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub is_dir: bool,
}

/// Stat result for one remote path
#[derive(Debug, Clone)]
pub struct RemoteStat {
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub is_dir: bool,
}

/// The capability set the executor and remote scanner rely on
///
/// Implementations must be safe to share across executor workers; when a
/// client is not, the pool size must be configured to 1.
pub trait RemoteFs: Send + Sync {
    fn connect(&self) -> Result<()>;
    fn disconnect(&self) -> Result<()>;

    /// Shallow listing of one directory
    fn list(&self, rel_dir: &str) -> Result<Vec<RemoteFileInfo>>;

    fn stat(&self, rel_path: &str) -> Result<RemoteStat>;

    /// Copy a remote file to a local path
    fn read(&self, rel_path: &str, local_path: &Path) -> Result<()>;

    /// Copy a local file to a remote path, creating parent directories
    fn write(&self, local_path: &Path, rel_path: &str) -> Result<()>;

    fn delete(&self, rel_path: &str) -> Result<()>;

    fn mkdir(&self, rel_dir: &str) -> Result<()>;

    fn rename(&self, old_rel: &str, new_rel: &str) -> Result<()>;

    /// Whole-file read into memory, used for manifests
    fn read_file(&self, rel_path: &str) -> Result<Vec<u8>>;
}

/// Builds a connected client for one job's remote root
pub trait RemoteFsFactory: Send + Sync {
    fn create(&self, unc: &UncPath, credentials: &Credentials) -> Result<Box<dyn RemoteFs>>;
}
