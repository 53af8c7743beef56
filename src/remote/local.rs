/*!
 * Mounted-share remote client
 *
 * Serves a share that the OS has already made reachable as a directory (a
 * UNC path on Windows, a mount point elsewhere) through plain `std::fs`.
 * Integration tests run against it with a temp directory as the share.
 */

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{RemoteFileInfo, RemoteFs, RemoteFsFactory, RemoteStat};
use crate::core::paths::{join_remote, to_local, UncPath};
use crate::error::{Result, SyncError};
use crate::keystore::Credentials;

pub struct LocalRemoteFs {
    root: PathBuf,
}

impl LocalRemoteFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, rel: &str) -> PathBuf {
        to_local(&self.root, rel)
    }
}

fn mtime_of(metadata: &fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}

impl RemoteFs for LocalRemoteFs {
    fn connect(&self) -> Result<()> {
        // a missing root is served as an empty share; the first write
        // creates it
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn list(&self, rel_dir: &str) -> Result<Vec<RemoteFileInfo>> {
        let dir = self.resolve(rel_dir);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| SyncError::from_io(e, &dir))? {
            let entry = entry.map_err(|e| SyncError::from_io(e, &dir))?;
            let metadata = entry
                .metadata()
                .map_err(|e| SyncError::from_io(e, &entry.path()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(RemoteFileInfo {
                path: join_remote(rel_dir, &name),
                name,
                size: metadata.len(),
                mtime: mtime_of(&metadata),
                is_dir: metadata.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn stat(&self, rel_path: &str) -> Result<RemoteStat> {
        let path = self.resolve(rel_path);
        let metadata = fs::metadata(&path).map_err(|e| SyncError::from_io(e, &path))?;
        Ok(RemoteStat {
            size: metadata.len(),
            mtime: mtime_of(&metadata),
            is_dir: metadata.is_dir(),
        })
    }

    fn read(&self, rel_path: &str, local_path: &Path) -> Result<()> {
        let remote = self.resolve(rel_path);
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::from_io(e, parent))?;
        }
        fs::copy(&remote, local_path).map_err(|e| SyncError::from_io(e, &remote))?;
        Ok(())
    }

    fn write(&self, local_path: &Path, rel_path: &str) -> Result<()> {
        let remote = self.resolve(rel_path);
        if let Some(parent) = remote.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::from_io(e, parent))?;
        }
        fs::copy(local_path, &remote).map_err(|e| SyncError::from_io(e, local_path))?;
        // SMB transfers preserve timestamps; mtime comparisons across the
        // two trees depend on it
        let metadata = fs::metadata(local_path).map_err(|e| SyncError::from_io(e, local_path))?;
        let mtime = filetime::FileTime::from_last_modification_time(&metadata);
        filetime::set_file_mtime(&remote, mtime).map_err(|e| SyncError::from_io(e, &remote))?;
        Ok(())
    }

    fn delete(&self, rel_path: &str) -> Result<()> {
        let path = self.resolve(rel_path);
        fs::remove_file(&path).map_err(|e| SyncError::from_io(e, &path))
    }

    fn mkdir(&self, rel_dir: &str) -> Result<()> {
        let path = self.resolve(rel_dir);
        fs::create_dir_all(&path).map_err(|e| SyncError::from_io(e, &path))
    }

    fn rename(&self, old_rel: &str, new_rel: &str) -> Result<()> {
        let old = self.resolve(old_rel);
        let new = self.resolve(new_rel);
        if let Some(parent) = new.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::from_io(e, parent))?;
        }
        fs::rename(&old, &new).map_err(|e| SyncError::from_io(e, &old))
    }

    fn read_file(&self, rel_path: &str) -> Result<Vec<u8>> {
        let path = self.resolve(rel_path);
        fs::read(&path).map_err(|e| SyncError::from_io(e, &path))
    }
}

/// Factory resolving a UNC root to an OS-mounted directory
///
/// With a `mount_base`, `\\server\share\rel` maps to
/// `<mount_base>/<server>/<share>/<rel>`. Without one, the UNC path is used
/// directly, which the OS resolves natively on Windows.
#[derive(Debug, Default)]
pub struct MountedShareFactory {
    mount_base: Option<std::path::PathBuf>,
}

impl MountedShareFactory {
    pub fn new(mount_base: Option<std::path::PathBuf>) -> Self {
        Self { mount_base }
    }
}

impl RemoteFsFactory for MountedShareFactory {
    fn create(&self, unc: &UncPath, _credentials: &Credentials) -> Result<Box<dyn RemoteFs>> {
        let root = match &self.mount_base {
            Some(base) => base.join(&unc.server).join(&unc.share),
            None => {
                if cfg!(windows) {
                    PathBuf::from(format!(r"\\{}\{}", unc.server, unc.share))
                } else {
                    return Err(SyncError::Config(
                        "no mount base configured; pass --mount-base for non-Windows hosts".into(),
                    ));
                }
            }
        };
        Ok(Box::new(LocalRemoteFs::new(root)))
    }
}
