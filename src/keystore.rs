/*!
 * Credential lookup
 *
 * Credential *storage* is outside the engine; this is only the seam the
 * preparation phase uses to resolve a server host into SMB credentials.
 */

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Result, SyncError};

/// SMB credentials for one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

/// Host-keyed credential source
pub trait Keystore: Send + Sync {
    fn get(&self, host: &str) -> Result<Credentials>;
    fn put(&self, host: &str, credentials: Credentials) -> Result<()>;
    fn delete(&self, host: &str) -> Result<()>;
}

/// In-memory keystore for tests and embedding callers
#[derive(Default)]
pub struct MemoryKeystore {
    entries: Mutex<HashMap<String, Credentials>>,
}

impl MemoryKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(host: &str, credentials: Credentials) -> Self {
        let store = Self::new();
        store.put(host, credentials).ok();
        store
    }
}

impl Keystore for MemoryKeystore {
    fn get(&self, host: &str) -> Result<Credentials> {
        self.entries
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .ok_or_else(|| SyncError::Config(format!("no credentials stored for host {host}")))
    }

    fn put(&self, host: &str, credentials: Credentials) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(host.to_string(), credentials);
        Ok(())
    }

    fn delete(&self, host: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(host);
        Ok(())
    }
}

/// Environment-backed keystore used by the CLI
///
/// Reads `ANEMONE_SMB_USERNAME` / `ANEMONE_SMB_PASSWORD` /
/// `ANEMONE_SMB_DOMAIN`, with `ANEMONE_SMB_<HOST>_*` taking precedence for
/// a specific server (host uppercased, `.` and `-` mapped to `_`).
#[derive(Default)]
pub struct EnvKeystore;

impl EnvKeystore {
    pub fn new() -> Self {
        Self
    }

    fn host_var(host: &str, suffix: &str) -> String {
        let mangled: String = host
            .to_uppercase()
            .chars()
            .map(|c| if c == '.' || c == '-' { '_' } else { c })
            .collect();
        format!("ANEMONE_SMB_{mangled}_{suffix}")
    }

    fn lookup(host: &str, suffix: &str) -> Option<String> {
        std::env::var(Self::host_var(host, suffix))
            .or_else(|_| std::env::var(format!("ANEMONE_SMB_{suffix}")))
            .ok()
    }
}

impl Keystore for EnvKeystore {
    fn get(&self, host: &str) -> Result<Credentials> {
        let username = Self::lookup(host, "USERNAME").ok_or_else(|| {
            SyncError::Config(format!(
                "no credentials for {host}: set ANEMONE_SMB_USERNAME or {}",
                Self::host_var(host, "USERNAME")
            ))
        })?;
        let password = Self::lookup(host, "PASSWORD").unwrap_or_default();
        let domain = Self::lookup(host, "DOMAIN");
        Ok(Credentials {
            username,
            password,
            domain,
        })
    }

    fn put(&self, _host: &str, _credentials: Credentials) -> Result<()> {
        Err(SyncError::Config(
            "environment keystore is read-only".into(),
        ))
    }

    fn delete(&self, _host: &str) -> Result<()> {
        Err(SyncError::Config(
            "environment keystore is read-only".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_round_trips() {
        let store = MemoryKeystore::new();
        let creds = Credentials {
            username: "svc".into(),
            password: "pw".into(),
            domain: Some("CORP".into()),
        };
        store.put("nas", creds.clone()).unwrap();
        assert_eq!(store.get("nas").unwrap(), creds);

        store.delete("nas").unwrap();
        assert!(store.get("nas").is_err());
    }

    #[test]
    fn env_host_var_mangles_punctuation() {
        assert_eq!(
            EnvKeystore::host_var("nas-01.corp.example", "USERNAME"),
            "ANEMONE_SMB_NAS_01_CORP_EXAMPLE_USERNAME"
        );
    }
}
