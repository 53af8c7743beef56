/*!
 * Configuration structures and defaults for Anemone
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::model::{ConflictPolicy, SyncMode};

/// Content hash algorithm used by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Blake3,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Sha256
    }
}

impl HashAlgorithm {
    /// Length of the lowercase hex digest this algorithm produces
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Blake3 => 64,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(SyncError::Config(format!("unknown hash algorithm: {other}"))),
        }
    }
}

/// Transfer and hashing performance knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Parallel transfer workers; 0 runs the executor sequentially
    pub parallel_transfers: usize,
    /// Streaming buffer for hashing and copies, in MiB
    pub buffer_size_mb: usize,
    pub hash_algorithm: HashAlgorithm,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            parallel_transfers: 4,
            buffer_size_mb: 4,
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

/// Defaults applied to newly created jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncDefaultsConfig {
    pub mode: SyncMode,
    pub trigger: String,
    pub conflict_resolution: ConflictPolicy,
}

impl Default for SyncDefaultsConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Mirror,
            trigger: "manual".to_string(),
            conflict_resolution: ConflictPolicy::Recent,
        }
    }
}

/// Watcher debounce settings, consumed by the external scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub debounce_seconds: u64,
    pub batch_interval_minutes: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: 2,
            batch_interval_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Minimum milliseconds between progress callbacks
    pub min_update_interval_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_update_interval_ms: 250,
        }
    }
}

/// Scanner write-batching thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub cache_batch_size: usize,
    pub cache_batch_delay_seconds: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            cache_batch_size: 100,
            cache_batch_delay_seconds: 5,
        }
    }
}

/// Retry policy knobs shared by all executed actions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of each delay randomly shaved off, in [0, 1]
    pub jitter: f64,
    pub only_retryable_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.2,
            only_retryable_errors: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Override for the state database location
    pub path: Option<PathBuf>,
}

/// Top-level application configuration, loadable from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub performance: PerformanceConfig,
    pub sync_defaults: SyncDefaultsConfig,
    pub realtime: RealtimeConfig,
    pub progress: ProgressConfig,
    pub batching: BatchingConfig,
    pub retry: RetryConfig,
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => return Err(SyncError::from_io(err, path)),
        };

        let config: AppConfig = toml::from_str(&text)
            .map_err(|e| SyncError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.performance.buffer_size_mb == 0 {
            return Err(SyncError::Config("buffer_size_mb must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(SyncError::Config(format!(
                "retry jitter must be in [0, 1], got {}",
                self.retry.jitter
            )));
        }
        if self.retry.multiplier < 1.0 {
            return Err(SyncError::Config(format!(
                "retry multiplier must be >= 1, got {}",
                self.retry.multiplier
            )));
        }
        if self.progress.min_update_interval_ms == 0 {
            return Err(SyncError::Config(
                "min_update_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Default on-disk location for the state database
    pub fn default_db_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("anemone")
            .join("state.db")
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(Self::default_db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.performance.parallel_transfers, 4);
        assert_eq!(config.performance.buffer_size_mb, 4);
        assert_eq!(config.performance.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.progress.min_update_interval_ms, 250);
        assert_eq!(config.batching.cache_batch_size, 100);
        assert_eq!(config.batching.cache_batch_delay_seconds, 5);
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[performance]\nparallel_transfers = 8\n\n[retry]\nmax_retries = 5"
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.performance.parallel_transfers, 8);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.batching.cache_batch_size, 100);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/anemone.toml")).unwrap();
        assert_eq!(config.performance.parallel_transfers, 4);
    }

    #[test]
    fn invalid_jitter_rejected() {
        let config = AppConfig {
            retry: RetryConfig {
                jitter: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn hash_algorithm_parses_case_insensitively() {
        assert_eq!(HashAlgorithm::parse("SHA256").unwrap(), HashAlgorithm::Sha256);
        assert_eq!(HashAlgorithm::parse("blake3").unwrap(), HashAlgorithm::Blake3);
        assert!(HashAlgorithm::parse("md5").is_err());
    }
}
