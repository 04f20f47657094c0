//! Engine configuration loaded from `~/.config/rdm/config.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::events::DEFAULT_NOTIFICATION_INTERVAL_MS;
use crate::transfer::TransferOptions;

/// Global engine configuration. Missing keys take their default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of attempts running at once.
    pub max_concurrent_tasks: usize,
    /// Minimum progress advance (percentage points) between recorded progress updates.
    pub progress_step: u8,
    pub connect_timeout_secs: u64,
    /// Abort an attempt when no data arrives for this long.
    pub read_timeout_secs: u64,
    /// Transfer chunk size in bytes.
    pub buffer_size: usize,
    /// Minimum interval between progress events forwarded by a `ThrottledObserver`.
    pub notification_interval_ms: u64,
    /// Optional `User-Agent` sent with every request.
    pub user_agent: Option<String>,
    /// Skip TLS certificate verification. Only for trusted test setups.
    pub accept_invalid_certs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 3,
            progress_step: 10,
            connect_timeout_secs: 15,
            read_timeout_secs: 15,
            buffer_size: 4096,
            notification_interval_ms: DEFAULT_NOTIFICATION_INTERVAL_MS,
            user_agent: None,
            accept_invalid_certs: false,
        }
    }
}

impl EngineConfig {
    /// Per-attempt transport settings derived from this config.
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
            read_timeout: Duration::from_secs(self.read_timeout_secs.max(1)),
            buffer_size: self.buffer_size,
            progress_step: self.progress_step.min(100),
            user_agent: self.user_agent.clone(),
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<EngineConfig> {
    load_or_init_at(&config_path()?)
}

/// Like [`load_or_init`] for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let default_cfg = EngineConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: EngineConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_concurrent_tasks, 3);
        assert_eq!(cfg.progress_step, 10);
        assert_eq!(cfg.connect_timeout_secs, 15);
        assert_eq!(cfg.read_timeout_secs, 15);
        assert_eq!(cfg.buffer_size, 4096);
        assert!(cfg.user_agent.is_none());
        assert!(!cfg.accept_invalid_certs);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = EngineConfig {
            user_agent: Some("rdm/0.1".to_string()),
            ..EngineConfig::default()
        };
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_partial_values() {
        let toml = r#"
            max_concurrent_tasks = 8
            read_timeout_secs = 30
            user_agent = "custom-agent"
        "#;
        let cfg: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_concurrent_tasks, 8);
        assert_eq!(cfg.read_timeout_secs, 30);
        assert_eq!(cfg.user_agent.as_deref(), Some("custom-agent"));
        assert_eq!(cfg.progress_step, 10);
        assert_eq!(cfg.notification_interval_ms, 1000);
    }

    #[test]
    fn transfer_options_follow_config() {
        let cfg = EngineConfig {
            connect_timeout_secs: 0,
            read_timeout_secs: 7,
            progress_step: 5,
            ..EngineConfig::default()
        };
        let opts = cfg.transfer_options();
        assert_eq!(opts.connect_timeout, Duration::from_secs(1));
        assert_eq!(opts.read_timeout, Duration::from_secs(7));
        assert_eq!(opts.progress_step, 5);
        assert_eq!(opts.buffer_size, 4096);
    }

    #[test]
    fn load_or_init_creates_then_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let created = load_or_init_at(&path).unwrap();
        assert_eq!(created, EngineConfig::default());
        assert!(path.exists());

        fs::write(&path, "max_concurrent_tasks = 1\n").unwrap();
        let loaded = load_or_init_at(&path).unwrap();
        assert_eq!(loaded.max_concurrent_tasks, 1);
    }
}
