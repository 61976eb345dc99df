use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// How the content of a copied file is compared against its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// Chunked byte-for-byte comparison.
    #[default]
    Bytes,
    /// Compare SHA-256 digests of both files.
    Sha256,
}

/// Order in which destination volumes are tried for each candidate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeOrder {
    /// Ascending path order.
    #[default]
    Path,
    /// Most live free space first; ties broken by path.
    MostFree,
}

/// Global configuration loaded from `~/.config/plotmover/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoverConfig {
    /// Directories scanned for finished plot files.
    pub staging_dirs: Vec<PathBuf>,
    /// Long-term storage volumes that receive plot files.
    pub destination_dirs: Vec<PathBuf>,
    /// Extension (without the dot) that marks a file as eligible.
    #[serde(default = "default_plot_extension")]
    pub plot_extension: String,
    /// Pause between two scan rounds, in seconds.
    #[serde(default = "default_round_interval_secs")]
    pub round_interval_secs: u64,
    /// How often the drain phase re-checks busy volumes, in seconds.
    #[serde(default = "default_drain_poll_secs")]
    pub drain_poll_secs: u64,
    /// Read/write chunk size for copy and verify. The stop signal is checked once per chunk.
    #[serde(default = "default_copy_chunk_bytes")]
    pub copy_chunk_bytes: usize,
    #[serde(default)]
    pub verify: VerifyMode,
    #[serde(default)]
    pub volume_order: VolumeOrder,
}

fn default_plot_extension() -> String {
    "plot".to_string()
}

fn default_round_interval_secs() -> u64 {
    300
}

fn default_drain_poll_secs() -> u64 {
    5
}

fn default_copy_chunk_bytes() -> usize {
    1024 * 1024
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            staging_dirs: Vec::new(),
            destination_dirs: Vec::new(),
            plot_extension: default_plot_extension(),
            round_interval_secs: default_round_interval_secs(),
            drain_poll_secs: default_drain_poll_secs(),
            copy_chunk_bytes: default_copy_chunk_bytes(),
            verify: VerifyMode::default(),
            volume_order: VolumeOrder::default(),
        }
    }
}

impl MoverConfig {
    pub fn round_interval(&self) -> Duration {
        Duration::from_secs(self.round_interval_secs)
    }

    pub fn drain_poll(&self) -> Duration {
        Duration::from_secs(self.drain_poll_secs.max(1))
    }

    /// Checks the startup rules: both lists non-empty, no path repeated within
    /// or across the lists, every path an existing directory, and no
    /// destination nested in a staging dir (or the reverse).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.staging_dirs.is_empty() {
            return Err(ConfigError::NoStagingDirs);
        }
        if self.destination_dirs.is_empty() {
            return Err(ConfigError::NoDestinationDirs);
        }
        if self.copy_chunk_bytes == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.plot_extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::EmptyExtension);
        }

        // Path equality is component-wise, so "/mnt/a/" and "/mnt/a" collide.
        let mut seen: HashSet<&Path> = HashSet::new();
        for dir in self.staging_dirs.iter().chain(&self.destination_dirs) {
            if !seen.insert(dir.as_path()) {
                return Err(ConfigError::DuplicatePath(dir.clone()));
            }
        }

        for dir in self.staging_dirs.iter().chain(&self.destination_dirs) {
            match fs::metadata(dir) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => return Err(ConfigError::NotADirectory(dir.clone())),
                Err(_) => return Err(ConfigError::MissingPath(dir.clone())),
            }
        }

        // A destination inside a staging dir would be walked, and its plots
        // copied onto themselves. Resolved paths catch symlinked aliases too.
        let canonical = |dir: &PathBuf| {
            fs::canonicalize(dir).map_err(|_| ConfigError::MissingPath(dir.clone()))
        };
        for staging in &self.staging_dirs {
            let s = canonical(staging)?;
            for destination in &self.destination_dirs {
                let d = canonical(destination)?;
                if s.starts_with(&d) || d.starts_with(&s) {
                    return Err(ConfigError::NestedPath {
                        staging: staging.clone(),
                        destination: destination.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Extension without a leading dot.
    pub fn extension(&self) -> &str {
        self.plot_extension.trim_start_matches('.')
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("plotmover")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load and validate configuration from `path`.
pub fn load_from_path(path: &Path) -> Result<MoverConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: MoverConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Load configuration from the default location, writing an empty template
/// there first if none exists. The template fails validation until edited.
pub fn load_or_init() -> Result<MoverConfig> {
    let path = config_path()?;
    if !path.exists() {
        let template = toml::to_string_pretty(&MoverConfig::default())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, template)?;
        tracing::info!("created template config at {}", path.display());
    }
    load_from_path(&path)
}
