use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub volumes: VolumeConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Directory names looked up under every mount point.
    /// Only used to seed a newly created database.
    #[serde(default = "default_roots")]
    pub roots: Vec<String>,

    /// Compared case-insensitively, without the leading dot.
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    /// A directory containing a file with this name is skipped along with
    /// everything below it.
    #[serde(default = "default_opt_out_marker")]
    pub opt_out_marker: String,
}

fn default_roots() -> Vec<String> {
    vec![
        "DCIM".to_string(),
        "Vespucci".to_string(),
        "osmtracker".to_string(),
    ]
}

fn default_image_extensions() -> Vec<String> {
    vec!["jpg".to_string()]
}

fn default_opt_out_marker() -> String {
    ".novespucci".to_string()
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            image_extensions: default_image_extensions(),
            opt_out_marker: default_opt_out_marker(),
        }
    }
}

impl ScannerConfig {
    pub fn is_image(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        !ext.is_empty() && self.image_extensions.iter().any(|e| e.to_lowercase() == ext)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Primary storage volume.
    #[serde(default = "default_primary")]
    pub primary: PathBuf,

    /// Every directory directly below this one is treated as a volume.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// External card directory relative to the primary volume.
    #[serde(default = "default_external_card")]
    pub external_card: String,
}

fn default_primary() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/sdcard"))
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("/storage")
}

fn default_external_card() -> String {
    "external_sd".to_string()
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            storage_root: default_storage_root(),
            external_card: default_external_card(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Seconds between rescans in watch mode.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    300
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `PHOTOMAP_LOG` is unset or invalid.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory of the rolling log file. Defaults to the local data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Prefer the systemd journal when it is reachable.
    #[serde(default = "default_journald")]
    pub journald: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_journald() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            journald: default_journald(),
        }
    }
}

impl LoggingConfig {
    pub fn log_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("photomap")
                .join("logs")
        })
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photomap")
        .join("photomap.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            scanner: ScannerConfig::default(),
            volumes: VolumeConfig::default(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, writing a default config if none exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photomap")
    }

    /// `PHOTOMAP_CONFIG` overrides the default location.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PHOTOMAP_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }
}
