use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used under the user-visible storage root
const APPS_LOG_DIR: &str = "Appslog";
/// Directory name used under the private data root
const PRIVATE_DIR: &str = "app-logger";

/// Runtime settings, read from a JSON file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Delay between the end of one sample and the start of the next
    pub interval_ms: u64,
    /// Explicit directory for log files
    pub log_dir: Option<PathBuf>,
    /// Extra directories to scan for `.desktop` files
    pub application_dirs: Vec<PathBuf>,
    /// Executable names always treated as launchable
    pub extra_apps: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            log_dir: None,
            application_dirs: Vec::new(),
            extra_apps: Vec::new(),
        }
    }
}

impl Config {
    /// `<config dir>/app-logger/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(PRIVATE_DIR).join("config.json"))
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Pick the directory that receives log files
    pub fn log_dir(&self) -> PathBuf {
        self.storage_roots().select()
    }

    /// Full path for a log file called `file_name`
    pub fn resolve_log_path(&self, file_name: &str) -> PathBuf {
        self.log_dir().join(file_name)
    }

    fn storage_roots(&self) -> StorageRoots {
        if let Some(dir) = &self.log_dir {
            return StorageRoots {
                external: Some(dir.clone()),
                private: dir.clone(),
            };
        }

        StorageRoots {
            external: dirs::document_dir().map(|d| d.join(APPS_LOG_DIR)),
            private: dirs::data_local_dir()
                .map(|d| d.join(PRIVATE_DIR))
                .unwrap_or_else(|| PathBuf::from(APPS_LOG_DIR)),
        }
    }
}

/// Candidate locations for log files
#[derive(Debug, Clone)]
struct StorageRoots {
    /// User-visible location, used when its parent exists
    external: Option<PathBuf>,
    /// Always-available fallback
    private: PathBuf,
}

impl StorageRoots {
    fn select(self) -> PathBuf {
        match self.external {
            Some(dir) if dir.parent().map_or(true, Path::exists) => dir,
            _ => self.private,
        }
    }
}
