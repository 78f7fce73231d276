use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolve the data directory based on priority:
/// 1. Explicit path (with tilde expansion)
/// 2. TRACEBOX_PATH environment variable (with tilde expansion)
/// 3. XDG data directory
/// 4. ~/.tracebox (fallback for systems without XDG)
pub fn resolve_data_dir(explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(expand_tilde(path));
    }

    if let Ok(env_path) = std::env::var("TRACEBOX_PATH") {
        return Ok(expand_tilde(&env_path));
    }

    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("tracebox"));
    }

    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".tracebox"));
    }

    Err(Error::Config(
        "Could not determine data directory: no HOME directory or XDG data directory found"
            .to_string(),
    ))
}

/// Expand tilde (~) in paths to the user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub poll_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// History kept by each multicast stream for late subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Listener announcements
    pub listeners: usize,
    /// Raw events per process
    pub events: usize,
    /// Aggregated traces, across all processes
    pub traces: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            listeners: 10,
            events: 500,
            traces: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub queue_capacity: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub source_roots: Vec<PathBuf>,
    pub poll_interval_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            source_roots: Vec::new(),
            poll_interval_ms: 1000,
        }
    }
}

impl IndexConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

impl Config {
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_from(&Self::path_in(data_dir))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config.normalized())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join("config.toml")
    }

    /// Replay and queue sizes below the minimums are raised to them.
    fn normalized(mut self) -> Self {
        let defaults = Self::default();
        self.replay.listeners = self.replay.listeners.max(defaults.replay.listeners);
        self.replay.events = self.replay.events.max(defaults.replay.events);
        self.replay.traces = self.replay.traces.max(defaults.replay.traces);
        self.navigation.queue_capacity = self
            .navigation
            .queue_capacity
            .max(defaults.navigation.queue_capacity);
        self.index.source_roots = self
            .index
            .source_roots
            .iter()
            .map(|root| expand_tilde(&root.to_string_lossy()))
            .collect();
        self
    }
}
