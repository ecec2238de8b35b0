use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Result;

use super::metrics::StorageMetrics;

/// Configuration supplied when opening a [`super::GraphDb`].
#[derive(Clone)]
pub struct GraphDbOptions {
    /// How long a writer waits for another transaction's write intent.
    pub lock_timeout: Duration,
    /// Background garbage collection.
    pub gc: GcCfg,
    /// Snapshot and recovery settings.
    pub durability: DurabilityCfg,
    /// Optional metrics sink.
    pub metrics: Option<Arc<dyn StorageMetrics>>,
}

impl Default for GraphDbOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(1),
            gc: GcCfg::default(),
            durability: DurabilityCfg::default(),
            metrics: None,
        }
    }
}

impl GraphDbOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the write-intent deadline.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the garbage collection configuration.
    pub fn gc(mut self, cfg: GcCfg) -> Self {
        self.gc = cfg;
        self
    }

    /// Sets the durability configuration.
    pub fn durability(mut self, cfg: DurabilityCfg) -> Self {
        self.durability = cfg;
        self
    }

    /// Sets the metrics implementation.
    pub fn metrics(mut self, metrics: Arc<dyn StorageMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Parses options from TOML, falling back to defaults for missing keys.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawOptions = toml::from_str(contents)?;
        Ok(raw.apply(Self::default()))
    }

    /// Reads and parses a TOML options file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

/// Configuration for the background garbage collector.
#[derive(Clone, Debug)]
pub struct GcCfg {
    /// Whether the background worker runs.
    pub enabled: bool,
    /// Interval between cycles.
    pub interval: Duration,
}

impl Default for GcCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
        }
    }
}

/// Snapshot and recovery settings.
#[derive(Clone, Debug)]
pub struct DurabilityCfg {
    /// Whether periodic snapshots are written.
    pub enabled: bool,
    /// Directory holding snapshot files.
    pub directory: PathBuf,
    /// Interval between periodic snapshots.
    pub snapshot_cycle: Duration,
    /// Snapshots to keep; zero or negative keeps all.
    pub snapshot_max_retained: i64,
    /// Write a snapshot when the database is dropped.
    pub snapshot_on_exit: bool,
    /// Recover from the newest snapshot when opening.
    pub recover_on_startup: bool,
}

impl Default for DurabilityCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("durability"),
            snapshot_cycle: Duration::from_secs(3600),
            snapshot_max_retained: -1,
            snapshot_on_exit: false,
            recover_on_startup: false,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    lock_timeout_ms: Option<u64>,
    #[serde(default)]
    gc: RawGc,
    #[serde(default)]
    durability: RawDurability,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawGc {
    enabled: Option<bool>,
    cycle_sec: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawDurability {
    enabled: Option<bool>,
    directory: Option<PathBuf>,
    snapshot_cycle_sec: Option<u64>,
    snapshot_max_retained: Option<i64>,
    snapshot_on_exit: Option<bool>,
    recover_on_startup: Option<bool>,
}

impl RawOptions {
    fn apply(self, mut opts: GraphDbOptions) -> GraphDbOptions {
        if let Some(ms) = self.lock_timeout_ms {
            opts.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(enabled) = self.gc.enabled {
            opts.gc.enabled = enabled;
        }
        if let Some(secs) = self.gc.cycle_sec {
            opts.gc.interval = Duration::from_secs(secs);
        }
        let dur = self.durability;
        if let Some(enabled) = dur.enabled {
            opts.durability.enabled = enabled;
        }
        if let Some(directory) = dur.directory {
            opts.durability.directory = directory;
        }
        if let Some(secs) = dur.snapshot_cycle_sec {
            opts.durability.snapshot_cycle = Duration::from_secs(secs);
        }
        if let Some(retained) = dur.snapshot_max_retained {
            opts.durability.snapshot_max_retained = retained;
        }
        if let Some(on_exit) = dur.snapshot_on_exit {
            opts.durability.snapshot_on_exit = on_exit;
        }
        if let Some(recover) = dur.recover_on_startup {
            opts.durability.recover_on_startup = recover;
        }
        opts
    }
}
