use std::path::{Path, PathBuf};

use anyhow::Context;
use radblob_archive::ArchiveConfig;
use radblob_store::StoreConfig;
use serde::{Deserialize, Serialize};
use tracing::Level;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "radblob.toml";

/// Settings for the `radblob` tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Max log level unless `--verbose` is passed (default: "info").
    pub log_level: String,
    /// Limits for loose-file stores.
    pub store: StoreConfig,
    /// Settings for archive stores.
    pub archive: ArchiveConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            store: StoreConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load `explicit` if given (it must exist), else `radblob.toml` in `cwd`
    /// if present, else defaults.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> anyhow::Result<Self> {
        let path: PathBuf = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = cwd.join(DEFAULT_CONFIG_FILE);
                if !candidate.is_file() {
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn level(&self) -> anyhow::Result<Level> {
        self.log_level
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid log_level {:?}", self.log_level))
    }
}
