use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tally::{load_yaml, TallyConfig};
use tally_drive::DriveConfig;

/// Environment variable naming the config file when `--config` is not given
pub const CONFIG_ENV: &str = "TALLY_CONFIG";

/// Contents of `config.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub sync: TallyConfig,
    pub drive: DriveConfig,
}

impl CliConfig {
    /// Load from `--config`, then `$TALLY_CONFIG`, then `~/.config/tally/config.yaml`
    /// if it exists, falling back to defaults. `$TALLY_ACCESS_TOKEN` is applied last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let config = Self::load(explicit, env_path, default_path())?;
        Ok(Self {
            drive: config.drive.with_env_overrides(),
            ..config
        })
    }

    fn load(
        explicit: Option<&Path>,
        env_path: Option<PathBuf>,
        default_path: Option<PathBuf>,
    ) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or(env_path)
            .or_else(|| default_path.filter(|p| p.exists()));

        let config = match path {
            Some(path) => load_yaml::<Self>(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Self::default(),
        };
        config.sync.validate()?;
        Ok(config)
    }
}

fn default_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
        let mut path = PathBuf::from(home);
        path.push(".config");
        path.push("tally");
        path.push("config.yaml");
        path
    })
}
