use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::coordinator::DEFAULT_MAX_ATTEMPTS;

pub const DEFAULT_FOLDER_NAME: &str = "TallyTracker";
pub const DEFAULT_FILE_NAME: &str = "tally_tracker_data.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Where the document lives and how hard to retry on conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    pub folder_name: String,
    pub file_name: String,
    pub max_attempts: usize,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            folder_name: DEFAULT_FOLDER_NAME.to_string(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl TallyConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.folder_name.trim().is_empty() {
            return Err(ConfigError::Invalid("folder_name must not be empty".into()));
        }
        if self.file_name.trim().is_empty() {
            return Err(ConfigError::Invalid("file_name must not be empty".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Read and deserialize a YAML file
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = TallyConfig::from_yaml_str("max_attempts: 5\n").unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.folder_name, DEFAULT_FOLDER_NAME);
        assert_eq!(config.file_name, DEFAULT_FILE_NAME);
    }

    #[test]
    fn test_validate() {
        assert!(TallyConfig::default().validate().is_ok());

        let zero = TallyConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid(_))));

        let blank = TallyConfig {
            file_name: "  ".into(),
            ..Default::default()
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_load_yaml_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "folder_name: Counts\nfile_name: counts.json").unwrap();

        let config: TallyConfig = load_yaml(file.path()).unwrap();

        assert_eq!(config.folder_name, "Counts");
        assert_eq!(config.file_name, "counts.json");
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_load_yaml_errors() {
        let missing = load_yaml::<TallyConfig>(Path::new("/nonexistent/tally.yaml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_attempts: [not, a, number]").unwrap();
        let bad = load_yaml::<TallyConfig>(file.path());
        assert!(matches!(bad, Err(ConfigError::Parse { .. })));
    }
}
