use std::path::Path;

use error::ConfigurationError;
use serde::{Deserialize, Serialize};

pub mod error;

#[derive(Debug, Serialize, Deserialize)]
pub struct Remote {
    /// Capacity of the completion queue channel between the transport and
    /// the drain thread.
    #[serde(rename = "completion-queue-depth")]
    pub completion_queue_depth: usize,

    /// Maximum number of writes a stream buffers while a prior write is
    /// still in flight.
    #[serde(rename = "write-buffer-capacity")]
    pub write_buffer_capacity: usize,
}

impl Default for Remote {
    fn default() -> Self {
        Self {
            completion_queue_depth: 128,
            write_buffer_capacity: 64,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub remote: Remote,
}

impl Configuration {
    /// Parse configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path)?;
        let mut configuration: Configuration = serde_yaml::from_str(&content)?;
        configuration.check_and_apply()?;
        Ok(configuration)
    }

    /// Check and apply the configuration.
    pub fn check_and_apply(&mut self) -> Result<(), ConfigurationError> {
        if self.remote.completion_queue_depth == 0 {
            return Err(ConfigurationError::Zero("completion-queue-depth"));
        }

        if self.remote.write_buffer_capacity == 0 {
            return Err(ConfigurationError::Zero("write-buffer-capacity"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{error::Error, path::Path};

    use super::Configuration;

    #[test]
    fn test_yaml() -> Result<(), Box<dyn Error>> {
        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")?;
        let path = Path::new(&manifest_dir);
        let path = path
            .parent()
            .unwrap()
            .parent()
            .unwrap()
            .join("etc/config.yaml");
        let config = Configuration::load(path.as_path())?;
        assert_eq!(128, config.remote.completion_queue_depth);
        assert_eq!(64, config.remote.write_buffer_capacity);
        Ok(())
    }

    #[test]
    fn test_check_and_apply() {
        let mut config = Configuration::default();
        config.remote.completion_queue_depth = 0;
        assert!(config.check_and_apply().is_err());
    }
}
