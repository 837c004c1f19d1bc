use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("An IO error raised")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration")]
    Parse(#[from] serde_yaml::Error),

    #[error("`{0}` must be greater than 0")]
    Zero(&'static str),
}
