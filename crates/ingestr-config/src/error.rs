use thiserror::Error;

/// Fatal configuration errors. Surfaced before any network connection is
/// attempted, and always exit the process with a nonzero status.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration from the environment: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
