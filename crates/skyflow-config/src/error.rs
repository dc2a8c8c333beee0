use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error(
        "Desired-state file not found. Looked in:\n\
        - current directory: sky.local.yaml, .sky.local.yaml, sky.yaml, .sky.yaml\n\
        - ./.skyflow/ directory\n\
        - ~/.config/skyflow/sky.yaml\n\
        Set SKYFLOW_CONFIG_PATH to point at a file directly"
    )]
    DesiredFileNotFound,

    #[error("Missing {name}: set {env} or add `{key}` to {path}")]
    MissingCredential {
        name: &'static str,
        env: &'static str,
        key: &'static str,
        path: PathBuf,
    },

    #[error("Failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
