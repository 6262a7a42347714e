//! Error types for configuration loading and parameter resolution.
//!
//! This module defines all errors that can occur while reading configuration
//! files, writing JSON documents and validating the merged simulation
//! parameters.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading or validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a configuration file from disk.
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML file at {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to parse a YAML parameter file.
    #[error("Failed to parse YAML file at {path}: {source}")]
    YamlParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// Failed to parse a JSON parameter file.
    #[error("Failed to parse JSON file at {path}: {source}")]
    JsonParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize a document before writing it.
    #[error("Failed to serialize JSON for {path}: {source}")]
    JsonSerialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Invalid configuration structure or unsupported file.
    #[error("Invalid configuration in {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    /// Merged parameters failed a stage's checks.
    #[error("Invalid parameters for {stage}: {reason}")]
    Validation { stage: String, reason: String },
}

/// Type alias for Result with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;
