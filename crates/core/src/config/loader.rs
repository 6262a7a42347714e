//! Configuration file loader for the `.mdkit/` directory.
//!
//! This module reads:
//! - `.mdkit/config.toml`: tool paths, workspace settings, execution limits,
//!   and the global tier of simulation defaults
//! - per-call parameter files in TOML, YAML or JSON

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::{ServiceConfig, CONFIG_DIR, CONFIG_FILE};
use mdk_protocol::config_models::GlobalConfig;
use std::path::Path;
use tracing::debug;

/// Loads the service configuration for a project directory.
///
/// # Arguments
///
/// * `root` - Project directory containing the `.mdkit/` folder
///
/// # Returns
///
/// A `ServiceConfig` whose relative paths resolve against `root`. If
/// `.mdkit/` or `config.toml` is missing, the defaults are returned rather
/// than an error.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub async fn load_config(root: &Path) -> ConfigResult<ServiceConfig> {
    let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

    if !config_path.exists() {
        debug!(path = %config_path.display(), "No config file, using defaults");
        return Ok(ServiceConfig::new(GlobalConfig::default(), root));
    }

    let global = read_global_config(&config_path)?;
    Ok(ServiceConfig::new(global, root))
}

/// Loads the service configuration from an explicit `config.toml` path.
///
/// Relative paths inside the file resolve against the directory holding the
/// `.mdkit/` folder when the file sits in one, else against the file's own
/// directory.
pub async fn load_config_file(path: &Path) -> ConfigResult<ServiceConfig> {
    let global = read_global_config(path)?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let base_dir = if parent.file_name().and_then(|n| n.to_str()) == Some(CONFIG_DIR) {
        parent.parent().unwrap_or(parent)
    } else {
        parent
    };

    Ok(ServiceConfig::new(global, base_dir))
}

fn read_global_config(path: &Path) -> ConfigResult<GlobalConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let config: GlobalConfig = toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })?;

    if !config.defaults.is_null() && !config.defaults.is_object() {
        return Err(ConfigError::InvalidConfig {
            path: path.to_path_buf(),
            reason: "[defaults] must be a table".to_string(),
        });
    }

    Ok(config)
}

/// Reads a per-call parameter override file.
///
/// The format is chosen by extension: `.toml`, `.yaml`/`.yml` or `.json`.
/// The document must be a table/object at the top level.
pub fn load_params_file(path: &Path) -> ConfigResult<serde_json::Value> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let value: serde_json::Value = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?,
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
                path: path.to_path_buf(),
                source,
            })?
        }
        Some("json") => serde_json::from_str(&content).map_err(|source| ConfigError::JsonParse {
            path: path.to_path_buf(),
            source,
        })?,
        _ => {
            return Err(ConfigError::InvalidConfig {
                path: path.to_path_buf(),
                reason: "expected a .toml, .yaml, .yml or .json file".to_string(),
            })
        }
    };

    if !value.is_object() {
        return Err(ConfigError::InvalidConfig {
            path: path.to_path_buf(),
            reason: "parameters must be a table at the top level".to_string(),
        });
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_config_dir_returns_default() {
        let dir = tempdir().expect("Failed to create temp dir");

        let config = load_config(dir.path())
            .await
            .expect("Should return default config");

        assert_eq!(config.global, GlobalConfig::default());
        assert_eq!(config.workspace_root(), dir.path().join("workflows"));
    }

    #[tokio::test]
    async fn test_load_full_config() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mdkit = dir.path().join(".mdkit");
        fs::create_dir_all(&mdkit).expect("Failed to create .mdkit");
        fs::write(
            mdkit.join("config.toml"),
            r#"
[tools]
gmx_path = "/opt/gromacs/bin/gmx"

[workspace]
root = "runs"
size_ceiling_mb = 64

[execution]
default_timeout_secs = 120

[execution.stage_timeouts]
produce = 3600

[defaults.production]
nsteps = 2500
temperature = 310.0
"#,
        )
        .expect("Failed to write config.toml");

        let config = load_config(dir.path()).await.expect("Should parse config");

        assert_eq!(config.global.tools.gmx_path, "/opt/gromacs/bin/gmx");
        assert_eq!(config.workspace_root(), dir.path().join("runs"));
        assert_eq!(config.size_ceiling_bytes(), Some(64 * 1024 * 1024));
        assert_eq!(config.global.defaults["production"]["nsteps"], json!(2500));
        assert!(config.global.defaults["production"]["nsteps"].is_u64());
        assert!(config.global.defaults["production"]["temperature"].is_f64());
    }

    #[tokio::test]
    async fn test_invalid_toml_reports_path() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mdkit = dir.path().join(".mdkit");
        fs::create_dir_all(&mdkit).expect("Failed to create .mdkit");
        fs::write(mdkit.join("config.toml"), "[tools\ngmx_path = 1").expect("write");

        let err = load_config(dir.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[tokio::test]
    async fn test_load_config_file_resolves_against_project_dir() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mdkit = dir.path().join(".mdkit");
        fs::create_dir_all(&mdkit).expect("Failed to create .mdkit");
        let path = mdkit.join("config.toml");
        fs::write(&path, "[workspace]\nroot = \"wf\"\n").expect("write");

        let config = load_config_file(&path).await.expect("Should parse config");
        assert_eq!(config.workspace_root(), dir.path().join("wf"));
    }

    #[test]
    fn test_load_params_file_formats() {
        let dir = tempdir().expect("Failed to create temp dir");

        let yaml = dir.path().join("params.yaml");
        fs::write(&yaml, "production:\n  nsteps: 1000\n").expect("write");
        let value = load_params_file(&yaml).expect("yaml params");
        assert_eq!(value["production"]["nsteps"], json!(1000));

        let toml_path = dir.path().join("params.toml");
        fs::write(&toml_path, "[minimization]\nemtol = 500.0\n").expect("write");
        let value = load_params_file(&toml_path).expect("toml params");
        assert_eq!(value["minimization"]["emtol"], json!(500.0));

        let json_path = dir.path().join("params.json");
        fs::write(&json_path, r#"{"analysis": {"kind": "rmsf"}}"#).expect("write");
        let value = load_params_file(&json_path).expect("json params");
        assert_eq!(value["analysis"]["kind"], json!("rmsf"));
    }

    #[test]
    fn test_load_params_file_rejects_scalars_and_unknown_extensions() {
        let dir = tempdir().expect("Failed to create temp dir");

        let scalar = dir.path().join("params.json");
        fs::write(&scalar, "42").expect("write");
        assert!(matches!(
            load_params_file(&scalar),
            Err(ConfigError::InvalidConfig { .. })
        ));

        let txt = dir.path().join("params.txt");
        fs::write(&txt, "a = 1").expect("write");
        assert!(matches!(
            load_params_file(&txt),
            Err(ConfigError::InvalidConfig { .. })
        ));
    }
}
