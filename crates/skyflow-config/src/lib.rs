pub mod error;

pub use error::*;

use serde::Deserialize;
use skyflow_cloud::RetryConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "SKYFLOW_CONFIG_PATH";
pub const TOKEN_ENV: &str = "SCW_TOKEN";
pub const ORGANIZATION_ENV: &str = "SCW_ORGANIZATION";
pub const REGION_ENV: &str = "SCW_REGION";
pub const DEFAULT_REGION: &str = "par1";

/// Skyflow's configuration directory, created on first use
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("skyflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the desired-state file.
///
/// Search order:
/// 1. `SKYFLOW_CONFIG_PATH`
/// 2. current directory: sky.local.yaml, .sky.local.yaml, sky.yaml, .sky.yaml
/// 3. the same names inside `./.skyflow/`
/// 4. `~/.config/skyflow/sky.yaml`
pub fn find_desired_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    let candidates = ["sky.local.yaml", ".sky.local.yaml", "sky.yaml", ".sky.yaml"];

    for filename in &candidates {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir = current_dir.join(".skyflow");
    if project_dir.is_dir() {
        for filename in &candidates {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("skyflow").join("sky.yaml");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::DesiredFileNotFound)
}

/// Retry tuning as written in `config.yaml`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            backoff_multiplier: defaults.backoff_multiplier,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig::new(settings.max_attempts)
            .with_initial_delay(Duration::from_millis(settings.initial_delay_ms))
            .with_max_delay(Duration::from_millis(settings.max_delay_ms))
            .with_backoff_multiplier(settings.backoff_multiplier)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    token: Option<String>,
    organization: Option<String>,
    region: Option<String>,
    retry: RetrySettings,
}

/// Credentials and tuning for the Scaleway provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub token: String,
    pub organization: String,
    pub region: String,
    pub retry: RetrySettings,
}

impl ProviderSettings {
    /// Load from `~/.config/skyflow/config.yaml` and the process environment
    pub fn load() -> Result<Self> {
        let path = get_config_dir()?.join("config.yaml");
        Self::from_sources(&path, |name| std::env::var(name).ok())
    }

    /// Merge the settings file at `path` (optional) with `env`, the
    /// environment taking precedence.
    pub fn from_sources(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str::<Option<SettingsFile>>(&content)
                .map_err(|source| ConfigError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })?
                .unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        let token = env(TOKEN_ENV)
            .or(file.token)
            .ok_or_else(|| ConfigError::MissingCredential {
                name: "API token",
                env: TOKEN_ENV,
                key: "token",
                path: path.to_path_buf(),
            })?;
        let organization = env(ORGANIZATION_ENV).or(file.organization).ok_or_else(|| {
            ConfigError::MissingCredential {
                name: "organization",
                env: ORGANIZATION_ENV,
                key: "organization",
                path: path.to_path_buf(),
            }
        })?;
        let region = env(REGION_ENV)
            .or(file.region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Ok(Self {
            token,
            organization,
            region,
            retry: file.retry,
        })
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::fs;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("skyflow"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_desired_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("sky.yaml"), "servers: {}").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_desired_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("sky.yaml"));
    }

    #[test]
    #[serial]
    fn test_local_and_hidden_files_take_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("sky.yaml"), "").unwrap();
        fs::write(temp_dir.path().join(".sky.local.yaml"), "").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let hidden = find_desired_file().unwrap();

        fs::write(temp_dir.path().join("sky.local.yaml"), "").unwrap();
        let local = find_desired_file().unwrap();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(hidden.ends_with(".sky.local.yaml"));
        assert!(local.ends_with("sky.local.yaml"));
        assert!(!local.ends_with(".sky.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_desired_file_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let project_dir = temp_dir.path().join(".skyflow");
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("sky.yaml"), "").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_desired_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".skyflow/sky.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_desired_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "").unwrap();

        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, &config_path);
        }
        let result = find_desired_file();
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_find_desired_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_desired_file();
        std::env::set_current_dir(original_dir).unwrap();

        // a global ~/.config/skyflow/sky.yaml on the test machine would win
        if let Err(e) = result {
            assert!(matches!(e, ConfigError::DesiredFileNotFound));
        }
    }

    #[test]
    fn test_settings_from_file_with_env_override() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(
            &path,
            "token: file-token\norganization: org-1\nregion: ams1\nretry:\n  max_attempts: 5\n",
        )
        .unwrap();

        let settings =
            ProviderSettings::from_sources(&path, env_of(&[(TOKEN_ENV, "env-token")])).unwrap();

        assert_eq!(settings.token, "env-token");
        assert_eq!(settings.organization, "org-1");
        assert_eq!(settings.region, "ams1");
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.initial_delay_ms, 1000);

        let retry = settings.retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_settings_from_env_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("missing.yaml");

        let settings = ProviderSettings::from_sources(
            &path,
            env_of(&[(TOKEN_ENV, "t"), (ORGANIZATION_ENV, "o")]),
        )
        .unwrap();

        assert_eq!(settings.region, DEFAULT_REGION);
        assert_eq!(settings.retry, RetrySettings::default());
        assert_eq!(settings.retry_config(), RetryConfig::default());
    }

    #[test]
    fn test_missing_organization_is_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "token: t\n").unwrap();

        let err = ProviderSettings::from_sources(&path, env_of(&[])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential {
                env: ORGANIZATION_ENV,
                ..
            }
        ));
        assert!(err.to_string().contains("SCW_ORGANIZATION"));
    }

    #[test]
    fn test_invalid_yaml_names_the_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "token: [unclosed\n").unwrap();

        let err = ProviderSettings::from_sources(&path, env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
        assert!(err.to_string().contains("config.yaml"));
    }
}
