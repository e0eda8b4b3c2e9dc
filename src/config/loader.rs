//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment section merging, `PROVISIONER__*` variable overrides, and
//! `${VAR}` expansion for warehouse credentials.

use super::error::{ConfigResult, ConfigurationError};
use super::ProvisionerConfig;
use serde_yaml::Value as YamlValue;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAMES: [&str; 2] = ["pipeline-config.yaml", "pipeline-config.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];
const OVERRIDE_PREFIX: &str = "PROVISIONER";
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: ProvisionerConfig,
    environment: String,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_overrides(config_dir, environment, None)
    }

    /// Load configuration with an explicit set of environment variables.
    ///
    /// When `variables` is `None` the process environment is used for both
    /// `PROVISIONER__*` overrides and `${VAR}` expansion.
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        variables: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);
        let config_path = Self::find_config_file(&config_directory)?;

        debug!(
            environment = %environment,
            path = %config_path.display(),
            "Loading pipeline configuration"
        );

        let mut config = Self::load_and_merge_config(&config_path, environment, variables.clone())?;
        Self::expand_environment_variables(&mut config, |name| match &variables {
            Some(vars) => vars.get(name).cloned(),
            None => env::var(name).ok(),
        })?;

        config.validate()?;

        info!(
            environment = %environment,
            regions = config.pipeline.regions.len(),
            home_region = config.pipeline.home_region().unwrap_or_default(),
            stream = %config.pipeline.stream_name,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_path,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the file the configuration was read from
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// JSON rendering of the configuration that is safe to log
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_else(|_| serde_json::Value::Null)
    }

    /// Detect current environment: PIPELINE_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("PIPELINE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// Environment sections recognised in the configuration file
    pub fn known_environments() -> &'static [&'static str] {
        &ENVIRONMENT_SECTIONS
    }

    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var("PIPELINE_CONFIG_DIR") {
            return PathBuf::from(dir);
        }

        for dir in [PathBuf::from("config"), PathBuf::from("../config")] {
            if CONFIG_FILE_NAMES.iter().any(|name| dir.join(name).exists()) {
                debug!("Found config directory: {}", dir.display());
                return dir;
            }
        }

        PathBuf::from("config")
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            if config_path.exists() {
                return Ok(config_path);
            }
            searched_paths.push(config_path);
        }

        Err(ConfigurationError::not_found(searched_paths))
    }

    /// Read a configuration file with a size limit
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::unreadable(path.display().to_string(), e))?;

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_field(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_field(
                "file_size",
                metadata.len().to_string(),
                format!("Configuration file larger than {MAX_CONFIG_FILE_SIZE} bytes"),
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::unreadable(path.display().to_string(), e))
    }

    fn load_and_merge_config(
        config_path: &Path,
        environment: &str,
        variables: Option<HashMap<String, String>>,
    ) -> ConfigResult<ProvisionerConfig> {
        let file_label = config_path.display().to_string();
        let yaml_content = Self::read_config_file_safely(config_path)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::malformed_yaml(file_label.clone(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!("Applying environment-specific overrides for: {}", environment);
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        let merged = serde_yaml::to_string(&yaml_data)
            .map_err(|e| ConfigurationError::malformed_yaml(file_label.clone(), e))?;

        let overrides = ::config::Environment::with_prefix(OVERRIDE_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("pipeline.regions")
            .try_parsing(true)
            .source(variables);

        ::config::Config::builder()
            .add_source(::config::File::from_str(&merged, ::config::FileFormat::Yaml))
            .add_source(overrides)
            .build()
            .map_err(|e| ConfigurationError::bad_override(OVERRIDE_PREFIX, e))?
            .try_deserialize::<ProvisionerConfig>()
            .map_err(|e| {
                ConfigurationError::malformed_yaml(
                    file_label,
                    format!("Failed to deserialize configuration: {e}"),
                )
            })
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }

    /// Expand `${VAR}` placeholders in warehouse credentials
    fn expand_environment_variables<F>(config: &mut ProvisionerConfig, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let warehouse = &mut config.pipeline.warehouse;
        for (field, value) in [
            ("warehouse.username", &mut warehouse.username),
            ("warehouse.password", &mut warehouse.password),
        ] {
            if let Some(var_name) = value
                .strip_prefix("${")
                .and_then(|rest| rest.strip_suffix('}'))
            {
                let expanded = lookup(var_name).ok_or_else(|| {
                    ConfigurationError::unset_variable(
                        var_name,
                        format!("referenced by {field}"),
                    )
                })?;
                debug!(field = field, variable = var_name, "Expanded environment variable");
                *value = expanded;
            }
        }
        Ok(())
    }
}
