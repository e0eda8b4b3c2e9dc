//! Errors raised while loading or validating pipeline configuration.
//!
//! All of them end a run at `Init`, before any provider call.

use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no pipeline configuration file in {}", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    #[error("cannot read {path}: {detail}")]
    Unreadable { path: String, detail: String },

    #[error("{file} is not valid YAML: {detail}")]
    MalformedYaml { file: String, detail: String },

    #[error("{context} requires '{field}'")]
    MissingField { field: String, context: String },

    /// `value` is never a secret; password fields only report emptiness
    #[error("'{value}' is not a valid {field}: {expected}")]
    InvalidField {
        field: String,
        value: String,
        expected: String,
    },

    #[error("${{{variable}}} is not set ({context})")]
    UnsetVariable { variable: String, context: String },

    #[error("override {key} could not be applied: {reason}")]
    BadOverride { key: String, reason: String },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConfigurationError {
    pub fn not_found(searched: Vec<PathBuf>) -> Self {
        Self::NotFound { searched }
    }

    pub fn unreadable(path: impl Into<String>, detail: impl Display) -> Self {
        Self::Unreadable {
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    pub fn malformed_yaml(file: impl Into<String>, detail: impl Display) -> Self {
        Self::MalformedYaml {
            file: file.into(),
            detail: detail.to_string(),
        }
    }

    pub fn missing_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn invalid_field(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn unset_variable(variable: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnsetVariable {
            variable: variable.into(),
            context: context.into(),
        }
    }

    pub fn bad_override(key: impl Into<String>, reason: impl Display) -> Self {
        Self::BadOverride {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// The configuration field at fault, when the error names one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field, .. } | Self::InvalidField { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_every_searched_path() {
        let err = ConfigurationError::not_found(vec![
            PathBuf::from("config/pipeline-config.yaml"),
            PathBuf::from("config/pipeline-config.yml"),
        ]);
        assert_eq!(
            err.to_string(),
            "no pipeline configuration file in config/pipeline-config.yaml, config/pipeline-config.yml"
        );
    }

    #[test]
    fn test_field_accessor() {
        let err = ConfigurationError::invalid_field("regions", "uswest2", "a region code");
        assert_eq!(err.field(), Some("regions"));
        assert_eq!(err.to_string(), "'uswest2' is not a valid regions: a region code");

        let err = ConfigurationError::unset_variable("WAREHOUSE_PASSWORD", "warehouse.password");
        assert_eq!(err.field(), None);
        assert_eq!(
            err.to_string(),
            "${WAREHOUSE_PASSWORD} is not set (warehouse.password)"
        );
    }
}
