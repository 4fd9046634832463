use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a data load. Soft data issues (empty cells,
/// out-of-range scores, unknown category codes) never show up here.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unreadable source {source_name}: {reason}")]
    Format { source_name: String, reason: String },

    #[error("missing required columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    pub fn format(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Short label for the failure kind, used in user-facing messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Format { .. } => "format error",
            Self::Schema { .. } => "schema error",
            Self::Io { .. } => "io error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("weight for {metric} must be a finite non-negative number, got {value}")]
    InvalidWeight { metric: String, value: f64 },

    #[error("invalid grade scale: {0}")]
    InvalidScale(String),

    #[error("unknown grade label {0:?}")]
    UnknownGrade(String),

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config path {} does not exist", .0.display())]
    Missing(PathBuf),
}
