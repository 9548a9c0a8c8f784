use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::face_analyzer::DetectionMode;
use crate::detection::domain::quality_filter::QualityFilter;
use crate::shared::constants::{
    FACE_CONFIDENCE_THRESHOLD, FACE_SIZE_THRESHOLD, FACE_UNIQUENESS_THRESHOLD,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("minimum face size must be between 0 and 100, got {0}")]
    SizeOutOfRange(u32),
    #[error("minimum confidence must be between 0 and 100, got {0}")]
    ConfidenceOutOfRange(u32),
    #[error("uniqueness threshold must be a positive distance, got {0}")]
    NonPositiveUniqueness(f64),
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Thresholds and detection mode for one scan.
///
/// Missing fields in a config file fall back to the defaults; the same
/// default applies to a threshold regardless of the detection mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub min_size_percent: u32,
    pub min_confidence_percent: u32,
    pub uniqueness_threshold: f64,
    pub mode: DetectionMode,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_size_percent: FACE_SIZE_THRESHOLD,
            min_confidence_percent: FACE_CONFIDENCE_THRESHOLD,
            uniqueness_threshold: FACE_UNIQUENESS_THRESHOLD,
            mode: DetectionMode::All,
        }
    }
}

impl ScanConfig {
    /// Reads a JSON config file. The result is not yet validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_size_percent > 100 {
            return Err(ConfigError::SizeOutOfRange(self.min_size_percent));
        }
        if self.min_confidence_percent > 100 {
            return Err(ConfigError::ConfidenceOutOfRange(
                self.min_confidence_percent,
            ));
        }
        if !(self.uniqueness_threshold.is_finite() && self.uniqueness_threshold > 0.0) {
            return Err(ConfigError::NonPositiveUniqueness(
                self.uniqueness_threshold,
            ));
        }
        Ok(())
    }

    pub fn quality_filter(&self) -> QualityFilter {
        QualityFilter::new(self.min_size_percent, self.min_confidence_percent)
    }
}
