use serde::{Deserialize, Serialize};

use crate::detection::domain::raw_detection::RawDetection;
use crate::shared::frame::Frame;

/// How many faces the analyzer should report per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// At most one face: the analyzer's most prominent pick.
    Single,
    /// Every face above the analyzer's internal threshold.
    #[default]
    All,
}

impl std::str::FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(DetectionMode::Single),
            "all" => Ok(DetectionMode::All),
            other => Err(format!("Mode must be 'single' or 'all', got '{other}'")),
        }
    }
}

/// Domain interface for the face detection capability.
///
/// Hides the whole model stack (detector, landmarks, age/gender, descriptor).
/// Model state is not reentrant, hence `&mut self`: one scan drives one
/// analyzer strictly sequentially.
pub trait FaceAnalyzer: Send {
    fn analyze(
        &mut self,
        frame: &Frame,
        mode: DetectionMode,
    ) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>>;
}

/// Result of one analyzer call as the scan sees it.
#[derive(Debug)]
pub enum DetectionOutcome {
    Found(Vec<RawDetection>),
    NoneFound,
    Failed(String),
}

impl DetectionOutcome {
    pub fn of(result: Result<Vec<RawDetection>, Box<dyn std::error::Error>>) -> Self {
        match result {
            Ok(detections) if detections.is_empty() => DetectionOutcome::NoneFound,
            Ok(detections) => DetectionOutcome::Found(detections),
            Err(e) => DetectionOutcome::Failed(e.to_string()),
        }
    }

    /// Detections to process; failures and empty frames both yield none.
    pub fn into_detections(self) -> Vec<RawDetection> {
        match self {
            DetectionOutcome::Found(detections) => detections,
            DetectionOutcome::NoneFound | DetectionOutcome::Failed(_) => Vec::new(),
        }
    }
}

/// Keeps only the highest-confidence detection.
///
/// Used by analyzers whose model has no single-face entry point of its own.
pub fn most_prominent(detections: Vec<RawDetection>) -> Vec<RawDetection> {
    detections
        .into_iter()
        .fold(None::<RawDetection>, |best, d| match best {
            Some(b) if b.confidence >= d.confidence => Some(b),
            _ => Some(d),
        })
        .into_iter()
        .collect()
}
