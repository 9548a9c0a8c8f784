use serde::{Deserialize, Serialize};

use crate::shared::relative_box::RelativeBox;

/// Gender label reported by the age/gender estimator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    /// The analyzer has no age/gender estimator.
    Unknown,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
            Gender::Unknown => write!(f, "unknown"),
        }
    }
}

/// One face as reported by a [`FaceAnalyzer`](super::face_analyzer::FaceAnalyzer),
/// before quality filtering or identity assignment.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub relative_box: RelativeBox,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    pub age: f32,
    pub gender: Gender,
    /// Identity embedding; all detections of one analyzer share a length.
    pub descriptor: Vec<f32>,
}

impl RawDetection {
    pub fn size_percent(&self) -> u32 {
        self.relative_box.size_percent()
    }

    pub fn confidence_percent(&self) -> u32 {
        crate::shared::relative_box::to_percent(self.confidence)
    }
}
