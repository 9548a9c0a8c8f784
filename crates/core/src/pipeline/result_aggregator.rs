use serde::{Deserialize, Serialize};

use crate::detection::domain::raw_detection::{Gender, RawDetection};
use crate::pipeline::session_detection_log::SessionDetectionLog;
use crate::shared::relative_box::RelativeBox;

/// One accepted face with its scan-wide identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceRecord {
    pub face_id: usize,
    /// Detector confidence in whole percent.
    pub score: u32,
    /// Face height in whole percent of frame height.
    pub size_percent: u32,
    #[serde(rename = "box")]
    pub relative_box: RelativeBox,
    pub gender: Gender,
    pub age: u32,
}

impl FaceRecord {
    pub fn from_detection(face_id: usize, detection: &RawDetection) -> Self {
        Self {
            face_id,
            score: detection.confidence_percent(),
            size_percent: detection.size_percent(),
            relative_box: detection.relative_box.rounded(),
            gender: detection.gender,
            age: detection.age.max(0.0).round() as u32,
        }
    }
}

/// All accepted faces of one frame, largest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDetectionResult {
    pub frame_number: usize,
    pub face_count: usize,
    pub largest_size: u32,
    pub faces_array: Vec<FaceRecord>,
}

impl FrameDetectionResult {
    /// Orders `faces` by size, descending. Equal sizes keep their input
    /// order. Returns `None` when there are no faces.
    pub fn build(frame_number: usize, mut faces: Vec<FaceRecord>) -> Option<Self> {
        // `sort_by` is stable.
        faces.sort_by(|a, b| b.size_percent.cmp(&a.size_percent));
        let largest_size = faces.first()?.size_percent;
        Some(Self {
            frame_number,
            face_count: faces.len(),
            largest_size,
            faces_array: faces,
        })
    }
}

/// Turns a frame's clustered faces into a log entry.
pub struct ResultAggregator {
    log: SessionDetectionLog,
}

impl ResultAggregator {
    pub fn new(log: SessionDetectionLog) -> Self {
        Self { log }
    }

    /// Appends a record for the frame, or nothing if `faces` is empty.
    ///
    /// Returns the number of faces recorded.
    pub fn record(&self, frame_number: usize, faces: Vec<FaceRecord>) -> usize {
        match FrameDetectionResult::build(frame_number, faces) {
            Some(result) => {
                let count = result.face_count;
                self.log.append(result);
                count
            }
            None => 0,
        }
    }

    pub fn log(&self) -> &SessionDetectionLog {
        &self.log
    }
}
