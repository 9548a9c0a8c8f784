use crate::detection::domain::raw_detection::RawDetection;

/// Drops detections that are too small or too uncertain to tag.
///
/// Both thresholds are inclusive integer percentages: a face whose rounded
/// height is exactly `min_size_percent` passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QualityFilter {
    min_size_percent: u32,
    min_confidence_percent: u32,
}

impl QualityFilter {
    pub fn new(min_size_percent: u32, min_confidence_percent: u32) -> Self {
        Self {
            min_size_percent,
            min_confidence_percent,
        }
    }

    pub fn accepts(&self, detection: &RawDetection) -> bool {
        let size = detection.size_percent();
        let confidence = detection.confidence_percent();
        let accepted = size >= self.min_size_percent && confidence >= self.min_confidence_percent;
        if !accepted {
            log::debug!(
                "Dropping face below threshold: size {size}% (min {}), confidence {confidence}% (min {})",
                self.min_size_percent,
                self.min_confidence_percent
            );
        }
        accepted
    }

    /// Keeps accepted detections in their original order.
    pub fn filter(&self, detections: Vec<RawDetection>) -> Vec<RawDetection> {
        detections.into_iter().filter(|d| self.accepts(d)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::raw_detection::Gender;
    use crate::shared::relative_box::RelativeBox;
    use rstest::rstest;

    fn detection(height: f64, confidence: f64) -> RawDetection {
        RawDetection {
            relative_box: RelativeBox::new(0.0, 0.0, height, height),
            confidence,
            age: 25.0,
            gender: Gender::Male,
            descriptor: vec![0.0; 3],
        }
    }

    #[rstest]
    #[case::below_confidence(0.5, 0.79, false)]
    #[case::at_confidence(0.5, 0.80, true)]
    #[case::rounds_up_to_confidence(0.5, 0.795, true)]
    #[case::below_size(0.19, 0.95, false)]
    #[case::at_size(0.20, 0.95, true)]
    #[case::both_below(0.1, 0.1, false)]
    fn test_accepts(#[case] height: f64, #[case] confidence: f64, #[case] expected: bool) {
        let filter = QualityFilter::new(20, 80);
        assert_eq!(filter.accepts(&detection(height, confidence)), expected);
    }

    #[test]
    fn test_zero_thresholds_accept_everything() {
        let filter = QualityFilter::new(0, 0);
        assert!(filter.accepts(&detection(0.0, 0.0)));
    }

    #[test]
    fn test_filter_keeps_order() {
        let filter = QualityFilter::new(20, 50);
        let kept = filter.filter(vec![
            detection(0.5, 0.9),
            detection(0.1, 0.9),
            detection(0.3, 0.9),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].size_percent(), 50);
        assert_eq!(kept[1].size_percent(), 30);
    }
}
