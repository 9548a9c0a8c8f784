use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::detection::domain::face_analyzer::{DetectionOutcome, FaceAnalyzer};
use crate::detection::domain::identity_clusterer::IdentityClusterer;
use crate::pipeline::result_aggregator::{FaceRecord, ResultAggregator};
use crate::pipeline::scan_config::{ConfigError, ScanConfig};
use crate::pipeline::scan_observer::{ScanEvent, ScanObserver};
use crate::pipeline::session_detection_log::SessionDetectionLog;
use crate::scheduling::frame_queue::{self, SharedFrameQueue};
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid scan configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("face detection is not initialised")]
    NotInitialized,
    #[error("a scan is already running")]
    AlreadyRunning,
    #[error("face detection initialisation failed: {0}")]
    Initialization(String),
}

/// Cooperative stop signal for a running scan.
///
/// Checked once per frame, before the next detection call starts. A frame
/// whose detection is already running is still recorded.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanSummary {
    pub outcome: ScanOutcome,
    pub frames_processed: usize,
    pub frames_with_faces: usize,
    pub unique_faces: usize,
}

/// Drives the detect → filter → cluster → aggregate loop over queued frames.
///
/// Holds the one analyzer instance; `&mut self` on [`scan`](Self::scan)
/// guarantees a single consumer per analyzer. Each scan starts with an empty
/// identity registry, so face IDs never leak between scans.
pub struct FaceScanner {
    analyzer: Option<Box<dyn FaceAnalyzer>>,
    observer: Box<dyn ScanObserver>,
    state: ScanState,
}

impl FaceScanner {
    pub fn new(observer: Box<dyn ScanObserver>) -> Self {
        Self {
            analyzer: None,
            observer,
            state: ScanState::Idle,
        }
    }

    /// Loads the analyzer, reporting progress to the observer.
    ///
    /// On failure any previously loaded analyzer is discarded and scans are
    /// refused until a later call succeeds.
    pub fn initialize<F>(&mut self, load: F) -> Result<(), ScanError>
    where
        F: FnOnce() -> Result<Box<dyn FaceAnalyzer>, Box<dyn std::error::Error>>,
    {
        if self.state == ScanState::Running {
            return Err(ScanError::AlreadyRunning);
        }
        self.observer.notify(&ScanEvent::InitializationStarted);
        match load() {
            Ok(analyzer) => {
                self.analyzer = Some(analyzer);
                self.observer.notify(&ScanEvent::InitializationSucceeded);
                Ok(())
            }
            Err(e) => {
                self.analyzer = None;
                let message = e.to_string();
                self.observer.notify(&ScanEvent::InitializationFailed {
                    message: message.clone(),
                });
                Err(ScanError::Initialization(message))
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.analyzer.is_some()
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Processes frames from `queue` until it is empty or `cancel` fires.
    ///
    /// Frames are taken from the front of the queue one at a time, so a
    /// producer may keep adding while the scan runs.
    pub fn scan(
        &mut self,
        queue: &SharedFrameQueue<Frame>,
        config: &ScanConfig,
        log: &SessionDetectionLog,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary, ScanError> {
        config.validate()?;
        if self.state == ScanState::Running {
            return Err(ScanError::AlreadyRunning);
        }
        let analyzer = self.analyzer.as_mut().ok_or(ScanError::NotInitialized)?;

        self.state = ScanState::Running;
        self.observer.notify(&ScanEvent::ScanStarted);

        let filter = config.quality_filter();
        let mut clusterer = IdentityClusterer::new(config.uniqueness_threshold);
        let aggregator = ResultAggregator::new(log.clone());

        let mut frames_processed = 0;
        let mut frames_with_faces = 0;

        let outcome = loop {
            if cancel.is_cancelled() {
                break ScanOutcome::Cancelled;
            }
            let (frame, remaining) = {
                let mut q = frame_queue::lock(queue);
                let frame = q.remove_first();
                (frame, q.size())
            };
            let Some(frame) = frame else {
                break ScanOutcome::Completed;
            };

            let started = Instant::now();
            let outcome = DetectionOutcome::of(analyzer.analyze(&frame, config.mode));
            let detect_ms = started.elapsed().as_secs_f64() * 1000.0;

            if let DetectionOutcome::Failed(ref message) = outcome {
                log::warn!(
                    "Detection failed on frame {}, treating as no face: {message}",
                    frame.frame_number()
                );
            }

            let faces: Vec<FaceRecord> = filter
                .filter(outcome.into_detections())
                .iter()
                .map(|d| FaceRecord::from_detection(clusterer.assign(&d.descriptor), d))
                .collect();
            let accepted_faces = aggregator.record(frame.frame_number(), faces);

            frames_processed += 1;
            if accepted_faces > 0 {
                frames_with_faces += 1;
            }

            self.observer.notify(&ScanEvent::FrameProcessed {
                frame_number: frame.frame_number(),
                accepted_faces,
                processed: frames_processed,
                remaining,
                detect_ms,
            });
        };

        self.state = match outcome {
            ScanOutcome::Completed => ScanState::Completed,
            ScanOutcome::Cancelled => ScanState::Cancelled,
        };

        let summary = ScanSummary {
            outcome,
            frames_processed,
            frames_with_faces,
            unique_faces: clusterer.unique_faces(),
        };
        self.observer.notify(&ScanEvent::ScanFinished {
            summary: summary.clone(),
        });

        self.state = ScanState::Idle;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::detection::domain::face_analyzer::DetectionMode;
    use crate::detection::domain::raw_detection::{Gender, RawDetection};
    use crate::pipeline::scan_observer::NullScanObserver;
    use crate::scheduling::frame_queue::FrameQueue;
    use crate::shared::relative_box::RelativeBox;

    // --- Stubs ---

    /// Returns canned detections per frame number; `None` entries fail.
    struct StubAnalyzer {
        results: HashMap<usize, Option<Vec<RawDetection>>>,
        calls: Arc<Mutex<Vec<(usize, DetectionMode)>>>,
        on_call: Option<Box<dyn Fn(usize) + Send>>,
    }

    impl StubAnalyzer {
        fn new(results: HashMap<usize, Option<Vec<RawDetection>>>) -> Self {
            Self {
                results,
                calls: Arc::new(Mutex::new(Vec::new())),
                on_call: None,
            }
        }
    }

    impl FaceAnalyzer for StubAnalyzer {
        fn analyze(
            &mut self,
            frame: &Frame,
            mode: DetectionMode,
        ) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
            let n = frame.frame_number();
            self.calls.lock().unwrap().push((n, mode));
            if let Some(ref hook) = self.on_call {
                hook(n);
            }
            match self.results.get(&n) {
                Some(Some(detections)) => Ok(detections.clone()),
                Some(None) => Err("model error".into()),
                None => Ok(Vec::new()),
            }
        }
    }

    struct RecordingObserver {
        events: Arc<Mutex<Vec<ScanEvent>>>,
    }

    impl ScanObserver for RecordingObserver {
        fn notify(&mut self, event: &ScanEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    // --- Helpers ---

    fn frame(n: usize) -> Frame {
        Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 3, n)
    }

    fn queue_of(frames: impl IntoIterator<Item = usize>) -> SharedFrameQueue<Frame> {
        let queue = FrameQueue::shared();
        frame_queue::lock(&queue).add_array(frames.into_iter().map(frame));
        queue
    }

    fn det(height: f64, confidence: f64, descriptor: Vec<f32>) -> RawDetection {
        RawDetection {
            relative_box: RelativeBox::new(0.1, 0.1, height, height),
            confidence,
            age: 29.6,
            gender: Gender::Female,
            descriptor,
        }
    }

    fn config() -> ScanConfig {
        ScanConfig {
            min_size_percent: 10,
            min_confidence_percent: 80,
            uniqueness_threshold: 0.4,
            mode: DetectionMode::All,
        }
    }

    fn scanner_with(analyzer: StubAnalyzer) -> FaceScanner {
        let mut scanner = FaceScanner::new(Box::new(NullScanObserver));
        scanner
            .initialize(move || Ok(Box::new(analyzer) as Box<dyn FaceAnalyzer>))
            .unwrap();
        scanner
    }

    // --- Tests ---

    #[test]
    fn test_scan_assigns_stable_ids_across_frames() {
        let results = HashMap::from([
            (0, Some(vec![det(0.3, 0.9, vec![0.0, 0.0])])),
            (1, Some(vec![det(0.2, 0.9, vec![5.0, 5.0]), det(0.4, 0.9, vec![0.3, 0.0])])),
            (2, Some(vec![det(0.25, 0.95, vec![5.1, 5.0])])),
        ]);
        let mut scanner = scanner_with(StubAnalyzer::new(results));
        let log = SessionDetectionLog::new();

        let summary = scanner
            .scan(&queue_of(0..3), &config(), &log, &CancellationToken::new())
            .unwrap();

        assert_eq!(summary.outcome, ScanOutcome::Completed);
        assert_eq!(summary.frames_processed, 3);
        assert_eq!(summary.frames_with_faces, 3);
        assert_eq!(summary.unique_faces, 2);

        let entries = log.snapshot();
        assert_eq!(entries[0].faces_array[0].face_id, 0);
        // Frame 1: the larger face (identity 0) is listed first.
        let ids: Vec<usize> = entries[1].faces_array.iter().map(|f| f.face_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(entries[1].largest_size, 40);
        assert_eq!(entries[2].faces_array[0].face_id, 1);
        assert_eq!(entries[2].faces_array[0].age, 30);
    }

    #[test]
    fn test_frames_without_accepted_faces_are_not_logged() {
        let results = HashMap::from([
            (0, Some(vec![det(0.3, 0.79, vec![0.0])])),
            (1, Some(vec![det(0.05, 0.99, vec![0.0])])),
            (2, Some(vec![det(0.3, 0.80, vec![0.0])])),
        ]);
        let mut scanner = scanner_with(StubAnalyzer::new(results));
        let log = SessionDetectionLog::new();

        let summary = scanner
            .scan(&queue_of(0..4), &config(), &log, &CancellationToken::new())
            .unwrap();

        assert_eq!(summary.frames_processed, 4);
        assert_eq!(summary.frames_with_faces, 1);
        let entries = log.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].frame_number, 2);
    }

    #[test]
    fn test_face_count_excludes_rejected_faces() {
        let results = HashMap::from([(
            0,
            Some(vec![
                det(0.4, 0.9, vec![0.0]),
                det(0.15, 0.9, vec![1.0]),
                det(0.25, 0.5, vec![2.0]),
            ]),
        )]);
        let mut scanner = scanner_with(StubAnalyzer::new(results));
        let log = SessionDetectionLog::new();

        scanner
            .scan(&queue_of(0..1), &config(), &log, &CancellationToken::new())
            .unwrap();

        let entry = &log.snapshot()[0];
        assert_eq!(entry.face_count, 2);
        let sizes: Vec<u32> = entry.faces_array.iter().map(|f| f.size_percent).collect();
        assert_eq!(sizes, vec![40, 15]);
    }

    #[test]
    fn test_adapter_failure_is_not_fatal() {
        let results = HashMap::from([
            (0, None),
            (1, Some(vec![det(0.3, 0.9, vec![0.0])])),
        ]);
        let mut scanner = scanner_with(StubAnalyzer::new(results));
        let log = SessionDetectionLog::new();

        let summary = scanner
            .scan(&queue_of(0..2), &config(), &log, &CancellationToken::new())
            .unwrap();

        assert_eq!(summary.outcome, ScanOutcome::Completed);
        assert_eq!(summary.frames_processed, 2);
        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshot()[0].frame_number, 1);
    }

    #[test]
    fn test_cancel_during_detection_records_current_frame_only() {
        let results = HashMap::from([
            (0, Some(vec![det(0.3, 0.9, vec![0.0])])),
            (1, Some(vec![det(0.3, 0.9, vec![0.0])])),
            (2, Some(vec![det(0.3, 0.9, vec![0.0])])),
        ]);
        let cancel = CancellationToken::new();
        let mut analyzer = StubAnalyzer::new(results);
        let calls = analyzer.calls.clone();
        let token = cancel.clone();
        analyzer.on_call = Some(Box::new(move |n| {
            if n == 1 {
                token.cancel();
            }
        }));
        let mut scanner = scanner_with(analyzer);
        let log = SessionDetectionLog::new();
        let queue = queue_of(0..3);

        let summary = scanner.scan(&queue, &config(), &log, &cancel).unwrap();

        assert_eq!(summary.outcome, ScanOutcome::Cancelled);
        assert_eq!(summary.frames_processed, 2);
        let frames: Vec<usize> = log.snapshot().iter().map(|e| e.frame_number).collect();
        assert_eq!(frames, vec![0, 1]);
        let called: Vec<usize> = calls.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(called, vec![0, 1]);
        assert_eq!(frame_queue::lock(&queue).size(), 1);
        assert_eq!(scanner.state(), ScanState::Idle);
    }

    #[test]
    fn test_cancelled_before_start_processes_nothing() {
        let mut scanner = scanner_with(StubAnalyzer::new(HashMap::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = scanner
            .scan(&queue_of(0..3), &config(), &SessionDetectionLog::new(), &cancel)
            .unwrap();

        assert_eq!(summary.outcome, ScanOutcome::Cancelled);
        assert_eq!(summary.frames_processed, 0);
    }

    #[test]
    fn test_log_order_follows_processing_order() {
        let results: HashMap<usize, Option<Vec<RawDetection>>> = (0..6)
            .map(|n| (n, Some(vec![det(0.3, 0.9, vec![n as f32])])))
            .collect();
        let mut scanner = scanner_with(StubAnalyzer::new(results));
        let log = SessionDetectionLog::new();

        scanner
            .scan(&queue_of(0..6), &config(), &log, &CancellationToken::new())
            .unwrap();

        let frames: Vec<usize> = log.snapshot().iter().map(|e| e.frame_number).collect();
        assert_eq!(frames, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_each_scan_starts_with_fresh_registry() {
        let results = HashMap::from([
            (0, Some(vec![det(0.3, 0.9, vec![0.0])])),
            (1, Some(vec![det(0.3, 0.9, vec![9.0])])),
        ]);
        let mut scanner = scanner_with(StubAnalyzer::new(results));

        let first = SessionDetectionLog::new();
        scanner
            .scan(&queue_of([0]), &config(), &first, &CancellationToken::new())
            .unwrap();
        let second = SessionDetectionLog::new();
        scanner
            .scan(&queue_of([1]), &config(), &second, &CancellationToken::new())
            .unwrap();

        assert_eq!(first.snapshot()[0].faces_array[0].face_id, 0);
        assert_eq!(second.snapshot()[0].faces_array[0].face_id, 0);
    }

    #[test]
    fn test_mode_is_passed_to_analyzer() {
        let analyzer = StubAnalyzer::new(HashMap::new());
        let calls = analyzer.calls.clone();
        let mut scanner = scanner_with(analyzer);
        let single = ScanConfig {
            mode: DetectionMode::Single,
            ..config()
        };

        scanner
            .scan(&queue_of([0]), &single, &SessionDetectionLog::new(), &CancellationToken::new())
            .unwrap();

        assert_eq!(calls.lock().unwrap()[0], (0, DetectionMode::Single));
    }

    #[test]
    fn test_invalid_config_rejected_before_scanning() {
        let analyzer = StubAnalyzer::new(HashMap::new());
        let calls = analyzer.calls.clone();
        let mut scanner = scanner_with(analyzer);
        let bad = ScanConfig {
            uniqueness_threshold: 0.0,
            ..config()
        };

        let result = scanner.scan(
            &queue_of([0]),
            &bad,
            &SessionDetectionLog::new(),
            &CancellationToken::new(),
        );

        assert!(matches!(result, Err(ScanError::Config(_))));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_scan_requires_initialisation() {
        let mut scanner = FaceScanner::new(Box::new(NullScanObserver));
        let result = scanner.scan(
            &queue_of([0]),
            &config(),
            &SessionDetectionLog::new(),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(ScanError::NotInitialized)));
    }

    #[test]
    fn test_failed_initialisation_reports_and_blocks_scans() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut scanner = FaceScanner::new(Box::new(RecordingObserver {
            events: events.clone(),
        }));

        let result = scanner.initialize(|| Err("weights missing".into()));

        assert!(matches!(result, Err(ScanError::Initialization(ref m)) if m == "weights missing"));
        assert!(!scanner.is_initialized());
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ScanEvent::InitializationStarted,
                ScanEvent::InitializationFailed {
                    message: "weights missing".into()
                },
            ]
        );
        let scan = scanner.scan(
            &queue_of([0]),
            &config(),
            &SessionDetectionLog::new(),
            &CancellationToken::new(),
        );
        assert!(matches!(scan, Err(ScanError::NotInitialized)));
    }

    #[test]
    fn test_scan_emits_lifecycle_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut scanner = FaceScanner::new(Box::new(RecordingObserver {
            events: events.clone(),
        }));
        let results = HashMap::from([(1, Some(vec![det(0.3, 0.9, vec![0.0])]))]);
        scanner
            .initialize(move || Ok(Box::new(StubAnalyzer::new(results)) as Box<dyn FaceAnalyzer>))
            .unwrap();

        scanner
            .scan(&queue_of(0..2), &config(), &SessionDetectionLog::new(), &CancellationToken::new())
            .unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events[0], ScanEvent::InitializationStarted);
        assert_eq!(events[1], ScanEvent::InitializationSucceeded);
        assert_eq!(events[2], ScanEvent::ScanStarted);
        assert!(matches!(
            events[3],
            ScanEvent::FrameProcessed {
                frame_number: 0,
                accepted_faces: 0,
                processed: 1,
                remaining: 1,
                ..
            }
        ));
        assert!(matches!(
            events[4],
            ScanEvent::FrameProcessed {
                frame_number: 1,
                accepted_faces: 1,
                processed: 2,
                remaining: 0,
                ..
            }
        ));
        assert!(matches!(
            events[5],
            ScanEvent::ScanFinished { ref summary } if summary.outcome == ScanOutcome::Completed
        ));
    }

    #[test]
    fn test_frames_added_singly_are_scanned_newest_first() {
        let analyzer = StubAnalyzer::new(HashMap::new());
        let analyzer_calls = analyzer.calls.clone();
        let mut scanner = scanner_with(analyzer);
        let queue = FrameQueue::shared();
        {
            let mut q = frame_queue::lock(&queue);
            q.add(frame(0));
            q.add(frame(1));
            q.add(frame(2));
        }

        scanner
            .scan(&queue, &config(), &SessionDetectionLog::new(), &CancellationToken::new())
            .unwrap();

        let order: Vec<usize> = analyzer_calls.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }
}
