use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};

use crate::pipeline::face_scanner::ScanSummary;

/// Lifecycle and progress notifications emitted by a [`FaceScanner`].
///
/// [`FaceScanner`]: crate::pipeline::face_scanner::FaceScanner
#[derive(Clone, Debug, PartialEq)]
pub enum ScanEvent {
    InitializationStarted,
    InitializationSucceeded,
    InitializationFailed { message: String },
    ScanStarted,
    FrameProcessed {
        frame_number: usize,
        accepted_faces: usize,
        processed: usize,
        remaining: usize,
        detect_ms: f64,
    },
    ScanFinished { summary: ScanSummary },
}

/// Receives scan events. Delivery is fire-and-forget: implementations must
/// return promptly and never block the scan.
pub trait ScanObserver: Send {
    fn notify(&mut self, event: &ScanEvent);
}

/// Observer that discards all events.
pub struct NullScanObserver;

impl ScanObserver for NullScanObserver {
    fn notify(&mut self, _event: &ScanEvent) {}
}

/// Forwards events over a channel, dropping them when the channel is full
/// or the receiver has gone away.
pub struct ChannelScanObserver {
    tx: Sender<ScanEvent>,
    dropped: usize,
}

impl ChannelScanObserver {
    pub fn new(tx: Sender<ScanEvent>) -> Self {
        Self { tx, dropped: 0 }
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl ScanObserver for ChannelScanObserver {
    fn notify(&mut self, event: &ScanEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
            }
        }
    }
}

/// Logs events through the `log` crate and keeps detection timings for an
/// end-of-scan summary.
///
/// Per-frame progress is throttled to every `throttle_frames` frames to
/// avoid flooding the log on long videos.
pub struct LogScanObserver {
    throttle_frames: usize,
    detect_ms: Vec<f64>,
    faces_per_frame: Vec<usize>,
    started: Option<Instant>,
}

impl LogScanObserver {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            detect_ms: Vec::new(),
            faces_per_frame: Vec::new(),
            started: None,
        }
    }

    /// Returns the formatted timing summary, or `None` if no frame was seen.
    pub fn summary_string(&self) -> Option<String> {
        if self.detect_ms.is_empty() {
            return None;
        }

        let frames = self.detect_ms.len();
        let total_ms: f64 = self.detect_ms.iter().sum();
        let avg_ms = total_ms / frames as f64;
        let avg_faces = self.faces_per_frame.iter().sum::<usize>() as f64 / frames as f64;

        let mut lines = vec![
            format!("Scan summary ({frames} frames):"),
            format!("  detect      : avg {avg_ms:6.1}ms  total {total_ms:7.0}ms"),
            format!("  faces/frame : avg {avg_faces:.1}"),
        ];

        if let Some(started) = self.started {
            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                lines.push(format!("  Throughput: {:.1} fps", frames as f64 / elapsed));
            }
        }

        Some(lines.join("\n"))
    }
}

impl Default for LogScanObserver {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ScanObserver for LogScanObserver {
    fn notify(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::InitializationStarted => log::info!("Initialising face detection"),
            ScanEvent::InitializationSucceeded => {
                log::info!("Face detection successfully initialised")
            }
            ScanEvent::InitializationFailed { message } => {
                log::error!("Face detection initialisation failed: {message}")
            }
            ScanEvent::ScanStarted => {
                self.detect_ms.clear();
                self.faces_per_frame.clear();
                self.started = Some(Instant::now());
                log::info!("Scan started");
            }
            ScanEvent::FrameProcessed {
                frame_number,
                accepted_faces,
                processed,
                remaining,
                detect_ms,
            } => {
                self.detect_ms.push(*detect_ms);
                self.faces_per_frame.push(*accepted_faces);
                if processed % self.throttle_frames == 0 || *remaining == 0 {
                    log::info!(
                        "Scanned {processed} frames ({remaining} queued), frame {frame_number}: {accepted_faces} faces"
                    );
                }
            }
            ScanEvent::ScanFinished { summary } => {
                log::info!(
                    "Scan {:?}: {} frames, {} with faces, {} unique faces",
                    summary.outcome,
                    summary.frames_processed,
                    summary.frames_with_faces,
                    summary.unique_faces
                );
                if let Some(text) = self.summary_string() {
                    log::info!("\n\n{text}");
                }
            }
        }
    }
}
