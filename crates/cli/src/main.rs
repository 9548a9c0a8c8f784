use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use facetrace_core::detection::domain::face_analyzer::{DetectionMode, FaceAnalyzer};
use facetrace_core::detection::infrastructure::onnx_face_analyzer::{
    OnnxFaceAnalyzer, DEFAULT_CONFIDENCE,
};
use facetrace_core::pipeline::face_scanner::{CancellationToken, FaceScanner};
use facetrace_core::pipeline::scan_config::ScanConfig;
use facetrace_core::pipeline::scan_observer::LogScanObserver;
use facetrace_core::pipeline::session_detection_log::SessionDetectionLog;
use facetrace_core::scheduling::frame_queue::{self, FrameQueue};
use facetrace_core::shared::constants::IMAGE_EXTENSIONS;
use facetrace_core::shared::frame::Frame;
use facetrace_core::shared::model_resolver::{
    require_existing, ModelResolver, DESCRIPTOR_MODEL, DETECTOR_MODEL,
};

/// Tag recurring faces across a sequence of frames.
#[derive(Parser)]
#[command(name = "facetrace")]
struct Cli {
    /// Image files or directories of images, scanned in the given order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// JSON scan config; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum face height in percent of frame height (0-100).
    #[arg(long)]
    min_size: Option<u32>,

    /// Minimum detector confidence in percent (0-100).
    #[arg(long)]
    min_confidence: Option<u32>,

    /// Descriptor distance below which two faces are the same person.
    #[arg(long)]
    uniqueness: Option<f64>,

    /// Detection mode: single or all.
    #[arg(long)]
    mode: Option<DetectionMode>,

    /// Raw detector score cutoff applied before quality filtering (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    detector_confidence: f64,

    /// Optional age/gender ONNX model.
    #[arg(long)]
    age_gender_model: Option<PathBuf>,

    /// Write the detection log here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = build_config(&cli)?;
    config.validate()?;

    let paths = expand_inputs(&cli.inputs)?;
    if paths.is_empty() {
        return Err("No images found in the given inputs".into());
    }
    log::info!("Loading {} frames", paths.len());
    let frames = paths
        .iter()
        .enumerate()
        .map(|(n, path)| load_frame(path, n))
        .collect::<Result<Vec<_>, _>>()?;

    let resolver = ModelResolver::with_default_cache(bundled_models_dir())?;
    let detector_path = resolver.resolve(&DETECTOR_MODEL, Some(Box::new(download_progress)))?;
    let descriptor_path =
        resolver.resolve(&DESCRIPTOR_MODEL, Some(Box::new(download_progress)))?;
    eprintln!();
    let age_gender_path = cli
        .age_gender_model
        .as_deref()
        .map(require_existing)
        .transpose()?;

    let mut scanner = FaceScanner::new(Box::new(LogScanObserver::default()));
    let detector_confidence = cli.detector_confidence;
    scanner.initialize(|| {
        let analyzer = OnnxFaceAnalyzer::new(
            &detector_path,
            &descriptor_path,
            age_gender_path.as_deref(),
            detector_confidence,
        )?;
        Ok(Box::new(analyzer) as Box<dyn FaceAnalyzer>)
    })?;

    let queue = FrameQueue::shared();
    frame_queue::lock(&queue).add_array(frames);
    let detections = SessionDetectionLog::new();
    let summary = scanner.scan(&queue, &config, &detections, &CancellationToken::new())?;

    eprintln!(
        "Scanned {} frames: {} with faces, {} unique faces",
        summary.frames_processed, summary.frames_with_faces, summary.unique_faces
    );
    for (face_id, frames) in detections.occurrences() {
        eprintln!("  face {face_id}: {frames} frames");
    }

    let json = serde_json::to_string_pretty(&detections.snapshot())?;
    match cli.output {
        Some(path) => {
            fs::write(&path, json)?;
            log::info!("Detection log written to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<ScanConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };
    if let Some(size) = cli.min_size {
        config.min_size_percent = size;
    }
    if let Some(confidence) = cli.min_confidence {
        config.min_confidence_percent = confidence;
    }
    if let Some(uniqueness) = cli.uniqueness {
        config.uniqueness_threshold = uniqueness;
    }
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    Ok(config)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    for input in &cli.inputs {
        if !input.exists() {
            return Err(format!("Input not found: {}", input.display()).into());
        }
    }
    if !(0.0..=1.0).contains(&cli.detector_confidence) {
        return Err(format!(
            "Detector confidence must be between 0.0 and 1.0, got {}",
            cli.detector_confidence
        )
        .into());
    }
    Ok(())
}

/// Files are kept as given; directories contribute their images in name order.
fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut images: Vec<PathBuf> = fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            images.sort();
            paths.extend(images);
        } else {
            paths.push(input.clone());
        }
    }
    Ok(paths)
}

fn load_frame(path: &Path, frame_number: usize) -> Result<Frame, Box<dyn std::error::Error>> {
    let image = image::open(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?
        .to_rgb8();
    Ok(Frame::from_rgb_image(image, frame_number))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// `models/` next to the executable, if present.
fn bundled_models_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("models")))
        .filter(|dir| dir.is_dir())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face models... {pct}%");
    } else {
        eprint!("\rDownloading face models... {downloaded} bytes");
    }
}
