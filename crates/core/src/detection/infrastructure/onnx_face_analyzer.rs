//! Face analyzer backed by ONNX Runtime via `ort`.
//!
//! Runs up to three models per frame: a YOLO face detector for boxes, an
//! ArcFace network for identity descriptors, and optionally an InsightFace
//! `genderage` network. Without the last one every face is reported as
//! [`Gender::Unknown`] with age 0.
use std::path::Path;

use ort::session::Session;

use crate::detection::domain::face_analyzer::{most_prominent, DetectionMode, FaceAnalyzer};
use crate::detection::domain::raw_detection::{Gender, RawDetection};
use crate::shared::frame::Frame;
use crate::shared::relative_box::RelativeBox;

use super::execution_provider::load_session;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default internal detector confidence. The scan applies its own,
/// usually stricter, confidence threshold afterwards.
pub const DEFAULT_CONFIDENCE: f64 = 0.25;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

const DESCRIPTOR_INPUT_SIZE: usize = 112;
const DESCRIPTOR_MEAN: f32 = 127.5;
const DESCRIPTOR_STD: f32 = 127.5;

/// `genderage` takes raw 0-255 RGB at 96x96.
const AGE_GENDER_INPUT_SIZE: usize = 96;

pub struct OnnxFaceAnalyzer {
    detector: Session,
    descriptor: Session,
    age_gender: Option<Session>,
    confidence: f64,
    input_size: u32,
}

impl OnnxFaceAnalyzer {
    /// Loads all models. Any failure here is an initialisation failure.
    ///
    /// The detector input resolution is read from the model's input shape
    /// (NCHW); dynamic shapes fall back to 640.
    pub fn new(
        detector_path: &Path,
        descriptor_path: &Path,
        age_gender_path: Option<&Path>,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let detector = load_session(detector_path)?;
        let descriptor = load_session(descriptor_path)?;
        let age_gender = age_gender_path.map(load_session).transpose()?;

        let input_size = detector
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!(
            "Face analyzer ready (input {input_size}px, age/gender {})",
            if age_gender.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            detector,
            descriptor,
            age_gender,
            confidence,
            input_size,
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn analyze(
        &mut self,
        frame: &Frame,
        mode: DetectionMode,
    ) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
        let boxes = detect_boxes(&mut self.detector, frame, self.input_size, self.confidence)?;

        let mut detections = Vec::with_capacity(boxes.len());
        for b in &boxes {
            let crop = square_crop(frame, b);
            if crop.width == 0 || crop.height == 0 {
                continue;
            }

            let descriptor = describe(&mut self.descriptor, &crop)?;
            let (gender, age) = match self.age_gender.as_mut() {
                Some(session) => estimate_age_gender(session, &crop)?,
                None => (Gender::Unknown, 0.0),
            };

            detections.push(RawDetection {
                relative_box: RelativeBox::from_pixels(
                    (b.x1, b.y1, b.x2, b.y2),
                    frame.width(),
                    frame.height(),
                ),
                confidence: b.confidence,
                age,
                gender,
                descriptor,
            });
        }

        Ok(match mode {
            DetectionMode::Single => most_prominent(detections),
            DetectionMode::All => detections,
        })
    }
}

// ---------------------------------------------------------------------------
// Model stages
// ---------------------------------------------------------------------------

fn detect_boxes(
    session: &mut Session,
    frame: &Frame,
    input_size: u32,
    confidence: f64,
) -> Result<Vec<PixelBox>, Box<dyn std::error::Error>> {
    let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, input_size);

    let input_value = ort::value::Tensor::from_array(input_tensor)?;
    let outputs = session.run(ort::inputs![input_value])?;
    if outputs.len() == 0 {
        return Err("Detector model produced no outputs".into());
    }
    let tensor = outputs[0].try_extract_array::<f32>()?;
    let shape = tensor.shape();
    if shape.len() != 3 {
        return Err(format!("Unexpected detector output shape: {shape:?}").into());
    }

    // [1, features, detections] (transposed) or [1, detections, features].
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

    let mut boxes = Vec::new();
    for i in 0..num_dets {
        let feature = |f: usize| {
            if transposed {
                data[f * num_dets + i]
            } else {
                data[i * num_feats + f]
            }
        };
        if num_feats < 5 {
            continue;
        }
        let conf = feature(4) as f64;
        if conf < confidence {
            continue;
        }

        let cx = feature(0) as f64;
        let cy = feature(1) as f64;
        let w = feature(2) as f64;
        let h = feature(3) as f64;

        boxes.push(PixelBox {
            x1: ((cx - w / 2.0) - pad_x as f64) / scale,
            y1: ((cy - h / 2.0) - pad_y as f64) / scale,
            x2: ((cx + w / 2.0) - pad_x as f64) / scale,
            y2: ((cy + h / 2.0) - pad_y as f64) / scale,
            confidence: conf,
        });
    }

    Ok(nms(&mut boxes, NMS_IOU_THRESH))
}

fn describe(session: &mut Session, crop: &Crop) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
    let tensor = resize_to_nchw(crop, DESCRIPTOR_INPUT_SIZE, DESCRIPTOR_MEAN, DESCRIPTOR_STD);
    let input_value = ort::value::Tensor::from_array(tensor)?;
    let outputs = session.run(ort::inputs![input_value])?;
    let embedding = outputs[0].try_extract_array::<f32>()?;
    let slice = embedding.as_slice().ok_or("Cannot get descriptor slice")?;

    let mut descriptor = slice.to_vec();
    l2_normalize(&mut descriptor);
    Ok(descriptor)
}

/// Output layout: `[female_score, male_score, age / 100]`.
fn estimate_age_gender(
    session: &mut Session,
    crop: &Crop,
) -> Result<(Gender, f32), Box<dyn std::error::Error>> {
    let tensor = resize_to_nchw(crop, AGE_GENDER_INPUT_SIZE, 0.0, 1.0);
    let input_value = ort::value::Tensor::from_array(tensor)?;
    let outputs = session.run(ort::inputs![input_value])?;
    let prediction = outputs[0].try_extract_array::<f32>()?;
    let values = prediction.as_slice().ok_or("Cannot get age/gender slice")?;
    if values.len() < 3 {
        return Err(format!("Age/gender model returned {} values", values.len()).into());
    }
    Ok(decode_age_gender(values))
}

fn decode_age_gender(values: &[f32]) -> (Gender, f32) {
    let gender = if values[1] > values[0] {
        Gender::Male
    } else {
        Gender::Female
    };
    (gender, (values[2] * 100.0).max(0.0))
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = (fw * scale).round() as u32;
    let new_h = (fh * scale).round() as u32;
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // YOLO convention: pad with 114/255 gray.
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

/// RGB pixels cut out of a frame.
struct Crop {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

/// Square crop centred on the box, clamped to frame bounds.
fn square_crop(frame: &Frame, b: &PixelBox) -> Crop {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;

    let cx = (b.x1 + b.x2) / 2.0;
    let cy = (b.y1 + b.y2) / 2.0;
    let half = (b.x2 - b.x1).max(b.y2 - b.y1) / 2.0;

    let x1 = (cx - half).clamp(0.0, fw) as usize;
    let y1 = (cy - half).clamp(0.0, fh) as usize;
    let x2 = (cx + half).clamp(0.0, fw) as usize;
    let y2 = (cy + half).clamp(0.0, fh) as usize;

    let width = x2.saturating_sub(x1);
    let height = y2.saturating_sub(y1);
    let src = frame.as_ndarray();
    let mut data = Vec::with_capacity(width * height * 3);
    for row in y1..y1 + height {
        for col in x1..x1 + width {
            for c in 0..3 {
                data.push(src[[row, col, c]]);
            }
        }
    }

    Crop {
        data,
        width,
        height,
    }
}

/// Nearest-neighbour resize to `size`×`size`, `(v - mean) / std`, NCHW layout.
fn resize_to_nchw(crop: &Crop, size: usize, mean: f32, std: f32) -> ndarray::Array4<f32> {
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        let src_y = (((y as f64 + 0.5) * crop.height as f64 / size as f64) as usize)
            .min(crop.height - 1);
        for x in 0..size {
            let src_x =
                (((x as f64 + 0.5) * crop.width as f64 / size as f64) as usize).min(crop.width - 1);
            let offset = (src_y * crop.width + src_x) * 3;
            for c in 0..3 {
                tensor[[0, c, y, x]] = (crop.data[offset + c] as f32 - mean) / std;
            }
        }
    }

    tensor
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

/// Detector box in original frame pixel coordinates.
#[derive(Clone, Debug)]
struct PixelBox {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(boxes: &mut [PixelBox], iou_thresh: f64) -> Vec<PixelBox> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<PixelBox> = Vec::new();
    for candidate in boxes.iter() {
        if keep.iter().all(|k| iou(k, candidate) <= iou_thresh) {
            keep.push(candidate.clone());
        }
    }
    keep
}

fn iou(a: &PixelBox, b: &PixelBox) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
