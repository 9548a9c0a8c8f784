pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Minimum face height, in percent of frame height, for a detection to count.
pub const FACE_SIZE_THRESHOLD: u32 = 10;

/// Minimum detector confidence, in percent, for a detection to count.
pub const FACE_CONFIDENCE_THRESHOLD: u32 = 50;

/// Euclidean distance below which two descriptors are the same identity.
///
/// Tuned for L2-normalised ArcFace embeddings, where 1.0 corresponds to a
/// cosine similarity of 0.5.
pub const FACE_UNIQUENESS_THRESHOLD: f64 = 1.0;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
