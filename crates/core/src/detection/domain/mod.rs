pub mod face_analyzer;
pub mod identity_clusterer;
pub mod quality_filter;
pub mod raw_detection;
