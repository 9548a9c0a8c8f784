pub mod face_scanner;
pub mod result_aggregator;
pub mod scan_config;
pub mod scan_observer;
pub mod session_detection_log;
