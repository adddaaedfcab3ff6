mod ort_service;

pub mod app;
pub mod config;
pub mod cv_utils;
pub mod detection;
pub mod detector;
pub mod labels;
pub mod model_service;
pub mod video;

pub use app::start_app;
pub use detector::{Detector, DetectorError};
pub use ort_service::OrtModelService;
