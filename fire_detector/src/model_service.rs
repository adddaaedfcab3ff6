use crate::{
    config::ModelConfig,
    detection::{ComputeDevice, DetectionSet},
};
use opencv::core::Mat;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelServiceError {
    #[error("Model file not found: {0:?}")]
    ModelNotFound(PathBuf),
    #[error("Invalid model config: {0}")]
    InvalidConfig(String),
    #[error("Failed to load model: {0}")]
    LoadFailed(String),
    #[error("Failed to prepare frame: {0}")]
    Preprocess(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// A detection engine that turns one frame into a detection set.
pub trait ModelService {
    fn load(model_config: &ModelConfig) -> Result<Self, ModelServiceError>
    where
        Self: Sized;
    fn device(&self) -> ComputeDevice;
    fn predict(&mut self, frame: &Mat) -> Result<DetectionSet, ModelServiceError>;
}
