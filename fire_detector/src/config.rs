use crate::labels::{load_color_labels, ColorLabel, Rgb};
use serde::Deserialize;
use std::{path::PathBuf, str::FromStr};
use thiserror::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
    pub detection: DetectionConfig,
    pub source: SourceConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer)?
        .parse()
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub onnx_file: String,
    pub model_dir: PathBuf,
    #[serde(default = "default_min_probability")]
    pub min_probability: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub force_cpu: bool,
}

fn default_min_probability() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.7
}

fn default_input_size() -> u32 {
    640
}

impl ModelConfig {
    pub fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_path()));
        }
        self.check_thresholds()
    }

    pub fn check_thresholds(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.min_probability) {
            return Err(format!(
                "min_probability {} is outside [0, 1]",
                self.min_probability
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "iou_threshold {} is outside [0, 1]",
                self.iou_threshold
            ));
        }
        if self.input_size == 0 {
            return Err("input_size must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum DetectionConfigError {
    #[error("At least one class is required")]
    EmptyClasses,
    #[error("Got {colors} colors for {classes} classes")]
    ColorCountMismatch { classes: usize, colors: usize },
    #[error("Confidence threshold {0} is outside [0, 1]")]
    ThresholdOutOfRange(f32),
    #[error("Failed to load labels file: {0}")]
    LabelsFile(#[from] std::io::Error),
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub colors: Option<Vec<Rgb>>,
    #[serde(default)]
    pub labels_file: Option<PathBuf>,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

fn default_confidence_threshold() -> f32 {
    0.5
}

impl DetectionConfig {
    pub fn new(classes: Vec<String>, colors: Option<Vec<Rgb>>, confidence_threshold: f32) -> Self {
        Self {
            classes,
            colors,
            labels_file: None,
            confidence_threshold,
        }
    }

    /// Resolves the per-class label table. Classes without explicit colors
    /// get [`Rgb::DEFAULT`] each.
    pub fn color_labels(&self) -> Result<Vec<ColorLabel>, DetectionConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DetectionConfigError::ThresholdOutOfRange(
                self.confidence_threshold,
            ));
        }

        let labels = match &self.labels_file {
            Some(path) => load_color_labels(path)?,
            None => {
                let colors = match &self.colors {
                    Some(colors) if colors.len() != self.classes.len() => {
                        return Err(DetectionConfigError::ColorCountMismatch {
                            classes: self.classes.len(),
                            colors: colors.len(),
                        })
                    }
                    Some(colors) => colors.clone(),
                    None => vec![Rgb::DEFAULT; self.classes.len()],
                };
                self.classes
                    .iter()
                    .zip(colors)
                    .map(|(label, color)| ColorLabel {
                        label: label.clone(),
                        color,
                    })
                    .collect()
            }
        };

        if labels.is_empty() {
            return Err(DetectionConfigError::EmptyClasses);
        }
        Ok(labels)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Video,
    Camera,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub mode: SourceMode,
    #[serde(default)]
    pub input_path: Option<PathBuf>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub show_live: bool,
    #[serde(default)]
    pub camera_id: i32,
}

/// Selects the optional `<environment>.yaml` overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Local, Self::Production]
            .into_iter()
            .find(|env| env.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown APP_ENVIRONMENT {:?}, expected local or production", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Debug, Self::Info, Self::Warn]
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown log_level {:?}, expected debug, info or warn", s))
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("No current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .parse()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("FD")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    if let Err(e) = config.model.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}
