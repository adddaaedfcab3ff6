use crate::config::{Config, SourceMode};
use crate::detector::Detector;
use crate::ort_service::OrtModelService;
use crate::video::CancelToken;

use anyhow::Context;
use std::path::{Path, PathBuf};

pub fn start_app(config: Config) -> anyhow::Result<()> {
    let cancel = CancelToken::new();
    install_shutdown_handler(cancel.clone())?;

    let mut detector =
        match Detector::<OrtModelService>::load(&config.model, &config.detection) {
            Ok(detector) => detector,
            Err(e) => {
                tracing::error!("Failed to initialize detector: {:?}", e);
                return Err(e.into());
            }
        };
    tracing::info!("Inference device: {}", detector.device().as_str());

    let source = &config.source;
    let summary = match source.mode {
        SourceMode::Video => {
            let input_path = source
                .input_path
                .as_deref()
                .context("source.input_path is required in video mode")?;
            let output_path = source
                .output_path
                .clone()
                .unwrap_or_else(|| default_output_path(input_path));

            detector.process_video_with_cancel(
                input_path,
                &output_path,
                source.show_live,
                &cancel,
            )?
        }
        SourceMode::Camera => {
            detector.real_time_processing_with_cancel(source.camera_id, &cancel)?
        }
    };

    tracing::info!(
        frames_read = summary.frames_read,
        frames_written = summary.frames_written,
        "Session finished: {:?}",
        summary.end
    );

    Ok(())
}

fn install_shutdown_handler(cancel: CancelToken) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping after the current frame.");
        cancel.cancel();
    })
    .context("failed to install Ctrl+C handler")
}

/// `clip.mp4` becomes `clip_detection.mp4` in the same directory.
fn default_output_path(input_path: &Path) -> PathBuf {
    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input_path.with_file_name(format!("{}_detection.mp4", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("test_video/fire-smoke.mp4")),
            PathBuf::from("test_video/fire-smoke_detection.mp4")
        );
        assert_eq!(
            default_output_path(Path::new("clip.avi")),
            PathBuf::from("clip_detection.mp4")
        );
    }
}
