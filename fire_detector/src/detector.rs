use crate::{
    config::{DetectionConfig, DetectionConfigError, ModelConfig},
    cv_utils::{draw_labeled_box, Canvas, CvUtilsError},
    detection::{ComputeDevice, DetectionSet},
    labels::ColorLabel,
    model_service::{ModelService, ModelServiceError},
    ort_service::OrtModelService,
    video::{
        CancelToken, CaptureSource, DisplayWindow, FrameDisplay, FrameSink, FrameSource,
        KeyAction, SessionEnd, SessionSummary, VideoError, WriterSink,
    },
};
use opencv::core::Mat;
use std::path::Path;
use thiserror::Error;
use tracing::instrument;

const VIDEO_WINDOW: &str = "Video Processing";
const LIVE_WINDOW: &str = "Live Detection";

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Invalid detection config: {0}")]
    Config(#[from] DetectionConfigError),
    #[error("Model error: {0}")]
    Model(#[from] ModelServiceError),
    #[error("Video error: {0}")]
    Video(#[from] VideoError),
    #[error("Annotation error: {0}")]
    Annotate(#[from] CvUtilsError),
}

/// Owns a loaded model and the class table used to annotate its output.
pub struct Detector<M: ModelService = OrtModelService> {
    model: M,
    class_labels: Vec<ColorLabel>,
    confidence_threshold: f32,
}

impl<M: ModelService> Detector<M> {
    pub fn load(
        model_config: &ModelConfig,
        detection_config: &DetectionConfig,
    ) -> Result<Self, DetectorError> {
        let class_labels = detection_config.color_labels()?;
        let model = M::load(model_config)?;
        Ok(Self::from_parts(
            model,
            class_labels,
            detection_config.confidence_threshold,
        ))
    }

    pub fn with_model(model: M, detection_config: &DetectionConfig) -> Result<Self, DetectorError> {
        let class_labels = detection_config.color_labels()?;
        Ok(Self::from_parts(
            model,
            class_labels,
            detection_config.confidence_threshold,
        ))
    }

    fn from_parts(model: M, class_labels: Vec<ColorLabel>, confidence_threshold: f32) -> Self {
        tracing::info!(
            "Detector ready on {} with {} classes, confidence threshold {:.2}",
            model.device().as_str(),
            class_labels.len(),
            confidence_threshold
        );
        Self {
            model,
            class_labels,
            confidence_threshold,
        }
    }

    pub fn device(&self) -> ComputeDevice {
        self.model.device()
    }

    pub fn process_frame(&mut self, frame: &Mat) -> Result<DetectionSet, DetectorError> {
        Ok(self.model.predict(frame)?)
    }

    /// Draws every detection at or above the confidence threshold onto
    /// `frame` in place. Detections with an unknown class id are skipped.
    pub fn draw_detections<'a, C: Canvas>(
        &self,
        frame: &'a mut C,
        detections: &DetectionSet,
    ) -> Result<&'a mut C, DetectorError> {
        for detection in detections.iter() {
            if detection.confidence < self.confidence_threshold {
                continue;
            }

            let Some(color_label) = self.class_labels.get(detection.class_id) else {
                tracing::warn!(
                    "Skipping detection with unknown class id {} ({} classes configured)",
                    detection.class_id,
                    self.class_labels.len()
                );
                continue;
            };

            let text = format!("{} {:.2}", color_label.label, detection.confidence);
            draw_labeled_box(&mut *frame, &detection.bbox, &text, color_label.color)?;
        }
        Ok(frame)
    }

    pub fn process_video(
        &mut self,
        input_path: &Path,
        output_path: &Path,
        show_live: bool,
    ) -> Result<SessionSummary, DetectorError> {
        self.process_video_with_cancel(input_path, output_path, show_live, &CancelToken::new())
    }

    #[instrument(skip(self, output_path, cancel))]
    pub fn process_video_with_cancel(
        &mut self,
        input_path: &Path,
        output_path: &Path,
        show_live: bool,
        cancel: &CancelToken,
    ) -> Result<SessionSummary, DetectorError> {
        let mut source = CaptureSource::open_file(input_path)?;
        let fps = source.fps()?;
        let frame_size = source.frame_size()?;
        tracing::info!(
            "Opened {:?}: {}x{} at {:.2} fps",
            input_path,
            frame_size.width,
            frame_size.height,
            fps
        );

        let mut sink = WriterSink::create(output_path, fps, frame_size)?;
        let mut window = if show_live {
            Some(DisplayWindow::open(VIDEO_WINDOW)?)
        } else {
            None
        };

        let summary = self.run_session(
            &mut source,
            Some(&mut sink),
            window.as_mut().map(|w| w as &mut dyn FrameDisplay),
            cancel,
        )?;
        tracing::info!(
            "Wrote {} frames to {:?} ({:?})",
            summary.frames_written,
            output_path,
            summary.end
        );
        Ok(summary)
    }

    pub fn real_time_processing(&mut self, camera_id: i32) -> Result<SessionSummary, DetectorError> {
        self.real_time_processing_with_cancel(camera_id, &CancelToken::new())
    }

    #[instrument(skip(self, cancel))]
    pub fn real_time_processing_with_cancel(
        &mut self,
        camera_id: i32,
        cancel: &CancelToken,
    ) -> Result<SessionSummary, DetectorError> {
        let mut source = CaptureSource::open_camera(camera_id)?;
        let mut window = DisplayWindow::open(LIVE_WINDOW)?;
        tracing::info!("Real-time processing started. Press 'q' to quit.");

        let summary = self.run_session(&mut source, None, Some(&mut window), cancel)?;
        tracing::info!(
            "Real-time processing stopped after {} frames ({:?})",
            summary.frames_read,
            summary.end
        );
        Ok(summary)
    }

    /// Pulls frames until the source runs dry, a read fails, or the session
    /// is cancelled. A frame that triggers a quit from the display is not
    /// written.
    pub fn run_session(
        &mut self,
        source: &mut dyn FrameSource,
        mut sink: Option<&mut dyn FrameSink>,
        mut display: Option<&mut dyn FrameDisplay>,
        cancel: &CancelToken,
    ) -> Result<SessionSummary, DetectorError> {
        let mut frames_read = 0;
        let mut frames_written = 0;

        let end = loop {
            if cancel.is_cancelled() {
                break SessionEnd::Cancelled;
            }

            let mut frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break SessionEnd::Exhausted,
                Err(e) => {
                    tracing::warn!("Ending session on failed read: {}", e);
                    break SessionEnd::ReadFailed;
                }
            };
            frames_read += 1;

            let detections = self.process_frame(&frame)?;
            if !detections.is_empty() {
                tracing::debug!("Frame {}: {} detections", frames_read, detections.len());
            }
            self.draw_detections(&mut frame, &detections)?;

            if let Some(display) = display.as_deref_mut() {
                if display.show(&frame)? == KeyAction::Quit {
                    cancel.cancel();
                    break SessionEnd::Cancelled;
                }
            }

            if let Some(sink) = sink.as_deref_mut() {
                sink.write_frame(&frame)?;
                frames_written += 1;
            }
        };

        Ok(SessionSummary {
            frames_read,
            frames_written,
            end,
        })
    }
}
