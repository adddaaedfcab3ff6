use opencv::{
    core::{Mat, Size},
    highgui,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use thiserror::Error;

const OUTPUT_FOURCC: [char; 4] = ['m', 'p', '4', 'v'];
const QUIT_KEY: i32 = 'q' as i32;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Failed to open video source: {0}")]
    SourceOpenFailed(String),
    #[error("Failed to open video writer: {0}")]
    WriterOpenFailed(String),
    #[error("Failed to write frame: {0}")]
    WriteFrameFailed(opencv::Error),
    #[error("Failed to display frame: {0}")]
    DisplayFailed(opencv::Error),
    #[error("OpenCV error: {0}")]
    OpenCvError(#[from] opencv::Error),
}

/// Cooperative stop flag shared between the session loop and whoever may
/// want to end it early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Exhausted,
    Cancelled,
    ReadFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_read: u64,
    pub frames_written: u64,
    pub end: SessionEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Continue,
    Quit,
}

pub trait FrameSource {
    /// `Ok(None)` once the source has no more frames.
    fn read_frame(&mut self) -> Result<Option<Mat>, VideoError>;
}

pub trait FrameSink {
    fn write_frame(&mut self, frame: &Mat) -> Result<(), VideoError>;
}

pub trait FrameDisplay {
    fn show(&mut self, frame: &Mat) -> Result<KeyAction, VideoError>;
}

/// An opened capture device or file. Released on drop.
pub struct CaptureSource {
    capture: VideoCapture,
}

impl CaptureSource {
    pub fn open_file(path: &Path) -> Result<Self, VideoError> {
        let name = path.to_string_lossy();
        let capture = VideoCapture::from_file(&name, videoio::CAP_ANY)
            .map_err(|e| VideoError::SourceOpenFailed(format!("{}: {}", name, e)))?;
        Self::checked(capture, &name)
    }

    pub fn open_camera(camera_id: i32) -> Result<Self, VideoError> {
        let capture = VideoCapture::new(camera_id, videoio::CAP_ANY)
            .map_err(|e| VideoError::SourceOpenFailed(format!("camera {}: {}", camera_id, e)))?;
        Self::checked(capture, &format!("camera {}", camera_id))
    }

    fn checked(capture: VideoCapture, name: &str) -> Result<Self, VideoError> {
        if !capture.is_opened()? {
            return Err(VideoError::SourceOpenFailed(name.to_string()));
        }
        Ok(Self { capture })
    }

    pub fn fps(&self) -> Result<f64, VideoError> {
        Ok(self.capture.get(videoio::CAP_PROP_FPS)?)
    }

    pub fn frame_size(&self) -> Result<Size, VideoError> {
        let width = self.capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = self.capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        Ok(Size::new(width, height))
    }
}

impl FrameSource for CaptureSource {
    fn read_frame(&mut self) -> Result<Option<Mat>, VideoError> {
        let mut frame = Mat::default();
        if self.capture.read(&mut frame)? && !frame.empty() {
            return Ok(Some(frame));
        }
        Ok(None)
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            tracing::warn!("Failed to release video source: {}", e);
        }
    }
}

/// An output video file. Finalized on drop.
pub struct WriterSink {
    writer: VideoWriter,
}

impl WriterSink {
    pub fn create(path: &Path, fps: f64, frame_size: Size) -> Result<Self, VideoError> {
        let name = path.to_string_lossy();
        let [c1, c2, c3, c4] = OUTPUT_FOURCC;
        let fourcc = VideoWriter::fourcc(c1, c2, c3, c4)?;
        let writer = VideoWriter::new(&name, fourcc, fps, frame_size, true)
            .map_err(|e| VideoError::WriterOpenFailed(format!("{}: {}", name, e)))?;
        if !writer.is_opened()? {
            return Err(VideoError::WriterOpenFailed(name.to_string()));
        }
        Ok(Self { writer })
    }
}

impl FrameSink for WriterSink {
    fn write_frame(&mut self, frame: &Mat) -> Result<(), VideoError> {
        self.writer
            .write(frame)
            .map_err(VideoError::WriteFrameFailed)
    }
}

impl Drop for WriterSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.release() {
            tracing::warn!("Failed to finalize output video: {}", e);
        }
    }
}

/// A named highgui window. `q` asks the session to stop. Closed on drop.
pub struct DisplayWindow {
    name: String,
}

impl DisplayWindow {
    pub fn open(name: &str) -> Result<Self, VideoError> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)
            .map_err(VideoError::DisplayFailed)?;
        Ok(Self {
            name: name.to_string(),
        })
    }
}

impl FrameDisplay for DisplayWindow {
    fn show(&mut self, frame: &Mat) -> Result<KeyAction, VideoError> {
        highgui::imshow(&self.name, frame).map_err(VideoError::DisplayFailed)?;
        let key = highgui::wait_key(1).map_err(VideoError::DisplayFailed)?;
        if key & 0xFF == QUIT_KEY {
            return Ok(KeyAction::Quit);
        }
        Ok(KeyAction::Continue)
    }
}

impl Drop for DisplayWindow {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(&self.name) {
            tracing::warn!("Failed to close window {}: {}", self.name, e);
        }
    }
}
