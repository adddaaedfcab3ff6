use crate::{detection::BoundingBox, labels::Rgb};
use opencv::{
    core::{Mat, Point, Scalar, Size},
    imgproc,
};
use thiserror::Error;

const FONT_FACE: i32 = imgproc::FONT_HERSHEY_SIMPLEX;
const FONT_SCALE: f64 = 0.5;
const TEXT_THICKNESS: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const TEXT_COLOR: Rgb = Rgb(30, 30, 30);

#[derive(Error, Debug)]
pub enum CvUtilsError {
    #[error("Failed to draw on frame: {0}")]
    DrawFailed(opencv::Error),
    #[error("Failed to measure label text: {0}")]
    TextSizeFailed(opencv::Error),
}

/// The drawing primitives annotation needs.
pub trait Canvas {
    /// `thickness < 0` fills the rectangle.
    fn draw_rectangle(
        &mut self,
        pt1: Point,
        pt2: Point,
        color: Scalar,
        thickness: i32,
    ) -> Result<(), CvUtilsError>;
    fn text_size(&self, text: &str) -> Result<Size, CvUtilsError>;
    fn draw_text(&mut self, text: &str, origin: Point, color: Scalar) -> Result<(), CvUtilsError>;
}

impl Canvas for Mat {
    fn draw_rectangle(
        &mut self,
        pt1: Point,
        pt2: Point,
        color: Scalar,
        thickness: i32,
    ) -> Result<(), CvUtilsError> {
        imgproc::rectangle_points(self, pt1, pt2, color, thickness, imgproc::LINE_8, 0)
            .map_err(CvUtilsError::DrawFailed)
    }

    fn text_size(&self, text: &str) -> Result<Size, CvUtilsError> {
        let mut baseline = 0;
        imgproc::get_text_size(text, FONT_FACE, FONT_SCALE, TEXT_THICKNESS, &mut baseline)
            .map_err(CvUtilsError::TextSizeFailed)
    }

    fn draw_text(&mut self, text: &str, origin: Point, color: Scalar) -> Result<(), CvUtilsError> {
        imgproc::put_text(
            self,
            text,
            origin,
            FONT_FACE,
            FONT_SCALE,
            color,
            TEXT_THICKNESS,
            imgproc::LINE_AA,
            false,
        )
        .map_err(CvUtilsError::DrawFailed)
    }
}

/// Baseline of the label text: above the box when it fits, else inside it.
pub fn label_baseline_y(y1: i32, text_height: i32) -> i32 {
    if y1 - 10 > text_height {
        y1 - 10
    } else {
        y1 + 20
    }
}

pub fn draw_labeled_box<C: Canvas>(
    canvas: &mut C,
    bbox: &BoundingBox,
    text: &str,
    color: Rgb,
) -> Result<(), CvUtilsError> {
    let color = color.to_scalar();

    canvas.draw_rectangle(
        Point::new(bbox.x1, bbox.y1),
        Point::new(bbox.x2, bbox.y2),
        color,
        BOX_THICKNESS,
    )?;

    let text_size = canvas.text_size(text)?;
    let text_y = label_baseline_y(bbox.y1, text_size.height);

    canvas.draw_rectangle(
        Point::new(bbox.x1, text_y - text_size.height - 2),
        Point::new(bbox.x1 + text_size.width, text_y + 2),
        color,
        imgproc::FILLED,
    )?;

    canvas.draw_text(text, Point::new(bbox.x1, text_y), TEXT_COLOR.to_scalar())
}
