use crate::{
    config::ModelConfig,
    detection::{BoundingBox, ComputeDevice, Detection, DetectionSet},
    model_service::{ModelService, ModelServiceError},
};
use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use ndarray::{s, Array, ArrayViewD, Axis, Ix4};
use opencv::{core::Mat, imgproc, prelude::*};
use ort::{
    execution_providers::{CUDAExecutionProvider, ExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};

const OUTPUT_NAME: &str = "output0";

#[derive(Debug, Clone, Copy)]
struct Candidate {
    class_id: usize,
    confidence: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

fn intersection(box1: &Candidate, box2: &Candidate) -> f32 {
    (box1.x2.min(box2.x2) - box1.x1.max(box2.x1)).max(0.)
        * (box1.y2.min(box2.y2) - box1.y1.max(box2.y1)).max(0.)
}

fn union(box1: &Candidate, box2: &Candidate) -> f32 {
    ((box1.x2 - box1.x1) * (box1.y2 - box1.y1)) + ((box2.x2 - box2.x1) * (box2.y2 - box2.y1))
        - intersection(box1, box2)
}

fn transform_frame(frame: &Mat, input_size: u32) -> Result<(Array<f32, Ix4>, u32, u32), String> {
    if frame.empty() {
        return Err("empty frame".to_string());
    }

    let mut rgb = Mat::default();
    imgproc::cvt_color_def(frame, &mut rgb, imgproc::COLOR_BGR2RGB)
        .map_err(|e| format!("Error converting colors: {}", e))?;

    let img_width = rgb.cols() as u32;
    let img_height = rgb.rows() as u32;
    let data = rgb
        .data_bytes()
        .map_err(|e| format!("Error reading pixels: {}", e))?
        .to_vec();
    let original_img = RgbImage::from_raw(img_width, img_height, data)
        .ok_or_else(|| "pixel buffer does not match frame size".to_string())?;

    let img = DynamicImage::ImageRgb8(original_img).resize_exact(
        input_size,
        input_size,
        FilterType::CatmullRom,
    );

    let side = input_size as usize;
    let mut input = Array::zeros((1, 3, side, side));
    for pixel in img.pixels() {
        let x = pixel.0 as _;
        let y = pixel.1 as _;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    Ok((input, img_height, img_width))
}

/// Decodes a `[1, 4 + classes, anchors]` YOLO head into frame-space
/// detections, suppressing same-class overlaps above `iou_threshold`.
fn decode_output(
    output: ArrayViewD<f32>,
    min_probability: f32,
    iou_threshold: f32,
    input_size: u32,
    img_width: u32,
    img_height: u32,
) -> Result<Vec<Detection>, ModelServiceError> {
    if output.ndim() != 3 || output.shape()[1] <= 4 {
        return Err(ModelServiceError::Inference(format!(
            "unexpected output shape {:?}, want [1, 4 + classes, anchors]",
            output.shape()
        )));
    }

    let scale_x = img_width as f32 / input_size as f32;
    let scale_y = img_height as f32 / input_size as f32;

    let output = output.t();
    let output = output.slice(s![.., .., 0]);

    let mut boxes = Vec::new();
    for row in output.axis_iter(Axis(0)) {
        let row: Vec<_> = row.iter().copied().collect();
        let Some((class_id, prob)) = row
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
        else {
            continue;
        };

        if prob < min_probability {
            continue;
        }

        let xc = row[0] * scale_x;
        let yc = row[1] * scale_y;
        let w = row[2] * scale_x;
        let h = row[3] * scale_y;

        boxes.push(Candidate {
            class_id,
            confidence: prob,
            x1: xc - w / 2.,
            y1: yc - h / 2.,
            x2: xc + w / 2.,
            y2: yc + h / 2.,
        });
    }

    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));
    let mut kept = Vec::new();

    while !boxes.is_empty() {
        let best = boxes.remove(0);
        kept.push(best);
        boxes.retain(|other| {
            other.class_id != best.class_id
                || intersection(&best, other) / union(&best, other) < iou_threshold
        });
    }

    let max_x = img_width as f32;
    let max_y = img_height as f32;
    let detections = kept
        .into_iter()
        .filter_map(|c| {
            let bbox = BoundingBox::new(
                c.x1.clamp(0., max_x) as i32,
                c.y1.clamp(0., max_y) as i32,
                c.x2.clamp(0., max_x) as i32,
                c.y2.clamp(0., max_y) as i32,
            )?;
            Some(Detection {
                class_id: c.class_id,
                confidence: c.confidence,
                bbox,
            })
        })
        .collect();
    Ok(detections)
}

pub struct OrtModelService {
    session: Session,
    device: ComputeDevice,
    min_probability: f32,
    iou_threshold: f32,
    input_size: u32,
}

impl OrtModelService {
    fn run_inference(
        &mut self,
        input: &Array<f32, Ix4>,
    ) -> Result<ndarray::ArrayD<f32>, ModelServiceError> {
        let tensor_ref = TensorRef::from_array_view(input.view()).map_err(|e| {
            ModelServiceError::Inference(format!("failed to build tensor: {}", e))
        })?;

        let outputs = self
            .session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelServiceError::Inference(e.to_string()))?;

        let output = outputs.get(OUTPUT_NAME).ok_or_else(|| {
            ModelServiceError::Inference(format!("model has no `{}` output", OUTPUT_NAME))
        })?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                ModelServiceError::Inference(format!("failed to extract tensor: {}", e))
            })?;

        let ix = shape.to_ixdyn();
        ndarray::ArrayD::from_shape_vec(ix, data.to_vec())
            .map_err(|e| ModelServiceError::Inference(format!("invalid tensor shape: {}", e)))
    }
}

impl ModelService for OrtModelService {
    fn load(model_config: &ModelConfig) -> Result<Self, ModelServiceError> {
        let path = model_config.get_path();
        if !path.exists() {
            return Err(ModelServiceError::ModelNotFound(path));
        }
        model_config
            .check_thresholds()
            .map_err(ModelServiceError::InvalidConfig)?;

        let cuda = CUDAExecutionProvider::default();
        let device = if !model_config.force_cpu && cuda.is_available().unwrap_or(false) {
            ComputeDevice::Accelerated
        } else {
            ComputeDevice::General
        };

        let mut builder = Session::builder()
            .map_err(|e| ModelServiceError::LoadFailed(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelServiceError::LoadFailed(e.to_string()))?;
        if device == ComputeDevice::Accelerated {
            builder = builder
                .with_execution_providers([cuda.build()])
                .map_err(|e| ModelServiceError::LoadFailed(e.to_string()))?;
        }
        let session = builder
            .commit_from_file(&path)
            .map_err(|e| ModelServiceError::LoadFailed(e.to_string()))?;

        tracing::info!("Loaded ONNX model {:?} on {}", path, device.as_str());

        Ok(Self {
            session,
            device,
            min_probability: model_config.min_probability,
            iou_threshold: model_config.iou_threshold,
            input_size: model_config.input_size,
        })
    }

    fn device(&self) -> ComputeDevice {
        self.device
    }

    fn predict(&mut self, frame: &Mat) -> Result<DetectionSet, ModelServiceError> {
        let (input, img_height, img_width) =
            transform_frame(frame, self.input_size).map_err(ModelServiceError::Preprocess)?;

        let outputs = self.run_inference(&input)?;

        let detections = decode_output(
            outputs.view(),
            self.min_probability,
            self.iou_threshold,
            self.input_size,
            img_width,
            img_height,
        )?;

        Ok(DetectionSet::from(detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use opencv::core::{Scalar, CV_8UC3};

    /// Builds a `[1, 4 + classes, anchors]` head from per-anchor rows.
    fn head(rows: &[[f32; 6]]) -> ndarray::ArrayD<f32> {
        let mut out = Array3::<f32>::zeros((1, 6, rows.len()));
        for (anchor, row) in rows.iter().enumerate() {
            for (channel, value) in row.iter().enumerate() {
                out[[0, channel, anchor]] = *value;
            }
        }
        out.into_dyn()
    }

    #[test]
    fn test_transform_frame() {
        let frame =
            Mat::new_rows_cols_with_default(100, 120, CV_8UC3, Scalar::new(0., 0., 255., 0.))
                .unwrap();

        let (input, img_height, img_width) = transform_frame(&frame, 640).unwrap();

        assert_eq!(input.shape(), &[1, 3, 640, 640]);
        assert_eq!(img_width, 120);
        assert_eq!(img_height, 100);
        // BGR red becomes RGB channel 0
        assert!((input[[0, 0, 10, 10]] - 1.0).abs() < 1e-3);
        assert!(input[[0, 2, 10, 10]].abs() < 1e-3);
    }

    #[test]
    fn test_transform_empty_frame_fails() {
        assert!(transform_frame(&Mat::default(), 640).is_err());
    }

    #[test]
    fn test_decode_scales_to_frame() {
        let output = head(&[[320., 320., 64., 32., 0.1, 0.9]]);

        let detections = decode_output(output.view(), 0.25, 0.7, 640, 1280, 640).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 1);
        assert_eq!(
            detections[0].bbox,
            BoundingBox {
                x1: 576,
                y1: 304,
                x2: 704,
                y2: 336
            }
        );
    }

    #[test]
    fn test_decode_drops_low_probability() {
        let output = head(&[[320., 320., 64., 64., 0.1, 0.2]]);

        assert!(decode_output(output.view(), 0.25, 0.7, 640, 640, 640)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_decode_suppresses_same_class_overlap_only() {
        let output = head(&[
            [100., 100., 50., 50., 0.9, 0.0],
            [102., 102., 50., 50., 0.8, 0.0],
            [102., 102., 50., 50., 0.0, 0.7],
        ]);

        let detections = decode_output(output.view(), 0.25, 0.7, 640, 640, 640).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_id, 0);
        assert!((detections[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(detections[1].class_id, 1);
    }

    #[test]
    fn test_decode_clips_to_frame() {
        let output = head(&[[0., 0., 40., 40., 0.9, 0.0]]);

        let detections = decode_output(output.view(), 0.25, 0.7, 640, 640, 640).unwrap();

        assert_eq!(detections[0].bbox.x1, 0);
        assert_eq!(detections[0].bbox.y1, 0);
        assert_eq!(detections[0].bbox.x2, 20);
    }

    #[test]
    fn test_decode_terminates_with_iou_threshold_above_one() {
        let output = head(&[
            [100., 100., 10., 10., 0.9, 0.0],
            [100., 100., 10., 10., 0.8, 0.0],
        ]);

        let detections = decode_output(output.view(), 0.25, 1.5, 640, 640, 640).unwrap();

        // nothing reaches an IoU of 1.5, so both boxes are kept exactly once
        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn test_decode_rejects_rank_two_output() {
        let output = ndarray::Array2::<f32>::zeros((1, 6)).into_dyn();

        assert!(matches!(
            decode_output(output.view(), 0.25, 0.7, 640, 640, 640),
            Err(ModelServiceError::Inference(_))
        ));
    }

    #[test]
    fn test_decode_rejects_output_without_class_scores() {
        let output = Array3::<f32>::zeros((1, 4, 8)).into_dyn();

        assert!(decode_output(output.view(), 0.25, 0.7, 640, 640, 640).is_err());
    }
}
