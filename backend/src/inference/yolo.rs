//! Pre- and post-processing for YOLO-style single-stage detectors.
//!
//! The network sees a square letterboxed copy of the input and emits one
//! column per anchor: `cx, cy, w, h` followed by one score per class.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::ArrayView2;

use super::{BoundingBox, InferenceError, RawDetection};

const PAD_VALUE: u8 = 114;

#[derive(Debug, Clone, Copy)]
pub struct YoloDecoder {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

/// Geometry of a letterbox resize, used to map boxes back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    pub fn restore(&self, bbox: BoundingBox) -> BoundingBox {
        let max_x = self.source_width as f32;
        let max_y = self.source_height as f32;
        BoundingBox {
            x1: ((bbox.x1 - self.pad_x) / self.scale).clamp(0.0, max_x),
            y1: ((bbox.y1 - self.pad_y) / self.scale).clamp(0.0, max_y),
            x2: ((bbox.x2 - self.pad_x) / self.scale).clamp(0.0, max_x),
            y2: ((bbox.y2 - self.pad_y) / self.scale).clamp(0.0, max_y),
        }
    }
}

/// Fits `image` into a `size` x `size` square keeping the aspect ratio;
/// the remainder is padded with gray.
pub fn letterbox(image: &RgbImage, size: u32) -> Result<(RgbImage, Letterbox), InferenceError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(InferenceError::Preprocessing("image has no pixels".to_string()));
    }

    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let resized_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let resized_height = ((height as f32 * scale).round() as u32).clamp(1, size);
    let resized = imageops::resize(image, resized_width, resized_height, FilterType::Triangle);

    let pad_x = (size - resized_width) / 2;
    let pad_y = (size - resized_height) / 2;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    Ok((
        canvas,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            source_width: width,
            source_height: height,
        },
    ))
}

impl YoloDecoder {
    /// Decodes a raw output tensor. `shape` is `[1, 4 + classes, anchors]`
    /// or its transpose, with or without the batch axis.
    pub fn decode(
        &self,
        output: &[f32],
        shape: &[usize],
        letterbox: &Letterbox,
    ) -> Result<Vec<RawDetection>, InferenceError> {
        let (rows, cols) = match shape {
            [1, rows, cols] | [rows, cols] => (*rows, *cols),
            other => {
                return Err(InferenceError::OutputShape(format!(
                    "expected [1, C, N] or [C, N], got {:?}",
                    other
                )));
            }
        };

        let grid = ArrayView2::from_shape((rows, cols), output)
            .map_err(|e| InferenceError::OutputShape(e.to_string()))?;
        // Anchors outnumber attributes; put attributes on the first axis.
        let grid = if rows > cols { grid.reversed_axes() } else { grid };
        if grid.nrows() < 5 {
            return Err(InferenceError::OutputShape(format!(
                "need at least 5 attributes per anchor, got {}",
                grid.nrows()
            )));
        }

        let mut candidates = Vec::new();
        for anchor in grid.columns() {
            let Some((class_index, confidence)) = anchor
                .iter()
                .skip(4)
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(&b.1))
            else {
                continue;
            };
            if confidence < self.confidence_threshold {
                continue;
            }

            let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
            let bbox = letterbox.restore(BoundingBox {
                x1: cx - w / 2.0,
                y1: cy - h / 2.0,
                x2: cx + w / 2.0,
                y2: cy + h / 2.0,
            });
            if bbox.area() <= 0.0 {
                continue;
            }
            candidates.push(RawDetection {
                bbox,
                confidence,
                class_index,
            });
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

/// Class-wise greedy NMS; output is sorted by descending confidence.
pub fn non_max_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept.iter().any(|k| {
            k.class_index == candidate.class_index && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::testing::raw;

    fn decoder() -> YoloDecoder {
        YoloDecoder {
            input_size: 640,
            confidence_threshold: 0.5,
            iou_threshold: 0.7,
        }
    }

    fn identity() -> Letterbox {
        Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            source_width: 640,
            source_height: 640,
        }
    }

    /// Builds a `[1, 4 + classes, anchors]` buffer from per-anchor rows,
    /// padded with empty anchors so anchors outnumber attributes.
    fn grid(anchors: &[[f32; 6]]) -> (Vec<f32>, Vec<usize>) {
        let attributes = 6;
        let count = anchors.len().max(8);
        let mut data = vec![0.0; attributes * count];
        for (a, anchor) in anchors.iter().enumerate() {
            for (row, value) in anchor.iter().enumerate() {
                data[row * count + a] = *value;
            }
        }
        (data, vec![1, attributes, count])
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let image = RgbImage::new(200, 100);
        let (boxed, geometry) = letterbox(&image, 640).unwrap();
        assert_eq!(boxed.dimensions(), (640, 640));
        assert_eq!(geometry.scale, 3.2);
        assert_eq!(geometry.pad_x, 0.0);
        assert_eq!(geometry.pad_y, 160.0);
        assert_eq!(boxed.get_pixel(0, 0), &Rgb([PAD_VALUE; 3]));
        assert_eq!(boxed.get_pixel(320, 320), &Rgb([0, 0, 0]));
    }

    #[test]
    fn restore_maps_back_to_source_pixels() {
        let image = RgbImage::new(200, 100);
        let (_, geometry) = letterbox(&image, 640).unwrap();
        let restored = geometry.restore(BoundingBox {
            x1: 32.0,
            y1: 192.0,
            x2: 64.0,
            y2: 224.0,
        });
        assert!((restored.x1 - 10.0).abs() < 1e-4);
        assert!((restored.y1 - 10.0).abs() < 1e-4);
        assert!((restored.x2 - 20.0).abs() < 1e-4);
        assert!((restored.y2 - 20.0).abs() < 1e-4);
    }

    #[test]
    fn decode_filters_by_confidence_and_picks_best_class() {
        let (data, shape) = grid(&[
            [100.0, 100.0, 20.0, 20.0, 0.2, 0.9],
            [300.0, 300.0, 10.0, 10.0, 0.3, 0.1],
        ]);
        let detections = decoder().decode(&data, &shape, &identity()).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_index, 1);
        assert_eq!(detections[0].confidence, 0.9);
        assert_eq!(detections[0].bbox.center(), (100.0, 100.0));
    }

    #[test]
    fn decode_accepts_transposed_output() {
        let anchors = [[50.0, 60.0, 10.0, 10.0, 0.8, 0.1]];
        let data: Vec<f32> = anchors.iter().flatten().copied().collect();
        let padded: Vec<f32> = data.iter().copied().cycle().take(6 * 8).collect();
        let detections = decoder().decode(&padded, &[1, 8, 6], &identity()).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_index, 0);
    }

    #[test]
    fn decode_rejects_bad_shapes() {
        assert!(decoder().decode(&[0.0; 8], &[2, 2, 2], &identity()).is_err());
        assert!(decoder().decode(&[0.0; 6], &[1, 3, 2], &identity()).is_err());
    }

    #[test]
    fn nms_keeps_best_overlapping_box_per_class() {
        let kept = non_max_suppression(
            vec![
                raw(0.0, 0.0, 10.0, 10.0, 0.6, 0),
                raw(1.0, 1.0, 10.0, 10.0, 0.9, 0),
                raw(1.0, 1.0, 10.0, 10.0, 0.7, 1),
                raw(50.0, 50.0, 60.0, 60.0, 0.55, 0),
            ],
            0.5,
        );
        let confidences: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7, 0.55]);
    }
}
