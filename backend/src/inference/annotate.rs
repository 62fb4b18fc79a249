use ab_glyph::{FontVec, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use super::Detection;

const BOX_COLOR: Rgb<u8> = Rgb([221, 160, 221]);
const CENTER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const STROKE: i32 = 2;
const CENTER_RADIUS: i32 = 5;
const LABEL_SCALE: f32 = 16.0;
pub const JPEG_QUALITY: u8 = 95;

/// Draws detections onto copies of the input; output keeps the input size.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    /// Box outline per detection, plus a `class: confidence` label when a
    /// font is available.
    pub fn draw_boxes(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();
        for detection in detections {
            let x = detection.bbox.x1.round() as i32;
            let y = detection.bbox.y1.round() as i32;
            let width = detection.bbox.width().round() as i32;
            let height = detection.bbox.height().round() as i32;
            for inset in 0..STROKE {
                let w = width - 2 * inset;
                let h = height - 2 * inset;
                if w <= 0 || h <= 0 {
                    break;
                }
                let rect = Rect::at(x + inset, y + inset).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
            }

            if let Some(font) = &self.font {
                let label = format!("{}: {:.2}", detection.model_class, detection.confidence);
                let label_y = (y - LABEL_SCALE as i32 - 2).max(0);
                draw_text_mut(
                    &mut canvas,
                    BOX_COLOR,
                    x,
                    label_y,
                    PxScale::from(LABEL_SCALE),
                    font,
                    &label,
                );
            }
        }
        canvas
    }

    /// Circle around each detection center.
    pub fn mark_centers(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();
        for detection in detections {
            let center = (
                detection.center.0.round() as i32,
                detection.center.1.round() as i32,
            );
            for offset in 0..STROKE {
                draw_hollow_circle_mut(&mut canvas, center, CENTER_RADIUS - offset, CENTER_COLOR);
            }
        }
        canvas
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(image)?;
    Ok(buffer)
}

#[cfg(test)]
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, ImageError> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buffer, image::ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::testing::detection;
    use crate::inference::BoundingBox;

    #[test]
    fn boxes_are_drawn_without_resizing() {
        let image = RgbImage::from_pixel(64, 48, Rgb([0, 0, 0]));
        let mut lesion = detection("papules", 0.9);
        lesion.bbox = BoundingBox {
            x1: 4.0,
            y1: 4.0,
            x2: 20.0,
            y2: 20.0,
        };
        let annotated = Annotator::new(None).draw_boxes(&image, &[lesion]);
        assert_eq!(annotated.dimensions(), (64, 48));
        assert_eq!(annotated.get_pixel(4, 10), &BOX_COLOR);
        assert_eq!(annotated.get_pixel(5, 10), &BOX_COLOR);
        assert_eq!(annotated.get_pixel(12, 12), &Rgb([0, 0, 0]));
    }

    #[test]
    fn degenerate_boxes_are_skipped() {
        let image = RgbImage::new(16, 16);
        let mut lesion = detection("papules", 0.9);
        lesion.bbox = BoundingBox {
            x1: 3.0,
            y1: 3.0,
            x2: 3.0,
            y2: 9.0,
        };
        let annotated = Annotator::new(None).draw_boxes(&image, &[lesion]);
        assert_eq!(annotated, image);
    }

    #[test]
    fn centers_are_circled() {
        let image = RgbImage::new(40, 40);
        let mut lesion = detection("papules", 0.9);
        lesion.center = (20.0, 20.0);
        let annotated = Annotator::new(None).mark_centers(&image, &[lesion]);
        assert_eq!(annotated.get_pixel(25, 20), &CENTER_COLOR);
        assert_eq!(annotated.get_pixel(20, 20), &Rgb([0, 0, 0]));
    }

    #[test]
    fn encoded_images_decode_to_the_same_size() {
        let image = RgbImage::from_pixel(33, 17, Rgb([10, 200, 30]));
        let jpeg = encode_jpeg(&image, JPEG_QUALITY).unwrap();
        let png = encode_png(&image).unwrap();
        assert_eq!(image::load_from_memory(&jpeg).unwrap().to_rgb8().dimensions(), (33, 17));
        assert_eq!(image::load_from_memory(&png).unwrap().to_rgb8(), image);
    }
}
