//! Paginated PDF report for a single analysis.

pub mod content;
pub mod layout;
pub mod pdf;

use ab_glyph::FontVec;
use chrono::NaiveDate;
use image::{Rgb, RgbImage, RgbaImage};
use printpdf::ImageXObject;
use shared::PatientInfo;
use std::path::Path;

use crate::analysis::classes::{AcneType, Severity};
use crate::analysis::factors::FactorSet;
use crate::analysis::scorer::ClassScores;
use crate::inference::Detection;
use layout::{AverageGlyph, GlyphMetrics, PageTemplate};

const DOCUMENT_TITLE: &str = "Informe de Análisis de Acné";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Font error: {0}")]
    Font(String),
    #[error("Report image error: {0}")]
    Image(String),
    #[error("PDF error: {0}")]
    Pdf(String),
}

/// Everything the report shows about one analysis.
pub struct Report<'a> {
    pub patient: &'a PatientInfo,
    pub annotated: &'a RgbImage,
    pub scores: &'a ClassScores,
    pub acne_type: AcneType,
    pub severity: Severity,
    pub recommendations: &'a [String],
    pub detections: &'a [Detection],
    pub factors: &'a FactorSet,
    pub date: NaiveDate,
}

/// Optional font and watermark, resolved once at startup. Assets that are
/// missing or unreadable are dropped with a warning.
#[derive(Default)]
pub struct ReportAssets {
    font: Option<Vec<u8>>,
    watermark: Option<ImageXObject>,
}

/// Composites transparent pixels onto white paper.
fn flatten(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

impl ReportAssets {
    pub fn load(font_path: Option<&Path>, watermark_path: Option<&Path>) -> Self {
        let font = font_path.and_then(|path| match std::fs::read(path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes.clone()) {
                Ok(_) => Some(bytes),
                Err(e) => {
                    log::warn!("Ignoring report font {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Report font {} not readable: {}", path.display(), e);
                None
            }
        });

        let watermark = watermark_path.and_then(|path| {
            let loaded = image::open(path)
                .map_err(|e| e.to_string())
                .and_then(|image| {
                    pdf::jpeg_object(&flatten(&image.to_rgba8())).map_err(|e| e.to_string())
                });
            match loaded {
                Ok(object) => Some(object),
                Err(e) => {
                    log::warn!("Ignoring report watermark {}: {}", path.display(), e);
                    None
                }
            }
        });

        Self { font, watermark }
    }

    /// A fresh font handle for drawing labels on images.
    pub fn label_font(&self) -> Option<FontVec> {
        self.font
            .as_ref()
            .and_then(|bytes| FontVec::try_from_vec(bytes.clone()).ok())
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn has_watermark(&self) -> bool {
        self.watermark.is_some()
    }
}

pub struct ReportRenderer {
    assets: ReportAssets,
    metrics: Box<dyn GlyphMetrics>,
    template: PageTemplate,
}

impl ReportRenderer {
    /// Text is measured with the report font when there is one.
    pub fn new(assets: ReportAssets) -> Self {
        let metrics: Box<dyn GlyphMetrics> = match assets.label_font() {
            Some(font) => Box::new(font),
            None => Box::new(AverageGlyph),
        };
        Self {
            assets,
            metrics,
            template: PageTemplate::letter(),
        }
    }

    /// Lays out and paints the report; returns the PDF bytes.
    pub fn render(&self, report: &Report<'_>) -> Result<Vec<u8>, RenderError> {
        let blocks = content::build_document(report);
        let pages = layout::plan(&blocks, &self.template, self.metrics.as_ref());
        pdf::paint(
            DOCUMENT_TITLE,
            &blocks,
            &pages,
            &self.template,
            self.assets.font.as_deref(),
            self.metrics.as_ref(),
            self.assets.watermark.as_ref(),
        )
    }
}
