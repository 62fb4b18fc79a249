use image::RgbImage;
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, ColorBits, ColorSpace, Image, ImageFilter, ImageTransform, ImageXObject,
    IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Point,
    Polygon, Px, Rgb,
};
use std::io::Cursor;

use super::RenderError;
use super::layout::{
    Block, GlyphMetrics, IMAGE_DPI, MM_PER_INCH, Op, PageTemplate, PlannedPage, text_width,
};
use crate::inference::annotate::encode_jpeg;

const LAYER: &str = "Contenido";
const FOOTER_SIZE: f32 = 8.0;
const RULE_THICKNESS: f32 = 0.5;
const JPEG_QUALITY: u8 = 85;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Builtin fonts only cover ASCII reliably.
    unicode: bool,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference, external: Option<&[u8]>) -> Result<Self, RenderError> {
        if let Some(bytes) = external {
            let font = doc
                .add_external_font(Cursor::new(bytes.to_vec()))
                .map_err(|e| RenderError::Font(format!("{:?}", e)))?;
            return Ok(Self {
                regular: font.clone(),
                bold: font,
                unicode: true,
            });
        }
        let builtin = |font| {
            doc.add_builtin_font(font)
                .map_err(|e| RenderError::Font(format!("{:?}", e)))
        };
        Ok(Self {
            regular: builtin(BuiltinFont::Helvetica)?,
            bold: builtin(BuiltinFont::HelveticaBold)?,
            unicode: false,
        })
    }

    fn pick(&self, bold: bool) -> &IndirectFontRef {
        if bold { &self.bold } else { &self.regular }
    }

    fn prepare(&self, text: &str) -> String {
        if self.unicode {
            text.to_string()
        } else {
            fold_ascii(text)
        }
    }
}

/// Replaces accented Latin letters and common typographic symbols with
/// ASCII look-alikes; anything else outside ASCII becomes `?`.
pub fn fold_ascii(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Á' | 'À' | 'Â' | 'Ä' => 'A',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'Ó' | 'Ò' | 'Ô' | 'Ö' => 'O',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ñ' => 'n',
            'Ñ' => 'N',
            'ç' => 'c',
            'Ç' => 'C',
            '•' => '-',
            '¿' | '¡' => ' ',
            '–' | '—' => '-',
            c if c.is_ascii() => c,
            _ => '?',
        })
        .collect()
}

fn black() -> Color {
    rgb([0.0, 0.0, 0.0])
}

fn rgb([r, g, b]: [f32; 3]) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

fn point(template: &PageTemplate, x: f32, y: f32) -> (Point, bool) {
    (Point::new(Mm(x), Mm(template.height - y)), false)
}

/// JPEG-compressed image object, decoded by the viewer through `DCTDecode`.
pub fn jpeg_object(image: &RgbImage) -> Result<ImageXObject, RenderError> {
    let data = encode_jpeg(image, JPEG_QUALITY).map_err(|e| RenderError::Image(e.to_string()))?;
    Ok(ImageXObject {
        width: Px(image.width() as usize),
        height: Px(image.height() as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: true,
        image_data: data,
        image_filter: Some(ImageFilter::DCT),
        smask: None,
        clipping_bbox: None,
    })
}

fn place_image(
    layer: &PdfLayerReference,
    image: &ImageXObject,
    template: &PageTemplate,
    (x, y): (f32, f32),
    (width, height): (f32, f32),
) {
    let to_mm = |px: Px| px.0 as f32 * MM_PER_INCH / IMAGE_DPI;
    let (natural_width, natural_height) = (to_mm(image.width), to_mm(image.height));
    if natural_width <= 0.0 || natural_height <= 0.0 {
        return;
    }
    Image::from(image.clone()).add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(x)),
            translate_y: Some(Mm(template.height - y - height)),
            scale_x: Some(width / natural_width),
            scale_y: Some(height / natural_height),
            dpi: Some(IMAGE_DPI),
            ..Default::default()
        },
    );
}

fn draw_watermark(layer: &PdfLayerReference, watermark: &ImageXObject, template: &PageTemplate) {
    if watermark.width.0 == 0 || watermark.height.0 == 0 {
        return;
    }
    let width = template.width;
    let height = width * watermark.height.0 as f32 / watermark.width.0 as f32;
    let y = (template.height - height) / 2.0;
    place_image(layer, watermark, template, (0.0, y), (width, height));
}

fn block_image(block: &Block) -> Result<ImageXObject, RenderError> {
    match block {
        Block::Image {
            pixels,
            width_px,
            height_px,
            ..
        } => {
            let image = RgbImage::from_raw(*width_px, *height_px, pixels.clone()).ok_or_else(|| {
                RenderError::Image("pixel buffer does not match image size".to_string())
            })?;
            jpeg_object(&image)
        }
        _ => Err(RenderError::Image("layout referenced a non-image block".to_string())),
    }
}

pub fn paint(
    title: &str,
    blocks: &[Block],
    pages: &[PlannedPage],
    template: &PageTemplate,
    font: Option<&[u8]>,
    metrics: &dyn GlyphMetrics,
    watermark: Option<&ImageXObject>,
) -> Result<Vec<u8>, RenderError> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(template.width), Mm(template.height), LAYER);
    let fonts = Fonts::load(&doc, font)?;
    let total = pages.len();

    for (index, page) in pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page_index, layer_index) =
                doc.add_page(Mm(template.width), Mm(template.height), LAYER);
            doc.get_page(page_index).get_layer(layer_index)
        };

        if let Some(watermark) = watermark {
            draw_watermark(&layer, watermark, template);
        }
        layer.set_fill_color(black());
        layer.set_outline_color(black());
        layer.set_outline_thickness(RULE_THICKNESS);

        for op in &page.ops {
            match op {
                Op::Text {
                    x,
                    y,
                    size,
                    bold,
                    text,
                } => layer.use_text(
                    fonts.prepare(text),
                    *size,
                    Mm(*x),
                    Mm(template.height - y),
                    fonts.pick(*bold),
                ),
                Op::Rule { x1, y1, x2, y2 } => layer.add_line(Line {
                    points: vec![point(template, *x1, *y1), point(template, *x2, *y2)],
                    is_closed: false,
                }),
                Op::Image {
                    block,
                    x,
                    y,
                    width,
                    height,
                } => {
                    let source = blocks.get(*block).ok_or_else(|| {
                        RenderError::Image(format!("layout referenced missing block {}", block))
                    })?;
                    let image = block_image(source)?;
                    place_image(&layer, &image, template, (*x, *y), (*width, *height));
                }
                Op::Wedge { points, color } => {
                    layer.set_fill_color(rgb(*color));
                    layer.add_polygon(Polygon {
                        rings: vec![points.iter().map(|(x, y)| point(template, *x, *y)).collect()],
                        mode: PaintMode::FillStroke,
                        winding_order: WindingOrder::NonZero,
                    });
                    layer.set_fill_color(black());
                }
            }
        }

        let footer = format!("Página {} de {}", index + 1, total);
        let footer_x = (template.width - text_width(&footer, FOOTER_SIZE, metrics)) / 2.0;
        layer.use_text(
            fonts.prepare(&footer),
            FOOTER_SIZE,
            Mm(footer_x),
            Mm(template.margin / 2.0),
            fonts.pick(false),
        );
    }

    doc.save_to_bytes()
        .map_err(|e| RenderError::Pdf(format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_are_embedded_as_jpeg() {
        let image = RgbImage::from_fn(64, 32, |x, y| image::Rgb([x as u8 * 4, y as u8 * 8, 90]));
        let object = jpeg_object(&image).unwrap();
        assert_eq!((object.width.0, object.height.0), (64, 32));
        assert!(matches!(object.image_filter, Some(ImageFilter::DCT)));
        assert_eq!(&object.image_data[..2], &[0xFF, 0xD8]);
        assert!(object.image_data.len() < 64 * 32 * 3);
    }

    #[test]
    fn folding_keeps_spanish_readable() {
        assert_eq!(fold_ascii("Acné Noduloquístico"), "Acne Noduloquistico");
        assert_eq!(fold_ascii("• Página ñ ¿sí?"), "- Pagina n  si?");
        assert_eq!(fold_ascii("日"), "?");
    }
}
