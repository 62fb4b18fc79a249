//! Flow layout for report content.
//!
//! Blocks are planned onto pages first (pure geometry, in millimetres from
//! the top-left corner) and painted afterwards, so pagination can be tested
//! without producing a PDF.

use ab_glyph::{Font, FontVec};

pub const MM_PER_INCH: f32 = 25.4;
const PT_TO_MM: f32 = MM_PER_INCH / 72.0;
/// Resolution images are prepared for and placed at.
pub const IMAGE_DPI: f32 = 300.0;
const LINE_SPACING: f32 = 1.3;
const CELL_PADDING: f32 = 1.8;
const BULLET_INDENT: f32 = 5.0;
const PIE_LABEL_SIZE: f32 = 8.0;
const PIE_LABEL_RADIUS: f32 = 1.2;
/// Largest angle covered by one straight segment of a pie arc.
const ARC_STEP_DEG: f32 = 5.0;
const PIE_COLORS: [[f32; 3]; 6] = [
    [0.27, 0.51, 0.71],
    [0.94, 0.50, 0.50],
    [0.56, 0.74, 0.56],
    [0.96, 0.76, 0.36],
    [0.58, 0.44, 0.86],
    [0.50, 0.50, 0.50],
];

/// Horizontal advance of single characters, in ems.
pub trait GlyphMetrics: Send + Sync {
    fn advance(&self, c: char) -> f32;
}

/// Flat estimate for the builtin sans faces.
pub struct AverageGlyph;

impl GlyphMetrics for AverageGlyph {
    fn advance(&self, _c: char) -> f32 {
        0.5
    }
}

impl GlyphMetrics for FontVec {
    fn advance(&self, c: char) -> f32 {
        let units = self.units_per_em().unwrap_or(1000.0);
        self.h_advance_unscaled(self.glyph_id(c)) / units
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTemplate {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl PageTemplate {
    /// US Letter with one-inch margins.
    pub fn letter() -> Self {
        Self {
            width: 215.9,
            height: 279.4,
            margin: 25.4,
        }
    }

    pub fn content_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    fn bottom(&self) -> f32 {
        self.height - self.margin
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Heading1(String),
    Heading2(String),
    Paragraph(String),
    Bullet(String),
    Table {
        widths: Vec<f32>,
        rows: Vec<Vec<String>>,
        header: bool,
    },
    /// Raw RGB8 pixels, drawn centred at `max_width` or less.
    Image {
        pixels: Vec<u8>,
        width_px: u32,
        height_px: u32,
        max_width: f32,
    },
    /// Labelled pie chart centred in a box of `height`. Slices that are not
    /// positive are left out.
    Pie {
        slices: Vec<(String, f64)>,
        diameter: f32,
        height: f32,
    },
    Spacer(f32),
    PageBreak,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// `y` is the baseline.
    Text {
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        text: String,
    },
    Rule {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
    /// `block` indexes the source block; `y` is the top edge.
    Image {
        block: usize,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    /// Closed filled outline.
    Wedge {
        points: Vec<(f32, f32)>,
        color: [f32; 3],
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlannedPage {
    pub ops: Vec<Op>,
}

struct TextStyle {
    size: f32,
    bold: bool,
    centered: bool,
    space_after: f32,
}

const TITLE: TextStyle = TextStyle {
    size: 24.0,
    bold: true,
    centered: true,
    space_after: 4.0,
};
const HEADING1: TextStyle = TextStyle {
    size: 16.0,
    bold: true,
    centered: false,
    space_after: 3.0,
};
const HEADING2: TextStyle = TextStyle {
    size: 13.0,
    bold: true,
    centered: false,
    space_after: 2.0,
};
const BODY: TextStyle = TextStyle {
    size: 10.0,
    bold: false,
    centered: false,
    space_after: 2.0,
};
const TABLE_TEXT: f32 = 10.0;

pub fn text_width(text: &str, size: f32, metrics: &dyn GlyphMetrics) -> f32 {
    text.chars().map(|c| metrics.advance(c)).sum::<f32>() * size * PT_TO_MM
}

fn line_height(size: f32) -> f32 {
    size * LINE_SPACING * PT_TO_MM
}

/// Greedy word wrap. Words wider than the line are split by characters.
pub fn wrap(text: &str, size: f32, max_width: f32, metrics: &dyn GlyphMetrics) -> Vec<String> {
    let width = |text: &str| text_width(text, size, metrics);
    let fits = |text: &str| width(text) <= max_width + 1e-3;
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if fits(&candidate) {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        for c in word.chars() {
            current.push(c);
            if !fits(&current) && current.chars().count() > 1 {
                current.pop();
                lines.push(std::mem::replace(&mut current, c.to_string()));
            }
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Points along a circular arc, `start` and `sweep` in degrees,
/// counter-clockwise positive, on a y-down page.
fn arc(center: (f32, f32), radius: f32, start: f32, sweep: f32) -> Vec<(f32, f32)> {
    let steps = ((sweep.abs() / ARC_STEP_DEG).ceil() as usize).max(1);
    (0..=steps)
        .map(|i| {
            let angle = (start + sweep * i as f32 / steps as f32).to_radians();
            (center.0 + radius * angle.cos(), center.1 - radius * angle.sin())
        })
        .collect()
}

struct Planner<'a> {
    template: &'a PageTemplate,
    metrics: &'a dyn GlyphMetrics,
    pages: Vec<PlannedPage>,
    y: f32,
}

impl<'a> Planner<'a> {
    fn new(template: &'a PageTemplate, metrics: &'a dyn GlyphMetrics) -> Self {
        Self {
            template,
            metrics,
            pages: vec![PlannedPage::default()],
            y: template.margin,
        }
    }

    fn page(&mut self) -> &mut PlannedPage {
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn at_top(&self) -> bool {
        self.y <= self.template.margin
    }

    fn new_page(&mut self) {
        self.pages.push(PlannedPage::default());
        self.y = self.template.margin;
    }

    /// Starts a new page unless `height` fits below the cursor. A block
    /// taller than a whole page is placed at the top and allowed to overflow.
    fn reserve(&mut self, height: f32) {
        if self.y + height > self.template.bottom() && !self.at_top() {
            self.new_page();
        }
    }

    fn text(&mut self, text: &str, style: &TextStyle, indent: f32) {
        let left = self.template.margin + indent;
        let width = self.template.content_width() - indent;
        let step = line_height(style.size);
        for line in wrap(text, style.size, width, self.metrics) {
            self.reserve(step);
            let x = if style.centered {
                left + ((width - text_width(&line, style.size, self.metrics)) / 2.0).max(0.0)
            } else {
                left
            };
            let baseline = self.y + style.size * PT_TO_MM;
            self.page().ops.push(Op::Text {
                x,
                y: baseline,
                size: style.size,
                bold: style.bold,
                text: line,
            });
            self.y += step;
        }
        self.y += style.space_after;
    }

    fn table(&mut self, widths: &[f32], rows: &[Vec<String>], header: bool) {
        let step = line_height(TABLE_TEXT);
        let left = self.template.margin;
        let right = left + widths.iter().sum::<f32>();

        for (index, row) in rows.iter().enumerate() {
            let bold = header && index == 0;
            let cells: Vec<Vec<String>> = widths
                .iter()
                .enumerate()
                .map(|(col, width)| {
                    let text = row.get(col).map(String::as_str).unwrap_or("");
                    wrap(text, TABLE_TEXT, width - 2.0 * CELL_PADDING, self.metrics)
                })
                .collect();
            let lines = cells.iter().map(Vec::len).max().unwrap_or(1);
            let height = lines as f32 * step + 2.0 * CELL_PADDING;
            self.reserve(height);

            let top = self.y;
            let bottom = top + height;
            let mut ops = vec![
                Op::Rule {
                    x1: left,
                    y1: top,
                    x2: right,
                    y2: top,
                },
                Op::Rule {
                    x1: left,
                    y1: bottom,
                    x2: right,
                    y2: bottom,
                },
            ];
            let mut x = left;
            ops.push(Op::Rule {
                x1: x,
                y1: top,
                x2: x,
                y2: bottom,
            });
            for (width, cell) in widths.iter().zip(cells) {
                for (line_no, line) in cell.into_iter().enumerate() {
                    ops.push(Op::Text {
                        x: x + CELL_PADDING,
                        y: top + CELL_PADDING + line_no as f32 * step + TABLE_TEXT * PT_TO_MM,
                        size: TABLE_TEXT,
                        bold,
                        text: line,
                    });
                }
                x += width;
                ops.push(Op::Rule {
                    x1: x,
                    y1: top,
                    x2: x,
                    y2: bottom,
                });
            }
            self.page().ops.extend(ops);
            self.y = bottom;
        }
        self.y += BODY.space_after;
    }

    fn image(&mut self, block: usize, width_px: u32, height_px: u32, max_width: f32) {
        if width_px == 0 || height_px == 0 {
            return;
        }
        let max_height = (self.template.bottom() - self.template.margin) * 0.6;
        let aspect = height_px as f32 / width_px as f32;
        let mut width = max_width.min(self.template.content_width());
        let mut height = width * aspect;
        if height > max_height {
            height = max_height;
            width = height / aspect;
        }
        self.reserve(height);
        let x = self.template.margin + (self.template.content_width() - width) / 2.0;
        let y = self.y;
        self.page().ops.push(Op::Image {
            block,
            x,
            y,
            width,
            height,
        });
        self.y += height + BODY.space_after;
    }

    /// Slices run clockwise from twelve o'clock, labels sit outside the rim.
    fn pie(&mut self, slices: &[(String, f64)], diameter: f32, height: f32) {
        let slices: Vec<&(String, f64)> = slices
            .iter()
            .filter(|(_, value)| value.is_finite() && *value > 0.0)
            .collect();
        let total: f64 = slices.iter().map(|(_, value)| value).sum();
        if slices.is_empty() || total <= 0.0 {
            return;
        }
        let height = height.max(diameter);
        self.reserve(height);

        let radius = diameter / 2.0;
        let center = (
            self.template.margin + self.template.content_width() / 2.0,
            self.y + height / 2.0,
        );
        let mut start = 90.0_f32;
        let mut ops = Vec::new();
        let mut labels = Vec::new();
        for (index, (label, value)) in slices.iter().enumerate() {
            let sweep = -((value / total) as f32 * 360.0);
            let mut points = arc(center, radius, start, sweep);
            if slices.len() > 1 {
                points.insert(0, center);
            }
            ops.push(Op::Wedge {
                points,
                color: PIE_COLORS[index % PIE_COLORS.len()],
            });

            let middle = (start + sweep / 2.0).to_radians();
            let anchor = (
                center.0 + radius * PIE_LABEL_RADIUS * middle.cos(),
                center.1 - radius * PIE_LABEL_RADIUS * middle.sin(),
            );
            let width = text_width(label, PIE_LABEL_SIZE, self.metrics);
            labels.push(Op::Text {
                x: if middle.cos() >= 0.0 { anchor.0 } else { anchor.0 - width },
                y: anchor.1 + PIE_LABEL_SIZE * PT_TO_MM / 2.0,
                size: PIE_LABEL_SIZE,
                bold: false,
                text: label.clone(),
            });
            start += sweep;
        }
        ops.extend(labels);
        self.page().ops.extend(ops);
        self.y += height + BODY.space_after;
    }

    fn spacer(&mut self, height: f32) {
        self.y = (self.y + height).min(self.template.bottom());
    }

    fn page_break(&mut self) {
        if !self.page().ops.is_empty() {
            self.new_page();
        }
    }
}

pub fn plan(
    blocks: &[Block],
    template: &PageTemplate,
    metrics: &dyn GlyphMetrics,
) -> Vec<PlannedPage> {
    let mut planner = Planner::new(template, metrics);
    for (index, block) in blocks.iter().enumerate() {
        match block {
            Block::Title(text) => planner.text(text, &TITLE, 0.0),
            Block::Heading1(text) => planner.text(text, &HEADING1, 0.0),
            Block::Heading2(text) => planner.text(text, &HEADING2, 0.0),
            Block::Paragraph(text) => planner.text(text, &BODY, 0.0),
            Block::Bullet(text) => planner.text(&format!("• {}", text), &BODY, BULLET_INDENT),
            Block::Table { widths, rows, header } => planner.table(widths, rows, *header),
            Block::Image { width_px, height_px, max_width, .. } => {
                planner.image(index, *width_px, *height_px, *max_width)
            }
            Block::Pie { slices, diameter, height } => planner.pie(slices, *diameter, *height),
            Block::Spacer(height) => planner.spacer(*height),
            Block::PageBreak => planner.page_break(),
        }
    }
    planner.pages
}
