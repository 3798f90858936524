//! Still-frame drawing for quiz videos.
//!
//! Every frame shares one layout: logo on top, the wrapped question below it
//! and four answer boxes labelled A-D. The reveal frame is the same picture
//! with the correct box recolored.

mod countdown;
mod fonts;

pub use countdown::CountdownBar;
pub use fonts::load_font;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{Rgb, RgbImage, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

use super::config::{Palette, QuizConfig};
use crate::ui::prelude::{Level, emit};

pub const CANVAS_WIDTH: u32 = 1080;
pub const CANVAS_HEIGHT: u32 = 1920;

const LOGO_SIZE: u32 = 150;
const LOGO_TOP: u32 = 100;

const QUESTION_TOP: i32 = 350;
const QUESTION_LINE_HEIGHT: i32 = 90;
const QUESTION_WRAP_CHARS: usize = 22;
const QUESTION_FONT_PX: f32 = 75.0;

pub const OPTIONS_TOP: u32 = 800;
pub const OPTION_GAP: u32 = 170;
pub const OPTION_HEIGHT: u32 = 130;
pub const OPTION_MARGIN: u32 = 100;
const OPTION_TEXT_LEFT: i32 = 150;
const OPTION_TEXT_NUDGE: i32 = -10;
const OPTION_FONT_PX: f32 = 55.0;
const OPTION_LABELS: [&str; 4] = ["A", "B", "C", "D"];

pub struct FrameCompositor {
    font: Option<FontVec>,
    logo: Option<RgbaImage>,
    palette: Palette,
}

impl FrameCompositor {
    pub fn new(font: Option<FontVec>, logo: Option<RgbaImage>, palette: Palette) -> Self {
        Self {
            font,
            logo: logo.map(|logo| fit_logo(&logo)),
            palette,
        }
    }

    /// Build from config, degrading to no text / no logo when assets are missing.
    pub fn from_config(config: &QuizConfig) -> Result<Self> {
        let palette = config.palette()?;

        let font = load_font(&config.font_path());
        if font.is_none() {
            emit(
                Level::Warn,
                "frame.font.missing",
                &format!(
                    "No usable font at {} or in system font paths; frames will have no text",
                    config.font_path().display()
                ),
                None,
            );
        }

        let logo = load_logo(&config.logo_path());
        Ok(Self::new(font, logo, palette))
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    /// Draw one frame. `highlight` recolors the first box whose text equals it.
    pub fn render(&self, question: &str, options: &[String; 4], highlight: Option<&str>) -> RgbImage {
        let mut canvas = RgbImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, self.palette.background);

        if let Some(logo) = &self.logo {
            let left = (CANVAS_WIDTH - LOGO_SIZE) / 2;
            blend_rgba(&mut canvas, logo, left, LOGO_TOP);
        }

        self.draw_question(&mut canvas, question);

        let highlighted = highlight.and_then(|answer| highlighted_index(options, answer));
        for (i, option) in options.iter().enumerate() {
            let (fill, text_color) = if highlighted == Some(i) {
                (self.palette.highlight, self.palette.highlight_text)
            } else {
                (self.palette.box_fill, self.palette.text)
            };
            self.draw_option(&mut canvas, i, option, fill, text_color);
        }

        canvas
    }

    fn draw_question(&self, canvas: &mut RgbImage, question: &str) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(QUESTION_FONT_PX);

        let mut y = QUESTION_TOP;
        for line in wrap_text(question, QUESTION_WRAP_CHARS) {
            let (text_w, _) = text_size(scale, font, &line);
            let x = (CANVAS_WIDTH as i32 - text_w as i32) / 2;
            draw_text_mut(canvas, self.palette.text, x, y, scale, font, &line);
            y += QUESTION_LINE_HEIGHT;
        }
    }

    fn draw_option(
        &self,
        canvas: &mut RgbImage,
        index: usize,
        text: &str,
        fill: Rgb<u8>,
        text_color: Rgb<u8>,
    ) {
        let rect = option_box(index);
        draw_filled_rect_mut(canvas, rect, fill);

        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(OPTION_FONT_PX);
        let label = format!("  {}.  {}", OPTION_LABELS[index], text);
        let (_, text_h) = text_size(scale, font, &label);
        let y = rect.top() + (OPTION_HEIGHT as i32 - text_h as i32) / 2 + OPTION_TEXT_NUDGE;
        draw_text_mut(canvas, text_color, OPTION_TEXT_LEFT, y, scale, font, &label);
    }
}

/// Box geometry for option `index` (0 = A).
pub fn option_box(index: usize) -> Rect {
    let top = OPTIONS_TOP + index as u32 * OPTION_GAP;
    Rect::at(OPTION_MARGIN as i32, top as i32)
        .of_size(CANVAS_WIDTH - 2 * OPTION_MARGIN, OPTION_HEIGHT)
}

/// First option whose text equals `answer`.
pub fn highlighted_index(options: &[String; 4], answer: &str) -> Option<usize> {
    options.iter().position(|option| option == answer)
}

/// Greedy word wrap on character counts; words longer than `width` are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();

        while !chars.is_empty() {
            let room = if current_len == 0 {
                width
            } else {
                width.saturating_sub(current_len + 1)
            };

            if chars.len() <= room {
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(chars.iter());
                current_len += chars.len();
                chars.clear();
            } else if current_len > 0 && chars.len() <= width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            } else if room == 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            } else {
                if current_len > 0 {
                    current.push(' ');
                }
                let rest = chars.split_off(room);
                current.extend(chars.iter());
                lines.push(std::mem::take(&mut current));
                current_len = 0;
                chars = rest;
            }
        }
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}

pub fn save_png(frame: &RgbImage, path: &Path) -> Result<()> {
    frame
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write frame {}", path.display()))
}

fn load_logo(path: &Path) -> Option<RgbaImage> {
    if !path.exists() {
        emit(
            Level::Debug,
            "frame.logo.missing",
            &format!("No logo at {}, frames will not carry one", path.display()),
            None,
        );
        return None;
    }

    match image::open(path) {
        Ok(img) => Some(img.to_rgba8()),
        Err(err) => {
            emit(
                Level::Warn,
                "frame.logo.invalid",
                &format!("Could not decode logo {}: {err}", path.display()),
                None,
            );
            None
        }
    }
}

fn fit_logo(logo: &RgbaImage) -> RgbaImage {
    if logo.dimensions() == (LOGO_SIZE, LOGO_SIZE) {
        return logo.clone();
    }
    image::imageops::resize(logo, LOGO_SIZE, LOGO_SIZE, FilterType::Lanczos3)
}

fn blend_rgba(canvas: &mut RgbImage, overlay: &RgbaImage, left: u32, top: u32) {
    for (x, y, px) in overlay.enumerate_pixels() {
        let (cx, cy) = (left + x, top + y);
        if cx >= canvas.width() || cy >= canvas.height() {
            continue;
        }
        let alpha = f32::from(px[3]) / 255.0;
        if alpha <= 0.0 {
            continue;
        }
        let dst = canvas.get_pixel_mut(cx, cy);
        for c in 0..3 {
            let blended = f32::from(px[c]) * alpha + f32::from(dst[c]) * (1.0 - alpha);
            dst[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn options() -> [String; 4] {
        ["Lyon", "Paris", "Nice", "Rouen"].map(String::from)
    }

    fn box_probe(index: usize) -> (u32, u32) {
        // Left inner edge of the box, clear of any label text
        (OPTION_MARGIN + 10, OPTIONS_TOP + index as u32 * OPTION_GAP + 5)
    }

    #[test]
    fn question_frame_has_no_highlight() {
        let compositor = FrameCompositor::new(None, None, Palette::default());
        let frame = compositor.render("Capital of France?", &options(), None);

        assert_eq!(frame.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
        for i in 0..4 {
            let (x, y) = box_probe(i);
            assert_eq!(*frame.get_pixel(x, y), Palette::default().box_fill);
        }
        assert_eq!(*frame.get_pixel(20, 20), Palette::default().background);
    }

    #[test]
    fn reveal_highlights_exactly_the_correct_box() {
        let compositor = FrameCompositor::new(None, None, Palette::default());
        let frame = compositor.render("Capital of France?", &options(), Some("Paris"));

        for i in 0..4 {
            let (x, y) = box_probe(i);
            let expected = if i == 1 {
                Palette::default().highlight
            } else {
                Palette::default().box_fill
            };
            assert_eq!(*frame.get_pixel(x, y), expected, "box {i}");
        }
    }

    #[test]
    fn duplicate_text_highlights_first_match_only() {
        let opts = ["Paris", "Lyon", "Paris", "Nice"].map(String::from);
        assert_eq!(highlighted_index(&opts, "Paris"), Some(0));
        assert_eq!(highlighted_index(&opts, "Berlin"), None);
    }

    #[test]
    fn boxes_follow_layout_constants() {
        let last = option_box(3);
        assert_eq!(last.left(), 100);
        assert_eq!(last.top(), 800 + 3 * 170);
        assert_eq!(last.width(), 880);
        assert_eq!(last.height(), 130);
    }

    #[test]
    fn logo_is_centered_at_top() {
        let logo = RgbaImage::from_pixel(150, 150, Rgba([200, 0, 0, 255]));
        let compositor = FrameCompositor::new(None, Some(logo), Palette::default());
        let frame = compositor.render("Q", &options(), None);

        assert_eq!(*frame.get_pixel(540, 175), Rgb([200, 0, 0]));
        assert_eq!(*frame.get_pixel(464, 175), Palette::default().background);
        assert_eq!(*frame.get_pixel(540, 99), Palette::default().background);
    }

    #[test]
    fn oversized_logo_is_scaled_down() {
        let logo = RgbaImage::new(640, 480);
        assert_eq!(fit_logo(&logo).dimensions(), (LOGO_SIZE, LOGO_SIZE));
    }

    #[test]
    fn transparent_logo_pixels_keep_background() {
        let logo = RgbaImage::from_pixel(150, 150, Rgba([255, 255, 255, 0]));
        let compositor = FrameCompositor::new(None, Some(logo), Palette::default());
        let frame = compositor.render("Q", &options(), None);
        assert_eq!(*frame.get_pixel(540, 175), Palette::default().background);
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap_text("¿Cuál es el planeta más grande del sistema solar?", 22);
        assert_eq!(
            lines,
            vec!["¿Cuál es el planeta", "más grande del sistema", "solar?"]
        );
        assert!(lines.iter().all(|l| l.chars().count() <= 22));
    }

    #[test]
    fn breaks_overlong_words() {
        let lines = wrap_text("a supercalifragilisticexpialidocious word", 10);
        assert_eq!(
            lines,
            vec!["a supercal", "ifragilist", "icexpialid", "ocious", "word"]
        );
    }

    #[test]
    fn empty_text_wraps_to_nothing() {
        assert!(wrap_text("   ", 22).is_empty());
    }
}
