use ab_glyph::FontVec;
use std::fs;
use std::path::Path;

use crate::ui::prelude::{Level, emit};

/// Bold sans faces commonly shipped by Linux distributions and macOS.
const SYSTEM_FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
];

/// Load the configured font, falling back to a known system font.
pub fn load_font(preferred: &Path) -> Option<FontVec> {
    if let Some(font) = read_font(preferred) {
        return Some(font);
    }

    SYSTEM_FALLBACK_FONTS.iter().find_map(|candidate| {
        let font = read_font(Path::new(candidate))?;
        emit(
            Level::Debug,
            "frame.font.fallback",
            &format!("Using fallback font {candidate}"),
            None,
        );
        Some(font)
    })
}

fn read_font(path: &Path) -> Option<FontVec> {
    let bytes = fs::read(path).ok()?;
    match FontVec::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(err) => {
            emit(
                Level::Warn,
                "frame.font.invalid",
                &format!("{} is not a usable font: {err}", path.display()),
                None,
            );
            None
        }
    }
}
