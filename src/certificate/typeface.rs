use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, anyhow};
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{debug, warn};

const BUILTIN_GLYPH_SIZE: u32 = 8;

/// Typeface used to print text onto certificate canvases.
///
/// `Scalable` is a TrueType/OpenType face loaded from disk. `Builtin` is an
/// 8x8 bitmap face scaled by whole pixels; it covers basic Latin only and
/// prints `?` for anything else.
pub enum Typeface {
    Scalable(FontVec),
    Builtin,
}

impl Typeface {
    /// Loads the preferred face, falling back to the built-in one when the
    /// file is missing or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            debug!("No certificate font configured, using the built-in typeface");
            return Typeface::Builtin;
        };

        match read_font(path) {
            Ok(font) => {
                debug!("Loaded certificate font from {}", path.display());
                Typeface::Scalable(font)
            }
            Err(e) => {
                warn!(
                    "Falling back to the built-in typeface, font {} unusable: {:#}",
                    path.display(),
                    e
                );
                Typeface::Builtin
            }
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, Typeface::Builtin)
    }

    /// Rendered `(width, height)` of `text` at `size` pixels.
    pub fn text_size(&self, size: f32, text: &str) -> (u32, u32) {
        match self {
            Typeface::Scalable(font) => text_size(PxScale::from(size), font, text),
            Typeface::Builtin => {
                let cell = builtin_scale(size) * BUILTIN_GLYPH_SIZE;
                let glyphs = text.chars().count() as u32;
                if glyphs == 0 {
                    (0, 0)
                } else {
                    (glyphs * cell, cell)
                }
            }
        }
    }

    /// Draws `text` with its top-left corner at `(x, y)`; anything outside
    /// the canvas is clipped.
    pub fn draw(&self, canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, size: f32, text: &str) {
        match self {
            Typeface::Scalable(font) => {
                draw_text_mut(canvas, color, x, y, PxScale::from(size), font, text)
            }
            Typeface::Builtin => draw_builtin(canvas, color, x, y, builtin_scale(size), text),
        }
    }
}

fn read_font(path: &Path) -> anyhow::Result<FontVec> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|e| anyhow!("Invalid font data: {}", e))
}

fn builtin_scale(size: f32) -> u32 {
    ((size / BUILTIN_GLYPH_SIZE as f32).round() as u32).max(1)
}

fn draw_builtin(canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, scale: u32, text: &str) {
    let cell = (BUILTIN_GLYPH_SIZE * scale) as i32;

    for (index, ch) in text.chars().enumerate() {
        let glyph = BASIC_FONTS
            .get(ch)
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or([0; 8]);
        let origin_x = x + index as i32 * cell;

        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..BUILTIN_GLYPH_SIZE {
                if (*bits >> col) & 1 == 1 {
                    let rect = Rect::at(
                        origin_x + (col * scale) as i32,
                        y + (row as u32 * scale) as i32,
                    )
                    .of_size(scale, scale);
                    draw_filled_rect_mut(canvas, rect, color);
                }
            }
        }
    }
}
