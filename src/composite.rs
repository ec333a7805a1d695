//! Upscale the field into the window's pixel buffer.

use crate::display::{write_pixel, PixelBuffer, BYTES_PER_PIXEL};
use crate::math::Vec2;
use crate::sim::FieldBuffer;
use crate::util::lerp_color;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Two-tone palette: `paper` where B dominates, `ink` where A does
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub paper: (u8, u8, u8),
    pub ink: (u8, u8, u8),
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            paper: (244, 240, 232),
            ink: (24, 26, 38),
        }
    }
}

/// Field position sampled for the center of window pixel (px, py).
/// Window rows run top-down, field rows bottom-up.
#[inline]
fn field_position(px: u32, py: u32, window: (u32, u32), field: (usize, usize)) -> Vec2 {
    let (ww, wh) = (window.0.max(1) as f32, window.1.max(1) as f32);
    let (fw, fh) = (field.0 as f32, field.1 as f32);
    let flipped = wh - 1.0 - py as f32;
    Vec2::new(
        (px as f32 + 0.5) / ww * fw - 0.5,
        (flipped + 0.5) / wh * fh - 0.5,
    )
}

/// Bilinearly upscale `field` over the whole of `buffer`
pub fn composite(field: &FieldBuffer, buffer: &mut PixelBuffer, palette: &Palette) {
    let window = (buffer.width(), buffer.height());
    let dims = field.dims();
    let pitch = buffer.pitch();
    if pitch == 0 {
        return;
    }

    buffer
        .as_bytes_mut()
        .par_chunks_mut(pitch)
        .enumerate()
        .for_each(|(py, row)| {
            for (px, dest) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                let pos = field_position(px as u32, py as u32, window, dims);
                let cell = field.sample_bilinear(pos);
                let (r, g, b) = lerp_color(palette.paper, palette.ink, cell.a - cell.b);
                write_pixel(dest, r, g, b);
            }
        });
}
