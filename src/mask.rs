//! Clock-face seed mask.
//!
//! Rasterizes `HH:MM:SS` into a [`SeedMask`] with a built-in 5x7 digit font,
//! anti-aliased by supersampling. Re-rendering is driven by the caller and
//! skipped while the displayed second has not changed.

use crate::error::SimError;
use crate::sim::SeedMask;
use chrono::{Local, Timelike};

const GLYPH_W: usize = 5;
const GLYPH_H: usize = 7;
/// Subsamples per mask pixel along each axis
const SUPERSAMPLE: usize = 4;
/// Minimum glyph height in mask pixels before fitting
const MIN_FONT_SIZE: f32 = 80.0;
/// Fields wider than this get one line, narrower ones three
const SINGLE_LINE_ASPECT: f32 = 1.3;
const LINE_HEIGHT: f32 = 1.25;
/// Fraction of the field the text may cover
const FILL: f32 = 0.9;

// Rows top to bottom, bit 4 is the leftmost column
const DIGITS: [[u8; GLYPH_H]; 10] = [
    [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E], // 0
    [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E], // 1
    [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F], // 2
    [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E], // 3
    [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02], // 4
    [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E], // 5
    [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E], // 6
    [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08], // 7
    [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E], // 8
    [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C], // 9
];
const COLON: [u8; GLYPH_H] = [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00];

fn glyph(ch: char) -> Option<&'static [u8; GLYPH_H]> {
    match ch {
        '0'..='9' => Some(&DIGITS[ch as usize - '0' as usize]),
        ':' => Some(&COLON),
        _ => None,
    }
}

/// Wall-clock time of day shown by the mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl ClockTime {
    pub fn new(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            hours,
            minutes,
            seconds,
        }
    }

    /// Current local time
    pub fn now() -> Self {
        let now = Local::now();
        Self::new(now.hour(), now.minute(), now.second())
    }

    fn lines(&self, single_line: bool) -> Vec<String> {
        if single_line {
            vec![format!(
                "{:02}:{:02}:{:02}",
                self.hours, self.minutes, self.seconds
            )]
        } else {
            vec![
                format!("{:02}", self.hours),
                format!("{:02}", self.minutes),
                format!("{:02}", self.seconds),
            ]
        }
    }
}

/// Text placement in top-down mask pixel space
struct TextLayout {
    lines: Vec<String>,
    /// Size of one font pixel
    cell: f32,
    line_advance: f32,
    top: f32,
    /// Left edge of each line
    lefts: Vec<f32>,
}

impl TextLayout {
    fn new(time: ClockTime, width: usize, height: usize) -> Self {
        let (w, h) = (width as f32, height as f32);
        let lines = time.lines(w / h > SINGLE_LINE_ASPECT);

        let font_size = MIN_FONT_SIZE.max(w.min(h) / 3.0);
        let columns = lines.iter().map(|l| l.chars().count()).max().unwrap_or(1);
        // Text width in font pixels: glyphs plus one-pixel spacing between them
        let text_cols = (columns * (GLYPH_W + 1) - 1) as f32;
        let line_count = lines.len() as f32;
        let text_rows = GLYPH_H as f32 * (1.0 + (line_count - 1.0) * LINE_HEIGHT);

        let cell = (font_size / GLYPH_H as f32)
            .min(FILL * w / text_cols)
            .min(FILL * h / text_rows);

        let line_advance = GLYPH_H as f32 * LINE_HEIGHT * cell;
        let top = (h - text_rows * cell) * 0.5;
        let lefts = lines
            .iter()
            .map(|l| {
                let cols = (l.chars().count() * (GLYPH_W + 1) - 1) as f32;
                (w - cols * cell) * 0.5
            })
            .collect();

        Self {
            lines,
            cell,
            line_advance,
            top,
            lefts,
        }
    }

    /// Whether the point (top-down pixel space) falls on a lit font pixel
    fn covers(&self, px: f32, py: f32) -> bool {
        let rel_y = py - self.top;
        if rel_y < 0.0 {
            return false;
        }
        let line = (rel_y / self.line_advance) as usize;
        let Some(text) = self.lines.get(line) else {
            return false;
        };
        let row = ((rel_y - line as f32 * self.line_advance) / self.cell) as usize;
        if row >= GLYPH_H {
            return false;
        }
        let rel_x = px - self.lefts[line];
        if rel_x < 0.0 {
            return false;
        }
        let col = (rel_x / self.cell) as usize;
        let (index, col) = (col / (GLYPH_W + 1), col % (GLYPH_W + 1));
        if col >= GLYPH_W {
            return false;
        }
        text.chars()
            .nth(index)
            .and_then(glyph)
            .is_some_and(|g| g[row] & (1 << (GLYPH_W - 1 - col)) != 0)
    }
}

/// Render `time` into `mask`, overwriting it. Row 0 of the mask is the
/// bottom of the image, so text rows are flipped.
pub fn render_clock(mask: &mut SeedMask, time: ClockTime) {
    let (width, height) = mask.dims();
    let layout = TextLayout::new(time, width, height);
    let step = 1.0 / SUPERSAMPLE as f32;
    let full = (SUPERSAMPLE * SUPERSAMPLE) as f32;

    for y in 0..height {
        let top_down = (height - 1 - y) as f32;
        for x in 0..width {
            let mut hits = 0;
            for sy in 0..SUPERSAMPLE {
                for sx in 0..SUPERSAMPLE {
                    let px = x as f32 + (sx as f32 + 0.5) * step;
                    let py = top_down + (sy as f32 + 0.5) * step;
                    if layout.covers(px, py) {
                        hits += 1;
                    }
                }
            }
            mask.set(x, y, hits as f32 / full);
        }
    }
}

/// Seed mask showing the clock, re-rendered only when the second changes
pub struct ClockMask {
    mask: SeedMask,
    shown: Option<ClockTime>,
}

impl ClockMask {
    pub fn new(width: usize, height: usize) -> Result<Self, SimError> {
        Ok(Self {
            mask: SeedMask::try_new(width, height)?,
            shown: None,
        })
    }

    /// Reallocate for new field dimensions; the next refresh always renders
    pub fn resize(&mut self, width: usize, height: usize) -> Result<(), SimError> {
        self.mask = SeedMask::try_new(width, height)?;
        self.shown = None;
        Ok(())
    }

    /// Render `time` unless it is already shown. Returns whether the mask changed.
    pub fn refresh(&mut self, time: ClockTime) -> bool {
        if self.shown == Some(time) {
            return false;
        }
        render_clock(&mut self.mask, time);
        self.shown = Some(time);
        true
    }

    pub fn mask(&self) -> &SeedMask {
        &self.mask
    }

    #[cfg(test)]
    pub fn shown(&self) -> Option<ClockTime> {
        self.shown
    }
}
