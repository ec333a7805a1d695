//! Field storage: the two-species concentration grid and the seed mask.
//!
//! Both grids are row-major with row 0 at the bottom of the displayed image.
//! Storage is allocated fallibly so that exhaustion surfaces as
//! [`SimError::Allocation`] instead of aborting the process.

use crate::error::SimError;
use crate::math::{mix, Vec2};

/// One field cell: concentrations of chemical A and chemical B.
/// Nominally in [0, 1], never clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cell {
    pub a: f32,
    pub b: f32,
}

impl Cell {
    pub const fn new(a: f32, b: f32) -> Self {
        Self { a, b }
    }

    #[inline]
    fn lerp(self, other: Cell, t: f32) -> Cell {
        Cell {
            a: mix(self.a, other.a, t),
            b: mix(self.b, other.b, t),
        }
    }
}

/// Allocate `width * height` copies of `fill`, reporting failure instead of aborting
fn allocate<T: Clone>(width: usize, height: usize, fill: T) -> Result<Vec<T>, SimError> {
    if width == 0 || height == 0 {
        return Err(SimError::InvalidDimensions { width, height });
    }
    let cells = width
        .checked_mul(height)
        .ok_or(SimError::Allocation { cells: usize::MAX })?;
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(cells)
        .map_err(|_| SimError::Allocation { cells })?;
    storage.resize(cells, fill);
    Ok(storage)
}

/// Clamp a signed cell coordinate to the field extent (edge-clamp policy)
#[inline]
pub fn clamp_coord(x: i64, y: i64, width: usize, height: usize) -> (usize, usize) {
    (
        x.clamp(0, width as i64 - 1) as usize,
        y.clamp(0, height as i64 - 1) as usize,
    )
}

/// Initial contents written into the front buffer on creation and resize
#[derive(Debug, Clone, Copy)]
pub enum InitialPattern<'a> {
    /// A=1, B=0 everywhere except a centered square of B
    Blob { half_size: f32 },
    /// A where the mask is set, B elsewhere
    Mask(&'a SeedMask),
}

/// A fixed-size grid of (A, B) cells
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBuffer {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl FieldBuffer {
    /// Allocate a zeroed buffer
    pub fn try_new(width: usize, height: usize) -> Result<Self, SimError> {
        Self::filled(width, height, Cell::default())
    }

    /// Allocate a buffer with every cell set to `cell`
    pub fn filled(width: usize, height: usize, cell: Cell) -> Result<Self, SimError> {
        Ok(Self {
            width,
            height,
            cells: allocate(width, height, cell)?,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Cell {
        self.cells[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        let idx = self.index(x, y);
        self.cells[idx] = cell;
    }

    /// Read a cell with out-of-range coordinates clamped to the nearest edge
    #[inline]
    pub fn fetch_clamped(&self, x: i64, y: i64) -> Cell {
        let (x, y) = clamp_coord(x, y, self.width, self.height);
        self.get(x, y)
    }

    /// Bilinear sample at a fractional cell coordinate with edge-clamped taps.
    /// Integral coordinates return the stored cell exactly.
    pub fn sample_bilinear(&self, pos: Vec2) -> Cell {
        let fx = pos.x.floor();
        let fy = pos.y.floor();
        let tx = pos.x - fx;
        let ty = pos.y - fy;
        let x0 = fx as i64;
        let y0 = fy as i64;

        let tl = self.fetch_clamped(x0, y0);
        let tr = self.fetch_clamped(x0 + 1, y0);
        let bl = self.fetch_clamped(x0, y0 + 1);
        let br = self.fetch_clamped(x0 + 1, y0 + 1);

        tl.lerp(tr, tx).lerp(bl.lerp(br, tx), ty)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn fill(&mut self, cell: Cell) {
        self.cells.fill(cell);
    }

    /// Sum of both channels over the whole field, accumulated in f64
    #[cfg(test)]
    pub fn totals(&self) -> (f64, f64) {
        self.cells.iter().fold((0.0, 0.0), |(sa, sb), c| {
            (sa + f64::from(c.a), sb + f64::from(c.b))
        })
    }

    /// Overwrite the buffer with an initial pattern
    pub fn seed(&mut self, pattern: InitialPattern<'_>) -> Result<(), SimError> {
        match pattern {
            InitialPattern::Blob { half_size } => {
                let cx = self.width as f32 * 0.5;
                let cy = self.height as f32 * 0.5;
                for y in 0..self.height {
                    for x in 0..self.width {
                        // Cell centers keep the blob symmetric for odd and even sizes
                        let inside = (x as f32 + 0.5 - cx).abs() < half_size
                            && (y as f32 + 0.5 - cy).abs() < half_size;
                        let cell = if inside {
                            Cell::new(0.0, 1.0)
                        } else {
                            Cell::new(1.0, 0.0)
                        };
                        self.set(x, y, cell);
                    }
                }
            },
            InitialPattern::Mask(mask) => {
                if mask.dims() != self.dims() {
                    return Err(SimError::MaskSize {
                        expected: self.dims(),
                        actual: mask.dims(),
                    });
                }
                for (cell, &m) in self.cells.iter_mut().zip(mask.values()) {
                    *cell = Cell::new(m, 1.0 - m);
                }
            },
        }
        Ok(())
    }
}

/// Externally supplied scalar field, same size as the solver field.
/// Read-only from the solver's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedMask {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl SeedMask {
    /// Allocate an all-zero mask
    pub fn try_new(width: usize, height: usize) -> Result<Self, SimError> {
        Ok(Self {
            width,
            height,
            values: allocate(width, height, 0.0)?,
        })
    }

    /// Wrap existing values (row-major, `width * height` entries)
    #[cfg(test)]
    pub fn from_values(width: usize, height: usize, values: Vec<f32>) -> Result<Self, SimError> {
        if width == 0 || height == 0 {
            return Err(SimError::InvalidDimensions { width, height });
        }
        if values.len() != width * height {
            return Err(SimError::MaskSize {
                expected: (width, height),
                actual: (values.len(), 1),
            });
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        let idx = y * self.width + x;
        self.values[idx] = value;
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn fill(&mut self, value: f32) {
        self.values.fill(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_dimensions_rejected() {
        assert_eq!(
            FieldBuffer::try_new(0, 4),
            Err(SimError::InvalidDimensions {
                width: 0,
                height: 4
            })
        );
        assert!(SeedMask::try_new(3, 0).is_err());
    }

    #[test]
    fn test_oversized_allocation_fails() {
        let result = FieldBuffer::try_new(usize::MAX / 2, 3);
        assert!(matches!(result, Err(SimError::Allocation { .. })));
    }

    #[test]
    fn test_clamp_coord_corners() {
        assert_eq!(clamp_coord(-1, -1, 5, 4), (0, 0));
        assert_eq!(clamp_coord(5, -7, 5, 4), (4, 0));
        assert_eq!(clamp_coord(-3, 4, 5, 4), (0, 3));
        assert_eq!(clamp_coord(99, 99, 5, 4), (4, 3));
        assert_eq!(clamp_coord(2, 1, 5, 4), (2, 1));
    }

    #[test]
    fn test_bilinear_integral_is_exact() {
        let mut field = FieldBuffer::try_new(4, 3).unwrap();
        for y in 0..3 {
            for x in 0..4 {
                field.set(x, y, Cell::new(x as f32 * 0.1, y as f32 * 0.3));
            }
        }
        for y in 0..3 {
            for x in 0..4 {
                let s = field.sample_bilinear(Vec2::new(x as f32, y as f32));
                assert_eq!(s, field.get(x, y));
            }
        }
    }

    #[test]
    fn test_bilinear_midpoint_and_clamp() {
        let mut field = FieldBuffer::try_new(2, 1).unwrap();
        field.set(0, 0, Cell::new(0.0, 1.0));
        field.set(1, 0, Cell::new(1.0, 0.0));

        let mid = field.sample_bilinear(Vec2::new(0.5, 0.0));
        assert!((mid.a - 0.5).abs() < 1e-6);
        assert!((mid.b - 0.5).abs() < 1e-6);

        // Past the edges the taps clamp to the border cells
        assert_eq!(field.sample_bilinear(Vec2::new(-3.7, -2.0)), field.get(0, 0));
        assert_eq!(field.sample_bilinear(Vec2::new(8.2, 5.5)), field.get(1, 0));
    }

    #[test]
    fn test_blob_is_symmetric() {
        let mut field = FieldBuffer::try_new(16, 16).unwrap();
        field.seed(InitialPattern::Blob { half_size: 2.0 }).unwrap();
        let blob: Vec<(usize, usize)> = (0..16)
            .flat_map(|y| (0..16).map(move |x| (x, y)))
            .filter(|&(x, y)| field.get(x, y).b == 1.0)
            .collect();
        assert_eq!(blob.len(), 16);
        for &(x, y) in &blob {
            assert!((6..10).contains(&x) && (6..10).contains(&y));
            assert_eq!(field.get(x, y).a, 0.0);
        }
        assert_eq!(field.get(0, 0), Cell::new(1.0, 0.0));
    }

    #[test]
    fn test_seed_from_mask() {
        let mask = SeedMask::from_values(2, 2, vec![1.0, 0.0, 0.25, 0.0]).unwrap();
        let mut field = FieldBuffer::try_new(2, 2).unwrap();
        field.seed(InitialPattern::Mask(&mask)).unwrap();
        assert_eq!(field.get(0, 0), Cell::new(1.0, 0.0));
        assert_eq!(field.get(1, 0), Cell::new(0.0, 1.0));
        assert_eq!(field.get(0, 1), Cell::new(0.25, 0.75));

        let wrong = SeedMask::try_new(3, 2).unwrap();
        assert!(matches!(
            field.seed(InitialPattern::Mask(&wrong)),
            Err(SimError::MaskSize { .. })
        ));
    }

    #[test]
    fn test_mask_from_values_length_checked() {
        assert!(SeedMask::from_values(2, 2, vec![0.0; 3]).is_err());
        let mask = SeedMask::from_values(3, 1, vec![0.0, 0.5, 1.0]).unwrap();
        assert_eq!(mask.get(2, 0), 1.0);
    }
}
