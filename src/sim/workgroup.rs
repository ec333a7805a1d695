//! Work-group execution model for tiled stencil kernels.
//!
//! A dispatch covers the field with groups of `group_size` invocations. Each
//! invocation owns a `tile_size` block of slots in the group's [`SharedTile`].
//! The tile spans the group's dispatch area plus a halo of `halo` cells on
//! every side, so a group only produces output for its inner
//! `dispatch_size` region and neighbouring groups overlap by `2 * halo`.
//!
//! Execution is split into two phases separated by a group barrier:
//!
//! 1. load: every invocation writes the cache entries for its own slots
//! 2. compute: every invocation reads any cache entry and emits output for
//!    those of its slots that are not halo-only and lie inside the field
//!
//! [`ExecutionMode::Phased`] runs the invocations of one group in sequence
//! with the barrier at the boundary between the two loops, and runs rows of
//! groups in parallel on the rayon pool. [`ExecutionMode::Threaded`] gives
//! each invocation its own thread and a real [`Barrier`], which is slow but
//! exercises the cooperative protocol literally. [`ExecutionMode::Direct`]
//! skips the tile altogether and evaluates every cell from its direct
//! neighbours, for comparison against the tiled scheme.

use crate::error::SimError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, RwLock};
use std::thread;

/// Side length of the convolution kernel
pub const KERNEL_SIZE: usize = 3;

/// Cells of context needed on each side of an output cell
pub const HALO: usize = (KERNEL_SIZE - 1) / 2;

/// Compile-time geometry of a work group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelLayout {
    /// Invocations per group along x and y
    pub group_size: [usize; 2],
    /// Cache slots owned by each invocation along x and y
    pub tile_size: [usize; 2],
    pub halo: usize,
}

impl KernelLayout {
    /// 8x8 invocations with 2x2 tiles: 16x16 cache, 14x14 dispatch area
    pub const DEFAULT: KernelLayout = KernelLayout::new([8, 8], [2, 2]);

    pub const fn new(group_size: [usize; 2], tile_size: [usize; 2]) -> Self {
        Self {
            group_size,
            tile_size,
            halo: HALO,
        }
    }

    /// Cache extent (tile size times group size)
    #[inline]
    pub const fn cache_size(&self) -> [usize; 2] {
        [
            self.tile_size[0] * self.group_size[0],
            self.tile_size[1] * self.group_size[1],
        ]
    }

    /// Output extent of one group: the cache minus the halo border
    #[inline]
    pub const fn dispatch_size(&self) -> [usize; 2] {
        let cache = self.cache_size();
        [
            cache[0].saturating_sub(2 * self.halo),
            cache[1].saturating_sub(2 * self.halo),
        ]
    }

    /// A layout is usable when every group produces at least one output cell
    pub const fn is_valid(&self) -> bool {
        let dispatch = self.dispatch_size();
        dispatch[0] > 0 && dispatch[1] > 0
    }

    /// [`is_valid`](Self::is_valid) as a `Result`
    pub fn check(&self) -> Result<(), SimError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(SimError::InvalidLayout {
                group_size: self.group_size,
                tile_size: self.tile_size,
            })
        }
    }

    #[inline]
    pub const fn invocations(&self) -> usize {
        self.group_size[0] * self.group_size[1]
    }

    /// Groups needed to cover a field: `ceil(dim / dispatch_size)` per axis
    pub fn group_count(&self, width: usize, height: usize) -> [usize; 2] {
        let dispatch = self.dispatch_size();
        [width.div_ceil(dispatch[0]), height.div_ceil(dispatch[1])]
    }

    /// Field origin of a group's dispatch area
    #[inline]
    pub fn dispatch_origin(&self, group_id: [usize; 2]) -> [usize; 2] {
        let dispatch = self.dispatch_size();
        [group_id[0] * dispatch[0], group_id[1] * dispatch[1]]
    }

    /// Unclamped field coordinate cached in `slot`: dispatch origin + slot - halo.
    /// Negative or past-the-edge values occur in the halo at the field border.
    #[inline]
    pub fn source_coord(&self, group_id: [usize; 2], slot: [usize; 2]) -> [i64; 2] {
        let origin = self.dispatch_origin(group_id);
        [
            origin[0] as i64 + slot[0] as i64 - self.halo as i64,
            origin[1] as i64 + slot[1] as i64 - self.halo as i64,
        ]
    }

    /// Field cell written from `slot`, or `None` for halo-only slots and
    /// slots past the field edge.
    pub fn output_cell(
        &self,
        group_id: [usize; 2],
        slot: [usize; 2],
        width: usize,
        height: usize,
    ) -> Option<[usize; 2]> {
        let cache = self.cache_size();
        let inner = |s: usize, extent: usize| s >= self.halo && s < extent - self.halo;
        if !inner(slot[0], cache[0]) || !inner(slot[1], cache[1]) {
            return None;
        }
        let origin = self.dispatch_origin(group_id);
        let x = origin[0] + slot[0] - self.halo;
        let y = origin[1] + slot[1] - self.halo;
        (x < width && y < height).then_some([x, y])
    }

    /// Local ids of all invocations in a group, row-major
    pub fn local_ids(&self) -> impl Iterator<Item = [usize; 2]> {
        let [gw, gh] = self.group_size;
        (0..gh).flat_map(move |y| (0..gw).map(move |x| [x, y]))
    }
}

impl Default for KernelLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One invocation within one group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub group_id: [usize; 2],
    pub local_id: [usize; 2],
}

impl Invocation {
    /// First cache slot of this invocation's tile: `local_id * tile_size`
    #[inline]
    pub fn tile_offset(&self, layout: &KernelLayout) -> [usize; 2] {
        [
            self.local_id[0] * layout.tile_size[0],
            self.local_id[1] * layout.tile_size[1],
        ]
    }

    /// Cache slots owned by this invocation
    pub fn slots(&self, layout: &KernelLayout) -> impl Iterator<Item = [usize; 2]> {
        let [ox, oy] = self.tile_offset(layout);
        let [tw, th] = layout.tile_size;
        (0..tw).flat_map(move |c| (0..th).map(move |r| [ox + c, oy + r]))
    }
}

/// Per-group scratch cache covering the dispatch area plus halo
#[derive(Debug, Clone)]
pub struct SharedTile<E> {
    width: usize,
    entries: Vec<E>,
}

impl<E: Copy + Default> SharedTile<E> {
    pub fn new(size: [usize; 2]) -> Self {
        Self {
            width: size[0],
            entries: vec![E::default(); size[0] * size[1]],
        }
    }

    #[inline]
    pub fn get(&self, slot: [usize; 2]) -> E {
        self.entries[slot[1] * self.width + slot[0]]
    }

    #[inline]
    pub fn set(&mut self, slot: [usize; 2], entry: E) {
        self.entries[slot[1] * self.width + slot[0]] = entry;
    }

    /// Entry at `slot + (dx, dy)`. Only valid for non-halo slots with |d| <= halo.
    #[inline]
    pub fn neighbor(&self, slot: [usize; 2], dx: isize, dy: isize) -> E {
        let x = slot[0].wrapping_add_signed(dx);
        let y = slot[1].wrapping_add_signed(dy);
        self.get([x, y])
    }
}

/// A stencil kernel executed cooperatively by a work group
pub trait GroupKernel: Sync {
    type Entry: Copy + Default + Send + Sync;
    type Output: Copy + Send;

    /// Load phase: build the cache entry for an unclamped source coordinate.
    /// Implementations own the boundary policy.
    fn load(&self, source: [i64; 2]) -> Self::Entry;

    /// Compute phase: produce the value for field cell `cell`, whose cache
    /// slot is `slot`. Any entry of `tile` may be read.
    fn compute(&self, slot: [usize; 2], cell: [usize; 2], tile: &SharedTile<Self::Entry>)
        -> Self::Output;

    /// Untiled evaluation of field cell `cell` straight from the source
    fn direct(&self, cell: [usize; 2]) -> Self::Output;
}

/// How groups and their invocations are scheduled on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Sequential invocations per group, group rows in parallel
    #[default]
    Phased,
    /// One OS thread per invocation, synchronized with a barrier
    Threaded,
    /// No work groups: every cell reads its neighbours from the source
    Direct,
}

/// Run one dispatch of `kernel` over a `width * height` field, writing every
/// field cell of `out` exactly once.
pub fn dispatch<K: GroupKernel>(
    kernel: &K,
    layout: &KernelLayout,
    width: usize,
    height: usize,
    out: &mut [K::Output],
    mode: ExecutionMode,
) -> Result<(), SimError> {
    layout.check()?;
    debug_assert_eq!(out.len(), width * height);
    match mode {
        ExecutionMode::Phased => {
            dispatch_phased(kernel, layout, width, height, out);
            Ok(())
        },
        ExecutionMode::Threaded => dispatch_threaded(kernel, layout, width, height, out),
        ExecutionMode::Direct => {
            dispatch_direct(kernel, width, out);
            Ok(())
        },
    }
}

fn dispatch_direct<K: GroupKernel>(kernel: &K, width: usize, out: &mut [K::Output]) {
    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        for (x, value) in row.iter_mut().enumerate() {
            *value = kernel.direct([x, y]);
        }
    });
}

fn dispatch_phased<K: GroupKernel>(
    kernel: &K,
    layout: &KernelLayout,
    width: usize,
    height: usize,
    out: &mut [K::Output],
) {
    let [groups_x, _] = layout.group_count(width, height);
    let band_rows = layout.dispatch_size()[1];

    // A row of groups writes exactly one band of `band_rows` field rows
    out.par_chunks_mut(width * band_rows)
        .enumerate()
        .for_each(|(gy, band)| {
            let mut tile = SharedTile::new(layout.cache_size());
            for gx in 0..groups_x {
                run_group_phased(kernel, layout, [gx, gy], width, height, &mut tile, band);
            }
        });
}

fn run_group_phased<K: GroupKernel>(
    kernel: &K,
    layout: &KernelLayout,
    group_id: [usize; 2],
    width: usize,
    height: usize,
    tile: &mut SharedTile<K::Entry>,
    band: &mut [K::Output],
) {
    let band_origin = layout.dispatch_origin(group_id)[1];

    for local_id in layout.local_ids() {
        let inv = Invocation { group_id, local_id };
        for slot in inv.slots(layout) {
            tile.set(slot, kernel.load(layout.source_coord(group_id, slot)));
        }
    }

    // Barrier: every slot is written before any invocation reads a neighbour

    for local_id in layout.local_ids() {
        let inv = Invocation { group_id, local_id };
        for slot in inv.slots(layout) {
            if let Some(cell) = layout.output_cell(group_id, slot, width, height) {
                let row = cell[1] - band_origin;
                band[row * width + cell[0]] = kernel.compute(slot, cell, tile);
            }
        }
    }
}

fn dispatch_threaded<K: GroupKernel>(
    kernel: &K,
    layout: &KernelLayout,
    width: usize,
    height: usize,
    out: &mut [K::Output],
) -> Result<(), SimError> {
    let [groups_x, groups_y] = layout.group_count(width, height);
    for gy in 0..groups_y {
        for gx in 0..groups_x {
            for (cell, value) in run_group_threaded(kernel, layout, [gx, gy], width, height)? {
                out[cell[1] * width + cell[0]] = value;
            }
        }
    }
    Ok(())
}

fn run_group_threaded<K: GroupKernel>(
    kernel: &K,
    layout: &KernelLayout,
    group_id: [usize; 2],
    width: usize,
    height: usize,
) -> Result<Vec<([usize; 2], K::Output)>, SimError> {
    let layout = *layout;
    let tile = RwLock::new(SharedTile::<K::Entry>::new(layout.cache_size()));
    let barrier = Barrier::new(layout.invocations());
    // Set by any invocation whose load phase panicked. Every invocation still
    // reaches the barrier, so the group always completes.
    let failed = AtomicBool::new(false);

    thread::scope(|scope| {
        let handles: Vec<_> = layout
            .local_ids()
            .map(|local_id| {
                let tile = &tile;
                let barrier = &barrier;
                let failed = &failed;
                scope.spawn(move || -> Result<Vec<([usize; 2], K::Output)>, SimError> {
                    let inv = Invocation { group_id, local_id };

                    let loaded = panic::catch_unwind(AssertUnwindSafe(|| {
                        inv.slots(&layout)
                            .map(|slot| (slot, kernel.load(layout.source_coord(group_id, slot))))
                            .collect::<Vec<_>>()
                    }));
                    match loaded {
                        Ok(loaded) => match tile.write() {
                            Ok(mut cache) => {
                                for (slot, entry) in loaded {
                                    cache.set(slot, entry);
                                }
                            },
                            Err(_) => failed.store(true, Ordering::SeqCst),
                        },
                        Err(_) => failed.store(true, Ordering::SeqCst),
                    }

                    barrier.wait();

                    if failed.load(Ordering::SeqCst) {
                        return Err(SimError::ThreadPanicked);
                    }
                    let cache = tile.read().map_err(|_| SimError::ThreadPanicked)?;
                    panic::catch_unwind(AssertUnwindSafe(|| {
                        inv.slots(&layout)
                            .filter_map(|slot| {
                                layout
                                    .output_cell(group_id, slot, width, height)
                                    .map(|cell| (cell, kernel.compute(slot, cell, &cache)))
                            })
                            .collect()
                    }))
                    .map_err(|_| SimError::ThreadPanicked)
                })
            })
            .collect();

        let mut writes = Vec::new();
        let mut result = Ok(());
        for handle in handles {
            match handle.join().map_err(|_| SimError::ThreadPanicked) {
                Ok(Ok(cells)) => writes.extend(cells),
                Ok(Err(e)) | Err(e) => result = Err(e),
            }
        }
        result.map(|()| writes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Caches an integer-valued function of the clamped coordinate and sums
    /// the 3x3 neighbourhood from the cache.
    struct BoxSum {
        width: usize,
        height: usize,
    }

    impl BoxSum {
        fn value(&self, source: [i64; 2]) -> f64 {
            let x = source[0].clamp(0, self.width as i64 - 1);
            let y = source[1].clamp(0, self.height as i64 - 1);
            (x + 1000 * y) as f64
        }

        fn expected(&self, cell: [usize; 2]) -> f64 {
            let mut sum = 0.0;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    sum += self.value([cell[0] as i64 + dx, cell[1] as i64 + dy]);
                }
            }
            sum
        }
    }

    impl GroupKernel for BoxSum {
        type Entry = f64;
        type Output = f64;

        fn load(&self, source: [i64; 2]) -> f64 {
            self.value(source)
        }

        fn compute(&self, slot: [usize; 2], _cell: [usize; 2], tile: &SharedTile<f64>) -> f64 {
            let mut sum = 0.0;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    sum += tile.neighbor(slot, dx, dy);
                }
            }
            sum
        }

        fn direct(&self, cell: [usize; 2]) -> f64 {
            self.expected(cell)
        }
    }

    /// Emits the cell coordinate it was asked to compute
    struct Coordinates;

    impl GroupKernel for Coordinates {
        type Entry = u8;
        type Output = (usize, usize);

        fn load(&self, _source: [i64; 2]) -> u8 {
            0
        }

        fn compute(&self, _slot: [usize; 2], cell: [usize; 2], _tile: &SharedTile<u8>) -> (usize, usize) {
            (cell[0], cell[1])
        }

        fn direct(&self, cell: [usize; 2]) -> (usize, usize) {
            (cell[0], cell[1])
        }
    }

    /// Panics while loading one source coordinate
    struct FailingLoad {
        at: [i64; 2],
    }

    impl GroupKernel for FailingLoad {
        type Entry = u8;
        type Output = u8;

        fn load(&self, source: [i64; 2]) -> u8 {
            assert_ne!(source, self.at, "load failed");
            1
        }

        fn compute(&self, _slot: [usize; 2], _cell: [usize; 2], _tile: &SharedTile<u8>) -> u8 {
            1
        }

        fn direct(&self, _cell: [usize; 2]) -> u8 {
            1
        }
    }

    fn layouts() -> Vec<KernelLayout> {
        vec![
            KernelLayout::DEFAULT,
            KernelLayout::new([4, 2], [1, 3]),
            KernelLayout::new([3, 3], [1, 1]),
            KernelLayout::new([2, 5], [3, 2]),
        ]
    }

    #[test]
    fn test_default_layout_geometry() {
        let layout = KernelLayout::DEFAULT;
        assert_eq!(layout.cache_size(), [16, 16]);
        assert_eq!(layout.dispatch_size(), [14, 14]);
        assert_eq!(layout.invocations(), 64);
        assert_eq!(layout.group_count(100, 30), [8, 3]);
        assert_eq!(layout.group_count(14, 15), [1, 2]);
        assert!(layout.is_valid());
        assert!(!KernelLayout::new([1, 1], [2, 2]).is_valid());
    }

    #[test]
    fn test_slots_partition_cache() {
        for layout in layouts() {
            let [cw, ch] = layout.cache_size();
            let mut hits = vec![0u32; cw * ch];
            for local_id in layout.local_ids() {
                let inv = Invocation {
                    group_id: [0, 0],
                    local_id,
                };
                for slot in inv.slots(&layout) {
                    hits[slot[1] * cw + slot[0]] += 1;
                }
            }
            assert!(hits.iter().all(|&h| h == 1), "layout {:?}", layout);
        }
    }

    #[test]
    fn test_every_cell_written_once() {
        for layout in layouts() {
            for &(w, h) in &[(1, 1), (7, 5), (29, 31), (14, 14)] {
                let mut out = vec![(usize::MAX, usize::MAX); w * h];
                dispatch(&Coordinates, &layout, w, h, &mut out, ExecutionMode::Phased).unwrap();
                for y in 0..h {
                    for x in 0..w {
                        assert_eq!(out[y * w + x], (x, y), "layout {:?} at {}x{}", layout, w, h);
                    }
                }
            }
        }
    }

    #[test]
    fn test_cache_matches_direct_stencil() {
        for layout in layouts() {
            for mode in [
                ExecutionMode::Phased,
                ExecutionMode::Threaded,
                ExecutionMode::Direct,
            ] {
                let (w, h) = (23, 17);
                let kernel = BoxSum {
                    width: w,
                    height: h,
                };
                let mut out = vec![f64::NAN; w * h];
                dispatch(&kernel, &layout, w, h, &mut out, mode).unwrap();
                for y in 0..h {
                    for x in 0..w {
                        assert_eq!(
                            out[y * w + x],
                            kernel.expected([x, y]),
                            "layout {:?} mode {:?} cell ({}, {})",
                            layout,
                            mode,
                            x,
                            y
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_invalid_layout_rejected() {
        let layout = KernelLayout::new([1, 1], [2, 2]);
        assert_eq!(
            layout.check(),
            Err(SimError::InvalidLayout {
                group_size: [1, 1],
                tile_size: [2, 2]
            })
        );
        let mut out = vec![(0, 0); 4];
        assert!(dispatch(&Coordinates, &layout, 2, 2, &mut out, ExecutionMode::Phased).is_err());
        assert_eq!(KernelLayout::DEFAULT.check(), Ok(()));
    }

    #[test]
    fn test_direct_mode_writes_every_cell() {
        for &(w, h) in &[(1, 1), (7, 5), (29, 31)] {
            let mut out = vec![(usize::MAX, usize::MAX); w * h];
            dispatch(&Coordinates, &KernelLayout::DEFAULT, w, h, &mut out, ExecutionMode::Direct)
                .unwrap();
            for y in 0..h {
                for x in 0..w {
                    assert_eq!(out[y * w + x], (x, y));
                }
            }
        }
    }

    #[test]
    fn test_threaded_load_panic_releases_group() {
        // Run on a helper thread so a stuck barrier shows up as a timeout
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let kernel = FailingLoad { at: [3, 3] };
            let mut out = vec![0u8; 8 * 8];
            let result = dispatch(
                &kernel,
                &KernelLayout::DEFAULT,
                8,
                8,
                &mut out,
                ExecutionMode::Threaded,
            );
            let _ = tx.send(result);
        });
        let result = rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .unwrap_or_else(|_| panic!("threaded dispatch did not return"));
        assert_eq!(result, Err(SimError::ThreadPanicked));
    }

    #[test]
    fn test_halo_slots_produce_no_output() {
        let layout = KernelLayout::DEFAULT;
        let [cw, ch] = layout.cache_size();
        for x in 0..cw {
            assert_eq!(layout.output_cell([0, 0], [x, 0], 100, 100), None);
            assert_eq!(layout.output_cell([0, 0], [x, ch - 1], 100, 100), None);
        }
        assert_eq!(layout.output_cell([0, 0], [1, 1], 100, 100), Some([0, 0]));
        assert_eq!(layout.output_cell([1, 2], [14, 14], 100, 100), Some([27, 41]));
        // Past the field edge
        assert_eq!(layout.output_cell([0, 0], [6, 1], 5, 5), None);
    }

    #[test]
    fn test_source_coord_includes_halo() {
        let layout = KernelLayout::DEFAULT;
        assert_eq!(layout.source_coord([0, 0], [0, 0]), [-1, -1]);
        assert_eq!(layout.source_coord([1, 0], [15, 0]), [28, -1]);
    }
}
