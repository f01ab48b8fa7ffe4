//! HEALPix rendezvous maps between input samples and output pixels.
//!
//! Two lookup structures meet here. `target_by_cell` is built once per
//! target geometry and nside: it maps each HEALPix cell to the output
//! pixels whose centers fall in it (a finer WCS grid than the HEALPix grid
//! puts several pixels in one cell, so the values are lists). At every
//! `grid()` call, each input sample queries a disc of neighboring cells and
//! is appended to the candidate list of every output pixel living under
//! those cells.
//!
//! The disc is looked up for the *cell center* of the sample, not its exact
//! position, so the result can be memoized per cell in `disc_cache`. The
//! disc radius therefore carries a one-cell pad (added by the caller); the
//! exact distance filter in the accumulation loop rejects the overshoot.

use rustc_hash::FxHashMap;
use tracing::debug;

use super::target::TargetGrid;
use crate::healpix::HealpixGrid;

#[derive(Debug)]
pub(crate) struct HpxRendezvous {
    grid: HealpixGrid,
    /// Disc radius: kernel support plus one HEALPix resolution element.
    disc_size: f64,
    target_by_cell: FxHashMap<u64, Vec<u32>>,
    disc_cache: FxHashMap<u64, Vec<u64>>,
}

impl HpxRendezvous {
    pub(crate) fn new(grid: HealpixGrid, disc_size: f64, target: &TargetGrid) -> Self {
        let mut target_by_cell: FxHashMap<u64, Vec<u32>> = FxHashMap::default();
        for (idx, (&lon, &lat)) in target.lons_rad.iter().zip(&target.lats_rad).enumerate() {
            let cell = grid.ang2pix(lon, lat);
            target_by_cell.entry(cell).or_default().push(idx as u32);
        }
        debug!(
            "target cell map: {} pixels in {} HEALPix cells at nside {}",
            target.len(),
            target_by_cell.len(),
            grid.nside()
        );
        Self {
            grid,
            disc_size,
            target_by_cell,
            disc_cache: FxHashMap::default(),
        }
    }

    pub(crate) fn nside(&self) -> u64 {
        self.grid.nside()
    }

    pub(crate) fn disc_size(&self) -> f64 {
        self.disc_size
    }

    pub(crate) fn disc_cache_len(&self) -> usize {
        self.disc_cache.len()
    }

    /// Change the disc radius, dropping the now-invalid cached discs.
    pub(crate) fn set_disc_size(&mut self, disc_size: f64) {
        self.disc_size = disc_size;
        self.disc_cache.clear();
    }

    /// For every output pixel, the indices of the input samples that may
    /// contribute to it. Returned as a dense per-target-index table.
    pub(crate) fn collect_candidates(
        &mut self,
        lons_rad: &[f64],
        lats_rad: &[f64],
        n_targets: usize,
    ) -> Vec<Vec<u32>> {
        let Self {
            grid,
            disc_size,
            target_by_cell,
            disc_cache,
        } = self;

        let mut out: Vec<Vec<u32>> = vec![Vec::new(); n_targets];
        let mut pairs = 0usize;
        for (i, (&lon, &lat)) in lons_rad.iter().zip(lats_rad).enumerate() {
            let cell = grid.ang2pix(lon, lat);
            let disc = disc_cache.entry(cell).or_insert_with(|| {
                let (clon, clat) = grid.pix2ang(cell);
                grid.query_disc(clon, clat, *disc_size)
            });
            for neighbor in disc.iter() {
                if let Some(targets) = target_by_cell.get(neighbor) {
                    for &t in targets {
                        out[t as usize].push(i as u32);
                        pairs += 1;
                    }
                }
            }
        }
        debug!(
            "candidate collection: {} samples, {} candidate pairs, {} cached discs",
            lons_rad.len(),
            pairs,
            disc_cache.len()
        );
        out
    }
}
