//! The gridder: target geometry, kernel configuration and the gridding
//! entry point.
//!
//! A `Gridder` is constructed once per target geometry, configured with
//! `set_kernel`, and fed samples through repeated `grid` calls which
//! accumulate into the data and weight cubes. `datacube()` performs the
//! flux-conserving normalization (weighted sum divided by summed weights).
//!
//! `set_kernel` may be called again between campaigns: the HEALPix
//! rendezvous structures are only rebuilt when the requested resolution
//! changes the nside, and the memoized disc lookups are only dropped when
//! the kernel support actually moves (0.1-arcsecond tolerance), so
//! re-issuing identical settings is free.

mod accumulate;
mod hashes;
mod target;

use ndarray::{Array2, Array3, ArrayView2};
use tracing::{debug, info};

use crate::error::GridError;
use crate::healpix::HealpixGrid;
use crate::kernels::{Kernel, KernelParams};
use crate::sphere::lonlat_to_uvec;
use crate::GridFloat;

use accumulate::SampleSet;
use hashes::HpxRendezvous;
use target::TargetGrid;

/// Tolerance for deciding whether kernel geometry changed, ≈ 0.1 arcsec.
const GEOMETRY_TOL_RAD: f64 = 3e-5;

#[derive(Debug)]
struct KernelState {
    kernel: Kernel,
    support_rad: f64,
}

/// Convolution-based resampler from irregular sky samples onto a fixed set
/// of output pixels.
///
/// `F` selects the accumulation precision (`f32` or `f64`); data, weights
/// and both cubes share it by construction.
#[derive(Debug)]
pub struct Gridder<F: GridFloat> {
    target: TargetGrid,
    datacube: Array3<F>,
    weightscube: Array3<F>,
    kernel: Option<KernelState>,
    rendezvous: Option<HpxRendezvous>,
    pool: rayon::ThreadPool,
}

impl<F: GridFloat> Gridder<F> {
    // ── Construction ────────────────────────────────────────────────────────

    /// Gridder onto a rectangular projection grid of shape
    /// (channels, ny, nx).
    ///
    /// `pixel_to_world` maps 1-based pixel indices (x, y) to (lon, lat) in
    /// degrees. Non-finite coordinates mark pixels outside the projection;
    /// they are filtered once here and stay zero in both cubes.
    pub fn from_projection(
        shape: (usize, usize, usize),
        pixel_to_world: impl Fn(f64, f64) -> (f64, f64),
    ) -> Result<Self, GridError> {
        Self::with_target(TargetGrid::from_projection(shape, pixel_to_world), None)
    }

    /// Like [`from_projection`](Self::from_projection) but accumulating into
    /// caller-owned cubes, which are not zeroed (supports additive gridding
    /// campaigns).
    pub fn from_projection_with_buffers(
        shape: (usize, usize, usize),
        pixel_to_world: impl Fn(f64, f64) -> (f64, f64),
        datacube: Array3<F>,
        weightscube: Array3<F>,
    ) -> Result<Self, GridError> {
        Self::with_target(
            TargetGrid::from_projection(shape, pixel_to_world),
            Some((datacube, weightscube)),
        )
    }

    /// Gridder onto an unordered list of sight-line positions (degrees),
    /// treated as a (channels, 1, n) cube with one position per x index.
    pub fn from_sight_lines(
        lons_deg: &[f64],
        lats_deg: &[f64],
        channels: usize,
    ) -> Result<Self, GridError> {
        Self::with_target(
            TargetGrid::from_sight_lines(lons_deg, lats_deg, channels)?,
            None,
        )
    }

    /// Like [`from_sight_lines`](Self::from_sight_lines) with caller-owned
    /// cubes.
    pub fn from_sight_lines_with_buffers(
        lons_deg: &[f64],
        lats_deg: &[f64],
        channels: usize,
        datacube: Array3<F>,
        weightscube: Array3<F>,
    ) -> Result<Self, GridError> {
        Self::with_target(
            TargetGrid::from_sight_lines(lons_deg, lats_deg, channels)?,
            Some((datacube, weightscube)),
        )
    }

    fn with_target(
        target: TargetGrid,
        buffers: Option<(Array3<F>, Array3<F>)>,
    ) -> Result<Self, GridError> {
        let shape = target.shape;
        let (datacube, weightscube) = match buffers {
            Some((datacube, weightscube)) => {
                check_cube_shape("datacube", datacube.dim(), shape)?;
                check_cube_shape("weightscube", weightscube.dim(), shape)?;
                (datacube, weightscube)
            }
            None => (Array3::zeros(shape), Array3::zeros(shape)),
        };
        Ok(Self {
            target,
            datacube,
            weightscube,
            kernel: None,
            rendezvous: None,
            pool: build_pool(0)?,
        })
    }

    // ── Configuration ───────────────────────────────────────────────────────

    /// Select the gridding kernel.
    ///
    /// `kind` names a kernel from the closed registry (see
    /// [`Kernel::from_spec`]); `support_radius_deg` is the truncation radius
    /// and `hpx_max_resolution_deg` caps the HEALPix cell size used for the
    /// spatial hash (half the support radius is a reasonable choice).
    pub fn set_kernel(
        &mut self,
        kind: &str,
        params: KernelParams,
        support_radius_deg: f64,
        hpx_max_resolution_deg: f64,
    ) -> Result<(), GridError> {
        let kernel = Kernel::from_spec(kind, params)?;
        if !(support_radius_deg > 0.0 && support_radius_deg.is_finite()) {
            return Err(GridError::GeometryError(format!(
                "kernel support radius must be positive and finite, got {support_radius_deg}"
            )));
        }
        if !(hpx_max_resolution_deg > 0.0 && hpx_max_resolution_deg.is_finite()) {
            return Err(GridError::GeometryError(format!(
                "HEALPix max resolution must be positive and finite, got {hpx_max_resolution_deg}"
            )));
        }
        let support_rad = support_radius_deg.to_radians();
        let grid = HealpixGrid::for_resolution(hpx_max_resolution_deg.to_radians());
        // Padding by one cell makes the per-cell disc lookup conservative.
        let disc_size = support_rad + grid.resolution();

        match self.rendezvous.as_mut() {
            Some(r) if r.nside() == grid.nside() => {
                if (r.disc_size() - disc_size).abs() > GEOMETRY_TOL_RAD {
                    debug!(
                        "kernel support changed, dropping {} cached discs",
                        r.disc_cache_len()
                    );
                    r.set_disc_size(disc_size);
                }
            }
            _ => {
                info!(
                    "building HEALPix rendezvous at nside {} (resolution {:.3e} rad)",
                    grid.nside(),
                    grid.resolution()
                );
                self.rendezvous = Some(HpxRendezvous::new(grid, disc_size, &self.target));
            }
        }
        self.kernel = Some(KernelState {
            kernel,
            support_rad,
        });
        Ok(())
    }

    /// Resize the worker pool. `0` selects one worker per core.
    pub fn set_num_threads(&mut self, num_threads: usize) -> Result<(), GridError> {
        self.pool = build_pool(num_threads)?;
        Ok(())
    }

    // ── Gridding ────────────────────────────────────────────────────────────

    /// Accumulate a batch of samples into the cubes.
    ///
    /// `lons_deg`/`lats_deg` hold one position per sample; `data` and
    /// `weights` are (samples × channels). Passing `None` for `weights`
    /// weighs every channel of every sample equally. Results add onto
    /// whatever the cubes already hold.
    pub fn grid<'a>(
        &mut self,
        lons_deg: &[f64],
        lats_deg: &[f64],
        data: ArrayView2<'a, F>,
        weights: Option<ArrayView2<'a, F>>,
    ) -> Result<(), GridError> {
        let n = lons_deg.len();
        if lats_deg.len() != n {
            return Err(GridError::ShapeMismatch(format!(
                "lons has {n} entries but lats has {}",
                lats_deg.len()
            )));
        }
        if data.nrows() != n {
            return Err(GridError::ShapeMismatch(format!(
                "{n} sample positions but data has {} rows",
                data.nrows()
            )));
        }
        let nchan = self.target.shape.0;
        if data.ncols() != nchan {
            return Err(GridError::ShapeMismatch(format!(
                "data has {} channels but the target cube has {nchan}",
                data.ncols()
            )));
        }
        if let Some(w) = &weights {
            if w.dim() != data.dim() {
                return Err(GridError::ShapeMismatch(format!(
                    "weights shape {:?} differs from data shape {:?}",
                    w.dim(),
                    data.dim()
                )));
            }
        }
        let state = self.kernel.as_ref().ok_or(GridError::KernelNotSet)?;
        let rendezvous = self.rendezvous.as_mut().ok_or(GridError::KernelNotSet)?;

        let lons_rad: Vec<f64> = lons_deg.iter().map(|l| l.to_radians()).collect();
        let lats_rad: Vec<f64> = lats_deg.iter().map(|b| b.to_radians()).collect();
        let uvecs: Vec<_> = lons_rad
            .iter()
            .zip(&lats_rad)
            .map(|(&l, &b)| lonlat_to_uvec(l, b))
            .collect();

        let candidates = rendezvous.collect_candidates(&lons_rad, &lats_rad, self.target.len());
        let touched = candidates.iter().filter(|c| !c.is_empty()).count();
        debug!("gridding {} samples onto {} touched pixels", n, touched);

        match weights {
            Some(w) => {
                let samples = SampleSet {
                    lons_rad: &lons_rad,
                    lats_rad: &lats_rad,
                    uvecs: &uvecs,
                    data,
                    weights: w,
                };
                accumulate::accumulate(
                    &self.pool,
                    &state.kernel,
                    state.support_rad,
                    &self.target,
                    &samples,
                    &candidates,
                    &mut self.datacube,
                    &mut self.weightscube,
                );
            }
            None => {
                let ones = Array2::ones(data.raw_dim());
                let samples = SampleSet {
                    lons_rad: &lons_rad,
                    lats_rad: &lats_rad,
                    uvecs: &uvecs,
                    data,
                    weights: ones.view(),
                };
                accumulate::accumulate(
                    &self.pool,
                    &state.kernel,
                    state.support_rad,
                    &self.target,
                    &samples,
                    &candidates,
                    &mut self.datacube,
                    &mut self.weightscube,
                );
            }
        }
        Ok(())
    }

    // ── Read-back ───────────────────────────────────────────────────────────

    /// The normalized cube: `datacube / weightscube` elementwise. Pixels
    /// that never received a contribution divide 0/0 and come out NaN.
    pub fn datacube(&self) -> Array3<F> {
        &self.datacube / &self.weightscube
    }

    /// The accumulated weight cube.
    pub fn weights(&self) -> &Array3<F> {
        &self.weightscube
    }

    /// The unnormalized accumulator (numerator of [`datacube`](Self::datacube)).
    pub fn unweighted_datacube(&self) -> &Array3<F> {
        &self.datacube
    }

    /// Zero both accumulators for a fresh campaign, keeping the target
    /// geometry and kernel configuration.
    pub fn clear_cubes(&mut self) {
        self.datacube.fill(F::zero());
        self.weightscube.fill(F::zero());
    }

    /// Output cube shape (channels, ny, nx).
    pub fn shape(&self) -> (usize, usize, usize) {
        self.target.shape
    }

    /// The nside of the spatial hash, once a kernel has been set.
    pub fn nside(&self) -> Option<u64> {
        self.rendezvous.as_ref().map(|r| r.nside())
    }

    /// Number of memoized disc lookups currently held.
    pub fn disc_cache_len(&self) -> usize {
        self.rendezvous.as_ref().map_or(0, |r| r.disc_cache_len())
    }
}

fn check_cube_shape(
    name: &str,
    got: (usize, usize, usize),
    expected: (usize, usize, usize),
) -> Result<(), GridError> {
    if got == expected {
        Ok(())
    } else {
        Err(GridError::GeometryError(format!(
            "pre-allocated {name} has shape {got:?} but the target geometry is {expected:?}"
        )))
    }
}

fn build_pool(num_threads: usize) -> Result<rayon::ThreadPool, GridError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| GridError::ThreadPool(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn flat_3x3() -> Gridder<f64> {
        Gridder::from_projection((1, 3, 3), |x, y| (x - 2.0, y - 2.0)).expect("valid target")
    }

    #[test]
    fn grid_without_kernel_fails() {
        let mut g = flat_3x3();
        let data = array![[1.0]];
        let err = g.grid(&[0.0], &[0.0], data.view(), None).unwrap_err();
        assert!(matches!(err, GridError::KernelNotSet));
    }

    #[test]
    fn grid_rejects_mismatched_shapes() {
        let mut g = flat_3x3();
        g.set_kernel("gauss1d", KernelParams::Scalars(vec![0.5]), 1.5, 0.75)
            .unwrap();

        let data = array![[1.0]];
        let err = g.grid(&[0.0, 1.0], &[0.0], data.view(), None).unwrap_err();
        assert!(matches!(err, GridError::ShapeMismatch(_)));

        let err = g.grid(&[0.0, 1.0], &[0.0, 0.0], data.view(), None).unwrap_err();
        assert!(matches!(err, GridError::ShapeMismatch(_)));

        let two_chan = array![[1.0, 2.0]];
        let err = g.grid(&[0.0], &[0.0], two_chan.view(), None).unwrap_err();
        assert!(matches!(err, GridError::ShapeMismatch(_)));

        let weights = array![[1.0], [1.0]];
        let err = g
            .grid(&[0.0], &[0.0], data.view(), Some(weights.view()))
            .unwrap_err();
        assert!(matches!(err, GridError::ShapeMismatch(_)));
    }

    #[test]
    fn prealloc_buffers_must_match_geometry() {
        let datacube = Array3::<f64>::zeros((1, 3, 3));
        let weightscube = Array3::<f64>::zeros((1, 2, 3));
        let err = Gridder::from_projection_with_buffers(
            (1, 3, 3),
            |x, y| (x - 2.0, y - 2.0),
            datacube,
            weightscube,
        )
        .unwrap_err();
        assert!(matches!(err, GridError::GeometryError(_)));
    }

    #[test]
    fn set_kernel_twice_with_same_args_keeps_caches() {
        let mut g = flat_3x3();
        g.set_kernel("gauss1d", KernelParams::Scalars(vec![0.5]), 1.5, 0.75)
            .unwrap();
        let nside = g.nside().unwrap();

        let data = array![[1.0]];
        g.grid(&[0.0], &[0.0], data.view(), None).unwrap();
        assert!(g.disc_cache_len() > 0);
        let cached = g.disc_cache_len();

        // Identical settings: nothing is rebuilt, the cache survives.
        g.set_kernel("gauss1d", KernelParams::Scalars(vec![0.5]), 1.5, 0.75)
            .unwrap();
        assert_eq!(g.nside(), Some(nside));
        assert_eq!(g.disc_cache_len(), cached);

        // A different support radius drops the memoized discs.
        g.set_kernel("gauss1d", KernelParams::Scalars(vec![0.5]), 0.8, 0.75)
            .unwrap();
        assert_eq!(g.disc_cache_len(), 0);
    }

    #[test]
    fn set_kernel_rejects_bad_geometry() {
        let mut g = flat_3x3();
        let err = g
            .set_kernel("gauss1d", KernelParams::Scalars(vec![0.5]), -1.0, 0.75)
            .unwrap_err();
        assert!(matches!(err, GridError::GeometryError(_)));
    }

    #[test]
    fn out_of_support_sample_leaves_cubes_unchanged() {
        let mut g = flat_3x3();
        g.set_kernel("gauss1d", KernelParams::Scalars(vec![0.5]), 1.5, 0.75)
            .unwrap();
        let data = array![[5.0]];
        g.grid(&[40.0], &[40.0], data.view(), None).unwrap();
        assert!(g.weights().iter().all(|&w| w == 0.0));
        assert!(g.unweighted_datacube().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn clear_cubes_resets_accumulators() {
        let mut g = flat_3x3();
        g.set_kernel("gauss1d", KernelParams::Scalars(vec![0.5]), 1.5, 0.75)
            .unwrap();
        let data = array![[2.0]];
        g.grid(&[0.0], &[0.0], data.view(), None).unwrap();
        assert!(g.weights().iter().any(|&w| w > 0.0));
        g.clear_cubes();
        assert!(g.weights().iter().all(|&w| w == 0.0));
    }
}
