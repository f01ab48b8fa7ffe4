//! The parallel accumulation loop.
//!
//! Parallelism is over output-pixel columns: the cubes are iterated along
//! their x axis, and the candidate lists are transposed into per-column job
//! lists beforehand. Each worker therefore owns a disjoint set of (z, y, x)
//! destinations and no locking is needed on the accumulators. Within one
//! pixel the candidates are visited in collection order, so the per-pixel
//! summation order does not depend on the thread count.

use nalgebra::Vector3;
use ndarray::parallel::prelude::*;
use ndarray::{Array3, ArrayView2, Axis};

use super::target::TargetGrid;
use crate::kernels::Kernel;
use crate::sphere::{angular_distance_uvec, great_circle_bearing};
use crate::GridFloat;

/// Scheduler granularity: aim for at least this many output pixels per task.
const MIN_PIXELS_PER_TASK: usize = 100;

/// Per-grid() view of the input samples, coordinates already in radians.
pub(crate) struct SampleSet<'a, 'b, 'c, F: GridFloat> {
    pub lons_rad: &'a [f64],
    pub lats_rad: &'a [f64],
    pub uvecs: &'a [Vector3<f64>],
    pub data: ArrayView2<'b, F>,
    pub weights: ArrayView2<'c, F>,
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn accumulate<F: GridFloat>(
    pool: &rayon::ThreadPool,
    kernel: &Kernel,
    support_rad: f64,
    target: &TargetGrid,
    samples: &SampleSet<'_, '_, '_, F>,
    candidates: &[Vec<u32>],
    datacube: &mut Array3<F>,
    weightscube: &mut Array3<F>,
) {
    let (nchan, ny, nx) = target.shape;
    let bearing_needed = kernel.bearing_needed();

    // Transpose touched pixels into per-column job lists; the column index
    // is the parallel unit below.
    let mut col_jobs: Vec<Vec<u32>> = vec![Vec::new(); nx];
    for (t, cands) in candidates.iter().enumerate() {
        if !cands.is_empty() {
            col_jobs[target.xs[t] as usize].push(t as u32);
        }
    }

    let min_cols = (MIN_PIXELS_PER_TASK / ny.max(1)).max(1);

    pool.install(|| {
        datacube
            .axis_iter_mut(Axis(2))
            .into_par_iter()
            .zip(weightscube.axis_iter_mut(Axis(2)).into_par_iter())
            .zip(col_jobs.par_iter())
            .with_min_len(min_cols)
            .for_each(|((mut dcol, mut wcol), jobs)| {
                for &t in jobs {
                    let t = t as usize;
                    let y = target.ys[t] as usize;
                    let pixel_vec = &target.uvecs[t];

                    for &i in &candidates[t] {
                        let i = i as usize;
                        let dist_rad = angular_distance_uvec(pixel_vec, &samples.uvecs[i]);
                        // Candidates come from the padded disc lookup; the
                        // exact support check happens here.
                        if dist_rad >= support_rad {
                            continue;
                        }
                        let bearing = if bearing_needed {
                            great_circle_bearing(
                                target.lons_rad[t],
                                target.lats_rad[t],
                                samples.lons_rad[i],
                                samples.lats_rad[i],
                            )
                        } else {
                            0.0
                        };
                        let kw = F::from_f64(kernel.evaluate(dist_rad.to_degrees(), bearing));

                        for z in 0..nchan {
                            let wv = samples.weights[[i, z]] * kw;
                            dcol[[z, y]] += samples.data[[i, z]] * wv;
                            wcol[[z, y]] += wv;
                        }
                    }
                }
            });
    });
}
