//! Flux-conserving convolution gridding of irregular sky samples onto
//! pixel grids.
//!
//! Samples, each a (lon, lat) position with spectral and weight vectors,
//! are distributed into every output pixel within a kernel support radius,
//! weighted by a radial or elliptical kernel of the angular separation.
//! A HEALPix-based spatial hash keeps the sample/pixel rendezvous far from
//! quadratic, and the accumulation is transposed over output pixels so it
//! parallelizes without locks.

pub mod error;
pub mod healpix;
pub mod kernels;
pub mod sphere;

mod gridder;

pub use error::GridError;
pub use gridder::Gridder;
pub use kernels::{Kernel, KernelParams};

/// Floating-point element type of the accumulation cubes.
///
/// Implemented for `f32` and `f64`; data, weights and both cubes of one
/// gridder share the same element type by construction.
pub trait GridFloat:
    num_traits::Float + std::ops::AddAssign + Send + Sync + std::fmt::Debug + 'static
{
    fn from_f64(x: f64) -> Self;
}

impl GridFloat for f32 {
    #[inline]
    fn from_f64(x: f64) -> Self {
        x as f32
    }
}

impl GridFloat for f64 {
    #[inline]
    fn from_f64(x: f64) -> Self {
        x
    }
}

/// Single-precision gridder.
pub type Gridder32 = Gridder<f32>;
/// Double-precision gridder.
pub type Gridder64 = Gridder<f64>;

/// Output precision selector for thin entry layers that take the precision
/// as a runtime string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Float32,
    Float64,
}

impl std::str::FromStr for Dtype {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, GridError> {
        match s {
            "float32" => Ok(Dtype::Float32),
            "float64" => Ok(Dtype::Float64),
            other => Err(GridError::InvalidDtype(other.to_string())),
        }
    }
}
