//! Gridding kernel registry.
//!
//! The kernel set is closed and known at compile time, so dispatch is a
//! tagged enum rather than a trait object. A kernel maps an angular
//! separation (in degrees, matching the parameter units) and, for the
//! direction-dependent kernels, a great-circle bearing (radians, east of
//! north) to a convolution weight. Kernel values beyond the configured
//! support radius are never evaluated; the gridder's exact distance filter
//! handles truncation.

use ndarray::Array2;

use crate::error::GridError;

/// A convolution kernel from the closed registry.
///
/// Width parameters (`sigma`, table steps) are in degrees; orientation
/// parameters (`pa`, bearings) are in radians east of north.
#[derive(Debug, Clone)]
pub enum Kernel {
    /// Radial Gaussian: `exp(-d²/2σ²)`.
    Gauss1d { sigma: f64 },
    /// Elliptical Gaussian evaluated in the frame rotated by the position
    /// angle `pa`.
    Gauss2d {
        sigma_maj: f64,
        sigma_min: f64,
        pa: f64,
    },
    /// `sinc(d/aσ)·exp(-(d/bσ)²)` with the normalized sinc convention.
    TaperedSinc { sigma: f64, a: f64, b: f64 },
    /// Linearly interpolated radial lookup table. Sample `i` sits at
    /// distance `(i - refpix)·dx` degrees.
    Vector1d {
        values: Vec<f64>,
        refpix: f64,
        dx: f64,
    },
    /// Bilinearly interpolated 2D lookup table, indexed `[iy, ix]` at plane
    /// offsets `(d·cos(bearing), d·sin(bearing))` degrees.
    Matrix2d {
        values: Array2<f64>,
        refpix: (f64, f64),
        step: (f64, f64),
    },
}

/// Parameters accepted by [`Kernel::from_spec`], one shape per kernel family.
#[derive(Debug, Clone)]
pub enum KernelParams {
    /// Flat parameters for the analytic kernels.
    Scalars(Vec<f64>),
    /// Tabulated radial profile.
    Vector {
        values: Vec<f64>,
        refpix: f64,
        dx: f64,
    },
    /// Tabulated 2D profile.
    Matrix {
        values: Array2<f64>,
        refpix: (f64, f64),
        step: (f64, f64),
    },
}

impl Kernel {
    /// Construct a kernel from its registry name and a parameter block.
    ///
    /// Scalar parameter order matches the registry table: `gauss1d` takes
    /// `[sigma]`, `gauss2d` takes `[sigma_maj, sigma_min, pa]` and
    /// `tapered_sinc` takes `[sigma, a, b]`. Returns `UnknownKernel` for a
    /// name outside the closed set and `ArityMismatch` when the parameter
    /// block does not fit the kernel.
    pub fn from_spec(kind: &str, params: KernelParams) -> Result<Self, GridError> {
        match (kind, params) {
            ("gauss1d", KernelParams::Scalars(p)) => {
                let [sigma] = expect_scalars::<1>("gauss1d", "1 parameter (sigma)", &p)?;
                require_positive("gauss1d", "sigma", sigma)?;
                Ok(Kernel::Gauss1d { sigma })
            }
            ("gauss2d", KernelParams::Scalars(p)) => {
                let [sigma_maj, sigma_min, pa] =
                    expect_scalars::<3>("gauss2d", "3 parameters (sigma_maj, sigma_min, pa)", &p)?;
                require_positive("gauss2d", "sigma_maj", sigma_maj)?;
                require_positive("gauss2d", "sigma_min", sigma_min)?;
                Ok(Kernel::Gauss2d {
                    sigma_maj,
                    sigma_min,
                    pa,
                })
            }
            ("tapered_sinc", KernelParams::Scalars(p)) => {
                let [sigma, a, b] =
                    expect_scalars::<3>("tapered_sinc", "3 parameters (sigma, a, b)", &p)?;
                require_positive("tapered_sinc", "sigma", sigma)?;
                require_positive("tapered_sinc", "a", a)?;
                require_positive("tapered_sinc", "b", b)?;
                Ok(Kernel::TaperedSinc { sigma, a, b })
            }
            ("vector1d", KernelParams::Vector { values, refpix, dx }) => {
                if values.is_empty() {
                    return Err(GridError::ArityMismatch {
                        kind: "vector1d",
                        expected: "a non-empty lookup vector",
                        got: "an empty vector".into(),
                    });
                }
                require_positive("vector1d", "dx", dx)?;
                Ok(Kernel::Vector1d { values, refpix, dx })
            }
            ("matrix2d", KernelParams::Matrix {
                values,
                refpix,
                step,
            }) => {
                if values.is_empty() {
                    return Err(GridError::ArityMismatch {
                        kind: "matrix2d",
                        expected: "a non-empty lookup matrix",
                        got: "an empty matrix".into(),
                    });
                }
                require_positive("matrix2d", "step.0", step.0)?;
                require_positive("matrix2d", "step.1", step.1)?;
                Ok(Kernel::Matrix2d {
                    values,
                    refpix,
                    step,
                })
            }
            (kind @ ("gauss1d" | "gauss2d" | "tapered_sinc"), params) => {
                Err(GridError::ArityMismatch {
                    kind: registry_name(kind),
                    expected: "scalar parameters",
                    got: params_shape(&params),
                })
            }
            ("vector1d", params) => Err(GridError::ArityMismatch {
                kind: "vector1d",
                expected: "a lookup vector with refpix and dx",
                got: params_shape(&params),
            }),
            ("matrix2d", params) => Err(GridError::ArityMismatch {
                kind: "matrix2d",
                expected: "a lookup matrix with refpix and step",
                got: params_shape(&params),
            }),
            (other, _) => Err(GridError::UnknownKernel(other.to_string())),
        }
    }

    /// Whether the inner loop must compute the great-circle bearing.
    pub fn bearing_needed(&self) -> bool {
        matches!(self, Kernel::Gauss2d { .. } | Kernel::Matrix2d { .. })
    }

    /// Kernel weight at angular separation `dist_deg` (degrees) and bearing
    /// `bearing_rad` (radians east of north; ignored by radial kernels).
    pub fn evaluate(&self, dist_deg: f64, bearing_rad: f64) -> f64 {
        match self {
            Kernel::Gauss1d { sigma } => (-0.5 * dist_deg * dist_deg / (sigma * sigma)).exp(),
            Kernel::Gauss2d {
                sigma_maj,
                sigma_min,
                pa,
            } => {
                let (s, c) = (bearing_rad - pa).sin_cos();
                let along_maj = dist_deg * c;
                let along_min = dist_deg * s;
                (-0.5
                    * (along_maj * along_maj / (sigma_maj * sigma_maj)
                        + along_min * along_min / (sigma_min * sigma_min)))
                    .exp()
            }
            Kernel::TaperedSinc { sigma, a, b } => {
                let taper = dist_deg / (b * sigma);
                sinc(dist_deg / (a * sigma)) * (-taper * taper).exp()
            }
            Kernel::Vector1d { values, refpix, dx } => {
                lerp_lookup(values, refpix + dist_deg / dx)
            }
            Kernel::Matrix2d {
                values,
                refpix,
                step,
            } => {
                let (s, c) = bearing_rad.sin_cos();
                let fx = refpix.0 + dist_deg * c / step.0;
                let fy = refpix.1 + dist_deg * s / step.1;
                bilerp_lookup(values, fx, fy)
            }
        }
    }
}

fn registry_name(kind: &str) -> &'static str {
    match kind {
        "gauss1d" => "gauss1d",
        "gauss2d" => "gauss2d",
        "tapered_sinc" => "tapered_sinc",
        "vector1d" => "vector1d",
        _ => "matrix2d",
    }
}

fn params_shape(params: &KernelParams) -> String {
    match params {
        KernelParams::Scalars(p) => format!("{} scalar(s)", p.len()),
        KernelParams::Vector { values, .. } => format!("a {}-element vector", values.len()),
        KernelParams::Matrix { values, .. } => {
            format!("a {}x{} matrix", values.nrows(), values.ncols())
        }
    }
}

fn expect_scalars<const N: usize>(
    kind: &'static str,
    expected: &'static str,
    p: &[f64],
) -> Result<[f64; N], GridError> {
    <[f64; N]>::try_from(p).map_err(|_| GridError::ArityMismatch {
        kind,
        expected,
        got: format!("{} scalar(s)", p.len()),
    })
}

fn require_positive(kind: &'static str, name: &str, value: f64) -> Result<(), GridError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(GridError::ArityMismatch {
            kind,
            expected: "positive finite parameters",
            got: format!("{name} = {value}"),
        })
    }
}

/// Normalized sinc: sin(πx)/(πx), with sinc(0) = 1.
#[inline]
fn sinc(x: f64) -> f64 {
    let px = std::f64::consts::PI * x;
    if px.abs() < 1e-12 {
        1.0
    } else {
        px.sin() / px
    }
}

/// Linear interpolation into `values` at fractional position `fpos`;
/// zero outside the table.
fn lerp_lookup(values: &[f64], fpos: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let last = (values.len() - 1) as f64;
    if !(0.0..=last).contains(&fpos) {
        return 0.0;
    }
    let i0 = fpos.floor() as usize;
    if i0 as f64 == last {
        return values[values.len() - 1];
    }
    let frac = fpos - i0 as f64;
    values[i0] * (1.0 - frac) + values[i0 + 1] * frac
}

/// Bilinear interpolation into `values[[iy, ix]]` at fractional position
/// (fx, fy); zero outside the table.
fn bilerp_lookup(values: &Array2<f64>, fx: f64, fy: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let last_x = (values.ncols() - 1) as f64;
    let last_y = (values.nrows() - 1) as f64;
    if !(0.0..=last_x).contains(&fx) || !(0.0..=last_y).contains(&fy) {
        return 0.0;
    }
    let ix = (fx.floor() as usize).min(values.ncols().saturating_sub(2));
    let iy = (fy.floor() as usize).min(values.nrows().saturating_sub(2));
    let tx = fx - ix as f64;
    let ty = fy - iy as f64;

    let ix1 = (ix + 1).min(values.ncols() - 1);
    let iy1 = (iy + 1).min(values.nrows() - 1);
    values[[iy, ix]] * (1.0 - tx) * (1.0 - ty)
        + values[[iy, ix1]] * tx * (1.0 - ty)
        + values[[iy1, ix]] * (1.0 - tx) * ty
        + values[[iy1, ix1]] * tx * ty
}
