//! Spherical geometry primitives on the celestial sphere.
//!
//! All functions take and return radians; conversion to and from degrees
//! happens at the public API boundary. Angular distances use the Vincenty
//! form (an `atan2` of cross-product magnitude over dot product), which
//! stays accurate for both tiny and near-antipodal separations where
//! `acos(dot)` loses precision.

use nalgebra::Vector3;

/// Great-circle angle between two points (lon, lat in radians), in radians.
pub fn true_angular_distance(l1: f64, b1: f64, l2: f64, b2: f64) -> f64 {
    let (sin_dl, cos_dl) = (l2 - l1).sin_cos();
    let (sin_b1, cos_b1) = b1.sin_cos();
    let (sin_b2, cos_b2) = b2.sin_cos();

    let cross = (cos_b2 * sin_dl).hypot(cos_b1 * sin_b2 - sin_b1 * cos_b2 * cos_dl);
    let dot = sin_b1 * sin_b2 + cos_b1 * cos_b2 * cos_dl;
    cross.atan2(dot)
}

/// Initial great-circle bearing from point 1 to point 2, measured east of
/// north and wrapped to [0, 2π). Inputs are (lon, lat) in radians.
pub fn great_circle_bearing(l1: f64, b1: f64, l2: f64, b2: f64) -> f64 {
    let (sin_dl, cos_dl) = (l2 - l1).sin_cos();
    let (sin_b1, cos_b1) = b1.sin_cos();
    let (sin_b2, cos_b2) = b2.sin_cos();

    wrap_tau((cos_b2 * sin_dl).atan2(cos_b1 * sin_b2 - sin_b1 * cos_b2 * cos_dl))
}

/// Wrap an angle into [0, 2π).
#[inline]
pub fn wrap_tau(angle: f64) -> f64 {
    let a = angle.rem_euclid(std::f64::consts::TAU);
    if a >= std::f64::consts::TAU {
        0.0
    } else {
        a
    }
}

/// Unit vector pointing at (lon, lat), both in radians.
#[inline]
pub fn lonlat_to_uvec(lon: f64, lat: f64) -> Vector3<f64> {
    let (sin_l, cos_l) = lon.sin_cos();
    let (sin_b, cos_b) = lat.sin_cos();
    Vector3::new(cos_b * cos_l, cos_b * sin_l, sin_b)
}

/// Great-circle angle between two unit vectors, in radians.
///
/// Same Vincenty form as [`true_angular_distance`] but for precomputed unit
/// vectors, which is what the accumulation inner loop works with.
#[inline]
pub fn angular_distance_uvec(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.cross(b).norm().atan2(a.dot(b))
}
