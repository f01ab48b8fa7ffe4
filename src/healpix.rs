//! RING-scheme HEALPix geometry used as an equal-area spatial hash.
//!
//! The gridder only needs HEALPix as a rendezvous structure between input
//! samples and output pixels, so this module implements the minimal RING
//! operations: `ang2pix`, `pix2ang` and `query_disc`. The math follows the
//! standard HEALPix derivation (Górski et al.): the sphere is split into a
//! north polar cap (rings 1..nside-1 of 4·ring pixels), an equatorial belt
//! (rings nside..3·nside of 4·nside pixels, alternately phase-shifted by
//! half a pixel) and a mirrored south cap. Ring ordering is used throughout;
//! the choice is internal and consistent between all operations.
//!
//! `query_disc` walks the rings intersecting the latitude band of the disc
//! and selects the pixels whose centers fall inside the chord-limited
//! longitude bound, with explicit handling for discs containing a pole and
//! for longitude wrap at 0.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use crate::sphere::wrap_tau;

/// z = cos(colatitude) at which the equatorial belt meets the polar caps.
const TRANSITION_Z: f64 = 2.0 / 3.0;

/// Largest supported resolution order (nside = 2^29 keeps pixel ids in u64).
const MAX_ORDER: u32 = 29;

/// A fixed-nside RING-scheme HEALPix tessellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealpixGrid {
    nside: u64,
    npix: u64,
    /// Number of pixels in both polar caps combined north: 2·nside·(nside−1).
    ncap: u64,
}

impl HealpixGrid {
    /// Create a tessellation with the given nside (power of two, ≥ 1).
    pub fn new(nside: u64) -> Self {
        assert!(
            nside >= 1 && nside.is_power_of_two() && nside <= 1 << MAX_ORDER,
            "nside must be a power of two in [1, 2^{MAX_ORDER}], got {nside}"
        );
        Self {
            nside,
            npix: 12 * nside * nside,
            ncap: 2 * nside * (nside - 1),
        }
    }

    /// Smallest power-of-two nside whose pixel resolution is ≤ `max_res_rad`.
    pub fn for_resolution(max_res_rad: f64) -> Self {
        let mut nside = 1u64;
        while Self::resolution_for_nside(nside) > max_res_rad && nside < 1 << MAX_ORDER {
            nside *= 2;
        }
        Self::new(nside)
    }

    /// Approximate angular size of a pixel, sqrt(π/3)/nside radians.
    fn resolution_for_nside(nside: u64) -> f64 {
        (PI / 3.0).sqrt() / nside as f64
    }

    pub fn nside(&self) -> u64 {
        self.nside
    }

    pub fn npix(&self) -> u64 {
        self.npix
    }

    /// log2(nside).
    pub fn order(&self) -> u32 {
        self.nside.trailing_zeros()
    }

    /// Angular resolution of this tessellation, in radians.
    pub fn resolution(&self) -> f64 {
        Self::resolution_for_nside(self.nside)
    }

    // ── Coordinate → pixel ──────────────────────────────────────────────────

    /// RING pixel id containing (lon, lat), both in radians.
    pub fn ang2pix(&self, lon: f64, lat: f64) -> u64 {
        let nside = self.nside as i64;
        let z = lat.sin();
        let za = z.abs();
        // tt is the longitude in units of π/2, in [0, 4).
        let tt = wrap_tau(lon) / FRAC_PI_2;

        if za <= TRANSITION_Z {
            // Equatorial belt: locate the pixel between the two diagonal
            // edge-line families.
            let temp1 = self.nside as f64 * (0.5 + tt);
            let temp2 = self.nside as f64 * (z * 0.75);
            let jp = (temp1 - temp2) as i64; // ascending edge line
            let jm = (temp1 + temp2) as i64; // descending edge line

            let ir = nside + 1 + jp - jm; // ring counted from z = 2/3
            let kshift = 1 - (ir & 1); // rings with even ir are shifted
            let nl4 = 4 * nside;
            let ip = ((jp + jm - nside + kshift + 1) / 2).rem_euclid(nl4);

            (self.ncap as i64 + (ir - 1) * nl4 + ip) as u64
        } else {
            // Polar caps (Collignon projection region).
            let tp = tt.fract();
            let tmp = self.nside as f64 * (3.0 * (1.0 - za)).sqrt();
            let jp = (tp * tmp) as i64;
            let jm = ((1.0 - tp) * tmp) as i64;

            let ir = jp + jm + 1; // ring counted from the nearest pole
            let ip = ((tt * ir as f64) as i64).rem_euclid(4 * ir);

            if z > 0.0 {
                (2 * ir * (ir - 1) + ip) as u64
            } else {
                (self.npix as i64 - 2 * ir * (ir + 1) + ip) as u64
            }
        }
    }

    // ── Pixel → coordinate ──────────────────────────────────────────────────

    /// Center of the given RING pixel as (lon, lat) in radians.
    pub fn pix2ang(&self, pix: u64) -> (f64, f64) {
        debug_assert!(pix < self.npix, "pixel id {pix} out of range");
        let nside = self.nside as f64;

        if pix < self.ncap {
            // North polar cap.
            let iring = (1 + (1 + 2 * pix).isqrt()) >> 1;
            let iphi = (pix + 1) - 2 * iring * (iring - 1);

            let z = 1.0 - (iring * iring) as f64 / (3.0 * nside * nside);
            let phi = (iphi as f64 - 0.5) * FRAC_PI_2 / iring as f64;
            (phi, z.asin())
        } else if pix < self.npix - self.ncap {
            // Equatorial belt.
            let ip = pix - self.ncap;
            let nl4 = 4 * self.nside;
            let iring = ip / nl4 + self.nside; // ring counted from north pole
            let iphi = ip % nl4 + 1;

            // Odd (ring + nside) rings have their first pixel on the meridian.
            let fodd = if (iring + self.nside) & 1 == 1 { 1.0 } else { 0.5 };
            let z = (2.0 * self.nside as f64 - iring as f64) * 2.0 / (3.0 * nside);
            let phi = (iphi as f64 - fodd) * FRAC_PI_2 / nside;
            (phi, z.asin())
        } else {
            // South polar cap, mirror of the north.
            let ip = self.npix - pix;
            let iring = (1 + (2 * ip - 1).isqrt()) >> 1;
            let iphi = 4 * iring + 1 - (ip - 2 * iring * (iring - 1));

            let z = -1.0 + (iring * iring) as f64 / (3.0 * nside * nside);
            let phi = (iphi as f64 - 0.5) * FRAC_PI_2 / iring as f64;
            (phi, z.asin())
        }
    }

    // ── Ring metadata ───────────────────────────────────────────────────────

    /// For ring index 1..=4·nside−1: (first pixel id, pixels in ring, z of
    /// ring centers, half-pixel phase shift applied).
    fn ring_info(&self, ring: u64) -> (u64, u64, f64, bool) {
        debug_assert!(ring >= 1 && ring < 4 * self.nside);
        let nside = self.nside;
        if ring < nside {
            // North polar cap.
            let z = 1.0 - (ring * ring) as f64 / (3.0 * (nside * nside) as f64);
            (2 * ring * (ring - 1), 4 * ring, z, true)
        } else if ring <= 3 * nside {
            // Equatorial belt.
            let z = (2.0 * nside as f64 - ring as f64) * 2.0 / (3.0 * nside as f64);
            let shifted = (ring - nside) & 1 == 0;
            (self.ncap + (ring - nside) * 4 * nside, 4 * nside, z, shifted)
        } else {
            // South polar cap.
            let sr = 4 * nside - ring;
            let z = -1.0 + (sr * sr) as f64 / (3.0 * (nside * nside) as f64);
            (self.npix - 2 * sr * (sr + 1), 4 * sr, z, true)
        }
    }

    /// Index of the ring just above latitude-parameter z (0 = none).
    fn ring_above(&self, z: f64) -> u64 {
        let az = z.abs();
        if az <= TRANSITION_Z {
            (self.nside as f64 * (2.0 - 1.5 * z)) as u64
        } else {
            let iring = (self.nside as f64 * (3.0 * (1.0 - az)).sqrt()) as u64;
            if z > 0.0 {
                iring
            } else {
                4 * self.nside - iring - 1
            }
        }
    }

    // ── Disc queries ────────────────────────────────────────────────────────

    /// All RING pixels whose centers lie within `radius` of (lon, lat).
    ///
    /// Inputs in radians. Walks the rings intersecting the latitude band
    /// [lat − radius, lat + radius]; discs containing a pole return the
    /// complete polar rings, and the longitude bound wraps across lon = 0.
    /// The result is sorted.
    pub fn query_disc(&self, lon: f64, lat: f64, radius: f64) -> Vec<u64> {
        if radius >= PI {
            return (0..self.npix).collect();
        }

        let theta = FRAC_PI_2 - lat; // colatitude of disc center
        let phi0 = wrap_tau(lon);
        let cosang = radius.cos();
        let z0 = theta.cos();
        let sin_theta_sq = (1.0 - z0) * (1.0 + z0);

        let mut pixels = Vec::new();

        let rlat1 = theta - radius;
        let zmax = rlat1.cos();
        let irmin = self.ring_above(zmax) + 1;
        if rlat1 <= 0.0 {
            // North pole inside the disc: rings above irmin are fully inside.
            for ring in 1..irmin {
                self.push_full_ring(ring, &mut pixels);
            }
        }

        let rlat2 = theta + radius;
        let zmin = rlat2.cos();
        let irmax = self.ring_above(zmin);

        if sin_theta_sq > 0.0 {
            let xa = 1.0 / sin_theta_sq.sqrt();
            for ring in irmin..=irmax.min(4 * self.nside - 1) {
                let (_, _, z, _) = self.ring_info(ring);
                // cos(Δφ)·sinθ_ring; the chord-limited longitude bound.
                let x = (cosang - z * z0) * xa;
                let ysq = 1.0 - z * z - x * x;
                if ysq <= 0.0 {
                    // Ring entirely inside (x < 0) or entirely outside the disc.
                    if x < 0.0 {
                        self.push_full_ring(ring, &mut pixels);
                    }
                    continue;
                }
                let dphi = ysq.sqrt().atan2(x);
                self.push_ring_range(ring, phi0, dphi, &mut pixels);
            }
        } else {
            // Disc centered on a pole: every ring in the band is complete.
            for ring in irmin..=irmax.min(4 * self.nside - 1) {
                self.push_full_ring(ring, &mut pixels);
            }
        }

        if rlat2 >= PI {
            // South pole inside the disc: rings below irmax are fully inside.
            for ring in (irmax + 1)..(4 * self.nside) {
                self.push_full_ring(ring, &mut pixels);
            }
        }

        pixels.sort_unstable();
        pixels
    }

    fn push_full_ring(&self, ring: u64, out: &mut Vec<u64>) {
        let (start, npr, _, _) = self.ring_info(ring);
        out.extend(start..start + npr);
    }

    /// Append the pixels of `ring` whose center longitude lies within
    /// ±dphi of phi0, wrapping across 0.
    fn push_ring_range(&self, ring: u64, phi0: f64, dphi: f64, out: &mut Vec<u64>) {
        let (start, npr, _, shifted) = self.ring_info(ring);
        let shift = if shifted { 0.5 } else { 0.0 };

        // Pixel centers sit at φ = (i + shift)·2π/npr.
        let scale = npr as f64 / TAU;
        let ip_lo = (scale * (phi0 - dphi) - shift).ceil() as i64;
        let ip_hi = (scale * (phi0 + dphi) - shift).floor() as i64;
        if ip_lo > ip_hi {
            return;
        }
        if (ip_hi - ip_lo + 1) as u64 >= npr {
            out.extend(start..start + npr);
            return;
        }
        for i in ip_lo..=ip_hi {
            out.push(start + i.rem_euclid(npr as i64) as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sphere::true_angular_distance;

    fn deg2rad(d: f64) -> f64 {
        d.to_radians()
    }

    #[test]
    fn npix_and_caps() {
        let hpx = HealpixGrid::new(4);
        assert_eq!(hpx.npix(), 192);
        assert_eq!(hpx.order(), 2);
        let hpx1 = HealpixGrid::new(1);
        assert_eq!(hpx1.npix(), 12);
    }

    #[test]
    fn for_resolution_picks_smallest_sufficient_nside() {
        // resolution(nside) = sqrt(π/3)/nside
        let res16 = (std::f64::consts::PI / 3.0).sqrt() / 16.0;
        assert_eq!(HealpixGrid::for_resolution(res16).nside(), 16);
        // Slightly tighter cap forces the next power of two.
        assert_eq!(HealpixGrid::for_resolution(res16 * 0.99).nside(), 32);
        // A very loose cap is satisfied by nside = 1.
        assert_eq!(HealpixGrid::for_resolution(10.0).nside(), 1);
    }

    #[test]
    fn ang2pix_pix2ang_roundtrip() {
        // The center returned by pix2ang must map back to the same pixel.
        for &nside in &[1u64, 2, 4, 16, 64, 1024] {
            let hpx = HealpixGrid::new(nside);
            let step = (hpx.npix() / 97).max(1);
            for pix in (0..hpx.npix()).step_by(step as usize) {
                let (lon, lat) = hpx.pix2ang(pix);
                assert_eq!(
                    hpx.ang2pix(lon, lat),
                    pix,
                    "roundtrip failed at nside={nside} pix={pix}"
                );
            }
        }
    }

    #[test]
    fn pix2ang_centers_are_on_expected_rings() {
        let hpx = HealpixGrid::new(2);
        // nside=2: ring 1 holds pixels 0..3 at z = 1 - 1/12.
        let (_, lat) = hpx.pix2ang(0);
        assert!((lat.sin() - 11.0 / 12.0).abs() < 1e-14);
        // Equatorial ring at z = 0 holds pixels 20..27.
        let (_, lat) = hpx.pix2ang(20);
        assert!(lat.abs() < 1e-14);
        // Southernmost ring mirrors the north.
        let (_, lat) = hpx.pix2ang(44);
        assert!((lat.sin() + 11.0 / 12.0).abs() < 1e-14);
    }

    #[test]
    fn ang2pix_equator_and_poles() {
        let hpx = HealpixGrid::new(1);
        // Near the north pole every longitude lands in ring 1 (pixels 0..3).
        assert!(hpx.ang2pix(deg2rad(10.0), deg2rad(89.9)) < 4);
        assert!(hpx.ang2pix(deg2rad(200.0), deg2rad(89.9)) < 4);
        // Near the south pole: last ring (pixels 8..11).
        assert!(hpx.ang2pix(deg2rad(10.0), deg2rad(-89.9)) >= 8);
    }

    /// Brute-force reference: all pixels whose centers are within the disc.
    fn query_disc_exhaustive(hpx: &HealpixGrid, lon: f64, lat: f64, radius: f64) -> Vec<u64> {
        (0..hpx.npix())
            .filter(|&pix| {
                let (plon, plat) = hpx.pix2ang(pix);
                true_angular_distance(lon, lat, plon, plat) <= radius
            })
            .collect()
    }

    #[test]
    fn query_disc_matches_exhaustive_scan() {
        let cases = [
            (16u64, 0.0, 0.0, 10.0),
            (16, 45.0, 30.0, 5.0),
            (16, 123.4, -47.9, 17.3),
            (32, 359.5, 0.1, 2.0),  // wraps across lon = 0
            (32, 10.0, 87.0, 6.0),  // crosses the north pole
            (32, 80.0, -88.5, 4.0), // crosses the south pole
            (8, 200.0, 65.0, 33.0),
            (4, 0.0, 90.0, 20.0), // centered exactly on the pole
        ];
        for &(nside, lon_deg, lat_deg, radius_deg) in &cases {
            let hpx = HealpixGrid::new(nside);
            let (lon, lat, radius) = (deg2rad(lon_deg), deg2rad(lat_deg), deg2rad(radius_deg));
            let got = hpx.query_disc(lon, lat, radius);
            let expected = query_disc_exhaustive(&hpx, lon, lat, radius);
            assert_eq!(
                got, expected,
                "query_disc mismatch at nside={nside} center=({lon_deg}, {lat_deg}) r={radius_deg}"
            );
        }
    }

    #[test]
    fn query_disc_whole_sphere() {
        let hpx = HealpixGrid::new(4);
        let all = hpx.query_disc(0.0, 0.0, PI);
        assert_eq!(all.len() as u64, hpx.npix());
    }

    #[test]
    fn query_disc_tiny_radius_contains_own_pixel() {
        let hpx = HealpixGrid::new(64);
        let (lon, lat) = hpx.pix2ang(12345);
        let pixels = hpx.query_disc(lon, lat, 1e-6);
        assert_eq!(pixels, vec![12345]);
    }
}
