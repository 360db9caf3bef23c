//! Uniform altitude grid.
//!
//! The vertical operator is discretized on `n` uniformly spaced samples
//! between the ground altitude `z_min` and the top of the computational
//! domain `z_max`. The two formulations historically use slightly
//! different spacing conventions, preserved here:
//!
//! - narrow-angle: `dz = (z_max - z_min) / (n - 1)`
//! - wide-angle:   `dz = (z_max - z_min) / n`

/// Uniform altitude grid, immutable once built.
#[derive(Clone, Debug)]
pub struct AltitudeGrid {
    /// Ground altitude in meters MSL.
    pub z_min: f64,
    /// Top of the computational domain in meters MSL.
    pub z_max: f64,
    /// Number of grid samples.
    pub n: usize,
    /// Grid spacing in meters.
    pub dz: f64,
}

impl AltitudeGrid {
    /// Grid for the narrow-angle formulation: spacing `(z_max - z_min)/(n-1)`.
    pub fn narrow_angle(z_min: f64, z_max: f64, n: usize) -> Self {
        assert!(n >= 2, "Need at least two grid points");
        assert!(z_max > z_min, "z_max must be greater than z_min");
        let dz = (z_max - z_min) / (n - 1) as f64;
        Self { z_min, z_max, n, dz }
    }

    /// Grid for the wide-angle formulation: spacing `(z_max - z_min)/n`.
    pub fn wide_angle(z_min: f64, z_max: f64, n: usize) -> Self {
        assert!(n >= 2, "Need at least two grid points");
        assert!(z_max > z_min, "z_max must be greater than z_min");
        let dz = (z_max - z_min) / n as f64;
        Self { z_min, z_max, n, dz }
    }

    /// Altitude of sample `i` in meters MSL: `z_min + i*dz`, clamped to
    /// `z_max` so rounding cannot push the last sample past the domain top.
    #[inline]
    pub fn altitude(&self, i: usize) -> f64 {
        (self.z_min + i as f64 * self.dz).min(self.z_max)
    }

    /// All sample altitudes in meters MSL.
    pub fn altitudes(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.altitude(i)).collect()
    }

    /// Number of grid samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Always false; a grid has at least two points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }
}
