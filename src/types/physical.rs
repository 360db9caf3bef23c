//! Physical quantity newtypes.

use std::f64::consts::PI;
use std::fmt;

// =============================================================================
// Frequency
// =============================================================================

/// Acoustic frequency in Hz, always positive.
///
/// # Example
///
/// ```
/// use nm_rs::types::Frequency;
///
/// let f = Frequency::new(0.5);
/// assert!((f.angular() - std::f64::consts::PI).abs() < 1e-14);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Frequency(f64);

impl Frequency {
    /// Create a new frequency value.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the frequency is not positive.
    #[inline]
    pub fn new(hz: f64) -> Self {
        debug_assert!(hz > 0.0, "Frequency must be positive, got {}", hz);
        Self(hz)
    }

    /// Get the frequency in Hz.
    #[inline]
    pub fn hz(self) -> f64 {
        self.0
    }

    /// Angular frequency omega = 2*pi*f in rad/s.
    #[inline]
    pub fn angular(self) -> f64 {
        2.0 * PI * self.0
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

impl From<Frequency> for f64 {
    #[inline]
    fn from(f: Frequency) -> f64 {
        f.0
    }
}

// =============================================================================
// Azimuth
// =============================================================================

/// Propagation azimuth in degrees clockwise from north.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct AzimuthDeg(f64);

impl AzimuthDeg {
    /// Create a new azimuth value. No range normalization is applied.
    #[inline]
    pub fn new(degrees: f64) -> Self {
        Self(degrees)
    }

    /// Get the azimuth in degrees.
    #[inline]
    pub fn degrees(self) -> f64 {
        self.0
    }

    /// Get the azimuth in radians.
    #[inline]
    pub fn radians(self) -> f64 {
        self.0.to_radians()
    }
}

impl fmt::Display for AzimuthDeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} deg", self.0)
    }
}

// =============================================================================
// Wavenumber bounds
// =============================================================================

/// Valid horizontal-wavenumber spectral bounds `[k_min, k_max]` in 1/m.
///
/// `k_max` corresponds to the slowest admitted phase speed and `k_min` to
/// the fastest; both are derived from extremal effective sound speeds, or
/// set directly from externally supplied phase-speed limits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WavenumberBounds {
    /// Lower spectral bound in 1/m.
    pub k_min: f64,
    /// Upper spectral bound in 1/m.
    pub k_max: f64,
}

impl WavenumberBounds {
    /// Create bounds directly from wavenumbers.
    pub fn new(k_min: f64, k_max: f64) -> Self {
        debug_assert!(
            k_min <= k_max,
            "Wavenumber bounds out of order: [{}, {}]",
            k_min,
            k_max
        );
        Self { k_min, k_max }
    }

    /// Build bounds from phase-speed limits: `k_min = omega/c_max`,
    /// `k_max = omega/c_min`.
    pub fn from_phase_speeds(freq: Frequency, c_min: f64, c_max: f64) -> Self {
        let omega = freq.angular();
        Self {
            k_min: omega / c_max,
            k_max: omega / c_min,
        }
    }

    /// True if `k` lies within the bounds (inclusive).
    #[inline]
    pub fn contains(&self, k: f64) -> bool {
        k >= self.k_min && k <= self.k_max
    }

    /// Phase speeds `(c_slow, c_fast)` corresponding to `(k_max, k_min)`.
    pub fn phase_speed_range(&self, freq: Frequency) -> (f64, f64) {
        let omega = freq.angular();
        (omega / self.k_max, omega / self.k_min)
    }
}
