//! Modal trace construction.
//!
//! Builds the discretized vertical operator's diagonal from the effective
//! sound speed, applies the ground boundary condition, and computes the
//! valid horizontal-wavenumber spectral bounds `[k_min, k_max]`. For
//! ground-to-ground propagation the upper bound may be tightened by a WKB
//! tunneling criterion that discards modes with negligible ground-level
//! energy.

pub mod sturm;

use crate::grid::AltitudeGrid;
use crate::types::{Frequency, WavenumberBounds};

/// Inputs common to both trace formulations.
#[derive(Clone, Debug)]
pub struct TraceSettings {
    /// Ground admittance in 1/m (zero for a plain rigid ground).
    pub admittance: f64,
    /// Acoustic frequency.
    pub freq: Frequency,
    /// Source height above ground in meters.
    pub source_height: f64,
    /// Receiver height above ground in meters.
    pub receiver_height: f64,
    /// Disable the WKB bound refinement even for ground-to-ground paths.
    pub turnoff_wkb: bool,
}

impl TraceSettings {
    fn ground_to_ground(&self) -> bool {
        self.source_height.abs() < 1.0e-3 && self.receiver_height.abs() < 1.0e-3
    }
}

/// Outcome of the WKB high-wavenumber truncation.
#[derive(Clone, Copy, Debug)]
pub struct WkbRefinement {
    /// Refined upper spectral bound in 1/m.
    pub k_max: f64,
    /// The unrefined bound `omega / min(c_eff)`.
    pub k_max_full: f64,
}

impl WkbRefinement {
    /// True if the refinement actually tightened the bound.
    pub fn tightened(&self) -> bool {
        self.k_max < self.k_max_full
    }

    /// Phase speeds `(refined, unrefined)` for progress reporting.
    pub fn phase_speeds(&self, freq: Frequency) -> (f64, f64) {
        let omega = freq.angular();
        (omega / self.k_max, omega / self.k_max_full)
    }
}

/// Trace of the narrow-angle (effective-sound-speed) operator.
#[derive(Clone, Debug)]
pub struct NarrowAngleTrace {
    /// Operator main-diagonal contribution `(omega/c_eff)^2`, boundary
    /// term already applied at index 0.
    pub diag: Vec<f64>,
    /// Valid spectral bounds.
    pub bounds: WavenumberBounds,
    /// WKB refinement outcome, when the ground-to-ground path used it.
    pub wkb: Option<WkbRefinement>,
}

/// Trace of the wide-angle (linearized quadratic) operator.
#[derive(Clone, Debug)]
pub struct WideAngleTrace {
    /// `(omega/c_eff)^2` diagonal used for mode counting.
    pub diag: Vec<f64>,
    /// `(omega/c0)^2` diagonal of the stiffness block, boundary term
    /// applied at index 0.
    pub kd: Vec<f64>,
    /// `(w/c0)^2 - 1` diagonal of the mass block.
    pub md: Vec<f64>,
    /// `-2*omega*w/c0^2` diagonal of the damping block.
    pub cd: Vec<f64>,
    /// Valid spectral bounds.
    pub bounds: WavenumberBounds,
    /// WKB refinement outcome, when the ground-to-ground path used it.
    pub wkb: Option<WkbRefinement>,
}

/// Ground boundary term for a centered finite-difference scheme:
/// `1/((1 + dz*admittance) * dz^2)`.
fn boundary_term(dz: f64, admittance: f64) -> f64 {
    (1.0 / (dz * admittance + 1.0)) / (dz * dz)
}

/// Lower spectral bound from the effective sound speed near the top of
/// the grid (roughly the top 10%).
fn k_min_from_top(c_eff: &[f64], omega: f64) -> f64 {
    let n = c_eff.len();
    let top = n - n / 10;
    let idx = (top + 1).min(n - 1);
    omega / c_eff[idx]
}

/// WKB tunneling search for the refined upper bound.
///
/// Scans trial `kk` from the ground wavenumber squared up to the full
/// bound in 100 equal steps; the first trial whose tunneling integral
/// reaches 10.0 becomes the new `k_max`. A degenerate step size (below
/// 1e-10) skips the search entirely and keeps the ground wavenumber.
fn wkb_refined_k_max(c_eff: &[f64], dz: f64, omega: f64, ceff_min: f64) -> f64 {
    let k_max_full = omega / ceff_min;
    let k_gnd = omega / c_eff[0];
    let dkk = (k_max_full.powi(2) - k_gnd.powi(2)) / 100.0;

    let mut kk = k_gnd.powi(2);
    if dkk > 1.0e-10 {
        while kk < k_max_full.powi(2) {
            let mut wkb_integral = 0.0;
            let mut wkb_term = 1.0;
            let mut i = 0;
            while wkb_term > dkk && i < c_eff.len() {
                let k_eff = omega / c_eff[i];
                wkb_term = (kk - k_eff.powi(2)).abs();
                wkb_integral += dz * wkb_term.sqrt();
                i += 1;
            }
            if wkb_integral >= 10.0 {
                break;
            }
            kk += dkk;
        }
    }
    kk.sqrt()
}

fn spectral_bounds(
    c_eff: &[f64],
    dz: f64,
    settings: &TraceSettings,
) -> (WavenumberBounds, Option<WkbRefinement>) {
    let omega = settings.freq.angular();
    let ceff_min = c_eff.iter().copied().fold(f64::INFINITY, f64::min);
    let k_max_full = omega / ceff_min;

    let (k_max, wkb) = if settings.ground_to_ground() && !settings.turnoff_wkb {
        let k_max = wkb_refined_k_max(c_eff, dz, omega, ceff_min);
        (k_max, Some(WkbRefinement { k_max, k_max_full }))
    } else {
        (k_max_full, None)
    };

    let k_min = k_min_from_top(c_eff, omega);
    (WavenumberBounds { k_min, k_max }, wkb)
}

/// Build the narrow-angle modal trace from the effective sound speed
/// sampled on the grid.
pub fn build_narrow_angle(
    grid: &AltitudeGrid,
    c_eff: &[f64],
    settings: &TraceSettings,
) -> NarrowAngleTrace {
    assert_eq!(c_eff.len(), grid.n, "c_eff length must match the grid");
    let omega = settings.freq.angular();

    let mut diag: Vec<f64> = c_eff.iter().map(|&c| (omega / c).powi(2)).collect();
    diag[0] += boundary_term(grid.dz, settings.admittance);

    let (bounds, wkb) = spectral_bounds(c_eff, grid.dz, settings);
    NarrowAngleTrace { diag, bounds, wkb }
}

/// Build the wide-angle modal trace from the effective sound speed, the
/// adiabatic sound speed `c0`, and the azimuth-projected wind component.
pub fn build_wide_angle(
    grid: &AltitudeGrid,
    c_eff: &[f64],
    c0: &[f64],
    wind: &[f64],
    settings: &TraceSettings,
) -> WideAngleTrace {
    assert_eq!(c_eff.len(), grid.n, "c_eff length must match the grid");
    assert_eq!(c0.len(), grid.n, "c0 length must match the grid");
    assert_eq!(wind.len(), grid.n, "wind length must match the grid");
    let omega = settings.freq.angular();

    let mut diag = Vec::with_capacity(grid.n);
    let mut kd = Vec::with_capacity(grid.n);
    let mut md = Vec::with_capacity(grid.n);
    let mut cd = Vec::with_capacity(grid.n);
    for i in 0..grid.n {
        diag.push((omega / c_eff[i]).powi(2));
        kd.push((omega / c0[i]).powi(2));
        md.push((wind[i] / c0[i]).powi(2) - 1.0);
        cd.push(-2.0 * omega * wind[i] / c0[i].powi(2));
    }

    let bnd = boundary_term(grid.dz, settings.admittance);
    diag[0] += bnd;
    kd[0] += bnd;

    let (bounds, wkb) = spectral_bounds(c_eff, grid.dz, settings);
    WideAngleTrace {
        diag,
        kd,
        md,
        cd,
        bounds,
        wkb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(turnoff_wkb: bool) -> TraceSettings {
        TraceSettings {
            admittance: 0.0,
            freq: Frequency::new(1.0),
            source_height: 0.0,
            receiver_height: 0.0,
            turnoff_wkb,
        }
    }

    #[test]
    fn test_uniform_diag_values() {
        let grid = AltitudeGrid::narrow_angle(0.0, 9000.0, 10);
        let c_eff = vec![340.0; 10];
        let trace = build_narrow_angle(&grid, &c_eff, &settings(true));

        let omega = 2.0 * std::f64::consts::PI;
        let expected = (omega / 340.0).powi(2);
        for &d in &trace.diag[1..] {
            assert!((d - expected).abs() < 1e-15);
        }
        // Boundary term 1/dz^2 with zero admittance.
        let bnd = 1.0 / grid.dz.powi(2);
        assert!((trace.diag[0] - expected - bnd).abs() < 1e-15);
    }

    #[test]
    fn test_admittance_shifts_boundary_term() {
        let grid = AltitudeGrid::narrow_angle(0.0, 9000.0, 10);
        let c_eff = vec![340.0; 10];
        let mut s = settings(true);
        s.admittance = 1.0e-4;
        let trace = build_narrow_angle(&grid, &c_eff, &s);

        let expected_bnd = (1.0 / (grid.dz * 1.0e-4 + 1.0)) / grid.dz.powi(2);
        let omega = 2.0 * std::f64::consts::PI;
        let base = (omega / 340.0).powi(2);
        assert!((trace.diag[0] - base - expected_bnd).abs() < 1e-15);
    }

    #[test]
    fn test_bounds_uniform_profile() {
        let grid = AltitudeGrid::narrow_angle(0.0, 9000.0, 10);
        let c_eff = vec![340.0; 10];
        let trace = build_narrow_angle(&grid, &c_eff, &settings(true));

        let omega = 2.0 * std::f64::consts::PI;
        assert!((trace.bounds.k_max - omega / 340.0).abs() < 1e-15);
        assert!((trace.bounds.k_min - omega / 340.0).abs() < 1e-15);
        assert!(trace.wkb.is_none());
    }

    #[test]
    fn test_wkb_degenerate_search_skipped() {
        // Uniform profile: dkk is exactly zero, so the scan is skipped and
        // the ground wavenumber is kept.
        let grid = AltitudeGrid::narrow_angle(0.0, 9000.0, 10);
        let c_eff = vec![340.0; 10];
        let trace = build_narrow_angle(&grid, &c_eff, &settings(false));

        let omega = 2.0 * std::f64::consts::PI;
        let wkb = trace.wkb.expect("ground-to-ground path should use WKB");
        assert!((wkb.k_max - omega / 340.0).abs() < 1e-15);
        assert!(!wkb.tightened());
    }

    #[test]
    fn test_wkb_tightens_with_elevated_duct() {
        // Slow layer aloft: without WKB, k_max = omega/c_min reaches into
        // modes trapped aloft that never touch the ground.
        let n = 200;
        let grid = AltitudeGrid::narrow_angle(0.0, 100_000.0, n);
        let c_eff: Vec<f64> = (0..n)
            .map(|i| {
                let z = grid.altitude(i);
                // 340 m/s at ground, dipping to 300 m/s near 50 km.
                340.0 - 40.0 * (-((z - 50_000.0) / 10_000.0).powi(2)).exp()
            })
            .collect();

        let mut s = settings(false);
        s.freq = Frequency::new(0.5);
        let trace = build_narrow_angle(&grid, &c_eff, &s);
        let wkb = trace.wkb.expect("WKB should be active");
        assert!(
            wkb.tightened(),
            "expected WKB to truncate the elevated duct, k_max={} full={}",
            wkb.k_max,
            wkb.k_max_full
        );
        assert!(trace.bounds.k_max < wkb.k_max_full);
        // Never slower than the ground wavenumber.
        assert!(trace.bounds.k_max >= s.freq.angular() / c_eff[0] - 1e-12);
    }

    #[test]
    fn test_elevated_source_disables_wkb() {
        let grid = AltitudeGrid::narrow_angle(0.0, 9000.0, 10);
        let c_eff = vec![340.0; 10];
        let mut s = settings(false);
        s.source_height = 1000.0;
        let trace = build_narrow_angle(&grid, &c_eff, &s);
        assert!(trace.wkb.is_none());
    }

    #[test]
    fn test_wide_angle_auxiliary_diagonals() {
        let grid = AltitudeGrid::wide_angle(0.0, 10_000.0, 10);
        let c_eff = vec![350.0; 10];
        let c0 = vec![340.0; 10];
        let wind = vec![10.0; 10];
        let trace = build_wide_angle(&grid, &c_eff, &c0, &wind, &settings(true));

        let omega = 2.0 * std::f64::consts::PI;
        assert!((trace.kd[3] - (omega / 340.0).powi(2)).abs() < 1e-15);
        assert!((trace.md[3] - ((10.0 / 340.0f64).powi(2) - 1.0)).abs() < 1e-15);
        assert!((trace.cd[3] + 2.0 * omega * 10.0 / 340.0f64.powi(2)).abs() < 1e-15);
        // Boundary term applied to both diag and kd, not md/cd.
        assert!(trace.kd[0] > trace.kd[1]);
        assert!((trace.md[0] - trace.md[1]).abs() < 1e-15);
    }
}
