//! Derived atmospheric quantities on the computational grid.
//!
//! Each function returns a freshly owned table sampled on the altitude
//! grid. Azimuth-dependent quantities (wind component, effective sound
//! speed) are recomputed per azimuth pass; the absorption table is
//! azimuth-independent and computed once.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use crate::grid::AltitudeGrid;

use super::profile::{Profile, ProfileError};

/// Ratio of specific heats for air.
pub const GAMMA: f64 = 1.4;

/// Sample a profile property onto the grid.
pub fn sample_property(
    profile: &impl Profile,
    key: &str,
    grid: &AltitudeGrid,
) -> Result<Vec<f64>, ProfileError> {
    (0..grid.n)
        .map(|i| profile.get_at(key, grid.altitude(i)))
        .collect()
}

/// Adiabatic sound speed `sqrt(gamma * P / rho)` per grid sample, in m/s.
///
/// `pr` is pressure in Pa and `rho` density in kg/m^3.
pub fn sound_speed_from_pressure_density(pr: &[f64], rho: &[f64]) -> Vec<f64> {
    pr.iter()
        .zip(rho.iter())
        .map(|(&p, &r)| (GAMMA * p / r).sqrt())
        .collect()
}

/// Wind speed from zonal (`u`, west-to-east) and meridional (`v`,
/// south-to-north) components, in the components' units.
pub fn wind_speed(u: &[f64], v: &[f64]) -> Vec<f64> {
    u.iter().zip(v.iter()).map(|(&a, &b)| a.hypot(b)).collect()
}

/// Wind direction in degrees clockwise from north, in [0, 360).
pub fn wind_direction(u: &[f64], v: &[f64]) -> Vec<f64> {
    u.iter()
        .zip(v.iter())
        .map(|(&a, &b)| {
            let deg = a.atan2(b).to_degrees();
            if deg < 0.0 { deg + 360.0 } else { deg }
        })
        .collect()
}

/// Wind component projected onto a propagation azimuth (degrees clockwise
/// from north): `speed * cos(direction - azimuth)`.
pub fn wind_component(speed: &[f64], direction_deg: &[f64], azimuth_deg: f64) -> Vec<f64> {
    speed
        .iter()
        .zip(direction_deg.iter())
        .map(|(&ws, &wd)| ws * (wd - azimuth_deg).to_radians().cos())
        .collect()
}

/// Effective sound speed: adiabatic sound speed plus the azimuth-projected
/// wind component.
pub fn effective_sound_speed(c0: &[f64], wind_component: &[f64]) -> Vec<f64> {
    c0.iter()
        .zip(wind_component.iter())
        .map(|(&c, &w)| c + w)
        .collect()
}

/// Error type for attenuation-table input.
#[derive(Debug, Error)]
pub enum AttenuationFileError {
    /// I/O error while reading the file.
    #[error("Attenuation file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A line could not be parsed as `altitude_km alpha`.
    #[error("Attenuation file parse error on line {line}: {content}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// The file held fewer than two usable samples.
    #[error("Attenuation file needs at least two samples, got {0}")]
    TooShort(usize),
}

/// Absorption-coefficient source for the perturbation stage.
#[derive(Clone, Debug)]
pub enum AttenuationSpec {
    /// No absorption; every mode stays lossless.
    Lossless,
    /// A user-supplied table of `(altitude_m, alpha)` samples, ascending
    /// in altitude, interpolated onto the grid and clamped at the ends.
    Table {
        /// Sample altitudes in meters.
        altitudes: Vec<f64>,
        /// Absorption coefficients, one per altitude.
        alpha: Vec<f64>,
    },
}

impl AttenuationSpec {
    /// Sample the absorption coefficient onto the grid.
    pub fn sample(&self, grid: &AltitudeGrid) -> Vec<f64> {
        match self {
            AttenuationSpec::Lossless => vec![0.0; grid.n],
            AttenuationSpec::Table { altitudes, alpha } => (0..grid.n)
                .map(|i| interpolate_clamped(altitudes, alpha, grid.altitude(i)))
                .collect(),
        }
    }
}

fn interpolate_clamped(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    let i = match xs.binary_search_by(|v| v.partial_cmp(&x).unwrap()) {
        Ok(i) => return ys[i],
        Err(i) => i - 1,
    };
    let t = (x - xs[i]) / (xs[i + 1] - xs[i]);
    ys[i] * (1.0 - t) + ys[i + 1] * t
}

/// Read a two-column attenuation file: altitude in km, absorption
/// coefficient. Blank lines and lines starting with `#` are skipped.
pub fn read_attenuation_file(path: &Path) -> Result<AttenuationSpec, AttenuationFileError> {
    let reader = BufReader::new(File::open(path)?);
    let mut altitudes = Vec::new();
    let mut alpha = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut it = trimmed.split_whitespace();
        let parse = |tok: Option<&str>| -> Option<f64> { tok.and_then(|t| t.parse().ok()) };
        match (parse(it.next()), parse(it.next())) {
            (Some(z_km), Some(a)) => {
                altitudes.push(z_km * 1000.0);
                alpha.push(a);
            }
            _ => {
                return Err(AttenuationFileError::Parse {
                    line: idx + 1,
                    content: line,
                });
            }
        }
    }

    if altitudes.len() < 2 {
        return Err(AttenuationFileError::TooShort(altitudes.len()));
    }
    Ok(AttenuationSpec::Table { altitudes, alpha })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sound_speed_isothermal() {
        // rho = 1.2, P chosen so that c = 340 m/s exactly.
        let p = 340.0_f64.powi(2) * 1.2 / GAMMA;
        let c = sound_speed_from_pressure_density(&[p, p], &[1.2, 1.2]);
        assert!((c[0] - 340.0).abs() < 1e-9);
        assert!((c[1] - 340.0).abs() < 1e-9);
    }

    #[test]
    fn test_wind_direction_cardinal() {
        // Pure southerly wind (blowing toward north): u=0, v>0 -> 0 deg.
        let d = wind_direction(&[0.0], &[10.0]);
        assert!(d[0].abs() < 1e-12);
        // Pure westerly (toward east): u>0, v=0 -> 90 deg.
        let d = wind_direction(&[10.0], &[0.0]);
        assert!((d[0] - 90.0).abs() < 1e-12);
        // Toward south -> 180, toward west -> 270.
        let d = wind_direction(&[0.0], &[-10.0]);
        assert!((d[0] - 180.0).abs() < 1e-12);
        let d = wind_direction(&[-10.0], &[0.0]);
        assert!((d[0] - 270.0).abs() < 1e-12);
    }

    #[test]
    fn test_wind_component_projection() {
        let speed = vec![10.0];
        let dir = vec![90.0]; // toward east
        // Propagating east: full tailwind.
        let wc = wind_component(&speed, &dir, 90.0);
        assert!((wc[0] - 10.0).abs() < 1e-12);
        // Propagating north: no projection.
        let wc = wind_component(&speed, &dir, 0.0);
        assert!(wc[0].abs() < 1e-12);
        // Propagating west: full headwind.
        let wc = wind_component(&speed, &dir, 270.0);
        assert!((wc[0] + 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_effective_sound_speed_sum() {
        let c = effective_sound_speed(&[340.0, 340.0], &[10.0, -5.0]);
        assert_eq!(c, vec![350.0, 335.0]);
    }

    #[test]
    fn test_attenuation_lossless_sampling() {
        let grid = AltitudeGrid::narrow_angle(0.0, 1000.0, 5);
        let a = AttenuationSpec::Lossless.sample(&grid);
        assert_eq!(a, vec![0.0; 5]);
    }

    #[test]
    fn test_attenuation_table_sampling() {
        let grid = AltitudeGrid::narrow_angle(0.0, 2000.0, 5);
        let table = AttenuationSpec::Table {
            altitudes: vec![0.0, 2000.0],
            alpha: vec![0.0, 4.0e-4],
        };
        let a = table.sample(&grid);
        assert!((a[0] - 0.0).abs() < 1e-15);
        assert!((a[2] - 2.0e-4).abs() < 1e-15);
        assert!((a[4] - 4.0e-4).abs() < 1e-15);
    }

    #[test]
    fn test_attenuation_table_clamps_outside() {
        let grid = AltitudeGrid::narrow_angle(0.0, 4000.0, 5);
        let table = AttenuationSpec::Table {
            altitudes: vec![1000.0, 3000.0],
            alpha: vec![1.0e-4, 3.0e-4],
        };
        let a = table.sample(&grid);
        assert!((a[0] - 1.0e-4).abs() < 1e-15); // below table start
        assert!((a[4] - 3.0e-4).abs() < 1e-15); // above table end
    }

    #[test]
    fn test_sample_property_on_grid() {
        use crate::atmosphere::profile::SampledAtmosphere;
        use crate::units::Unit;

        let mut p = SampledAtmosphere::new(vec![0.0, 1000.0, 2000.0]);
        p.add_vector("T", vec![288.0, 281.5, 275.0], Unit::Kelvin)
            .unwrap();
        let grid = AltitudeGrid::narrow_angle(0.0, 2000.0, 5);
        let t = sample_property(&p, "T", &grid).unwrap();
        assert_eq!(t.len(), 5);
        assert!((t[1] - 284.75).abs() < 1e-12);
    }
}
