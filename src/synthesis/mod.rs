//! Field synthesis and output products.
//!
//! Sums the selected modes into transmission-loss fields and writes the
//! column-oriented text products. Row layouts and file names are a
//! compatibility surface shared with downstream plotting tools, so every
//! writer reproduces the historical C formatting, including the two-digit
//! signed exponents.

use std::f64::consts::PI;
use std::io::{self, Write};

use num_complex::Complex64;

use crate::modes::SelectedModes;
use crate::types::Frequency;

// =============================================================================
// File names
// =============================================================================

pub const TLOSS_1D: &str = "tloss_1d.nm";
pub const TLOSS_1D_LOSSLESS: &str = "tloss_1d.lossless.nm";
pub const TLOSS_2D: &str = "tloss_2d.nm";
pub const WTLOSS_1D: &str = "wtloss_1d.nm";
pub const WTLOSS_1D_LOSSLESS: &str = "wtloss_1d.lossless.nm";
pub const WTLOSS_2D: &str = "wtloss_2d.nm";
pub const NBY2D_TLOSS_1D: &str = "Nby2D_tloss_1d.nm";
pub const NBY2D_TLOSS_1D_LOSSLESS: &str = "Nby2D_tloss_1d.lossless.nm";
pub const NBY2D_WTLOSS_1D: &str = "Nby2D_wtloss_1d.nm";
pub const NBY2D_WTLOSS_1D_LOSSLESS: &str = "Nby2D_wtloss_1d.lossless.nm";
pub const PHASESPEEDS: &str = "phasespeeds.nm";
pub const SPEEDS: &str = "speeds.nm";

/// Per-mode eigenfunction file name, `mode_<j>.nm`.
pub fn mode_file_name(j: usize) -> String {
    format!("mode_{}.nm", j)
}

/// Dispersion file name carrying the frequency, `dispersion_<freq>.nm`.
pub fn dispersion_file_name(freq: Frequency) -> String {
    format!("dispersion_{}.nm", sci(freq.hz(), 0, 6))
}

// =============================================================================
// C-compatible formatting
// =============================================================================

/// Format like C's `%*.*e`: fixed decimal count and a sign-carrying
/// exponent of at least two digits, right-padded to `width`.
pub(crate) fn sci(x: f64, width: usize, prec: usize) -> String {
    if !x.is_finite() {
        return format!("{:>width$}", x);
    }
    let s = format!("{:.prec$e}", x);
    let (mantissa, exp) = s.split_once('e').unwrap_or((s.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let formatted = format!("{}e{}{:02}", mantissa, sign, exp.abs());
    format!("{formatted:>width$}")
}

// =============================================================================
// Modal sums
// =============================================================================

/// Geometry of the range sweep for the 1D and 2D products.
#[derive(Clone, Copy, Debug)]
pub struct RangeSweep {
    /// Number of range steps; ranges run `dr, 2*dr, ..., n*dr`.
    pub n_ranges: usize,
    /// Range step in meters.
    pub range_step: f64,
}

/// Grid index of a height above ground, matching the historical rounding.
pub fn level_index(height: f64, dz: f64, n: usize) -> usize {
    ((height / dz).ceil() as usize).min(n.saturating_sub(1))
}

/// Coherent and incoherent modal sums at one range, lossy and lossless.
#[derive(Clone, Copy, Debug, Default)]
struct ModalSums {
    coherent: Complex64,
    coherent_lossless: Complex64,
    incoherent: f64,
    incoherent_lossless: f64,
}

/// The phase and spreading prefactor `4*pi*i*exp(-i*pi/4)/sqrt(8*pi)`,
/// sized so the written modal sum is the actual transmission loss.
fn expov8pi() -> Complex64 {
    4.0 * PI * Complex64::i() * (-Complex64::i() * PI * 0.25).exp() / (8.0 * PI).sqrt()
}

fn modal_sums_at(
    modes: &SelectedModes,
    k_pert: &[Complex64],
    n_zsrc: usize,
    n_zrcv: usize,
    r: f64,
) -> ModalSums {
    let i = Complex64::i();
    let mut sums = ModalSums::default();
    for (m, v) in modes.vectors.iter().enumerate() {
        let prod = v[n_zsrc] * v[n_zrcv];
        let k = k_pert[m];
        sums.coherent += prod * (i * k * r).exp() / k.sqrt();
        sums.coherent_lossless += prod * (i * k.re * r).exp() / k.re.sqrt();
        sums.incoherent += prod.powi(2) * (-2.0 * k.im * r).exp() / k.norm();
        sums.incoherent_lossless += prod.powi(2) / k.re;
    }
    sums.coherent *= expov8pi() / r.sqrt();
    sums.coherent_lossless *= expov8pi() / r.sqrt();
    sums.incoherent = 4.0 * PI * sums.incoherent.sqrt() * (1.0 / 8.0 / PI / r).sqrt();
    sums.incoherent_lossless = 4.0 * PI * sums.incoherent_lossless.sqrt() * (1.0 / 8.0 / PI / r).sqrt();
    sums
}

// =============================================================================
// 1D transmission loss
// =============================================================================

/// Write the 1D transmission loss at the receiver height, lossy and
/// lossless files side by side. Rows are `r_km  Re(TL)  Im(TL)  TL_inc`.
pub fn write_tloss_1d<W: Write, V: Write>(
    lossy: &mut W,
    lossless: &mut V,
    modes: &SelectedModes,
    k_pert: &[Complex64],
    dz: f64,
    n: usize,
    source_height: f64,
    receiver_height: f64,
    sweep: &RangeSweep,
) -> io::Result<()> {
    let n_zsrc = level_index(source_height, dz, n);
    let n_zrcv = level_index(receiver_height, dz, n);
    for step in 0..sweep.n_ranges {
        let r = (step + 1) as f64 * sweep.range_step;
        let s = modal_sums_at(modes, k_pert, n_zsrc, n_zrcv, r);
        writeln!(
            lossy,
            "{:.6} {} {} {}",
            r / 1000.0,
            sci(s.coherent.re, 20, 12),
            sci(s.coherent.im, 20, 12),
            sci(s.incoherent, 20, 12)
        )?;
        writeln!(
            lossless,
            "{:.6} {} {} {}",
            r / 1000.0,
            sci(s.coherent_lossless.re, 20, 12),
            sci(s.coherent_lossless.im, 20, 12),
            sci(s.incoherent_lossless, 20, 12)
        )?;
    }
    Ok(())
}

/// Write one azimuthal block of the N-by-2D product. Rows carry the
/// azimuth; each block ends with a blank line so plotting tools can split
/// the sweep.
pub fn write_tloss_1d_nby2d<W: Write, V: Write>(
    lossy: &mut W,
    lossless: &mut V,
    azimuth_deg: f64,
    modes: &SelectedModes,
    k_pert: &[Complex64],
    dz: f64,
    n: usize,
    source_height: f64,
    receiver_height: f64,
    sweep: &RangeSweep,
) -> io::Result<()> {
    let n_zsrc = level_index(source_height, dz, n);
    let n_zrcv = level_index(receiver_height, dz, n);
    for step in 0..sweep.n_ranges {
        let r = (step + 1) as f64 * sweep.range_step;
        let s = modal_sums_at(modes, k_pert, n_zsrc, n_zrcv, r);
        writeln!(
            lossy,
            "{:10.3} {:8.3} {} {} {}",
            r / 1000.0,
            azimuth_deg,
            sci(s.coherent.re, 20, 12),
            sci(s.coherent.im, 20, 12),
            sci(s.incoherent, 20, 12)
        )?;
        writeln!(
            lossless,
            "{:10.3} {:8.3} {} {} {}",
            r / 1000.0,
            azimuth_deg,
            sci(s.coherent_lossless.re, 20, 12),
            sci(s.coherent_lossless.im, 20, 12),
            sci(s.incoherent_lossless, 20, 12)
        )?;
    }
    writeln!(lossy)?;
    writeln!(lossless)?;
    Ok(())
}

// =============================================================================
// 2D transmission loss
// =============================================================================

/// Write the lossy 2D transmission loss field over range and altitude.
/// The vertical sampling keeps roughly 500 rows per range step.
pub fn write_tloss_2d<W: Write>(
    out: &mut W,
    modes: &SelectedModes,
    k_pert: &[Complex64],
    dz: f64,
    n: usize,
    source_height: f64,
    sweep: &RangeSweep,
) -> io::Result<()> {
    let n_zsrc = level_index(source_height, dz, n);
    let mut stepj = n / 500;
    if stepj == 0 {
        stepj = 10;
    }

    let i = Complex64::i();
    let pref = expov8pi();
    for step in 0..sweep.n_ranges {
        let r = (step + 1) as f64 * sweep.range_step;
        let mut j = 0;
        while j < n {
            let z = j as f64 * dz;
            let mut modal_sum = Complex64::default();
            for (m, v) in modes.vectors.iter().enumerate() {
                let k = k_pert[m];
                modal_sum += v[n_zsrc] * v[j] * (i * k * r).exp() / k.sqrt();
            }
            modal_sum *= pref / r.sqrt();
            writeln!(
                out,
                "{:.6} {:.6} {} {}",
                r / 1000.0,
                z / 1000.0,
                sci(modal_sum.re, 15, 8),
                sci(modal_sum.im, 15, 8)
            )?;
            j += stepj;
        }
        writeln!(out)?;
    }
    Ok(())
}

// =============================================================================
// Modal starter
// =============================================================================

/// Write the modal starter field for seeding a parabolic-equation run,
/// sampled every tenth of the reference wavelength.
pub fn write_modal_starter<W: Write>(
    out: &mut W,
    modes: &SelectedModes,
    k_pert: &[Complex64],
    dz: f64,
    n: usize,
    freq: Frequency,
    source_height: f64,
) -> io::Result<()> {
    let n_zsrc = level_index(source_height, dz, n);
    let k0 = freq.angular() / 340.0;
    let z_cnd = (((340.0 / freq.hz()) / 10.0 / dz) as usize).max(1);

    let mut j = 0;
    while j < n {
        let z = j as f64 * dz;
        let mut modal_sum = Complex64::default();
        for (m, v) in modes.vectors.iter().enumerate() {
            modal_sum += v[n_zsrc] * v[j] / k_pert[m].re.sqrt();
        }
        modal_sum *= PI * k0.sqrt();
        writeln!(
            out,
            "{:10.3}   {}   {}",
            z / 1000.0,
            sci(modal_sum.re, 16, 12),
            sci(modal_sum.im, 16, 12)
        )?;
        j += z_cnd;
    }
    writeln!(out)?;
    Ok(())
}

// =============================================================================
// Dispersion, speeds, eigenfunctions
// =============================================================================

/// Write one dispersion record: frequency, mode count, source density,
/// then per-mode wavenumber and source/receiver amplitudes, all on one
/// line.
pub fn write_dispersion<W: Write>(
    out: &mut W,
    modes: &SelectedModes,
    k_pert: &[Complex64],
    dz: f64,
    n: usize,
    freq: Frequency,
    source_height: f64,
    receiver_height: f64,
    rho_at_source: f64,
) -> io::Result<()> {
    let n_zsrc = level_index(source_height, dz, n);
    let n_zrcv = level_index(receiver_height, dz, n);
    write!(
        out,
        "{}   {}    {}",
        sci(freq.hz(), 0, 12),
        modes.len(),
        sci(rho_at_source, 0, 12)
    )?;
    for (m, v) in modes.vectors.iter().enumerate() {
        write!(
            out,
            "   {}   {}",
            sci(k_pert[m].re, 0, 12),
            sci(k_pert[m].im, 0, 12)
        )?;
        write!(
            out,
            "   {}   {}",
            sci(v[n_zsrc], 0, 12),
            sci(v[n_zrcv], 0, 12)
        )?;
    }
    writeln!(out)?;
    Ok(())
}

/// Write the modal phase speeds with the imaginary wavenumber part.
pub fn write_phase_speeds<W: Write>(
    out: &mut W,
    freq: Frequency,
    k_pert: &[Complex64],
) -> io::Result<()> {
    for (j, k) in k_pert.iter().enumerate() {
        writeln!(
            out,
            "{} {:.6} {}",
            j,
            freq.angular() / k.re,
            sci(k.im, 15, 8)
        )?;
    }
    Ok(())
}

/// Write phase and group speeds per mode, 1-based mode numbers. The group
/// speed is the reciprocal of the phase-speed-weighted shape integral over
/// the effective sound speed.
pub fn write_phase_and_group_speeds<W: Write>(
    out: &mut W,
    modes: &SelectedModes,
    k_pert: &[Complex64],
    c_eff: &[f64],
    dz: f64,
    freq: Frequency,
) -> io::Result<()> {
    let omega = freq.angular();
    for (j, v) in modes.vectors.iter().enumerate() {
        let v_phase = omega / k_pert[j].re;
        let mut v_group = 0.0;
        for (i, &c) in c_eff.iter().enumerate() {
            v_group += v[i] * v[i] / (c * c);
        }
        v_group = 1.0 / (v_group * v_phase * dz);
        writeln!(
            out,
            "{:4} {:9.3} {:9.3} {}",
            j + 1,
            v_phase,
            v_group,
            sci(k_pert[j].im, 15, 8)
        )?;
    }
    Ok(())
}

/// Write one eigenfunction over altitude and return its normalization
/// integral `sum(v^2) * dz` so the caller can flag drifted modes.
pub fn write_eigenfunction<W: Write>(out: &mut W, v: &[f64], dz: f64) -> io::Result<f64> {
    let dz_km = dz / 1000.0;
    let mut chk = 0.0;
    for (i, &x) in v.iter().enumerate() {
        writeln!(out, "{:.6} {}", i as f64 * dz_km, sci(x, 15, 8))?;
        chk += x * x * dz;
    }
    Ok(chk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::SelectedModes;

    fn single_mode(n: usize, k: f64, dz: f64) -> (SelectedModes, Vec<Complex64>) {
        // Constant shape normalized so sum(v^2)*dz = 1.
        let amp = 1.0 / (n as f64 * dz).sqrt();
        let modes = SelectedModes::from_parts(vec![k], vec![vec![amp; n]]).unwrap();
        (modes, vec![Complex64::new(k, 0.0)])
    }

    #[test]
    fn test_sci_matches_c_printf() {
        assert_eq!(sci(0.0, 0, 6), "0.000000e+00");
        assert_eq!(sci(1.0, 0, 6), "1.000000e+00");
        assert_eq!(sci(-0.0123, 0, 6), "-1.230000e-02");
        assert_eq!(sci(6.02e23, 0, 2), "6.02e+23");
        assert_eq!(sci(1.5e-7, 12, 2), "    1.50e-07");
        assert_eq!(sci(0.1, 0, 12), "1.000000000000e-01");
    }

    #[test]
    fn test_dispersion_file_name_format() {
        assert_eq!(
            dispersion_file_name(Frequency::new(0.1)),
            "dispersion_1.000000e-01.nm"
        );
    }

    #[test]
    fn test_level_index_rounds_up_and_clamps() {
        assert_eq!(level_index(0.0, 100.0, 50), 0);
        assert_eq!(level_index(1.0, 100.0, 50), 1);
        assert_eq!(level_index(150.0, 100.0, 50), 2);
        assert_eq!(level_index(1.0e9, 100.0, 50), 49);
    }

    #[test]
    fn test_single_lossless_mode_closed_form() {
        // One real mode: |TL| = 4*pi*v_src*v_rcv/sqrt(8*pi*r*k), and the
        // incoherent sum equals the coherent magnitude.
        let n = 100;
        let dz = 100.0;
        let k = 0.01;
        let (modes, k_pert) = single_mode(n, k, dz);

        let mut lossy = Vec::new();
        let mut lossless = Vec::new();
        let sweep = RangeSweep {
            n_ranges: 1,
            range_step: 1000.0,
        };
        write_tloss_1d(&mut lossy, &mut lossless, &modes, &k_pert, dz, n, 0.0, 0.0, &sweep)
            .unwrap();

        let line = String::from_utf8(lossy).unwrap();
        let fields: Vec<f64> = line
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .collect();
        assert_eq!(fields.len(), 4);
        assert!((fields[0] - 1.0).abs() < 1e-12);

        let amp2 = 1.0 / (n as f64 * dz);
        let expected = 4.0 * PI * amp2 / (8.0 * PI * 1000.0 * k).sqrt();
        let coherent_mag = (fields[1] * fields[1] + fields[2] * fields[2]).sqrt();
        assert!((coherent_mag - expected).abs() < 1e-12 * expected.max(1.0));
        assert!((fields[3] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_lossless_equals_lossy_without_absorption() {
        let n = 60;
        let dz = 50.0;
        let (modes, k_pert) = single_mode(n, 0.02, dz);

        let mut lossy = Vec::new();
        let mut lossless = Vec::new();
        let sweep = RangeSweep {
            n_ranges: 5,
            range_step: 500.0,
        };
        write_tloss_1d(&mut lossy, &mut lossless, &modes, &k_pert, dz, n, 0.0, 0.0, &sweep)
            .unwrap();

        let lossy = String::from_utf8(lossy).unwrap();
        let lossless = String::from_utf8(lossless).unwrap();
        for (a, b) in lossy.lines().zip(lossless.lines()) {
            let av: Vec<f64> = a.split_whitespace().map(|t| t.parse().unwrap()).collect();
            let bv: Vec<f64> = b.split_whitespace().map(|t| t.parse().unwrap()).collect();
            for (x, y) in av.iter().zip(&bv) {
                assert!((x - y).abs() <= 1e-12 * x.abs().max(1.0), "{} vs {}", x, y);
            }
        }
    }

    #[test]
    fn test_nby2d_block_ends_blank() {
        let n = 60;
        let dz = 50.0;
        let (modes, k_pert) = single_mode(n, 0.02, dz);
        let mut lossy = Vec::new();
        let mut lossless = Vec::new();
        let sweep = RangeSweep {
            n_ranges: 3,
            range_step: 500.0,
        };
        write_tloss_1d_nby2d(
            &mut lossy,
            &mut lossless,
            90.0,
            &modes,
            &k_pert,
            dz,
            n,
            0.0,
            0.0,
            &sweep,
        )
        .unwrap();

        let text = String::from_utf8(lossy).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[3].is_empty());
        // Second column carries the azimuth.
        let az: f64 = lines[0].split_whitespace().nth(1).unwrap().parse().unwrap();
        assert!((az - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_eigenfunction_normalization_check() {
        let dz = 100.0;
        let n = 50;
        let amp = 1.0 / (n as f64 * dz).sqrt();
        let v = vec![amp; n];
        let mut out = Vec::new();
        let chk = write_eigenfunction(&mut out, &v, dz).unwrap();
        assert!((chk - 1.0).abs() < 1e-12);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), n);
    }

    #[test]
    fn test_phase_speeds_rows() {
        let k_pert = vec![Complex64::new(0.02, 1.0e-6), Complex64::new(0.018, 0.0)];
        let mut out = Vec::new();
        write_phase_speeds(&mut out, Frequency::new(1.0), &k_pert).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0 "));
        let c: f64 = lines[1].split_whitespace().nth(1).unwrap().parse().unwrap();
        assert!((c - 2.0 * PI / 0.018).abs() < 1e-3);
    }

    #[test]
    fn test_group_speed_uniform_medium() {
        // Uniform c_eff: the shape integral collapses and
        // v_group = c_eff^2 / v_phase.
        let n = 40;
        let dz = 100.0;
        let (modes, k_pert) = single_mode(n, 0.0185, dz);
        let c_eff = vec![340.0; n];
        let freq = Frequency::new(1.0);

        let mut out = Vec::new();
        write_phase_and_group_speeds(&mut out, &modes, &k_pert, &c_eff, dz, freq).unwrap();
        let text = String::from_utf8(out).unwrap();
        let fields: Vec<&str> = text.split_whitespace().collect();
        let v_phase: f64 = fields[1].parse().unwrap();
        let v_group: f64 = fields[2].parse().unwrap();
        assert!((v_phase - freq.angular() / 0.0185).abs() < 1e-2);
        assert!((v_group - 340.0f64.powi(2) / v_phase).abs() < 1e-2);
    }

    #[test]
    fn test_dispersion_single_line() {
        let n = 30;
        let dz = 100.0;
        let (modes, k_pert) = single_mode(n, 0.02, dz);
        let mut out = Vec::new();
        write_dispersion(
            &mut out,
            &modes,
            &k_pert,
            dz,
            n,
            Frequency::new(0.5),
            0.0,
            0.0,
            1.2,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        let fields: Vec<&str> = text.split_whitespace().collect();
        // freq, count, rho, then 4 entries per mode.
        assert_eq!(fields.len(), 3 + 4 * modes.len());
        assert_eq!(fields[1], "1");
    }
}
