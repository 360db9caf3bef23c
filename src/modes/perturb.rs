//! First-order attenuation perturbation of the modal wavenumbers.
//!
//! Each real wavenumber picks up an imaginary part from the absorption
//! profile weighted by the mode shape:
//! `k_pert = sqrt(k^2 + i * sum(dz * v^2 * (omega/c_T) * alpha * 2))`.

use num_complex::Complex64;

use super::SelectedModes;
use crate::types::Frequency;

/// Perturb the selected wavenumbers with the absorption profile.
///
/// `c_t` is the adiabatic sound speed `sqrt(gamma*P/rho)` per level and
/// `alpha` the attenuation coefficient in Np/m per level. The principal
/// square root keeps `Im(k_pert) >= 0` for nonnegative absorption.
pub fn perturb_wavenumbers(
    modes: &SelectedModes,
    dz: f64,
    freq: Frequency,
    c_t: &[f64],
    alpha: &[f64],
) -> Vec<Complex64> {
    let omega = freq.angular();
    modes
        .wavenumbers
        .iter()
        .zip(&modes.vectors)
        .map(|(&k, v)| {
            let mut absorption = 0.0;
            for i in 0..v.len() {
                absorption += dz * v[i] * v[i] * (omega / c_t[i]) * alpha[i] * 2.0;
            }
            Complex64::new(k * k, absorption).sqrt()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modes_one(k: f64, v: Vec<f64>) -> SelectedModes {
        SelectedModes::from_parts(vec![k], vec![v]).unwrap()
    }

    #[test]
    fn test_zero_absorption_leaves_wavenumber_real() {
        let modes = modes_one(0.02, vec![0.5; 10]);
        let c_t = vec![340.0; 10];
        let alpha = vec![0.0; 10];
        let kp = perturb_wavenumbers(&modes, 100.0, Frequency::new(1.0), &c_t, &alpha);
        assert!((kp[0].re - 0.02).abs() < 1e-14);
        assert_eq!(kp[0].im, 0.0);
    }

    #[test]
    fn test_absorption_adds_positive_imaginary_part() {
        let modes = modes_one(0.02, vec![0.5; 10]);
        let c_t = vec![340.0; 10];
        let alpha = vec![1.0e-5; 10];
        let kp = perturb_wavenumbers(&modes, 100.0, Frequency::new(1.0), &c_t, &alpha);
        // First order the imaginary part is absorption/(2k); the real
        // part moves only at second order.
        let omega = 2.0 * std::f64::consts::PI;
        let absorption = 10.0 * 100.0 * 0.25 * (omega / 340.0) * 1.0e-5 * 2.0;
        assert!((kp[0].im - absorption / (2.0 * 0.02)).abs() < 5.0e-5);
        assert!((kp[0].re - 0.02).abs() < 1.0e-3);
    }

    #[test]
    fn test_known_absorption_integral() {
        // Single level, unit-ish numbers: absorption =
        // dz * v^2 * (omega/c_T) * alpha * 2.
        let modes = modes_one(1.0, vec![2.0]);
        let c_t = vec![std::f64::consts::PI]; // omega/c_T = 2 at 1 Hz
        let alpha = vec![0.25];
        let kp = perturb_wavenumbers(&modes, 0.5, Frequency::new(1.0), &c_t, &alpha);
        // absorption = 0.5 * 4 * 2 * 0.25 * 2 = 2; k_pert = sqrt(1 + 2i).
        let expected = Complex64::new(1.0, 2.0).sqrt();
        assert!((kp[0] - expected).norm() < 1e-14);
    }
}
