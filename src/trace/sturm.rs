//! Sturm-sequence mode counting.
//!
//! Counts eigenvalues of the discretized vertical operator below a trial
//! wavenumber squared by running the principal-minor recurrence from the
//! top of the grid downward and counting sign changes. Each step
//! renormalizes by the latest minor's magnitude so the sequence never
//! overflows.

/// Sign-change count of the minor sequence of the tridiagonal operator
/// with main diagonal `-2/dz^2 + diag[i]` and off-diagonal `1/dz^2`,
/// shifted by `k^2`. Nondecreasing in `k`; differencing two counts
/// estimates how many eigenvalues fall between the two shifts.
pub fn sturm_count(diag: &[f64], dz: f64, k: f64) -> usize {
    let n = diag.len();
    assert!(n >= 2, "Sturm count needs at least two grid points");

    let fd_d = -2.0 / dz.powi(2);
    let fd_o = 1.0 / dz.powi(2);
    let kk = k * k;

    let mut pm = 0usize;
    let mut cup0 = fd_d + diag[n - 1] - kk;
    let pot = fd_d + diag[n - 2] - kk;
    let mut cup1 = cup0 * pot;
    if cup0 * cup1 < 0.0 {
        pm += 1;
    }
    cup0 /= norm(cup1);
    cup1 /= norm(cup1);

    for i in (0..n.saturating_sub(2)).rev() {
        let pot = fd_d + diag[i] - kk;
        let cup2 = pot * cup1 - fd_o.powi(2) * cup0;
        if cup1 * cup2 < 0.0 {
            pm += 1;
        }
        cup0 = cup1 / norm(cup2);
        cup1 = cup2 / norm(cup2);
    }
    pm
}

/// Magnitude used for renormalization, floored away from zero so an
/// exactly vanishing minor cannot poison the sequence.
fn norm(x: f64) -> f64 {
    x.abs().max(f64::MIN_POSITIVE)
}

/// Estimated number of modes with wavenumber inside `[k_min, k_max]`:
/// the count below `k_max` minus the count below `k_min`, clamped at
/// zero.
pub fn estimate_mode_count(diag: &[f64], dz: f64, k_min: f64, k_max: f64) -> usize {
    let nev_max = sturm_count(diag, dz, k_max);
    let nev_min = sturm_count(diag, dz, k_min);
    nev_max.saturating_sub(nev_min)
}
