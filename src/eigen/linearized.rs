//! Determinant search for the wide-angle quadratic pencil.
//!
//! Real wavenumbers of `T(k) = D + k*C + k^2*M` inside the scan window are
//! bracketed by sign changes of the normalized tridiagonal determinant,
//! polished by bisection, and paired with vectors from inverse iteration on
//! the pencil frozen at the root. Each accepted pair is verified against
//! the linearized generalized problem `A x = k B x` with `x = (v, k v)`.

use faer::{Mat, linalg::solvers::Solve};

use super::{
    ConvergenceReport, EigenError, EigenPair, EigenSolution, QuadraticPencilProblem,
    ReferenceSolver, SpectralRequest, linearized_pair,
};

fn pencil_main(p: &QuadraticPencilProblem, i: usize, k: f64) -> f64 {
    let h2 = p.dz * p.dz;
    -2.0 / h2 + p.kd[i] + k * p.cd[i] + k * k * p.md[i]
}

/// Normalized determinant of `T(k)`: the magnitude is rescaled every step
/// so only the sign (and an exact zero) is meaningful.
fn det_normalized(p: &QuadraticPencilProblem, k: f64) -> f64 {
    let n = p.n();
    let e = 1.0 / (p.dz * p.dz);

    let mut d0 = 1.0;
    let mut d1 = pencil_main(p, 0, k);
    for i in 1..n {
        let d2 = pencil_main(p, i, k) * d1 - e * e * d0;
        let scale = d2.abs().max(d1.abs()).max(f64::MIN_POSITIVE);
        d0 = d1 / scale;
        d1 = d2 / scale;
    }
    d1
}

/// Bisect a sign-change bracket down to a root of the determinant.
fn bisect_root(p: &QuadraticPencilProblem, mut lo: f64, mut hi: f64) -> (f64, usize) {
    let tol = 4.0 * f64::EPSILON * lo.abs().max(hi.abs()).max(1.0e-30);
    let mut f_lo = det_normalized(p, lo);
    let mut iterations = 0;
    while hi - lo > tol && iterations < 200 {
        let mid = 0.5 * (lo + hi);
        let f_mid = det_normalized(p, mid);
        if f_mid == 0.0 {
            return (mid, iterations + 1);
        }
        if f_lo * f_mid < 0.0 {
            hi = mid;
        } else {
            lo = mid;
            f_lo = f_mid;
        }
        iterations += 1;
    }
    (0.5 * (lo + hi), iterations)
}

fn dense_pencil(p: &QuadraticPencilProblem, k: f64, ridge: f64) -> Mat<f64> {
    let n = p.n();
    let e = 1.0 / (p.dz * p.dz);
    let mut m = Mat::<f64>::zeros(n, n);
    for i in 0..n {
        m[(i, i)] = pencil_main(p, i, k) + ridge;
        if i > 0 {
            m[(i, i - 1)] = e;
        }
        if i + 1 < n {
            m[(i, i + 1)] = e;
        }
    }
    m
}

fn normalize(v: &mut [f64]) {
    let norm = v.iter().map(|&x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Copies the solve output into `v`, scaled by its largest magnitude so
/// the later norm cannot overflow. Returns `false` when the output is
/// non-finite or vanishes.
fn copy_iterate(y: &Mat<f64>, v: &mut [f64]) -> bool {
    let mut amax = 0.0f64;
    for i in 0..v.len() {
        let x = y[(i, 0)];
        if !x.is_finite() {
            return false;
        }
        amax = amax.max(x.abs());
    }
    if amax == 0.0 {
        return false;
    }
    for i in 0..v.len() {
        v[i] = y[(i, 0)] / amax;
    }
    true
}

/// Inverse iteration on `T(k)` frozen at the root, then verification of
/// the stacked vector against the linearized pair.
fn refine_pair(
    p: &QuadraticPencilProblem,
    k: f64,
    solver: &ReferenceSolver,
) -> Option<(EigenPair, usize)> {
    let n = p.n();
    let h2 = p.dz * p.dz;
    let op_scale = (0..n)
        .map(|i| pencil_main(p, i, k).abs())
        .fold(4.0 / h2, f64::max);

    let mut rhs = Mat::<f64>::zeros(n, 1);
    for i in 0..n {
        rhs[(i, 0)] = 1.0 + 0.5 * ((i as f64) * 1.7).sin();
    }

    let (a, b) = linearized_pair(p);
    let pair_scale = a.max_abs() + k.abs() * b.max_abs();
    let tol = solver.residual_tol * pair_scale;

    let mut v = vec![0.0; n];
    let mut have_direction = false;
    let mut ridge = 1.0e-11 * op_scale;
    let mut sweeps = 0usize;

    // Regularize the frozen pencil with a small ridge; enlarge it and
    // refactor while the factorization is still singular to working
    // precision.
    'factor: while sweeps < solver.max_refinements {
        let m = dense_pencil(p, k, ridge);
        let lu = m.as_ref().full_piv_lu();

        while sweeps < solver.max_refinements {
            sweeps += 1;
            let y = lu.solve(&rhs);
            if !copy_iterate(&y, &mut v) {
                if !have_direction {
                    ridge *= 100.0;
                    continue 'factor;
                }
                // The solve blew up along the factorization's null
                // direction, so the right-hand side already points
                // along the eigenvector.
                for i in 0..n {
                    v[i] = rhs[(i, 0)];
                }
            }
            have_direction = true;
            normalize(&mut v);

            // Stack x = (v, k v) with joint unit norm.
            let joint = (1.0 + k * k).sqrt();
            let mut x = Vec::with_capacity(2 * n);
            x.extend(v.iter().map(|&z| z / joint));
            x.extend(v.iter().map(|&z| k * z / joint));

            let ax = a.mul_vec(&x);
            let bx = b.mul_vec(&x);
            let residual = ax
                .iter()
                .zip(&bx)
                .map(|(&ai, &bi)| (ai - k * bi).powi(2))
                .sum::<f64>()
                .sqrt();
            if residual <= tol {
                return Some((EigenPair { value: k, vector: x }, sweeps));
            }
            for i in 0..n {
                rhs[(i, 0)] = v[i];
            }
        }
    }
    None
}

pub(crate) fn solve(
    p: &QuadraticPencilProblem,
    request: &SpectralRequest,
    solver: &ReferenceSolver,
) -> Result<EigenSolution, EigenError> {
    let (lo, hi, target) = match *request {
        SpectralRequest::Interval { lo, hi } => (lo, hi, None),
        SpectralRequest::Nearest {
            sigma,
            count,
            lo,
            hi,
        } => (lo, hi, Some((sigma, count))),
    };

    // Scan for sign changes of the determinant across the window.
    let scan_points = match target {
        Some((_, count)) => (4 * count).max(100),
        None => 200,
    };
    let step = (hi - lo) / scan_points as f64;

    let mut iterations = 0usize;
    let mut roots: Vec<f64> = Vec::new();
    if step > 0.0 {
        let mut k_prev = lo;
        let mut f_prev = det_normalized(p, k_prev);
        for s in 1..=scan_points {
            let k = lo + s as f64 * step;
            let f = det_normalized(p, k);
            if f_prev == 0.0 {
                roots.push(k_prev);
            } else if f_prev * f < 0.0 {
                let (root, its) = bisect_root(p, k_prev, k);
                iterations += its;
                roots.push(root);
            }
            k_prev = k;
            f_prev = f;
        }
        if f_prev == 0.0 {
            roots.push(k_prev);
        }
    } else if det_normalized(p, lo) == 0.0 {
        roots.push(lo);
    }

    let requested = match target {
        Some((_, count)) => count,
        None => roots.len(),
    };

    let mut pairs: Vec<EigenPair> = Vec::with_capacity(roots.len());
    for &k in &roots {
        if let Some((pair, sweeps)) = refine_pair(p, k, solver) {
            iterations += sweeps;
            pairs.push(pair);
        }
    }

    match target {
        Some((sigma, count)) => {
            pairs.sort_by(|a, b| {
                (a.value - sigma)
                    .abs()
                    .total_cmp(&(b.value - sigma).abs())
            });
            pairs.truncate(count);
        }
        None => pairs.sort_by(|a, b| b.value.total_cmp(&a.value)),
    }

    let report = ConvergenceReport {
        requested,
        converged: pairs.len(),
        iterations,
    };
    Ok(EigenSolution { pairs, report })
}
