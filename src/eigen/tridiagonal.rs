//! Bisection plus inverse iteration for the symmetric tridiagonal operator.
//!
//! Eigenvalues are located one at a time by bisecting on the exact
//! eigenvalue count below a shift (the LDL^T pivot count), then each
//! eigenvector is refined by inverse iteration on a factorization of the
//! shifted operator.

use faer::{Mat, linalg::solvers::Solve};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{
    ConvergenceReport, EigenError, EigenPair, EigenSolution, ReferenceSolver, SpectralRequest,
    TridiagonalProblem,
};

/// Exact number of eigenvalues strictly below `x`, via the signs of the
/// LDL^T pivots of the shifted operator.
pub(crate) fn count_below(problem: &TridiagonalProblem, x: f64) -> usize {
    let dz2 = problem.dz * problem.dz;
    let e2 = 1.0 / (dz2 * dz2);

    let mut count = 0usize;
    let mut q = -2.0 / dz2 + problem.diag[0] - x;
    if q < 0.0 {
        count += 1;
    }
    for i in 1..problem.diag.len() {
        let prev = if q == 0.0 { f64::MIN_POSITIVE } else { q };
        q = -2.0 / dz2 + problem.diag[i] - x - e2 / prev;
        if q < 0.0 {
            count += 1;
        }
    }
    count
}

/// Bisect for the eigenvalue with 1-based global index `j` inside
/// `[lo, hi]`, assuming `count_below(lo) < j <= count_below(hi)`.
fn bisect_eigenvalue(problem: &TridiagonalProblem, j: usize, lo: f64, hi: f64) -> (f64, usize) {
    let tol = 4.0 * f64::EPSILON * lo.abs().max(hi.abs()).max(1.0e-30);
    let (mut lo, mut hi) = (lo, hi);
    let mut iterations = 0;
    while hi - lo > tol && iterations < 200 {
        let mid = 0.5 * (lo + hi);
        if count_below(problem, mid) >= j {
            hi = mid;
        } else {
            lo = mid;
        }
        iterations += 1;
    }
    (0.5 * (lo + hi), iterations)
}

fn dense_shifted(problem: &TridiagonalProblem, shift: f64) -> Mat<f64> {
    let n = problem.n();
    let dz2 = problem.dz * problem.dz;
    let mut m = Mat::<f64>::zeros(n, n);
    for i in 0..n {
        m[(i, i)] = -2.0 / dz2 + problem.diag[i] - shift;
        if i > 0 {
            m[(i, i - 1)] = 1.0 / dz2;
        }
        if i + 1 < n {
            m[(i, i + 1)] = 1.0 / dz2;
        }
    }
    m
}

fn apply(problem: &TridiagonalProblem, v: &[f64]) -> Vec<f64> {
    let n = v.len();
    let dz2 = problem.dz * problem.dz;
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut s = (-2.0 / dz2 + problem.diag[i]) * v[i];
        if i > 0 {
            s += v[i - 1] / dz2;
        }
        if i + 1 < n {
            s += v[i + 1] / dz2;
        }
        y[i] = s;
    }
    y
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

/// Inverse iteration at the bisected eigenvalue. Returns the pair and the
/// sweeps spent, or `None` if the residual never met the tolerance.
fn refine_pair(
    problem: &TridiagonalProblem,
    value: f64,
    solver: &ReferenceSolver,
) -> Option<(EigenPair, usize)> {
    let n = problem.n();
    let dz2 = problem.dz * problem.dz;
    let op_scale = 4.0 / dz2 + problem.diag.iter().fold(0.0f64, |m, &d| m.max(d.abs()));
    let tol = solver.residual_tol * op_scale;

    let mut rhs = Mat::<f64>::zeros(n, 1);
    for i in 0..n {
        rhs[(i, 0)] = 1.0 + 0.5 * ((i as f64) * 1.7).sin();
    }

    let mut v = vec![0.0; n];
    let mut have_direction = false;
    let mut offset = 1.0e-11 * op_scale;
    let mut sweeps = 0usize;

    // Shift slightly off the eigenvalue so the factorization stays
    // regular; back further off and refactor while it is still singular
    // to working precision.
    'factor: while sweeps < solver.max_refinements {
        let m = dense_shifted(problem, value + offset);
        let lu = m.as_ref().full_piv_lu();

        while sweeps < solver.max_refinements {
            sweeps += 1;
            let y = lu.solve(&rhs);
            if !copy_iterate(&y, &mut v) {
                if !have_direction {
                    offset *= 100.0;
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

            let tv = apply(problem, &v);
            let residual = tv
                .iter()
                .zip(&v)
                .map(|(&t, &x)| (t - value * x).powi(2))
                .sum::<f64>()
                .sqrt();
            if residual <= tol {
                return Some((EigenPair { value, vector: v }, sweeps));
            }
            for i in 0..n {
                rhs[(i, 0)] = v[i];
            }
        }
    }
    None
}

pub(crate) fn solve(
    problem: &TridiagonalProblem,
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

    let m_lo = count_below(problem, lo);
    let m_hi = count_below(problem, hi);
    let indices: Vec<usize> = (m_lo + 1..=m_hi).collect();
    let requested = match target {
        Some((_, count)) => count,
        None => indices.len(),
    };

    let located: Vec<(f64, usize)> = {
        #[cfg(feature = "parallel")]
        {
            indices
                .par_iter()
                .map(|&j| bisect_eigenvalue(problem, j, lo, hi))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            indices
                .iter()
                .map(|&j| bisect_eigenvalue(problem, j, lo, hi))
                .collect()
        }
    };

    let refined: Vec<Option<(EigenPair, usize)>> = {
        #[cfg(feature = "parallel")]
        {
            located
                .par_iter()
                .map(|&(value, _)| refine_pair(problem, value, solver))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            located
                .iter()
                .map(|&(value, _)| refine_pair(problem, value, solver))
                .collect()
        }
    };

    let mut iterations: usize = located.iter().map(|&(_, it)| it).sum();
    let mut pairs: Vec<EigenPair> = Vec::with_capacity(refined.len());
    for item in refined {
        if let Some((pair, sweeps)) = item {
            iterations += sweeps;
            pairs.push(pair);
        }
    }

    // Ascending from the bisection order; the contract wants descending,
    // or nearest-to-target when a shift was given.
    match target {
        Some((sigma, count)) => {
            pairs.sort_by(|a, b| {
                (a.value - sigma)
                    .abs()
                    .total_cmp(&(b.value - sigma).abs())
            });
            pairs.truncate(count);
        }
        None => pairs.reverse(),
    }

    let report = ConvergenceReport {
        requested,
        converged: pairs.len(),
        iterations,
    };
    Ok(EigenSolution { pairs, report })
}
