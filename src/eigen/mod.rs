//! Eigensolver service.
//!
//! The propagation pipeline talks to an opaque [`EigenSolver`] that, given a
//! discretized operator and a spectral request, returns converged eigenpairs
//! with unit 2-norm vectors plus a convergence report. Returning fewer pairs
//! than requested is not an error; the report says how many converged.
//!
//! [`ReferenceSolver`] is the built-in backend: Sturm bisection plus inverse
//! iteration for the symmetric tridiagonal operator, and a determinant
//! search over the quadratic pencil for the wide-angle formulation.

pub mod linearized;
pub mod tridiagonal;

use thiserror::Error;

use crate::grid::AltitudeGrid;
use crate::trace::{NarrowAngleTrace, WideAngleTrace, sturm};

// =============================================================================
// Problems
// =============================================================================

/// Symmetric tridiagonal operator with main diagonal `-2/dz^2 + diag[i]`
/// and constant off-diagonal `1/dz^2`. Eigenvalues are squared horizontal
/// wavenumbers.
#[derive(Clone, Debug)]
pub struct TridiagonalProblem {
    pub diag: Vec<f64>,
    pub dz: f64,
}

impl TridiagonalProblem {
    pub fn n(&self) -> usize {
        self.diag.len()
    }
}

/// Quadratic pencil `T(k) = D + k*C + k^2*M` where `D` is the tridiagonal
/// operator built from `kd`, and `C`, `M` are diagonal with entries `cd`
/// and `md`. Eigenvalues are horizontal wavenumbers directly.
#[derive(Clone, Debug)]
pub struct QuadraticPencilProblem {
    pub kd: Vec<f64>,
    pub md: Vec<f64>,
    pub cd: Vec<f64>,
    pub dz: f64,
}

impl QuadraticPencilProblem {
    pub fn n(&self) -> usize {
        self.kd.len()
    }
}

/// The operator handed to the eigensolver.
#[derive(Clone, Debug)]
pub enum EigenProblem {
    Standard(TridiagonalProblem),
    WideAngle(QuadraticPencilProblem),
}

// =============================================================================
// Requests and results
// =============================================================================

/// What part of the spectrum the caller wants.
#[derive(Clone, Copy, Debug)]
pub enum SpectralRequest {
    /// Every eigenvalue inside `[lo, hi]`, returned in descending order.
    Interval { lo: f64, hi: f64 },
    /// Up to `count` eigenvalues inside `[lo, hi]`, ordered by distance
    /// from the shift `sigma` (nearest first).
    Nearest {
        sigma: f64,
        count: usize,
        lo: f64,
        hi: f64,
    },
}

/// A converged eigenpair. The vector has unit 2-norm.
#[derive(Clone, Debug)]
pub struct EigenPair {
    pub value: f64,
    pub vector: Vec<f64>,
}

/// Summary of a solve.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConvergenceReport {
    /// Pairs the request asked for (the interval estimate for
    /// [`SpectralRequest::Interval`]).
    pub requested: usize,
    /// Pairs that passed the residual check.
    pub converged: usize,
    /// Total iterations spent across all pairs.
    pub iterations: usize,
}

#[derive(Clone, Debug)]
pub struct EigenSolution {
    pub pairs: Vec<EigenPair>,
    pub report: ConvergenceReport,
}

#[derive(Debug, Error)]
pub enum EigenError {
    #[error("Invalid spectral interval [{lo}, {hi}]")]
    InvalidInterval { lo: f64, hi: f64 },
    #[error("Operator has dimension {n}, need at least 2 grid points")]
    ProblemTooSmall { n: usize },
    #[error("Operator diagonals have mismatched lengths: {0} vs {1}")]
    DiagonalMismatch(usize, usize),
}

// =============================================================================
// Solver trait and reference backend
// =============================================================================

/// Interface the pipeline uses to obtain eigenpairs.
pub trait EigenSolver {
    fn solve(
        &self,
        problem: &EigenProblem,
        request: &SpectralRequest,
    ) -> Result<EigenSolution, EigenError>;
}

/// Built-in direct backend.
///
/// Suited to the column sizes atmospheric runs use; both paths factor the
/// shifted operator once per eigenvalue and refine with inverse iteration.
#[derive(Clone, Copy, Debug)]
pub struct ReferenceSolver {
    /// Relative residual tolerance for accepting a pair.
    pub residual_tol: f64,
    /// Cap on inverse-iteration sweeps per pair.
    pub max_refinements: usize,
}

impl Default for ReferenceSolver {
    fn default() -> Self {
        Self {
            residual_tol: 1.0e-8,
            max_refinements: 12,
        }
    }
}

impl ReferenceSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EigenSolver for ReferenceSolver {
    fn solve(
        &self,
        problem: &EigenProblem,
        request: &SpectralRequest,
    ) -> Result<EigenSolution, EigenError> {
        validate(problem, request)?;
        match problem {
            EigenProblem::Standard(t) => tridiagonal::solve(t, request, self),
            EigenProblem::WideAngle(p) => linearized::solve(p, request, self),
        }
    }
}

fn validate(problem: &EigenProblem, request: &SpectralRequest) -> Result<(), EigenError> {
    let (lo, hi) = match *request {
        SpectralRequest::Interval { lo, hi } => (lo, hi),
        SpectralRequest::Nearest { lo, hi, .. } => (lo, hi),
    };
    if !(lo.is_finite() && hi.is_finite()) || lo > hi {
        return Err(EigenError::InvalidInterval { lo, hi });
    }
    match problem {
        EigenProblem::Standard(t) => {
            if t.n() < 2 {
                return Err(EigenError::ProblemTooSmall { n: t.n() });
            }
        }
        EigenProblem::WideAngle(p) => {
            if p.n() < 2 {
                return Err(EigenError::ProblemTooSmall { n: p.n() });
            }
            if p.md.len() != p.kd.len() {
                return Err(EigenError::DiagonalMismatch(p.kd.len(), p.md.len()));
            }
            if p.cd.len() != p.kd.len() {
                return Err(EigenError::DiagonalMismatch(p.kd.len(), p.cd.len()));
            }
        }
    }
    Ok(())
}

// =============================================================================
// Assembly into mode bases
// =============================================================================

/// Eigenpairs reshaped for the propagation pipeline: eigenvectors carry the
/// `1/sqrt(dz)` scaling so that `sum(v^2) * dz = 1`.
#[derive(Clone, Debug)]
pub struct AssembledModes {
    /// Squared wavenumbers `k^2` for the narrow-angle operator, wavenumbers
    /// `k` for the wide-angle pencil.
    pub values: Vec<f64>,
    /// One scaled eigenvector per value, each `grid.n` long.
    pub vectors: Vec<Vec<f64>>,
    pub report: ConvergenceReport,
}

/// Solve the narrow-angle operator over the trace's spectral bounds.
///
/// The backend returns pairs in descending eigenvalue order; they are
/// stored reversed so the assembled modes run in ascending `k^2`.
pub fn solve_narrow_angle(
    trace: &NarrowAngleTrace,
    grid: &AltitudeGrid,
    solver: &dyn EigenSolver,
) -> Result<AssembledModes, EigenError> {
    let problem = EigenProblem::Standard(TridiagonalProblem {
        diag: trace.diag.clone(),
        dz: grid.dz,
    });
    let request = SpectralRequest::Interval {
        lo: trace.bounds.k_min.powi(2),
        hi: trace.bounds.k_max.powi(2),
    };
    let solution = solver.solve(&problem, &request)?;

    let scale = 1.0 / grid.dz.sqrt();
    let mut values = Vec::with_capacity(solution.pairs.len());
    let mut vectors = Vec::with_capacity(solution.pairs.len());
    for pair in solution.pairs.iter().rev() {
        values.push(pair.value);
        vectors.push(pair.vector.iter().map(|&x| x * scale).collect());
    }
    Ok(AssembledModes {
        values,
        vectors,
        report: solution.report,
    })
}

/// Solve the wide-angle pencil, targeting the middle of the spectral
/// interval.
///
/// The pencil vectors are `2n` long (mode stacked over `k` times mode,
/// jointly unit norm); only the mode half enters the assembly, scaled by
/// `1/sqrt(dz)`. Pairs stay in the backend's nearest-to-target order.
pub fn solve_wide_angle(
    trace: &WideAngleTrace,
    grid: &AltitudeGrid,
    solver: &dyn EigenSolver,
) -> Result<AssembledModes, EigenError> {
    let nev = sturm::estimate_mode_count(
        &trace.diag,
        grid.dz,
        trace.bounds.k_min,
        trace.bounds.k_max,
    );
    let problem = EigenProblem::WideAngle(QuadraticPencilProblem {
        kd: trace.kd.clone(),
        md: trace.md.clone(),
        cd: trace.cd.clone(),
        dz: grid.dz,
    });
    let request = SpectralRequest::Nearest {
        sigma: 0.5 * (trace.bounds.k_min + trace.bounds.k_max),
        count: (2 * nev).max(1),
        lo: trace.bounds.k_min,
        hi: trace.bounds.k_max,
    };
    let solution = solver.solve(&problem, &request)?;

    let n = grid.n;
    let scale = 1.0 / grid.dz.sqrt();
    let mut values = Vec::with_capacity(solution.pairs.len());
    let mut vectors = Vec::with_capacity(solution.pairs.len());
    for pair in &solution.pairs {
        values.push(pair.value);
        vectors.push(pair.vector[..n].iter().map(|&x| x * scale).collect());
    }
    Ok(AssembledModes {
        values,
        vectors,
        report: solution.report,
    })
}

// =============================================================================
// Sparse triplet support for the linearized pair
// =============================================================================

/// Minimal triplet-form sparse matrix, enough for residual checks on the
/// linearized generalized problem.
#[derive(Clone, Debug)]
pub(crate) struct TripletMatrix {
    n: usize,
    entries: Vec<(usize, usize, f64)>,
}

impl TripletMatrix {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            n,
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n && col < self.n);
        self.entries.push((row, col, value));
    }

    pub(crate) fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.n);
        let mut y = vec![0.0; self.n];
        for &(i, j, a) in &self.entries {
            y[i] += a * x[j];
        }
        y
    }

    pub(crate) fn max_abs(&self) -> f64 {
        self.entries
            .iter()
            .map(|&(_, _, a)| a.abs())
            .fold(0.0, f64::max)
    }
}

/// Linearization of the quadratic pencil as a generalized pair `A x = k B x`
/// with `x = (v, k v)`:
///
/// ```text
///  / -D  0 \        / C  M \
/// |         | x = k |       | x
///  \  0  M /        \ M  0 /
/// ```
pub(crate) fn linearized_pair(p: &QuadraticPencilProblem) -> (TripletMatrix, TripletMatrix) {
    let n = p.n();
    let h2 = p.dz * p.dz;
    let mut a = TripletMatrix::new(2 * n);
    let mut b = TripletMatrix::new(2 * n);

    // -D block: main 2/h^2 - kd[i], off-diagonal -1/h^2.
    for i in 0..n {
        a.push(i, i, 2.0 / h2 - p.kd[i]);
        if i > 0 {
            a.push(i, i - 1, -1.0 / h2);
        }
        if i + 1 < n {
            a.push(i, i + 1, -1.0 / h2);
        }
    }
    // M block in the lower half of A.
    for i in 0..n {
        a.push(n + i, n + i, p.md[i]);
    }
    // B: C and M across the top, M in the lower-left block.
    for i in 0..n {
        b.push(i, i, p.cd[i]);
        b.push(i, n + i, p.md[i]);
        b.push(n + i, i, p.md[i]);
    }
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_inverted_interval() {
        let problem = EigenProblem::Standard(TridiagonalProblem {
            diag: vec![1.0; 8],
            dz: 1.0,
        });
        let request = SpectralRequest::Interval { lo: 2.0, hi: 1.0 };
        let err = ReferenceSolver::new().solve(&problem, &request);
        assert!(matches!(err, Err(EigenError::InvalidInterval { .. })));
    }

    #[test]
    fn test_validate_rejects_tiny_problem() {
        let problem = EigenProblem::Standard(TridiagonalProblem {
            diag: vec![1.0],
            dz: 1.0,
        });
        let request = SpectralRequest::Interval { lo: 0.0, hi: 1.0 };
        let err = ReferenceSolver::new().solve(&problem, &request);
        assert!(matches!(err, Err(EigenError::ProblemTooSmall { n: 1 })));
    }

    #[test]
    fn test_linearized_pair_consistent_with_pencil() {
        // For an eigenpair (k, v) of the pencil, x = (v, k v) must satisfy
        // A x = k B x. Use a 2-point problem small enough to check by hand.
        let p = QuadraticPencilProblem {
            kd: vec![3.0, 3.0],
            md: vec![-1.0, -1.0],
            cd: vec![0.0, 0.0],
            dz: 1.0,
        };
        // With cd = 0 and md = -1 the pencil is D - k^2 I; eigenvalues of D
        // (main 1.0, off 1.0) are 0 and 2, so k = sqrt(2) with v = (1,1).
        let k = 2.0f64.sqrt();
        let v = [1.0 / 2.0f64.sqrt(), 1.0 / 2.0f64.sqrt()];
        let x = [v[0], v[1], k * v[0], k * v[1]];

        let (a, b) = linearized_pair(&p);
        let ax = a.mul_vec(&x);
        let bx = b.mul_vec(&x);
        for i in 0..4 {
            assert!(
                (ax[i] - k * bx[i]).abs() < 1e-12,
                "row {}: {} vs {}",
                i,
                ax[i],
                k * bx[i]
            );
        }
    }

    #[test]
    fn test_triplet_mul_vec() {
        let mut m = TripletMatrix::new(3);
        m.push(0, 0, 2.0);
        m.push(1, 2, -1.0);
        m.push(2, 0, 0.5);
        m.push(2, 0, 0.5);
        let y = m.mul_vec(&[1.0, 2.0, 3.0]);
        assert_eq!(y, vec![2.0, -3.0, 1.0]);
    }
}
