//! # nm-rs
//!
//! Normal-mode propagation of atmospheric infrasound.
//!
//! Given an atmospheric profile (winds, temperature, pressure, density on
//! an altitude column), the crate decomposes the acoustic field at a fixed
//! frequency into vertical normal modes and synthesizes transmission loss
//! along range. The building blocks:
//! - Profile storage and derived column tables (effective sound speed,
//!   wind components, absorption)
//! - Finite-difference modal traces for the narrow-angle and wide-angle
//!   formulations, with Sturm mode counting and WKB bound refinement
//! - An eigensolver seam with a dense reference backend for both the
//!   standard and the linearized quadratic problems
//! - Mode selection, attenuation perturbation, and file products
//!   (1D/2D transmission loss, modal starter, dispersion, eigenfunctions)
//! - A run driver that sweeps azimuths with owned per-azimuth buffers

pub mod atmosphere;
pub mod driver;
pub mod eigen;
pub mod grid;
pub mod modes;
pub mod synthesis;
pub mod trace;
pub mod types;
pub mod units;

// Re-export main types for convenience
pub use atmosphere::{AttenuationSpec, Profile, ProfileError, SampledAtmosphere};
pub use driver::{Formulation, ModeSolverConfig, RunSummary, SolveError, run};
pub use eigen::{
    AssembledModes, ConvergenceReport, EigenError, EigenPair, EigenProblem, EigenSolution,
    EigenSolver, QuadraticPencilProblem, ReferenceSolver, SpectralRequest, TridiagonalProblem,
    solve_narrow_angle, solve_wide_angle,
};
pub use grid::AltitudeGrid;
pub use modes::{
    MAX_MODES, ModeSelectError, SelectedModes, perturb::perturb_wavenumbers, select_narrow_angle,
    select_wide_angle,
};
pub use trace::{
    NarrowAngleTrace, TraceSettings, WideAngleTrace, WkbRefinement, build_narrow_angle,
    build_wide_angle,
};
pub use types::{AzimuthDeg, Frequency, WavenumberBounds};
