//! Run driver.
//!
//! Owns the azimuth sweep: for each azimuth it derives the directional
//! sound-speed tables from the profile, builds the modal trace, runs the
//! eigensolver, selects and perturbs the modes, and writes the requested
//! output products. Every azimuth works on its own derived buffers; the
//! profile itself is never mutated.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use thiserror::Error;

use crate::atmosphere::{
    AttenuationSpec, Profile, ProfileError, effective_sound_speed, sample_property,
    sound_speed_from_pressure_density, wind_component, wind_direction, wind_speed,
};
use crate::eigen::{
    ConvergenceReport, EigenError, EigenSolver, solve_narrow_angle, solve_wide_angle,
};
use crate::grid::AltitudeGrid;
use crate::modes::{
    ModeSelectError, SelectedModes, perturb::perturb_wavenumbers, select_narrow_angle,
    select_wide_angle,
};
use crate::synthesis::{self, RangeSweep};
use crate::trace::{self, TraceSettings, sturm};
use crate::types::{AzimuthDeg, Frequency, WavenumberBounds};

/// Profile keys the pipeline samples.
pub mod keys {
    /// Zonal wind, m/s.
    pub const U: &str = "U";
    /// Meridional wind, m/s.
    pub const V: &str = "V";
    /// Temperature, K.
    pub const T: &str = "T";
    /// Pressure, Pa.
    pub const P: &str = "P";
    /// Density, kg/m^3.
    pub const RHO: &str = "RHO";
}

/// Which modal formulation the pipeline runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Formulation {
    /// Effective-sound-speed approximation, standard eigenproblem.
    NarrowAngle,
    /// Quadratic eigenproblem retaining the wind terms.
    WideAngle,
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Eigen(#[from] EigenError),
    #[error(transparent)]
    ModeSelect(#[from] ModeSelectError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Ground impedance model '{0}' is not implemented")]
    UnsupportedGroundModel(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Solver run configuration.
///
/// # Example
///
/// ```no_run
/// use nm_rs::driver::ModeSolverConfig;
///
/// let config = ModeSolverConfig::new(0.5)
///     .with_azimuth(90.0)
///     .with_grid(10_000, 150_000.0)
///     .with_range(1_000_000.0, 1000);
/// ```
#[derive(Clone, Debug)]
pub struct ModeSolverConfig {
    pub freq: Frequency,
    pub formulation: Formulation,
    /// Single propagation azimuth in degrees, used when `nby2d` is off.
    pub azimuth: f64,
    /// Azimuth sweep for N-by-2D runs, degrees.
    pub azimuth_start: f64,
    pub azimuth_end: f64,
    pub azimuth_step: f64,
    /// Sweep azimuths and emit the N-by-2D products.
    pub nby2d: bool,
    /// Number of vertical grid points.
    pub n_z: usize,
    /// Top of the computational column in meters MSL; clamped to the
    /// profile top.
    pub max_height: f64,
    /// Source height above ground in meters.
    pub source_height: f64,
    /// Receiver height above ground in meters.
    pub receiver_height: f64,
    /// Number of range steps.
    pub n_ranges: usize,
    /// Maximum range in meters.
    pub max_range: f64,
    /// Ground impedance model; only "rigid" is implemented.
    pub ground_impedance: String,
    /// Replace the rigid-ground condition with the Lamb wave condition
    /// derived from the density gradient at the ground.
    pub lamb_wave_bc: bool,
    /// Disable the WKB refinement of the upper spectral bound.
    pub turnoff_wkb: bool,
    /// Override the spectral bounds with phase-speed limits
    /// `(c_min, c_max)` in m/s.
    pub wavenumber_filter: Option<(f64, f64)>,
    pub attenuation: AttenuationSpec,
    pub write_2d_tloss: bool,
    pub write_phase_speeds: bool,
    pub write_speeds: bool,
    pub write_modes: bool,
    pub write_dispersion: bool,
    /// File name for the modal starter, written under `output_dir`.
    pub modal_starter_file: Option<String>,
    pub output_dir: PathBuf,
    pub verbose: bool,
}

impl Default for ModeSolverConfig {
    fn default() -> Self {
        Self {
            freq: Frequency::new(0.5),
            formulation: Formulation::NarrowAngle,
            azimuth: 90.0,
            azimuth_start: 0.0,
            azimuth_end: 360.0,
            azimuth_step: 1.0,
            nby2d: false,
            n_z: 20_000,
            max_height: 150_000.0,
            source_height: 0.0,
            receiver_height: 0.0,
            n_ranges: 1000,
            max_range: 1_000_000.0,
            ground_impedance: "rigid".to_string(),
            lamb_wave_bc: false,
            turnoff_wkb: false,
            wavenumber_filter: None,
            attenuation: AttenuationSpec::Lossless,
            write_2d_tloss: false,
            write_phase_speeds: false,
            write_speeds: false,
            write_modes: false,
            write_dispersion: false,
            modal_starter_file: None,
            output_dir: PathBuf::from("."),
            verbose: false,
        }
    }
}

impl ModeSolverConfig {
    pub fn new(freq_hz: f64) -> Self {
        Self {
            freq: Frequency::new(freq_hz),
            ..Default::default()
        }
    }

    pub fn with_formulation(mut self, formulation: Formulation) -> Self {
        self.formulation = formulation;
        self
    }

    pub fn with_azimuth(mut self, azimuth_deg: f64) -> Self {
        self.azimuth = azimuth_deg;
        self
    }

    pub fn with_azimuth_sweep(mut self, start: f64, end: f64, step: f64) -> Self {
        self.azimuth_start = start;
        self.azimuth_end = end;
        self.azimuth_step = step;
        self.nby2d = true;
        self
    }

    pub fn with_grid(mut self, n_z: usize, max_height: f64) -> Self {
        self.n_z = n_z;
        self.max_height = max_height;
        self
    }

    pub fn with_heights(mut self, source: f64, receiver: f64) -> Self {
        self.source_height = source;
        self.receiver_height = receiver;
        self
    }

    pub fn with_range(mut self, max_range: f64, n_ranges: usize) -> Self {
        self.max_range = max_range;
        self.n_ranges = n_ranges;
        self
    }

    pub fn with_attenuation(mut self, attenuation: AttenuationSpec) -> Self {
        self.attenuation = attenuation;
        self
    }

    pub fn with_lamb_wave_bc(mut self, on: bool) -> Self {
        self.lamb_wave_bc = on;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_wavenumber_filter(mut self, c_min: f64, c_max: f64) -> Self {
        self.wavenumber_filter = Some((c_min, c_max));
        self
    }

    pub fn with_verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }

    /// Print the run parameters, one per line.
    pub fn print_summary(&self) {
        println!(" Normal Modes Solver Parameters:");
        println!("                   freq : {}", self.freq.hz());
        if !self.nby2d {
            println!("                azimuth : {}", self.azimuth);
        } else {
            println!("     azimuth_start (deg): {}", self.azimuth_start);
            println!("       azimuth_end (deg): {}", self.azimuth_end);
            println!("      azimuth_step (deg): {}", self.azimuth_step);
        }
        println!("                Nz_grid : {}", self.n_z);
        println!("      maxheight_km (MSL): {}", self.max_height / 1000.0);
        println!("   sourceheight_km (AGL): {}", self.source_height / 1000.0);
        println!(" receiverheight_km (AGL): {}", self.receiver_height / 1000.0);
        println!("             Nrng_steps : {}", self.n_ranges);
        println!("            maxrange_km : {}", self.max_range / 1000.0);
        println!("          gnd_imp_model : {}", self.ground_impedance);
        println!("Lamb wave boundary cond : {}", self.lamb_wave_bc);
        println!("    write_2D_TLoss flag : {}", self.write_2d_tloss);
        println!("write_phase_speeds flag : {}", self.write_phase_speeds);
        println!("      write_speeds flag : {}", self.write_speeds);
        println!("  write_dispersion flag : {}", self.write_dispersion);
        println!("       write_modes flag : {}", self.write_modes);
        println!("         Nby2Dprop flag : {}", self.nby2d);
        println!("       turnoff_WKB flag : {}", self.turnoff_wkb);
        if let Some((c_min, c_max)) = self.wavenumber_filter {
            println!("                  c_min : {} m/s", c_min);
            println!("                  c_max : {} m/s", c_max);
        }
    }

    fn azimuths(&self) -> Vec<f64> {
        if !self.nby2d {
            return vec![self.azimuth];
        }
        let mut list = Vec::new();
        let mut az = self.azimuth_start;
        while az <= self.azimuth_end + 1.0e-9 {
            list.push(az);
            az += self.azimuth_step;
        }
        list
    }

    /// Any product that needs the full mode set disables the WKB
    /// truncation of the spectral bound.
    fn wkb_disabled(&self) -> bool {
        self.turnoff_wkb
            || self.write_2d_tloss
            || self.write_phase_speeds
            || self.write_speeds
            || self.write_modes
            || self.write_dispersion
    }
}

// =============================================================================
// Run results
// =============================================================================

/// Per-azimuth outcome.
#[derive(Clone, Debug)]
pub struct AzimuthOutcome {
    pub azimuth: AzimuthDeg,
    pub bounds: WavenumberBounds,
    pub mode_count: usize,
    /// Solver convergence for this azimuth; `converged` can fall short
    /// of `requested` when the backend loses pairs.
    pub report: ConvergenceReport,
}

/// Summary of a full run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<AzimuthOutcome>,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Azimuth-independent column data sampled once per run.
struct ColumnTables {
    grid: AltitudeGrid,
    c0: Vec<f64>,
    u: Vec<f64>,
    v: Vec<f64>,
    rho: Vec<f64>,
    alpha: Vec<f64>,
    admittance: f64,
}

fn build_column(
    config: &ModeSolverConfig,
    profile: &impl Profile,
) -> Result<ColumnTables, SolveError> {
    if config.n_z < 2 {
        return Err(SolveError::InvalidConfig(format!(
            "n_z = {} is too small",
            config.n_z
        )));
    }
    if config.n_ranges == 0 {
        return Err(SolveError::InvalidConfig("n_ranges must be positive".into()));
    }
    if config.nby2d && config.azimuth_step <= 0.0 {
        return Err(SolveError::InvalidConfig(
            "azimuth_step must be positive for an azimuth sweep".into(),
        ));
    }

    let z_min = profile.min_altitude();
    let mut max_height = config.max_height;
    if max_height > profile.max_altitude() {
        max_height = profile.max_altitude();
        if config.verbose {
            println!(
                "maxheight clamped to the profile top: {} m",
                max_height
            );
        }
    }
    if max_height <= z_min {
        return Err(SolveError::InvalidConfig(format!(
            "max_height {} m is below the ground at {} m",
            max_height, z_min
        )));
    }

    let grid = match config.formulation {
        Formulation::NarrowAngle => AltitudeGrid::narrow_angle(z_min, max_height, config.n_z),
        Formulation::WideAngle => AltitudeGrid::wide_angle(z_min, max_height, config.n_z),
    };

    let pr = sample_property(profile, keys::P, &grid)?;
    let rho = sample_property(profile, keys::RHO, &grid)?;
    let u = sample_property(profile, keys::U, &grid)?;
    let v = sample_property(profile, keys::V, &grid)?;
    let c0 = sound_speed_from_pressure_density(&pr, &rho);
    let alpha = config.attenuation.sample(&grid);

    if config.ground_impedance != "rigid" {
        return Err(SolveError::UnsupportedGroundModel(
            config.ground_impedance.clone(),
        ));
    }
    let admittance = if config.lamb_wave_bc {
        let d_rho = profile.first_derivative_at(keys::RHO, z_min)?;
        let rho_ground = profile.get_at(keys::RHO, z_min)?;
        let a = -d_rho / rho_ground / 2.0;
        if config.verbose {
            println!("Admittance = {}", a);
        }
        a
    } else {
        0.0
    };

    Ok(ColumnTables {
        grid,
        c0,
        u,
        v,
        rho,
        alpha,
        admittance,
    })
}

/// Run the solver over all configured azimuths.
pub fn run(
    config: &ModeSolverConfig,
    profile: &impl Profile,
    solver: &dyn EigenSolver,
) -> Result<RunSummary, SolveError> {
    let column = build_column(config, profile)?;
    std::fs::create_dir_all(&config.output_dir)?;

    let azimuths = config.azimuths();
    let mut summary = RunSummary::default();
    for (it, &azi) in azimuths.iter().enumerate() {
        let azi = AzimuthDeg::new(azi);
        if config.verbose {
            println!();
            println!(
                "Now processing azimuth = {} ({} of {})",
                azi,
                it + 1,
                azimuths.len()
            );
        }
        let outcome = run_azimuth(config, &column, azi, it, solver)?;
        summary.outcomes.push(outcome);
    }
    Ok(summary)
}

fn run_azimuth(
    config: &ModeSolverConfig,
    column: &ColumnTables,
    azi: AzimuthDeg,
    it: usize,
    solver: &dyn EigenSolver,
) -> Result<AzimuthOutcome, SolveError> {
    let grid = &column.grid;
    let freq = config.freq;

    // Directional tables owned by this azimuth.
    let ws = wind_speed(&column.u, &column.v);
    let wd = wind_direction(&column.u, &column.v);
    let wc = wind_component(&ws, &wd, azi.degrees());
    let c_eff = effective_sound_speed(&column.c0, &wc);

    let settings = TraceSettings {
        admittance: column.admittance,
        freq,
        source_height: config.source_height,
        receiver_height: config.receiver_height,
        turnoff_wkb: config.wkb_disabled(),
    };

    let (selected, bounds, report) = match config.formulation {
        Formulation::NarrowAngle => {
            let mut trace = trace::build_narrow_angle(grid, &c_eff, &settings);
            report_wkb(config, &trace.wkb, freq);
            apply_filter(config, freq, &mut trace.bounds);
            let bounds = trace.bounds;
            if bounds.k_max <= bounds.k_min {
                let empty = SelectedModes::from_parts(Vec::new(), Vec::new())?;
                (empty, bounds, ConvergenceReport::default())
            } else {
                announce(config, "Normal mode solution", freq, azi, &trace.diag, grid, &bounds);
                let assembled = solve_narrow_angle(&trace, grid, solver)?;
                let report = assembled.report;
                (select_narrow_angle(&assembled, &bounds)?, bounds, report)
            }
        }
        Formulation::WideAngle => {
            let mut trace = trace::build_wide_angle(grid, &c_eff, &column.c0, &wc, &settings);
            report_wkb(config, &trace.wkb, freq);
            apply_filter(config, freq, &mut trace.bounds);
            let bounds = trace.bounds;
            if bounds.k_max <= bounds.k_min {
                let empty = SelectedModes::from_parts(Vec::new(), Vec::new())?;
                (empty, bounds, ConvergenceReport::default())
            } else {
                announce(config, "Wide-angle solution", freq, azi, &trace.diag, grid, &bounds);
                let assembled = solve_wide_angle(&trace, grid, solver)?;
                let report = assembled.report;
                (select_wide_angle(&assembled, &bounds)?, bounds, report)
            }
        }
    };

    if config.verbose {
        println!(" Number of converged eigenpairs: {}", report.converged);
    }
    if report.converged < report.requested {
        println!(
            " Warning: only {} of {} requested eigenpairs converged.",
            report.converged, report.requested
        );
    }

    let k_pert = perturb_wavenumbers(&selected, grid.dz, freq, &column.c0, &column.alpha);

    let sweep = RangeSweep {
        n_ranges: config.n_ranges,
        range_step: config.max_range / config.n_ranges as f64,
    };
    let wide = config.formulation == Formulation::WideAngle;
    let n = grid.n;
    let dz = grid.dz;

    if config.nby2d {
        let (lossy_name, lossless_name) = if wide {
            (synthesis::NBY2D_WTLOSS_1D, synthesis::NBY2D_WTLOSS_1D_LOSSLESS)
        } else {
            (synthesis::NBY2D_TLOSS_1D, synthesis::NBY2D_TLOSS_1D_LOSSLESS)
        };
        let mut lossy = open_block(config, lossy_name, it)?;
        let mut lossless = open_block(config, lossless_name, it)?;
        synthesis::write_tloss_1d_nby2d(
            &mut lossy,
            &mut lossless,
            azi.degrees(),
            &selected,
            &k_pert,
            dz,
            n,
            config.source_height,
            config.receiver_height,
            &sweep,
        )?;
        lossy.flush()?;
        lossless.flush()?;
    } else {
        let (lossy_name, lossless_name) = if wide {
            (synthesis::WTLOSS_1D, synthesis::WTLOSS_1D_LOSSLESS)
        } else {
            (synthesis::TLOSS_1D, synthesis::TLOSS_1D_LOSSLESS)
        };
        if config.verbose {
            println!("Writing to file: 1D transmission loss at the ground...");
        }
        let mut lossy = create(config, lossy_name)?;
        let mut lossless = create(config, lossless_name)?;
        synthesis::write_tloss_1d(
            &mut lossy,
            &mut lossless,
            &selected,
            &k_pert,
            dz,
            n,
            config.source_height,
            config.receiver_height,
            &sweep,
        )?;
        lossy.flush()?;
        lossless.flush()?;

        if let Some(name) = &config.modal_starter_file {
            if config.verbose {
                println!("Writing to file: modal starter");
            }
            let mut out = create(config, name)?;
            synthesis::write_modal_starter(
                &mut out,
                &selected,
                &k_pert,
                dz,
                n,
                freq,
                config.source_height,
            )?;
            out.flush()?;
        }

        if config.write_2d_tloss {
            if config.verbose {
                println!("Writing to file: 2D transmission loss...");
            }
            let name = if wide {
                synthesis::WTLOSS_2D
            } else {
                synthesis::TLOSS_2D
            };
            let mut out = create(config, name)?;
            synthesis::write_tloss_2d(
                &mut out,
                &selected,
                &k_pert,
                dz,
                n,
                config.source_height,
                &sweep,
            )?;
            out.flush()?;
        }

        if config.write_phase_speeds {
            if config.verbose {
                println!("Writing to file: phase speeds...");
            }
            let mut out = create(config, synthesis::PHASESPEEDS)?;
            synthesis::write_phase_speeds(&mut out, freq, &k_pert)?;
            out.flush()?;
        }

        if config.write_modes {
            if config.verbose {
                println!("Writing to file: the modes and the phase and group speeds...");
            }
            for (j, v) in selected.vectors.iter().enumerate() {
                let mut out = create(config, &synthesis::mode_file_name(j))?;
                let chk = synthesis::write_eigenfunction(&mut out, v, dz)?;
                out.flush()?;
                if (1.0 - chk).abs() > 0.1 {
                    println!("Check if eigenfunction {} is normalized!", j);
                }
            }
        }

        if config.write_speeds || config.write_modes {
            let mut out = create(config, synthesis::SPEEDS)?;
            synthesis::write_phase_and_group_speeds(
                &mut out, &selected, &k_pert, &c_eff, dz, freq,
            )?;
            out.flush()?;
        }

        if config.write_dispersion {
            if config.verbose {
                println!("Writing to file: dispersion at freq = {:.3} Hz...", freq.hz());
            }
            let n_zsrc = synthesis::level_index(config.source_height, dz, n);
            let mut out = create(config, &synthesis::dispersion_file_name(freq))?;
            synthesis::write_dispersion(
                &mut out,
                &selected,
                &k_pert,
                dz,
                n,
                freq,
                config.source_height,
                config.receiver_height,
                column.rho[n_zsrc],
            )?;
            out.flush()?;
        }
    }

    Ok(AzimuthOutcome {
        azimuth: azi,
        bounds,
        mode_count: selected.len(),
        report,
    })
}

fn report_wkb(config: &ModeSolverConfig, wkb: &Option<trace::WkbRefinement>, freq: Frequency) {
    if let Some(wkb) = wkb
        && wkb.tightened()
        && config.verbose
    {
        let (refined, full) = wkb.phase_speeds(freq);
        println!(
            " -> WKB cut: minimum phase speed raised from {:.2} m/s to {:.2} m/s",
            full, refined
        );
    }
}

fn apply_filter(config: &ModeSolverConfig, freq: Frequency, bounds: &mut WavenumberBounds) {
    if let Some((c_min, c_max)) = config.wavenumber_filter {
        *bounds = WavenumberBounds::from_phase_speeds(freq, c_min, c_max);
    }
}

fn announce(
    config: &ModeSolverConfig,
    label: &str,
    freq: Frequency,
    azi: AzimuthDeg,
    diag: &[f64],
    grid: &AltitudeGrid,
    bounds: &WavenumberBounds,
) {
    if !config.verbose {
        return;
    }
    let nev = sturm::estimate_mode_count(diag, grid.dz, bounds.k_min, bounds.k_max);
    println!("______________________________________________________________________");
    println!();
    println!(
        " -> {} at {:.3} Hz and {:.2} deg ({} modes)...",
        label,
        freq.hz(),
        azi.degrees(),
        nev
    );
    let (c_slow, c_fast) = bounds.phase_speed_range(freq);
    println!(" -> Discrete spectrum: {:.2} m/s to {:.2} m/s", c_slow, c_fast);
}

fn create(config: &ModeSolverConfig, name: &str) -> Result<BufWriter<File>, SolveError> {
    let path = config.output_dir.join(name);
    Ok(BufWriter::new(File::create(path)?))
}

/// Truncate on the first azimuth of a sweep, append afterwards.
fn open_block(
    config: &ModeSolverConfig,
    name: &str,
    it: usize,
) -> Result<BufWriter<File>, SolveError> {
    let path = config.output_dir.join(name);
    let file = if it == 0 {
        File::create(path)?
    } else {
        OpenOptions::new().append(true).create(true).open(path)?
    };
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_azimuth_list_single() {
        let config = ModeSolverConfig::new(0.5).with_azimuth(37.0);
        assert_eq!(config.azimuths(), vec![37.0]);
    }

    #[test]
    fn test_azimuth_sweep_inclusive() {
        let config = ModeSolverConfig::new(0.5).with_azimuth_sweep(0.0, 10.0, 5.0);
        assert!(config.nby2d);
        assert_eq!(config.azimuths(), vec![0.0, 5.0, 10.0]);
    }

    #[test]
    fn test_aux_outputs_disable_wkb() {
        let mut config = ModeSolverConfig::new(0.5);
        assert!(!config.wkb_disabled());
        config.write_modes = true;
        assert!(config.wkb_disabled());
        config.write_modes = false;
        config.turnoff_wkb = true;
        assert!(config.wkb_disabled());
    }

    #[test]
    fn test_filter_overrides_bounds() {
        let config = ModeSolverConfig::new(0.5).with_wavenumber_filter(300.0, 400.0);
        let freq = config.freq;
        let mut bounds = WavenumberBounds::new(0.001, 0.002);
        apply_filter(&config, freq, &mut bounds);
        let (c_slow, c_fast) = bounds.phase_speed_range(freq);
        assert!((c_slow - 300.0).abs() < 1e-9);
        assert!((c_fast - 400.0).abs() < 1e-9);
    }
}
