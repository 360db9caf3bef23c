//! Mode selection.
//!
//! Filters the assembled eigenpairs down to the propagating set whose
//! horizontal wavenumbers fall inside the spectral bounds, preserving the
//! order they arrived in. The selected count is hard-capped; blowing the
//! cap is an error rather than a silent truncation.

pub mod perturb;

use thiserror::Error;

use crate::eigen::AssembledModes;
use crate::types::WavenumberBounds;

/// Hard cap on the number of selected modes.
pub const MAX_MODES: usize = 4000;

/// Propagating modes retained for the field synthesis. Vectors carry the
/// `1/sqrt(dz)` scaling, so `sum(v^2) * dz = 1` per mode.
#[derive(Clone, Debug)]
pub struct SelectedModes {
    /// Horizontal wavenumbers in 1/m, one per mode.
    pub wavenumbers: Vec<f64>,
    /// Mode shapes on the grid, one vector per mode.
    pub vectors: Vec<Vec<f64>>,
}

#[derive(Debug, Error)]
pub enum ModeSelectError {
    #[error("Selected {count} modes, exceeding the cap of {max}")]
    TooManyModes { count: usize, max: usize },
}

impl SelectedModes {
    pub fn from_parts(
        wavenumbers: Vec<f64>,
        vectors: Vec<Vec<f64>>,
    ) -> Result<Self, ModeSelectError> {
        debug_assert_eq!(wavenumbers.len(), vectors.len());
        if wavenumbers.len() > MAX_MODES {
            return Err(ModeSelectError::TooManyModes {
                count: wavenumbers.len(),
                max: MAX_MODES,
            });
        }
        Ok(Self {
            wavenumbers,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.wavenumbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavenumbers.is_empty()
    }
}

/// Select narrow-angle modes. Assembled values are squared wavenumbers;
/// negative ones (evanescent, below the branch cut) are skipped before the
/// square root.
pub fn select_narrow_angle(
    assembled: &AssembledModes,
    bounds: &WavenumberBounds,
) -> Result<SelectedModes, ModeSelectError> {
    let mut wavenumbers = Vec::new();
    let mut vectors = Vec::new();
    for (value, vector) in assembled.values.iter().zip(&assembled.vectors) {
        if *value < 0.0 {
            continue;
        }
        let k = value.sqrt();
        if bounds.contains(k) {
            wavenumbers.push(k);
            vectors.push(vector.clone());
        }
    }
    SelectedModes::from_parts(wavenumbers, vectors)
}

/// Select wide-angle modes. Assembled values are wavenumbers directly.
pub fn select_wide_angle(
    assembled: &AssembledModes,
    bounds: &WavenumberBounds,
) -> Result<SelectedModes, ModeSelectError> {
    let mut wavenumbers = Vec::new();
    let mut vectors = Vec::new();
    for (value, vector) in assembled.values.iter().zip(&assembled.vectors) {
        if bounds.contains(*value) {
            wavenumbers.push(*value);
            vectors.push(vector.clone());
        }
    }
    SelectedModes::from_parts(wavenumbers, vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eigen::ConvergenceReport;

    fn assembled(values: Vec<f64>) -> AssembledModes {
        let vectors = values.iter().map(|_| vec![1.0, 2.0]).collect();
        AssembledModes {
            values,
            vectors,
            report: ConvergenceReport::default(),
        }
    }

    #[test]
    fn test_narrow_selection_filters_and_roots() {
        let a = assembled(vec![-0.5, 0.0001, 0.0004, 0.01]);
        let bounds = WavenumberBounds::new(0.015, 0.025);
        let s = select_narrow_angle(&a, &bounds).unwrap();
        // Only k = 0.02 lands inside; negative value skipped, 0.01 and 0.1
        // fall outside the bounds.
        assert_eq!(s.wavenumbers, vec![0.02]);
        assert_eq!(s.vectors.len(), 1);
    }

    #[test]
    fn test_wide_selection_keeps_arrival_order() {
        let a = assembled(vec![0.020, 0.016, 0.024, 0.030]);
        let bounds = WavenumberBounds::new(0.015, 0.025);
        let s = select_wide_angle(&a, &bounds).unwrap();
        assert_eq!(s.wavenumbers, vec![0.020, 0.016, 0.024]);
    }

    #[test]
    fn test_mode_cap_enforced() {
        let n = MAX_MODES + 1;
        let wavenumbers = vec![0.02; n];
        let vectors = vec![vec![1.0]; n];
        let err = SelectedModes::from_parts(wavenumbers, vectors);
        assert!(matches!(
            err,
            Err(ModeSelectError::TooManyModes { count, max })
                if count == MAX_MODES + 1 && max == MAX_MODES
        ));
    }
}
