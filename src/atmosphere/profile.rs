//! 1-D atmospheric profile with altitude-indexed properties.
//!
//! Properties are either vectors over a common altitude basis or named
//! scalars. Vector lookups interpolate linearly between basis samples;
//! derivatives use the local segment slope (centered at interior nodes).

use std::collections::BTreeMap;

use thiserror::Error;

use crate::units::{Unit, UnitError, UnitTable};

/// Error type for profile lookups.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The requested property key does not exist.
    #[error("Profile has no property named '{0}'")]
    MissingKey(String),

    /// The key exists but holds the other kind of property.
    #[error("Property '{0}' is not a {1} property")]
    WrongKind(String, &'static str),

    /// An altitude outside the profile's valid range was requested.
    #[error("Altitude {altitude} m outside profile range [{min} m, {max} m]")]
    AltitudeOutOfRange {
        /// Requested altitude in meters.
        altitude: f64,
        /// Minimum valid altitude in meters.
        min: f64,
        /// Maximum valid altitude in meters.
        max: f64,
    },

    /// A property was added with the wrong number of samples.
    #[error("Property '{key}' has {got} samples, profile basis has {expected}")]
    LengthMismatch {
        /// Offending key.
        key: String,
        /// Number of samples supplied.
        got: usize,
        /// Number of samples in the altitude basis.
        expected: usize,
    },

    /// A property key is already in use.
    #[error("Property key '{0}' is already in use")]
    DuplicateKey(String),

    /// A unit conversion failed.
    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// Read-only view of an atmospheric profile consumed by the solver core.
pub trait Profile {
    /// Scalar property lookup.
    fn get_scalar(&self, key: &str) -> Result<f64, ProfileError>;

    /// Interpolated vector-property lookup at an altitude in meters.
    fn get_at(&self, key: &str, altitude: f64) -> Result<f64, ProfileError>;

    /// First derivative of a vector property with respect to altitude.
    fn first_derivative_at(&self, key: &str, altitude: f64) -> Result<f64, ProfileError>;

    /// Minimum valid altitude in meters.
    fn min_altitude(&self) -> f64;

    /// Maximum valid altitude in meters.
    fn max_altitude(&self) -> f64;
}

/// A 1-D atmospheric profile sampled on a common altitude basis.
///
/// Altitudes are stored in meters, ascending. Property values carry a
/// [`Unit`] tag and can be converted in place through a [`UnitTable`].
#[derive(Clone, Debug)]
pub struct SampledAtmosphere {
    altitudes: Vec<f64>,
    vectors: BTreeMap<String, (Vec<f64>, Unit)>,
    scalars: BTreeMap<String, (f64, Unit)>,
}

impl SampledAtmosphere {
    /// Create a profile from an ascending altitude basis in meters.
    ///
    /// # Panics
    ///
    /// Panics if fewer than two altitudes are given or they are not
    /// strictly ascending.
    pub fn new(altitudes: Vec<f64>) -> Self {
        assert!(altitudes.len() >= 2, "Need at least two altitude samples");
        assert!(
            altitudes.windows(2).all(|w| w[1] > w[0]),
            "Altitudes must be strictly ascending"
        );
        Self {
            altitudes,
            vectors: BTreeMap::new(),
            scalars: BTreeMap::new(),
        }
    }

    /// Number of altitude basis samples.
    pub fn nz(&self) -> usize {
        self.altitudes.len()
    }

    /// The altitude basis in meters.
    pub fn altitudes(&self) -> &[f64] {
        &self.altitudes
    }

    /// Add a vector property over the altitude basis.
    pub fn add_vector(
        &mut self,
        key: &str,
        values: Vec<f64>,
        unit: Unit,
    ) -> Result<(), ProfileError> {
        if self.vectors.contains_key(key) || self.scalars.contains_key(key) {
            return Err(ProfileError::DuplicateKey(key.to_string()));
        }
        if values.len() != self.altitudes.len() {
            return Err(ProfileError::LengthMismatch {
                key: key.to_string(),
                got: values.len(),
                expected: self.altitudes.len(),
            });
        }
        self.vectors.insert(key.to_string(), (values, unit));
        Ok(())
    }

    /// Add a scalar property.
    pub fn add_scalar(&mut self, key: &str, value: f64, unit: Unit) -> Result<(), ProfileError> {
        if self.vectors.contains_key(key) || self.scalars.contains_key(key) {
            return Err(ProfileError::DuplicateKey(key.to_string()));
        }
        self.scalars.insert(key.to_string(), (value, unit));
        Ok(())
    }

    /// Remove a property. Has no effect if the key does not exist.
    pub fn remove(&mut self, key: &str) {
        self.vectors.remove(key);
        self.scalars.remove(key);
    }

    /// True if a property (vector or scalar) with this key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.vectors.contains_key(key) || self.scalars.contains_key(key)
    }

    /// All property keys, vectors first.
    pub fn keys(&self) -> Vec<String> {
        self.vectors
            .keys()
            .chain(self.scalars.keys())
            .cloned()
            .collect()
    }

    /// The raw samples of a vector property.
    pub fn vector(&self, key: &str) -> Result<&[f64], ProfileError> {
        match self.vectors.get(key) {
            Some((v, _)) => Ok(v),
            None if self.scalars.contains_key(key) => {
                Err(ProfileError::WrongKind(key.to_string(), "vector"))
            }
            None => Err(ProfileError::MissingKey(key.to_string())),
        }
    }

    /// The unit tag of a property.
    pub fn unit_of(&self, key: &str) -> Result<Unit, ProfileError> {
        if let Some((_, u)) = self.vectors.get(key) {
            return Ok(*u);
        }
        if let Some((_, u)) = self.scalars.get(key) {
            return Ok(*u);
        }
        Err(ProfileError::MissingKey(key.to_string()))
    }

    /// Convert a vector property to new units in place.
    pub fn convert_vector(
        &mut self,
        key: &str,
        to: Unit,
        table: &UnitTable,
    ) -> Result<(), ProfileError> {
        let (values, unit) = self
            .vectors
            .get_mut(key)
            .ok_or_else(|| ProfileError::MissingKey(key.to_string()))?;
        table.convert_slice(values, *unit, to)?;
        *unit = to;
        Ok(())
    }

    fn segment(&self, altitude: f64) -> Result<usize, ProfileError> {
        let min = self.min_altitude();
        let max = self.max_altitude();
        if altitude < min || altitude > max {
            return Err(ProfileError::AltitudeOutOfRange { altitude, min, max });
        }
        // Index of the segment [z_i, z_{i+1}] containing the altitude.
        let i = match self
            .altitudes
            .binary_search_by(|z| z.partial_cmp(&altitude).unwrap())
        {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Ok(i.min(self.altitudes.len() - 2))
    }
}

impl Profile for SampledAtmosphere {
    fn get_scalar(&self, key: &str) -> Result<f64, ProfileError> {
        match self.scalars.get(key) {
            Some((v, _)) => Ok(*v),
            None if self.vectors.contains_key(key) => {
                Err(ProfileError::WrongKind(key.to_string(), "scalar"))
            }
            None => Err(ProfileError::MissingKey(key.to_string())),
        }
    }

    fn get_at(&self, key: &str, altitude: f64) -> Result<f64, ProfileError> {
        let values = self.vector(key)?;
        let i = self.segment(altitude)?;
        let (z0, z1) = (self.altitudes[i], self.altitudes[i + 1]);
        let t = (altitude - z0) / (z1 - z0);
        Ok(values[i] * (1.0 - t) + values[i + 1] * t)
    }

    fn first_derivative_at(&self, key: &str, altitude: f64) -> Result<f64, ProfileError> {
        let values = self.vector(key)?;
        let i = self.segment(altitude)?;
        let n = self.altitudes.len();
        // Centered difference at interior basis nodes, segment slope elsewhere.
        let at_node = (self.altitudes[i] - altitude).abs() < 1e-9;
        if at_node && i > 0 && i < n - 1 {
            let dz = self.altitudes[i + 1] - self.altitudes[i - 1];
            return Ok((values[i + 1] - values[i - 1]) / dz);
        }
        let dz = self.altitudes[i + 1] - self.altitudes[i];
        Ok((values[i + 1] - values[i]) / dz)
    }

    fn min_altitude(&self) -> f64 {
        self.altitudes[0]
    }

    fn max_altitude(&self) -> f64 {
        *self.altitudes.last().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_profile() -> SampledAtmosphere {
        let mut p = SampledAtmosphere::new(vec![0.0, 1000.0, 2000.0, 3000.0]);
        p.add_vector("T", vec![288.0, 281.5, 275.0, 268.5], Unit::Kelvin)
            .unwrap();
        p.add_vector(
            "RHO",
            vec![1.225, 1.112, 1.007, 0.909],
            Unit::KilogramsPerCubicMeter,
        )
        .unwrap();
        p
    }

    #[test]
    fn test_interpolation_at_nodes_and_midpoints() {
        let p = make_profile();
        assert!((p.get_at("T", 0.0).unwrap() - 288.0).abs() < 1e-12);
        assert!((p.get_at("T", 2000.0).unwrap() - 275.0).abs() < 1e-12);
        assert!((p.get_at("T", 500.0).unwrap() - 284.75).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_is_error() {
        let p = make_profile();
        assert!(matches!(
            p.get_at("T", -1.0),
            Err(ProfileError::AltitudeOutOfRange { .. })
        ));
        assert!(matches!(
            p.get_at("T", 3000.1),
            Err(ProfileError::AltitudeOutOfRange { .. })
        ));
    }

    #[test]
    fn test_missing_key_is_error() {
        let p = make_profile();
        assert!(matches!(
            p.get_at("P", 0.0),
            Err(ProfileError::MissingKey(_))
        ));
        assert!(matches!(
            p.get_scalar("T"),
            Err(ProfileError::WrongKind(_, "scalar"))
        ));
    }

    #[test]
    fn test_first_derivative() {
        let p = make_profile();
        // Linear lapse of -6.5 K per 1000 m everywhere.
        assert!((p.first_derivative_at("T", 1000.0).unwrap() + 0.0065).abs() < 1e-12);
        assert!((p.first_derivative_at("T", 0.0).unwrap() + 0.0065).abs() < 1e-12);
        assert!((p.first_derivative_at("T", 1500.0).unwrap() + 0.0065).abs() < 1e-12);
    }

    #[test]
    fn test_add_remove_round_trip() {
        let mut p = make_profile();
        let keys_before = p.keys();
        let t_before = p.vector("T").unwrap().to_vec();

        p.add_vector("_CE_", vec![340.0; 4], Unit::MetersPerSecond)
            .unwrap();
        p.add_scalar("_AZ_", 90.0, Unit::None).unwrap();
        assert!(p.contains_key("_CE_"));
        assert!(p.contains_key("_AZ_"));

        p.remove("_CE_");
        p.remove("_AZ_");

        assert_eq!(p.keys(), keys_before);
        assert_eq!(p.vector("T").unwrap(), &t_before[..]);
    }

    #[test]
    fn test_duplicate_key_is_error() {
        let mut p = make_profile();
        assert!(matches!(
            p.add_vector("T", vec![0.0; 4], Unit::Kelvin),
            Err(ProfileError::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let mut p = make_profile();
        assert!(matches!(
            p.add_vector("P", vec![1.0; 3], Unit::Pascals),
            Err(ProfileError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_unit_conversion_in_place() {
        let mut p = make_profile();
        let table = UnitTable::standard();
        p.convert_vector("RHO", Unit::GramsPerCubicCentimeter, &table)
            .unwrap();
        assert_eq!(p.unit_of("RHO").unwrap(), Unit::GramsPerCubicCentimeter);
        assert!((p.get_at("RHO", 0.0).unwrap() - 0.001225).abs() < 1e-15);
    }
}
