//! Unit conversion via an immutable lookup table.
//!
//! A [`UnitTable`] is constructed once (typically at process startup) and
//! passed by reference to whatever needs conversions. Requesting an
//! undefined conversion is a typed error, not a panic.

use std::collections::HashMap;

use thiserror::Error;

/// Error type for unit conversion.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnitError {
    /// No conversion is defined between the two units.
    #[error("No conversion defined from {from:?} to {to:?}")]
    UndefinedConversion {
        /// Source unit.
        from: Unit,
        /// Target unit.
        to: Unit,
    },
}

/// Units understood by the conversion table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Unit {
    /// Dimensionless / unitless quantity.
    None,
    /// Temperature in Kelvin.
    Kelvin,
    /// Temperature in degrees Celsius.
    Celsius,
    /// Temperature in degrees Fahrenheit.
    Fahrenheit,
    /// Distance in meters.
    Meters,
    /// Distance in kilometers.
    Kilometers,
    /// Speed in m/s.
    MetersPerSecond,
    /// Speed in km/s.
    KilometersPerSecond,
    /// Pressure in Pa.
    Pascals,
    /// Pressure in mbar.
    Millibars,
    /// Density in kg/m^3.
    KilogramsPerCubicMeter,
    /// Density in g/cm^3.
    GramsPerCubicCentimeter,
}

impl Unit {
    /// Parse a unit from its conventional abbreviation.
    pub fn from_abbreviation(s: &str) -> Option<Unit> {
        match s {
            "" => Some(Unit::None),
            "K" => Some(Unit::Kelvin),
            "C" => Some(Unit::Celsius),
            "F" => Some(Unit::Fahrenheit),
            "m" => Some(Unit::Meters),
            "km" => Some(Unit::Kilometers),
            "m/s" => Some(Unit::MetersPerSecond),
            "km/s" => Some(Unit::KilometersPerSecond),
            "Pa" => Some(Unit::Pascals),
            "mbar" => Some(Unit::Millibars),
            "kg/m3" => Some(Unit::KilogramsPerCubicMeter),
            "g/cm3" => Some(Unit::GramsPerCubicCentimeter),
            _ => None,
        }
    }
}

type ConversionFn = fn(f64) -> f64;

/// Immutable unit-conversion lookup table.
///
/// All supported conversions are registered in [`UnitTable::standard`];
/// there is no lazy or global state.
pub struct UnitTable {
    map: HashMap<(Unit, Unit), ConversionFn>,
}

impl UnitTable {
    /// Build the standard conversion table.
    pub fn standard() -> Self {
        use Unit::*;
        let mut map: HashMap<(Unit, Unit), ConversionFn> = HashMap::new();

        map.insert((Celsius, Kelvin), |v| v + 273.15);
        map.insert((Kelvin, Celsius), |v| v - 273.15);
        map.insert((Fahrenheit, Celsius), |v| (v - 32.0) * 5.0 / 9.0);
        map.insert((Celsius, Fahrenheit), |v| v * 9.0 / 5.0 + 32.0);
        map.insert((Fahrenheit, Kelvin), |v| (v - 32.0) * 5.0 / 9.0 + 273.15);
        map.insert((Kelvin, Fahrenheit), |v| (v - 273.15) * 9.0 / 5.0 + 32.0);

        map.insert((Meters, Kilometers), |v| v * 0.001);
        map.insert((Kilometers, Meters), |v| v * 1000.0);

        map.insert((MetersPerSecond, KilometersPerSecond), |v| v * 0.001);
        map.insert((KilometersPerSecond, MetersPerSecond), |v| v * 1000.0);

        map.insert((Pascals, Millibars), |v| v * 0.01);
        map.insert((Millibars, Pascals), |v| v * 100.0);

        map.insert((KilogramsPerCubicMeter, GramsPerCubicCentimeter), |v| {
            v * 0.001
        });
        map.insert((GramsPerCubicCentimeter, KilogramsPerCubicMeter), |v| {
            v * 1000.0
        });

        Self { map }
    }

    /// Convert a single value between units.
    pub fn convert(&self, value: f64, from: Unit, to: Unit) -> Result<f64, UnitError> {
        if from == to {
            return Ok(value);
        }
        match self.map.get(&(from, to)) {
            Some(f) => Ok(f(value)),
            None => Err(UnitError::UndefinedConversion { from, to }),
        }
    }

    /// Convert a slice of values in place.
    pub fn convert_slice(
        &self,
        values: &mut [f64],
        from: Unit,
        to: Unit,
    ) -> Result<(), UnitError> {
        if from == to {
            return Ok(());
        }
        let f = self
            .map
            .get(&(from, to))
            .ok_or(UnitError::UndefinedConversion { from, to })?;
        for v in values.iter_mut() {
            *v = f(*v);
        }
        Ok(())
    }
}
