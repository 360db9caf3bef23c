//! Atmospheric profile storage and derived quantities.
//!
//! [`SampledAtmosphere`] stores altitude-indexed physical quantities and
//! answers interpolated and derivative lookups. The [`derived`] module
//! computes new altitude-indexed tables (effective sound speed, wind
//! component, absorption) as freshly owned vectors; the profile itself is
//! never used as scratch storage for azimuth-dependent quantities.

pub mod derived;
pub mod profile;

pub use derived::{
    AttenuationFileError, AttenuationSpec, GAMMA, effective_sound_speed, read_attenuation_file,
    sample_property,
    sound_speed_from_pressure_density, wind_component, wind_direction, wind_speed,
};
pub use profile::{Profile, ProfileError, SampledAtmosphere};
