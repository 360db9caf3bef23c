//! Shared value types for the mode solver.
//!
//! These types prevent mixing up physical quantities that all have the
//! same underlying representation (f64).

pub mod physical;

pub use physical::{AzimuthDeg, Frequency, WavenumberBounds};
