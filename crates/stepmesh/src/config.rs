//! Meshing tolerance configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Default linear (chordal) deflection in model units.
pub const DEFAULT_LINEAR_DEFLECTION: f64 = 0.1;
/// Default angular deflection in radians.
pub const DEFAULT_ANGULAR_DEFLECTION: f64 = 0.5;

/// Meshing tolerances and verbosity, fixed for the duration of one run.
///
/// Constructed once from parsed arguments and passed by reference into the
/// pipeline; nothing reads tuning state from globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToleranceConfig {
    /// Maximum chordal deviation between mesh and surface (absolute, model units).
    pub linear_deflection: f64,
    /// Maximum angle between adjacent mesh normals (radians).
    pub angular_deflection: f64,
    /// Verbosity level; >= 1 prints stage banners to stdout.
    pub verbosity: u8,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            linear_deflection: DEFAULT_LINEAR_DEFLECTION,
            angular_deflection: DEFAULT_ANGULAR_DEFLECTION,
            verbosity: 0,
        }
    }
}

impl ToleranceConfig {
    /// Create a config with explicit deflections.
    pub fn new(linear_deflection: f64, angular_deflection: f64) -> Self {
        Self {
            linear_deflection,
            angular_deflection,
            verbosity: 0,
        }
    }

    /// Set the verbosity level.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Check that both deflections are strictly positive finite reals.
    ///
    /// Called once before any import work; a violation is a configuration
    /// error, not an export-time failure.
    pub fn validate(&self) -> Result<()> {
        if !(self.linear_deflection.is_finite() && self.linear_deflection > 0.0) {
            return Err(ConvertError::InvalidTolerance {
                name: "linear",
                value: self.linear_deflection,
            });
        }
        if !(self.angular_deflection.is_finite() && self.angular_deflection > 0.0) {
            return Err(ConvertError::InvalidTolerance {
                name: "angular",
                value: self.angular_deflection,
            });
        }
        Ok(())
    }
}
