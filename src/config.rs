use std::sync::OnceLock;

use tracing::debug;

use crate::error::{ConfigError, Result};

static CONFIG: OnceLock<KernelConfig> = OnceLock::new();

/// Numerical settings shared by every solid in the process.
///
/// The configuration is installed at most once, before any query runs,
/// and is read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelConfig {
    /// General boundary tolerance: stop criterion of the elliptic
    /// near-boundary search, cone-stack congruency and circular-ring tests,
    /// and rounded-rectangle crossing slack and nesting checks.
    pub boundary_tolerance: f64,
    /// Distance below which a boundary crossing counts as immediate.
    pub epsilon: f64,
    /// Hard cap on Newton steps in the elliptic near-boundary search.
    pub newton_max_iterations: usize,
    /// Number of non-convergence warnings emitted before going silent.
    pub newton_warning_limit: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            boundary_tolerance: 1e-10,
            epsilon: 1e-7,
            newton_max_iterations: 50,
            newton_warning_limit: 20,
        }
    }
}

impl KernelConfig {
    /// Checks that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for non-positive tolerances or a zero
    /// iteration cap.
    pub fn validate(&self) -> Result<()> {
        if !(self.boundary_tolerance > 0.0 && self.boundary_tolerance.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "boundary tolerance must be positive, got {}",
                self.boundary_tolerance
            ))
            .into());
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(
                ConfigError::Invalid(format!("epsilon must be positive, got {}", self.epsilon))
                    .into(),
            );
        }
        if self.newton_max_iterations == 0 {
            return Err(ConfigError::Invalid("newton iteration cap must be non-zero".into()).into());
        }
        Ok(())
    }
}

/// Installs the process-wide configuration.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` if validation fails and
/// `ConfigError::AlreadyInitialized` if a configuration was installed (or
/// read) before.
pub fn init(config: KernelConfig) -> Result<()> {
    config.validate()?;
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    debug!(?config, "kernel configuration installed");
    Ok(())
}

/// Returns the installed configuration, freezing the defaults on first use
/// if none was installed.
#[must_use]
pub fn get() -> &'static KernelConfig {
    CONFIG.get_or_init(KernelConfig::default)
}
