use thiserror::Error;

/// Top-level error type for the ray-query kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors related to geometric degeneracies in the input.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("zero-length vector")]
    ZeroVector,

    #[error("points are collinear and do not define a plane")]
    Collinear,

    #[error("point {index} lies {distance} away from the polygon plane")]
    NotCoplanar { index: usize, distance: f64 },

    #[error("degenerate geometry: {0}")]
    Degenerate(String),
}

/// Errors raised while validating solid construction parameters.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{what}: expected {expected} entries, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{what} must be strictly increasing (entry {index})")]
    NotIncreasing { what: &'static str, index: usize },

    #[error("parameter {parameter} = {value} is out of range [{min}, {max}]")]
    ParameterOutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("ring {ring}: fillet radius {radius} exceeds half-width {half_width}")]
    FilletTooLarge {
        ring: usize,
        radius: f64,
        half_width: f64,
    },

    #[error("ring {inner} is not contained in ring {outer}")]
    OverlappingRings { inner: usize, outer: usize },

    #[error("invalid cone stack layer {layer}: {reason}")]
    InvalidLayer { layer: usize, reason: String },
}

/// Errors related to the process-wide kernel configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("kernel configuration is already initialised")]
    AlreadyInitialized,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience type alias for results using [`KernelError`].
pub type Result<T> = std::result::Result<T, KernelError>;
