pub mod config;
pub mod error;
pub mod math;
pub mod polygon;
pub mod solid;

pub use config::KernelConfig;
pub use error::{KernelError, Result};
pub use solid::{Crossing, Solid};
