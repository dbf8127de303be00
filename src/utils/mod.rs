//! Utility modules for the bond engine.
//!
//! - Fixed-point arithmetic (`Decimal`, `Period`)
//! - Constants

pub mod constants;
pub mod math;

pub use constants::*;
pub use math::*;
