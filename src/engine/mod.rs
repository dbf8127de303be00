//! Accrual and valuation engine.
//!
//! Pure functions over `Decimal`; no I/O and no shared state.

pub mod accrual;
pub mod metrics;
pub mod valuation;

pub use accrual::*;
pub use metrics::*;
pub use valuation::*;
