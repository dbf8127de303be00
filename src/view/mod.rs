//! Bond view state machine.
//!
//! - `transitions`: views, events and the static transition table
//! - `status`: per-category transaction status
//! - `machine`: the dispatcher

pub mod machine;
pub mod status;
pub mod transitions;

pub use machine::BondViewMachine;
pub use status::{ActionCategory, StatusBoard, TransactionStatus};
pub use transitions::*;
