//! Core data model of the bond engine.
//!
//! - `protocol`: raw chain snapshot, treasury and derived `ProtocolInfo`
//! - `bond`: bond records, derived bonds, optimistic placeholders, stats
//! - `token`: tokens, spenders, allowances and balances
//! - `config`: session configuration

pub mod bond;
pub mod config;
pub mod protocol;
pub mod token;

pub use bond::*;
pub use config::*;
pub use protocol::*;
pub use token::*;
