//! Chain access.
//!
//! - `provider`: the [`ChainDataProvider`] trait, transaction handles and
//!   allowance decoding
//! - `memory`: [`InMemoryChain`], an in-process provider

pub mod memory;
pub mod provider;

pub use memory::{CallCounters, ConfirmationMode, InMemoryChain};
pub use provider::*;
