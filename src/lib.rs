//! # bLUSD Bond Engine
//!
//! Accrual and valuation engine for Chicken Bonds, the bond view state
//! machine driving bond, swap and liquidity transactions, and the layer
//! keeping both in sync with the chain.
//!
//! ## Architecture
//!
//! - **Core**: Bonds, protocol snapshots, tokens and session configuration
//! - **Engine**: Pure accrual, valuation and per-bond metrics over `Decimal`
//! - **Chain**: The `ChainDataProvider` seam and an in-memory chain
//! - **View**: Views, events, the transition table and the dispatcher
//! - **Sync**: Snapshot refresh, background refresh service, allowance polling
//! - **Session**: Shared state and the `BondSession` tying it all together
//!
//! ## Example
//!
//! ```rust,ignore
//! use blusd::prelude::*;
//!
//! let session = BondSession::start(provider, SessionConfig::new(account)).await?;
//!
//! session.dispatch(BondEvent::CreateBondPressed).await?;
//! session
//!     .dispatch(BondEvent::ConfirmPressed(ConfirmPayload::CreateBond { deposit }))
//!     .await?;
//!
//! for bond in session.snapshot().await.visible_bonds() {
//!     println!("{} {}", bond.id(), bond.deposit());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod chain;
pub mod core;
pub mod engine;
pub mod error;
pub mod session;
pub mod sync;
pub mod utils;
pub mod view;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chain::{
        memory::InMemoryChain,
        provider::{Allowance, ChainDataProvider, TransactionHandle},
    };
    pub use crate::core::{
        bond::{Bond, BondId, BondListing, BondStatus, OptimisticBond},
        config::SessionConfig,
        protocol::{ProtocolInfo, ProtocolRawState, Treasury, VaultApys},
        token::{AccountId, ApprovalKey, Balances, Spender, Token},
    };
    pub use crate::error::{Error, Result};
    pub use crate::session::{BondSession, SessionSnapshot};
    pub use crate::utils::math::{Decimal, Period};
    pub use crate::view::{
        status::{ActionCategory, TransactionStatus},
        transitions::{BondEvent, BondView, ConfirmPayload, EventKind, LiquidityAction},
    };
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
