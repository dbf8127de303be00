//! Synchronization layer.
//!
//! - `synchronizer`: all-or-nothing snapshot refresh
//! - `service`: periodic and on-demand refresh task
//! - `approvals`: allowance polling per `(token, spender)`
//! - `apy_cache`: time-bounded vault APY cache

pub mod apy_cache;
pub mod approvals;
pub mod service;
pub mod synchronizer;

pub use apy_cache::ApyCache;
pub use approvals::ApprovalWatcher;
pub use service::SyncService;
pub use synchronizer::{SyncOutcome, Synchronizer};
