//! Shared session state and read-only snapshots of it.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::chain::provider::Allowance;
use crate::core::bond::{Bond, BondId, BondListing, OptimisticBond, Stats};
use crate::core::protocol::ProtocolInfo;
use crate::core::token::{ApprovalKey, Balances, Token};
use crate::error::Error;
use crate::utils::math::Decimal;
use crate::view::status::{ActionCategory, StatusBoard, TransactionStatus};
use crate::view::transitions::BondView;

/// State shared by the dispatcher, the synchronizer and the watchers
pub type SharedState = Arc<RwLock<SessionState>>;

/// Mutable state of a bond session
///
/// The synchronizer writes the protocol, bond, stats and balance snapshots;
/// the dispatcher writes the view, selection and statuses.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Current view
    pub view: BondView,
    /// Bond targeted by the cancel/claim views
    pub selected_bond: Option<BondId>,
    /// Token sold in the swap view
    pub swap_input: Token,
    /// Per-category transaction status
    pub statuses: StatusBoard,
    /// Live protocol economics
    pub protocol_info: Option<ProtocolInfo>,
    /// User-set what-if price, kept across refreshes
    pub simulated_price: Option<Decimal>,
    /// Protocol economics at the simulated price
    pub simulated_protocol_info: Option<ProtocolInfo>,
    /// Bonds of the account, authoritative
    pub bonds: Vec<Bond>,
    /// Submitted, unconfirmed bond creation
    pub optimistic_bond: Option<OptimisticBond>,
    /// Protocol-wide counters
    pub stats: Option<Stats>,
    /// Account balances
    pub balances: Option<Balances>,
    /// Last polled allowance per watched key
    pub approvals: BTreeMap<ApprovalKey, Allowance>,
    /// A refresh has been requested and not yet served
    pub should_synchronize: bool,
    /// A refresh is in flight
    pub is_synchronizing: bool,
    /// A refresh was requested while another was in flight
    pub resync_requested: bool,
    /// Error of the last failed refresh
    pub last_error: Option<Error>,
    /// Snapshot timestamp of the last successful refresh
    pub last_synchronized: Option<u64>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            view: BondView::Idle,
            selected_bond: None,
            swap_input: Token::BLusd,
            statuses: StatusBoard::default(),
            protocol_info: None,
            simulated_price: None,
            simulated_protocol_info: None,
            bonds: Vec::new(),
            optimistic_bond: None,
            stats: None,
            balances: None,
            approvals: BTreeMap::new(),
            // Refresh on mount
            should_synchronize: true,
            is_synchronizing: false,
            resync_requested: false,
            last_error: None,
            last_synchronized: None,
        }
    }
}

impl SessionState {
    /// Create a state in the `Idle` view with a pending mount refresh
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap into a [`SharedState`]
    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Ask for a refresh; a request during an in-flight refresh survives it
    pub fn request_synchronization(&mut self) {
        self.should_synchronize = true;
        if self.is_synchronizing {
            self.resync_requested = true;
        }
    }

    /// Bond by id
    pub fn find_bond(&self, id: &BondId) -> Option<&Bond> {
        self.bonds.iter().find(|bond| &bond.id == id)
    }

    /// Read-only copy for callers
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            view: self.view,
            selected_bond: self.selected_bond.clone(),
            swap_input: self.swap_input,
            statuses: self.statuses,
            protocol_info: self.protocol_info.clone(),
            simulated_protocol_info: self.simulated_protocol_info.clone(),
            has_simulated_override: self.simulated_price.is_some(),
            bonds: self.bonds.clone(),
            optimistic_bond: self.optimistic_bond.clone(),
            stats: self.stats,
            balances: self.balances,
            approvals: self.approvals.clone(),
            is_synchronizing: self.is_synchronizing,
            should_synchronize: self.should_synchronize,
            last_error: self.last_error.as_ref().map(ToString::to_string),
            last_synchronized: self.last_synchronized,
        }
    }
}

/// Consistent, read-only view of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Current view
    pub view: BondView,
    /// Bond targeted by the cancel/claim views
    pub selected_bond: Option<BondId>,
    /// Token sold in the swap view
    pub swap_input: Token,
    /// Per-category transaction status
    pub statuses: StatusBoard,
    /// Live protocol economics
    pub protocol_info: Option<ProtocolInfo>,
    /// Protocol economics at the simulated price
    pub simulated_protocol_info: Option<ProtocolInfo>,
    /// A user-set simulated price is active
    pub has_simulated_override: bool,
    /// Authoritative bonds
    pub bonds: Vec<Bond>,
    /// Unconfirmed bond creation
    pub optimistic_bond: Option<OptimisticBond>,
    /// Protocol-wide counters
    pub stats: Option<Stats>,
    /// Account balances
    pub balances: Option<Balances>,
    /// Last polled allowances
    pub approvals: BTreeMap<ApprovalKey, Allowance>,
    /// A refresh is in flight
    pub is_synchronizing: bool,
    /// A refresh is pending
    pub should_synchronize: bool,
    /// Error of the last failed refresh
    pub last_error: Option<String>,
    /// Snapshot timestamp of the last successful refresh
    pub last_synchronized: Option<u64>,
}

impl SessionSnapshot {
    /// Bond list shown to readers: the optimistic placeholder first, then
    /// the authoritative bonds
    pub fn visible_bonds(&self) -> Vec<BondListing> {
        self.optimistic_bond
            .iter()
            .cloned()
            .map(BondListing::Optimistic)
            .chain(self.bonds.iter().cloned().map(BondListing::Confirmed))
            .collect()
    }

    /// Status of a category
    pub fn status(&self, category: ActionCategory) -> TransactionStatus {
        self.statuses.get(category)
    }

    /// Check if the last polled allowance for `key` covers `amount`
    pub fn is_approved(&self, key: ApprovalKey, amount: Decimal) -> bool {
        self.approvals
            .get(&key)
            .map(|allowance| allowance.covers(amount))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_during_refresh_is_remembered() {
        let mut state = SessionState::new();
        assert!(state.should_synchronize);

        state.should_synchronize = false;
        state.request_synchronization();
        assert!(!state.resync_requested);

        state.is_synchronizing = true;
        state.request_synchronization();
        assert!(state.resync_requested);
    }

    #[test]
    fn test_visible_bonds_overlay() {
        let mut state = SessionState::new();
        state.optimistic_bond = Some(OptimisticBond::new(Decimal::from_int(10), 1));

        let visible = state.snapshot().visible_bonds();
        assert_eq!(visible.len(), 1);
        assert!(visible[0].id().is_optimistic());

        state.optimistic_bond = None;
        assert!(state.snapshot().visible_bonds().is_empty());
    }

    #[test]
    fn test_is_approved() {
        let mut state = SessionState::new();
        state.approvals.insert(ApprovalKey::BOND_CREATION, Allowance::Amount(Decimal::from_int(5)));

        let snapshot = state.snapshot();
        assert!(snapshot.is_approved(ApprovalKey::BOND_CREATION, Decimal::from_int(5)));
        assert!(!snapshot.is_approved(ApprovalKey::BOND_CREATION, Decimal::from_int(6)));
        assert!(!snapshot.is_approved(ApprovalKey::all()[1], Decimal::ONE));
    }
}
