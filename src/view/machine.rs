//! Bond view state machine.
//!
//! [`BondViewMachine::dispatch`] validates an event against the transition
//! table and the payload rules of the current view, applies the next view
//! and runs the event's transaction handler, if it has one. The shared state
//! lock is never held while a provider call is awaited.

use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::chain::provider::{Allowance, ApprovalAmount, ChainDataProvider, TransactionReceipt};
use crate::core::bond::{BondId, BondStatus, OptimisticBond};
use crate::core::token::{ApprovalKey, Spender, Token};
use crate::error::{Error, Result};
use crate::session::state::{SessionState, SharedState};
use crate::utils::math::Decimal;
use crate::view::status::{ActionCategory, TransactionStatus};
use crate::view::transitions::{
    next_view, valid_events, BondEvent, BondView, ConfirmPayload, EventKind, LiquidityAction,
};

/// Transaction a handler submits
#[derive(Debug, Clone, PartialEq, Eq)]
enum Handler {
    Approve(ApprovalKey),
    CreateBond { deposit: Decimal },
    CancelBond { bond_id: BondId, min_return: Decimal },
    ClaimBond { bond_id: BondId },
    Swap { input: Token, amount: Decimal, min_output: Decimal },
    Liquidity(LiquidityAction),
}

/// Validated handler request, before the selected bond is resolved
enum Planned {
    Ready(Handler),
    CancelSelected { min_return: Decimal },
    ClaimSelected,
}

/// Dispatcher of [`BondEvent`]s
#[derive(Clone)]
pub struct BondViewMachine {
    provider: Arc<dyn ChainDataProvider>,
    state: SharedState,
    sync_trigger: Arc<Notify>,
}

impl BondViewMachine {
    /// Create a machine over shared session state
    ///
    /// `sync_trigger` is notified after every confirmed transaction.
    pub fn new(provider: Arc<dyn ChainDataProvider>, state: SharedState, sync_trigger: Arc<Notify>) -> Self {
        Self {
            provider,
            state,
            sync_trigger,
        }
    }

    /// Current view
    pub async fn view(&self) -> BondView {
        self.state.read().await.view
    }

    /// Events admissible in the current view
    pub async fn valid_events(&self) -> Vec<EventKind> {
        valid_events(self.view().await)
    }

    /// Dispatch an event, returning the view after it has been handled
    ///
    /// Rejected events leave the view and every status unchanged. A failed
    /// transaction marks its category `Failed` and keeps the action view.
    pub async fn dispatch(&self, event: BondEvent) -> Result<BondView> {
        let kind = event.kind();

        let view = self.view().await;
        if next_view(view, kind).is_none() {
            return Err(rejected(view, kind));
        }
        if kind.is_action() && !self.provider.is_connected().await {
            warn!(%view, event = %kind, "Chain provider not connected");
            return Err(Error::DependencyUnavailable("chain provider not connected".into()));
        }

        let (category, handler) = {
            let mut state = self.state.write().await;
            // The view may have moved while the connection was checked
            let view = state.view;
            let next = next_view(view, kind).ok_or_else(|| rejected(view, kind))?;
            debug!(%view, event = %kind, %next, "Transition");

            let Some((category, planned)) = plan(&state, view, &event)? else {
                apply_transition(&mut state, view, next, &event)?;
                return Ok(next);
            };

            if state.statuses.is_pending(category) {
                warn!(%category, "Transaction already in flight");
                return Err(Error::ActionInFlight(category.to_string()));
            }
            let handler = resolve(&state, planned)?;

            state.view = next;
            state.statuses.set(category, TransactionStatus::Pending);
            (category, handler)
        };

        info!(%category, "Submitting transaction");
        let outcome = self.execute(&handler).await;
        self.settle(category, &handler, outcome).await
    }

    async fn execute(&self, handler: &Handler) -> Result<TransactionReceipt> {
        let provider = &self.provider;
        let handle = match handler {
            Handler::Approve(key) => {
                provider
                    .submit_approval(key.token, key.spender, ApprovalAmount::Unlimited)
                    .await?
            }
            Handler::CreateBond { deposit } => {
                let handle = provider.submit_create_bond(*deposit).await?;
                let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
                self.state.write().await.optimistic_bond = Some(OptimisticBond::new(*deposit, now));
                handle
            }
            Handler::CancelBond { bond_id, min_return } => {
                provider.submit_cancel_bond(bond_id, *min_return).await?
            }
            Handler::ClaimBond { bond_id } => provider.submit_claim_bond(bond_id).await?,
            Handler::Swap {
                input,
                amount,
                min_output,
            } => provider.submit_swap(*input, *amount, *min_output).await?,
            Handler::Liquidity(action) => match action {
                LiquidityAction::Add {
                    blusd_amount,
                    lusd_amount,
                    min_lp_tokens,
                    stake,
                } => {
                    provider
                        .submit_add_liquidity(*blusd_amount, *lusd_amount, *min_lp_tokens, *stake)
                        .await?
                }
                LiquidityAction::Remove {
                    burn_lp_tokens,
                    min_blusd,
                    min_lusd,
                } => {
                    provider
                        .submit_remove_liquidity(*burn_lp_tokens, *min_blusd, *min_lusd)
                        .await?
                }
                LiquidityAction::RemoveOneCoin {
                    burn_lp_tokens,
                    output,
                    min_amount,
                } => {
                    provider
                        .submit_remove_liquidity_one_coin(*burn_lp_tokens, *output, *min_amount)
                        .await?
                }
                LiquidityAction::Stake { lp_tokens } => provider.submit_stake_liquidity(*lp_tokens).await?,
                LiquidityAction::Unstake { lp_tokens } => provider.submit_unstake_liquidity(*lp_tokens).await?,
                LiquidityAction::ClaimRewards => provider.submit_claim_lp_rewards().await?,
            },
        };

        debug!(hash = %handle.hash, "Waiting for confirmation");
        handle.wait().await
    }

    async fn settle(
        &self,
        category: ActionCategory,
        handler: &Handler,
        outcome: Result<TransactionReceipt>,
    ) -> Result<BondView> {
        let mut state = self.state.write().await;

        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(e) => {
                state.statuses.set(category, TransactionStatus::Failed);
                if category == ActionCategory::Create {
                    state.optimistic_bond = None;
                }
                warn!(%category, error = %e, "Transaction failed");
                return Err(e);
            }
        };

        state.statuses.set(category, TransactionStatus::Confirmed);
        if let Handler::Approve(key) = handler {
            state.approvals.insert(*key, Allowance::Unlimited);
        }
        state.request_synchronization();
        self.sync_trigger.notify_one();
        info!(%category, hash = %receipt.hash, event = ?receipt.event, "Transaction confirmed");

        if let Some(confirmation) = category.confirmation_event() {
            match next_view(state.view, confirmation) {
                Some(next) => {
                    debug!(view = %state.view, event = %confirmation, %next, "Transition");
                    state.view = next;
                    state.selected_bond = None;
                }
                None => warn!(view = %state.view, event = %confirmation, "Confirmation not admissible"),
            }
        }

        Ok(state.view)
    }
}

fn rejected(view: BondView, event: EventKind) -> Error {
    warn!(%view, %event, "Rejected event");
    Error::InvalidTransition {
        view: view.to_string(),
        event: event.to_string(),
    }
}

fn invalid_payload(view: BondView, event: EventKind, reason: impl Into<String>) -> Error {
    let reason = reason.into();
    warn!(%view, %event, %reason, "Rejected payload");
    Error::InvalidPayload {
        view: view.to_string(),
        event: event.to_string(),
        reason,
    }
}

fn require_positive(view: BondView, name: &str, value: Decimal) -> Result<()> {
    if !value.is_positive() {
        return Err(invalid_payload(view, EventKind::ConfirmPressed, format!("{} must be positive", name)));
    }
    Ok(())
}

fn require_non_negative(view: BondView, name: &str, value: Decimal) -> Result<()> {
    if value.is_negative() {
        return Err(invalid_payload(view, EventKind::ConfirmPressed, format!("{} cannot be negative", name)));
    }
    Ok(())
}

/// Approval the view depends on, or the one named in the payload
fn approval_key(
    view: BondView,
    requested: Option<ApprovalKey>,
    required: ApprovalKey,
) -> Result<ApprovalKey> {
    match requested {
        None => Ok(required),
        Some(key) if key == required => Ok(key),
        Some(key) => Err(invalid_payload(
            view,
            EventKind::ApprovePressed,
            format!("{} to {:?} is not needed here", key.token, key.spender),
        )),
    }
}

/// Validate the payload of a handler event
///
/// `None` for events without a handler.
fn plan(state: &SessionState, view: BondView, event: &BondEvent) -> Result<Option<(ActionCategory, Planned)>> {
    let planned = match (view, event) {
        (BondView::Creating, BondEvent::ApprovePressed { key }) => {
            let key = approval_key(view, *key, ApprovalKey::BOND_CREATION)?;
            (ActionCategory::Approve, Planned::Ready(Handler::Approve(key)))
        }
        (BondView::Swapping, BondEvent::ApprovePressed { key }) => {
            let input = state.swap_input;
            let spender = input
                .swap_spender()
                .ok_or_else(|| invalid_payload(view, EventKind::ApprovePressed, "swap input has no spender"))?;
            let key = approval_key(view, *key, ApprovalKey::new(input, spender))?;
            (ActionCategory::ApproveAmm, Planned::Ready(Handler::Approve(key)))
        }
        (BondView::ManagingLiquidity, BondEvent::ApprovePressed { key }) => {
            let key = (*key).ok_or_else(|| {
                invalid_payload(view, EventKind::ApprovePressed, "liquidity approvals name their spender")
            })?;
            if !matches!(key.spender, Spender::BLusdAmmZapper | Spender::BLusdLpGauge) {
                return Err(invalid_payload(
                    view,
                    EventKind::ApprovePressed,
                    format!("{:?} is not a liquidity spender", key.spender),
                ));
            }
            (ActionCategory::ApproveSpender, Planned::Ready(Handler::Approve(key)))
        }
        (BondView::Creating, BondEvent::ConfirmPressed(ConfirmPayload::CreateBond { deposit })) => {
            require_positive(view, "deposit", *deposit)?;
            (ActionCategory::Create, Planned::Ready(Handler::CreateBond { deposit: *deposit }))
        }
        (BondView::Cancelling, BondEvent::ConfirmPressed(ConfirmPayload::CancelBond { min_return })) => {
            require_non_negative(view, "min_return", *min_return)?;
            (ActionCategory::Cancel, Planned::CancelSelected { min_return: *min_return })
        }
        (BondView::Claiming, BondEvent::ConfirmPressed(ConfirmPayload::ClaimBond)) => {
            (ActionCategory::Claim, Planned::ClaimSelected)
        }
        (BondView::Swapping, BondEvent::ConfirmPressed(ConfirmPayload::Swap { amount, min_output })) => {
            require_positive(view, "amount", *amount)?;
            require_non_negative(view, "min_output", *min_output)?;
            let handler = Handler::Swap {
                input: state.swap_input,
                amount: *amount,
                min_output: *min_output,
            };
            (ActionCategory::Swap, Planned::Ready(handler))
        }
        (BondView::ManagingLiquidity, BondEvent::ConfirmPressed(ConfirmPayload::Liquidity(action))) => {
            let amounts = action
                .positive_amounts()
                .map_err(|_| invalid_payload(view, EventKind::ConfirmPressed, "liquidity amounts overflow"))?;
            for amount in amounts {
                require_positive(view, "amount", amount)?;
            }
            for amount in action.non_negative_amounts() {
                require_non_negative(view, "minimum", amount)?;
            }
            if let LiquidityAction::RemoveOneCoin { output, .. } = action {
                if output.swap_counterpart().is_none() {
                    return Err(invalid_payload(view, EventKind::ConfirmPressed, "output must be LUSD or bLUSD"));
                }
            }
            (ActionCategory::ManageLiquidity, Planned::Ready(Handler::Liquidity(action.clone())))
        }
        (_, BondEvent::ApprovePressed { .. }) | (_, BondEvent::ConfirmPressed(_)) => {
            return Err(invalid_payload(view, event.kind(), "payload does not match the view"));
        }
        _ => return Ok(None),
    };

    Ok(Some(planned))
}

/// Resolve the selected bond of a cancel/claim request
fn resolve(state: &SessionState, planned: Planned) -> Result<Handler> {
    let selected = || -> Result<BondId> {
        let id = state
            .selected_bond
            .clone()
            .ok_or_else(|| Error::DependencyUnavailable("no bond selected".into()))?;
        let bond = state
            .find_bond(&id)
            .ok_or_else(|| Error::BondNotFound(id.to_string()))?;
        if bond.status != BondStatus::Pending {
            return Err(invalid_payload(
                state.view,
                EventKind::ConfirmPressed,
                format!("bond {} is {:?}", id, bond.status),
            ));
        }
        Ok(id)
    };

    match planned {
        Planned::Ready(handler) => Ok(handler),
        Planned::CancelSelected { min_return } => Ok(Handler::CancelBond {
            bond_id: selected()?,
            min_return,
        }),
        Planned::ClaimSelected => Ok(Handler::ClaimBond { bond_id: selected()? }),
    }
}

/// Apply an event without a handler
fn apply_transition(state: &mut SessionState, view: BondView, next: BondView, event: &BondEvent) -> Result<()> {
    let categories = ActionCategory::for_view(view);

    match event {
        BondEvent::BackPressed
        | BondEvent::CreateBondConfirmed
        | BondEvent::CancelBondConfirmed
        | BondEvent::ClaimBondConfirmed
        | BondEvent::SwapConfirmed
        | BondEvent::ManageLiquidityConfirmed => {
            if let Some(pending) = state.statuses.first_pending(categories) {
                warn!(%view, event = %event.kind(), category = %pending, "Transaction in flight");
                return Err(Error::ActionInFlight(pending.to_string()));
            }
            if matches!(event, BondEvent::BackPressed) {
                state.statuses.reset_settled(categories);
            }
            state.selected_bond = None;
        }
        BondEvent::ChangePressed => {
            let flipped = state.swap_input.swap_counterpart().ok_or_else(|| {
                invalid_payload(view, EventKind::ChangePressed, "swap input has no counterpart")
            })?;
            state.swap_input = flipped;
        }
        BondEvent::CancelPressed { bond_id } | BondEvent::ClaimPressed { bond_id } => {
            state.selected_bond = Some(bond_id.clone());
        }
        BondEvent::SwapPressed { input_token } => {
            if input_token.swap_counterpart().is_none() {
                return Err(invalid_payload(
                    view,
                    EventKind::SwapPressed,
                    format!("{} cannot be swapped", input_token),
                ));
            }
            state.swap_input = *input_token;
        }
        BondEvent::CreateBondPressed | BondEvent::ManageLiquidityPressed => {}
        BondEvent::ApprovePressed { .. } | BondEvent::ConfirmPressed(_) => {
            return Err(Error::Internal("handler event reached a plain transition".into()));
        }
    }

    if view == BondView::Idle {
        state.statuses.reset_settled(ActionCategory::for_view(next));
    }
    state.view = next;
    Ok(())
}
