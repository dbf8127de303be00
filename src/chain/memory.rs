//! In-process chain for tests and the demo binary.
//!
//! Models the bond manager buckets, bond records, balances, allowances and a
//! constant-price bLUSD/LUSD pool. Transactions are confirmed according to a
//! [`ConfirmationMode`].

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

use crate::chain::provider::{
    Allowance, ApprovalAmount, ChainDataProvider, ChainEvent, TransactionHandle,
    TransactionOutcome, TransactionReceipt,
};
use crate::core::bond::{BondId, BondRawRecord, BondStatus, Stats};
use crate::core::protocol::{ProtocolRawState, VaultApys};
use crate::core::token::{AccountId, ApprovalKey, Balances, Spender, Token};
use crate::engine::accrual::future_accrual_factor;
use crate::engine::valuation::floor_price_from_reserves;
use crate::error::{Error, Result};
use crate::utils::constants::SECONDS_PER_DAY;
use crate::utils::math::{Decimal, Period};

/// How submitted transactions are confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationMode {
    /// Mined as soon as submitted
    Immediate,
    /// Queued until [`InMemoryChain::release_next`] or [`InMemoryChain::fail_next`]
    Manual,
    /// Every transaction reverts
    Revert,
}

/// Number of provider calls served, per call family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounters {
    /// `get_protocol_snapshot`
    pub snapshot_reads: u64,
    /// `get_bonds_for_account`
    pub bond_reads: u64,
    /// `get_vault_apys`
    pub apy_reads: u64,
    /// `get_allowance`
    pub allowance_reads: u64,
    /// `quote_swap`
    pub quotes: u64,
    /// All `submit_*` calls
    pub submissions: u64,
}

type Effect = Box<dyn FnOnce(&mut ChainState) -> std::result::Result<Option<ChainEvent>, String> + Send>;

fn effect<F>(f: F) -> Effect
where
    F: FnOnce(&mut ChainState) -> std::result::Result<Option<ChainEvent>, String> + Send + 'static,
{
    Box::new(f)
}

struct QueuedTransaction {
    hash: String,
    effect: Effect,
    sender: oneshot::Sender<TransactionOutcome>,
}

struct BondEntry {
    owner: AccountId,
    record: BondRawRecord,
}

struct ChainState {
    account: AccountId,
    protocol: ProtocolRawState,
    bonds: BTreeMap<u64, BondEntry>,
    next_bond_id: u64,
    stats: Stats,
    balances: HashMap<AccountId, Balances>,
    allowances: HashMap<(AccountId, ApprovalKey), Allowance>,
    apys: Option<VaultApys>,
    pool_price: Decimal,
    mode: ConfirmationMode,
    connected: bool,
    reads_failing: bool,
    read_latency: Duration,
    queue: VecDeque<QueuedTransaction>,
    nonce: u64,
    calls: CallCounters,
}

impl ChainState {
    fn floor_price(&self) -> Result<Decimal> {
        let p = &self.protocol;
        if p.bond_token_supply.is_zero() {
            return Ok(Decimal::ONE);
        }
        floor_price_from_reserves(
            p.b_amm_lusd_debt,
            p.curve_sai,
            p.pending_lusd,
            p.permanent_lusd,
            p.bond_token_supply,
        )
    }

    /// Accrued bLUSD of a pending bond at the current timestamp
    fn accrued(&self, record: &BondRawRecord) -> Result<Decimal> {
        if record.status != BondStatus::Pending {
            return Ok(Decimal::ZERO);
        }
        let floor = self.floor_price()?;
        if !floor.is_positive() {
            return Ok(Decimal::ZERO);
        }

        let day = Decimal::from(SECONDS_PER_DAY);
        let alpha = self.protocol.accrual_parameter_seconds.try_div(day)?;
        let age = Decimal::days_from_seconds(self.protocol.timestamp.saturating_sub(record.start_time));
        record.deposit.try_mul(future_accrual_factor(floor, Period::Finite(age), alpha)?)
    }

    fn balances_mut(&mut self) -> &mut Balances {
        self.balances.entry(self.account.clone()).or_default()
    }

    fn allowance(&self, key: ApprovalKey) -> Allowance {
        self.allowances
            .get(&(self.account.clone(), key))
            .copied()
            .unwrap_or(Allowance::Amount(Decimal::ZERO))
    }

    fn quote(&self, input: Token, amount: Decimal) -> Result<Decimal> {
        match input {
            Token::BLusd => amount.try_mul(self.pool_price),
            Token::Lusd => amount.try_div(self.pool_price),
            Token::BLusdLusdLp => Err(Error::InvalidParameter {
                name: "input".into(),
                reason: "LP tokens are not swappable".into(),
            }),
        }
    }

    fn read(&self, call: &str) -> Result<()> {
        if !self.connected || self.reads_failing {
            return Err(Error::chain_call(call, "provider unavailable"));
        }
        Ok(())
    }

    fn next_hash(&mut self, action: &str) -> String {
        self.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.account.0.as_bytes());
        hasher.update(action.as_bytes());
        hasher.update(self.nonce.to_be_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

fn failure(reason: impl ToString) -> String {
    reason.to_string()
}

fn ensure_balance(available: Decimal, required: Decimal, token: Token) -> std::result::Result<(), String> {
    if available < required {
        return Err(format!("insufficient {} balance", token));
    }
    Ok(())
}

/// In-memory [`ChainDataProvider`]
pub struct InMemoryChain {
    state: Mutex<ChainState>,
}

impl InMemoryChain {
    /// Bootstrap protocol (no bLUSD yet) with the given signer account
    pub fn new(account: AccountId) -> Self {
        let protocol = ProtocolRawState {
            bond_token_supply: Decimal::ZERO,
            pending_lusd: Decimal::ZERO,
            permanent_lusd: Decimal::ZERO,
            b_amm_lusd_debt: Decimal::ZERO,
            curve_sai: Decimal::ZERO,
            chicken_in_fee: Decimal::new(1, 2),
            accrual_parameter_seconds: Decimal::from(SECONDS_PER_DAY),
            target_average_age_seconds: Decimal::from(30 * SECONDS_PER_DAY),
            total_weighted_start_times: Decimal::ZERO,
            total_pending_deposits: Decimal::ZERO,
            amm_oracle_price: None,
            timestamp: 1_700_000_000,
        };

        Self {
            state: Mutex::new(ChainState {
                account,
                protocol,
                bonds: BTreeMap::new(),
                next_bond_id: 1,
                stats: Stats::default(),
                balances: HashMap::new(),
                allowances: HashMap::new(),
                apys: None,
                pool_price: Decimal::ONE,
                mode: ConfirmationMode::Immediate,
                connected: true,
                reads_failing: false,
                read_latency: Duration::ZERO,
                queue: VecDeque::new(),
                nonce: 0,
                calls: CallCounters::default(),
            }),
        }
    }

    /// Replace the protocol state
    pub fn with_protocol(mut self, protocol: ProtocolRawState) -> Self {
        self.state.get_mut().protocol = protocol;
        self
    }

    /// Set the signer's balances
    pub fn with_balances(mut self, balances: Balances) -> Self {
        let state = self.state.get_mut();
        let account = state.account.clone();
        state.balances.insert(account, balances);
        self
    }

    /// Set the vault APYs
    pub fn with_apys(mut self, apys: VaultApys) -> Self {
        self.state.get_mut().apys = Some(apys);
        self
    }

    /// Set the pool price of bLUSD in LUSD
    pub fn with_pool_price(mut self, price: Decimal) -> Self {
        self.state.get_mut().pool_price = price;
        self
    }

    /// Set the confirmation mode
    pub fn with_confirmation(mut self, mode: ConfirmationMode) -> Self {
        self.state.get_mut().mode = mode;
        self
    }

    /// Change the confirmation mode
    pub async fn set_confirmation(&self, mode: ConfirmationMode) {
        self.state.lock().await.mode = mode;
    }

    /// Toggle network connectivity
    pub async fn set_connected(&self, connected: bool) {
        self.state.lock().await.connected = connected;
    }

    /// Make every read fail while set
    pub async fn set_reads_failing(&self, failing: bool) {
        self.state.lock().await.reads_failing = failing;
    }

    /// Delay every protocol snapshot read by `latency`
    pub async fn set_read_latency(&self, latency: Duration) {
        self.state.lock().await.read_latency = latency;
    }

    /// Set the pool price of bLUSD in LUSD
    pub async fn set_pool_price(&self, price: Decimal) {
        self.state.lock().await.pool_price = price;
    }

    /// Move the chain clock forward
    pub async fn advance_time(&self, seconds: u64) {
        let mut state = self.state.lock().await;
        state.protocol.timestamp = state.protocol.timestamp.saturating_add(seconds);
    }

    /// Current chain timestamp
    pub async fn timestamp(&self) -> u64 {
        self.state.lock().await.protocol.timestamp
    }

    /// Call counters
    pub async fn calls(&self) -> CallCounters {
        self.state.lock().await.calls
    }

    /// Number of queued (unconfirmed) transactions
    pub async fn queued(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Mine the oldest queued transaction; returns false when none is queued
    pub async fn release_next(&self) -> bool {
        let mut state = self.state.lock().await;
        let Some(queued) = state.queue.pop_front() else {
            return false;
        };
        let outcome = Self::execute(&mut state, queued.hash, queued.effect);
        let _ = queued.sender.send(outcome);
        true
    }

    /// Revert the oldest queued transaction; returns false when none is queued
    pub async fn fail_next(&self, reason: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(queued) = state.queue.pop_front() else {
            return false;
        };
        tracing::debug!(hash = %queued.hash, reason, "Reverting queued transaction");
        let _ = queued.sender.send(Err(reason.to_string()));
        true
    }

    fn execute(state: &mut ChainState, hash: String, effect: Effect) -> TransactionOutcome {
        let event = effect(state)?;
        Ok(TransactionReceipt {
            hash,
            block_timestamp: state.protocol.timestamp,
            event,
        })
    }

    async fn submit(&self, action: &str, effect: Effect) -> Result<TransactionHandle> {
        let mut state = self.state.lock().await;
        state.calls.submissions += 1;
        if !state.connected {
            return Err(Error::DependencyUnavailable("network not connected".into()));
        }

        let hash = state.next_hash(action);
        tracing::debug!(%hash, action, mode = ?state.mode, "Transaction submitted");

        match state.mode {
            ConfirmationMode::Immediate => {
                let outcome = Self::execute(&mut state, hash.clone(), effect);
                Ok(TransactionHandle::resolved(hash, action, outcome))
            }
            ConfirmationMode::Revert => {
                Ok(TransactionHandle::resolved(hash, action, Err("execution reverted".into())))
            }
            ConfirmationMode::Manual => {
                let (sender, receiver) = oneshot::channel();
                state.queue.push_back(QueuedTransaction {
                    hash: hash.clone(),
                    effect,
                    sender,
                });
                Ok(TransactionHandle::new(hash, action, receiver))
            }
        }
    }
}

#[async_trait]
impl ChainDataProvider for InMemoryChain {
    async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    async fn get_protocol_snapshot(&self) -> Result<ProtocolRawState> {
        let latency = self.state.lock().await.read_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        state.calls.snapshot_reads += 1;
        state.read("getProtocolSnapshot")?;
        Ok(state.protocol.clone())
    }

    async fn get_bonds_for_account(&self, account: &AccountId) -> Result<Vec<BondRawRecord>> {
        let mut state = self.state.lock().await;
        state.calls.bond_reads += 1;
        state.read("getBondsForAccount")?;

        state
            .bonds
            .values()
            .filter(|entry| &entry.owner == account)
            .map(|entry| {
                let mut record = entry.record.clone();
                record.accrued = state.accrued(&entry.record)?;
                Ok(record)
            })
            .collect()
    }

    async fn get_stats(&self) -> Result<Stats> {
        let mut state = self.state.lock().await;
        state.read("getStats")?;
        Ok(state.stats)
    }

    async fn get_balances(&self, account: &AccountId) -> Result<Balances> {
        let mut state = self.state.lock().await;
        state.read("getBalances")?;
        Ok(state.balances.get(account).copied().unwrap_or_default())
    }

    async fn get_allowance(&self, owner: &AccountId, spender: Spender, token: Token) -> Result<Allowance> {
        let mut state = self.state.lock().await;
        state.calls.allowance_reads += 1;
        state.read("getAllowance")?;
        Ok(state
            .allowances
            .get(&(owner.clone(), ApprovalKey::new(token, spender)))
            .copied()
            .unwrap_or(Allowance::Amount(Decimal::ZERO)))
    }

    async fn quote_swap(&self, input: Token, amount: Decimal) -> Result<Decimal> {
        let mut state = self.state.lock().await;
        state.calls.quotes += 1;
        state.read("quoteSwap")?;
        state.quote(input, amount)
    }

    async fn get_vault_apys(&self) -> Result<VaultApys> {
        let mut state = self.state.lock().await;
        state.calls.apy_reads += 1;
        state.read("getVaultApys")?;
        state
            .apys
            .ok_or_else(|| Error::chain_call("getVaultApys", "no APY source configured"))
    }

    async fn submit_approval(&self, token: Token, spender: Spender, amount: ApprovalAmount) -> Result<TransactionHandle> {
        self.submit(
            "approve",
            effect(move |state| {
                let allowance = match amount {
                    ApprovalAmount::Unlimited => Allowance::Unlimited,
                    ApprovalAmount::Exact(value) => Allowance::Amount(value),
                };
                let account = state.account.clone();
                state
                    .allowances
                    .insert((account, ApprovalKey::new(token, spender)), allowance);
                Ok(Some(ChainEvent::Approval { token, spender }))
            }),
        )
        .await
    }

    async fn submit_create_bond(&self, amount: Decimal) -> Result<TransactionHandle> {
        self.submit(
            "createBond",
            effect(move |state| {
                if !state.allowance(ApprovalKey::BOND_CREATION).covers(amount) {
                    return Err("LUSD allowance too low".into());
                }
                let lusd = state.balances_mut().lusd;
                ensure_balance(lusd, amount, Token::Lusd)?;

                let now = state.protocol.timestamp;
                let weighted = amount.try_mul(Decimal::from(now)).map_err(failure)?;
                let p = &mut state.protocol;
                p.pending_lusd = p.pending_lusd.try_add(amount).map_err(failure)?;
                p.b_amm_lusd_debt = p.b_amm_lusd_debt.try_add(amount).map_err(failure)?;
                p.total_pending_deposits = p.total_pending_deposits.try_add(amount).map_err(failure)?;
                p.total_weighted_start_times = p.total_weighted_start_times.try_add(weighted).map_err(failure)?;

                let balances = state.balances_mut();
                balances.lusd = balances.lusd.try_sub(amount).map_err(failure)?;

                let id = state.next_bond_id;
                state.next_bond_id += 1;
                let bond_id = BondId(id.to_string());
                let owner = state.account.clone();
                state.bonds.insert(
                    id,
                    BondEntry {
                        owner,
                        record: BondRawRecord {
                            id: bond_id.clone(),
                            deposit: amount,
                            accrued: Decimal::ZERO,
                            start_time: now,
                            end_time: None,
                            status: BondStatus::Pending,
                            claimed_amount: None,
                        },
                    },
                );
                state.stats.pending_bonds += 1;
                state.stats.total_bonds += 1;

                Ok(Some(ChainEvent::BondCreated {
                    bond_id,
                    deposit: amount,
                }))
            }),
        )
        .await
    }

    async fn submit_cancel_bond(&self, bond_id: &BondId, min_return: Decimal) -> Result<TransactionHandle> {
        let bond_id = bond_id.clone();
        self.submit(
            "chickenOut",
            effect(move |state| {
                let (key, record) = pending_bond(state, &bond_id)?;
                let refund = record.deposit;
                if refund < min_return {
                    return Err("refund below minimum".into());
                }

                release_pending(state, &record)?;
                let balances = state.balances_mut();
                balances.lusd = balances.lusd.try_add(refund).map_err(failure)?;
                finish_bond(state, key, BondStatus::Cancelled, None);
                state.stats.cancelled_bonds += 1;

                Ok(Some(ChainEvent::BondCancelled { bond_id, refund }))
            }),
        )
        .await
    }

    async fn submit_claim_bond(&self, bond_id: &BondId) -> Result<TransactionHandle> {
        let bond_id = bond_id.clone();
        self.submit(
            "chickenIn",
            effect(move |state| {
                let (key, record) = pending_bond(state, &bond_id)?;
                let minted = state.accrued(&record).map_err(failure)?;
                let floor = state.floor_price().map_err(failure)?;

                // The deposit beyond the minted bLUSD's backing becomes protocol-owned
                let backing = minted.try_mul(floor).map_err(failure)?;
                let surplus = record.deposit.try_sub(backing).map_err(failure)?.clamp_non_negative();

                release_pending(state, &record)?;
                let p = &mut state.protocol;
                p.b_amm_lusd_debt = p.b_amm_lusd_debt.try_add(record.deposit).map_err(failure)?;
                p.permanent_lusd = p.permanent_lusd.try_add(surplus).map_err(failure)?;
                p.bond_token_supply = p.bond_token_supply.try_add(minted).map_err(failure)?;

                let balances = state.balances_mut();
                balances.blusd = balances.blusd.try_add(minted).map_err(failure)?;
                finish_bond(state, key, BondStatus::Claimed, Some(minted));
                state.stats.claimed_bonds += 1;

                Ok(Some(ChainEvent::BondClaimed { bond_id, minted }))
            }),
        )
        .await
    }

    async fn submit_swap(&self, input: Token, amount: Decimal, min_output: Decimal) -> Result<TransactionHandle> {
        self.submit(
            "swap",
            effect(move |state| {
                let output_token = input
                    .swap_counterpart()
                    .ok_or_else(|| format!("{} is not swappable", input))?;
                let spender = input
                    .swap_spender()
                    .ok_or_else(|| format!("{} has no swap spender", input))?;
                if !state.allowance(ApprovalKey::new(input, spender)).covers(amount) {
                    return Err(format!("{} allowance too low", input));
                }

                let output = state.quote(input, amount).map_err(failure)?;
                if output < min_output {
                    return Err("output below minimum".into());
                }

                let balances = state.balances_mut();
                ensure_balance(balances.of(input), amount, input)?;
                match input {
                    Token::BLusd => {
                        balances.blusd = balances.blusd.try_sub(amount).map_err(failure)?;
                        balances.lusd = balances.lusd.try_add(output).map_err(failure)?;
                    }
                    _ => {
                        balances.lusd = balances.lusd.try_sub(amount).map_err(failure)?;
                        balances.blusd = balances.blusd.try_add(output).map_err(failure)?;
                    }
                }

                tracing::debug!(%input, %output_token, %amount, %output, "Swap executed");
                Ok(Some(ChainEvent::Swapped {
                    input_token: input,
                    input_amount: amount,
                    output_amount: output,
                }))
            }),
        )
        .await
    }

    async fn submit_add_liquidity(
        &self,
        blusd_amount: Decimal,
        lusd_amount: Decimal,
        min_lp_tokens: Decimal,
        stake: bool,
    ) -> Result<TransactionHandle> {
        self.submit(
            "addLiquidity",
            effect(move |state| {
                let price = state.pool_price;
                let minted = blusd_amount
                    .try_mul(price)
                    .and_then(|value| value.try_add(lusd_amount))
                    .map_err(failure)?;
                if minted < min_lp_tokens {
                    return Err("LP tokens below minimum".into());
                }

                let balances = state.balances_mut();
                ensure_balance(balances.blusd, blusd_amount, Token::BLusd)?;
                ensure_balance(balances.lusd, lusd_amount, Token::Lusd)?;
                balances.blusd = balances.blusd.try_sub(blusd_amount).map_err(failure)?;
                balances.lusd = balances.lusd.try_sub(lusd_amount).map_err(failure)?;
                if stake {
                    balances.staked_lp_token = balances.staked_lp_token.try_add(minted).map_err(failure)?;
                } else {
                    balances.lp_token = balances.lp_token.try_add(minted).map_err(failure)?;
                }

                Ok(Some(liquidity_event(balances)))
            }),
        )
        .await
    }

    async fn submit_remove_liquidity(
        &self,
        burn_lp_tokens: Decimal,
        min_blusd: Decimal,
        min_lusd: Decimal,
    ) -> Result<TransactionHandle> {
        self.submit(
            "removeLiquidity",
            effect(move |state| {
                let half = burn_lp_tokens.try_div(Decimal::from_int(2)).map_err(failure)?;
                let blusd_out = half.try_div(state.pool_price).map_err(failure)?;
                if blusd_out < min_blusd || half < min_lusd {
                    return Err("output below minimum".into());
                }

                let balances = state.balances_mut();
                ensure_balance(balances.lp_token, burn_lp_tokens, Token::BLusdLusdLp)?;
                balances.lp_token = balances.lp_token.try_sub(burn_lp_tokens).map_err(failure)?;
                balances.blusd = balances.blusd.try_add(blusd_out).map_err(failure)?;
                balances.lusd = balances.lusd.try_add(half).map_err(failure)?;

                Ok(Some(liquidity_event(balances)))
            }),
        )
        .await
    }

    async fn submit_remove_liquidity_one_coin(
        &self,
        burn_lp_tokens: Decimal,
        output: Token,
        min_amount: Decimal,
    ) -> Result<TransactionHandle> {
        self.submit(
            "removeLiquidityOneCoin",
            effect(move |state| {
                let amount = match output {
                    Token::Lusd => burn_lp_tokens,
                    Token::BLusd => burn_lp_tokens.try_div(state.pool_price).map_err(failure)?,
                    Token::BLusdLusdLp => return Err("cannot withdraw LP tokens".into()),
                };
                if amount < min_amount {
                    return Err("output below minimum".into());
                }

                let balances = state.balances_mut();
                ensure_balance(balances.lp_token, burn_lp_tokens, Token::BLusdLusdLp)?;
                balances.lp_token = balances.lp_token.try_sub(burn_lp_tokens).map_err(failure)?;
                match output {
                    Token::BLusd => balances.blusd = balances.blusd.try_add(amount).map_err(failure)?,
                    _ => balances.lusd = balances.lusd.try_add(amount).map_err(failure)?,
                }

                Ok(Some(liquidity_event(balances)))
            }),
        )
        .await
    }

    async fn submit_stake_liquidity(&self, lp_tokens: Decimal) -> Result<TransactionHandle> {
        self.submit(
            "stake",
            effect(move |state| {
                let balances = state.balances_mut();
                ensure_balance(balances.lp_token, lp_tokens, Token::BLusdLusdLp)?;
                balances.lp_token = balances.lp_token.try_sub(lp_tokens).map_err(failure)?;
                balances.staked_lp_token = balances.staked_lp_token.try_add(lp_tokens).map_err(failure)?;
                Ok(Some(liquidity_event(balances)))
            }),
        )
        .await
    }

    async fn submit_unstake_liquidity(&self, lp_tokens: Decimal) -> Result<TransactionHandle> {
        self.submit(
            "unstake",
            effect(move |state| {
                let balances = state.balances_mut();
                if balances.staked_lp_token < lp_tokens {
                    return Err("insufficient staked LP tokens".into());
                }
                balances.staked_lp_token = balances.staked_lp_token.try_sub(lp_tokens).map_err(failure)?;
                balances.lp_token = balances.lp_token.try_add(lp_tokens).map_err(failure)?;
                Ok(Some(liquidity_event(balances)))
            }),
        )
        .await
    }

    async fn submit_claim_lp_rewards(&self) -> Result<TransactionHandle> {
        self.submit(
            "claimRewards",
            effect(|state| {
                let balances = state.balances_mut();
                balances.lp_rewards = Decimal::ZERO;
                Ok(Some(liquidity_event(balances)))
            }),
        )
        .await
    }
}

fn liquidity_event(balances: &Balances) -> ChainEvent {
    ChainEvent::LiquidityChanged {
        lp_token: balances.lp_token,
        staked_lp_token: balances.staked_lp_token,
    }
}

fn pending_bond(state: &ChainState, bond_id: &BondId) -> std::result::Result<(u64, BondRawRecord), String> {
    let (key, entry) = state
        .bonds
        .iter()
        .find(|(_, entry)| &entry.record.id == bond_id)
        .ok_or_else(|| format!("bond {} does not exist", bond_id))?;
    if entry.owner != state.account {
        return Err(format!("bond {} is not owned by the signer", bond_id));
    }
    if entry.record.status != BondStatus::Pending {
        return Err(format!("bond {} is not pending", bond_id));
    }
    Ok((*key, entry.record.clone()))
}

/// Take a pending bond's deposit out of the pending bucket and averages
fn release_pending(state: &mut ChainState, record: &BondRawRecord) -> std::result::Result<(), String> {
    let weighted = record
        .deposit
        .try_mul(Decimal::from(record.start_time))
        .map_err(failure)?;
    let p = &mut state.protocol;
    p.pending_lusd = p.pending_lusd.try_sub(record.deposit).map_err(failure)?;
    p.b_amm_lusd_debt = p.b_amm_lusd_debt.try_sub(record.deposit).map_err(failure)?;
    p.total_pending_deposits = p.total_pending_deposits.try_sub(record.deposit).map_err(failure)?;
    p.total_weighted_start_times = p.total_weighted_start_times.try_sub(weighted).map_err(failure)?;
    state.stats.pending_bonds = state.stats.pending_bonds.saturating_sub(1);
    Ok(())
}

fn finish_bond(state: &mut ChainState, key: u64, status: BondStatus, claimed: Option<Decimal>) {
    let now = state.protocol.timestamp;
    if let Some(entry) = state.bonds.get_mut(&key) {
        entry.record.status = status;
        entry.record.end_time = Some(now);
        entry.record.claimed_amount = claimed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountId {
        AccountId::from("0xabc")
    }

    fn funded_chain() -> InMemoryChain {
        InMemoryChain::new(account()).with_balances(Balances {
            lusd: Decimal::from_int(1_000),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_create_requires_allowance() {
        let chain = funded_chain();
        let handle = chain.submit_create_bond(Decimal::from_int(100)).await.unwrap();
        assert!(handle.wait().await.is_err());

        chain
            .submit_approval(Token::Lusd, Spender::ChickenBondManager, ApprovalAmount::Unlimited)
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();
        let receipt = chain
            .submit_create_bond(Decimal::from_int(100))
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert!(matches!(receipt.event, Some(ChainEvent::BondCreated { .. })));

        let balances = chain.get_balances(&account()).await.unwrap();
        assert_eq!(balances.lusd, Decimal::from_int(900));
        assert_eq!(chain.get_stats().await.unwrap().pending_bonds, 1);
    }

    #[tokio::test]
    async fn test_bond_accrues_and_claims() {
        let chain = funded_chain();
        chain
            .submit_approval(Token::Lusd, Spender::ChickenBondManager, ApprovalAmount::Unlimited)
            .await
            .unwrap();
        chain.submit_create_bond(Decimal::from_int(100)).await.unwrap();

        // alpha is one day: after one day half the deposit has accrued at floor 1
        chain.advance_time(SECONDS_PER_DAY).await;
        let bonds = chain.get_bonds_for_account(&account()).await.unwrap();
        assert_eq!(bonds.len(), 1);
        assert_eq!(bonds[0].accrued, Decimal::from_int(50));

        let receipt = chain.submit_claim_bond(&bonds[0].id).await.unwrap().wait().await.unwrap();
        assert!(matches!(receipt.event, Some(ChainEvent::BondClaimed { minted, .. }) if minted == Decimal::from_int(50)));

        let snapshot = chain.get_protocol_snapshot().await.unwrap();
        assert_eq!(snapshot.bond_token_supply, Decimal::from_int(50));
        assert_eq!(snapshot.permanent_lusd, Decimal::from_int(50));
        assert_eq!(snapshot.pending_lusd, Decimal::ZERO);

        let bonds = chain.get_bonds_for_account(&account()).await.unwrap();
        assert_eq!(bonds[0].status, BondStatus::Claimed);
        assert_eq!(bonds[0].accrued, Decimal::ZERO);
        assert!(chain.submit_claim_bond(&bonds[0].id).await.unwrap().wait().await.is_err());
    }

    #[tokio::test]
    async fn test_manual_confirmation() {
        let chain = funded_chain().with_confirmation(ConfirmationMode::Manual);
        let handle = chain
            .submit_approval(Token::BLusd, Spender::BLusdAmm, ApprovalAmount::Unlimited)
            .await
            .unwrap();
        assert_eq!(chain.queued().await, 1);

        assert!(chain.release_next().await);
        assert!(handle.wait().await.is_ok());
        assert!(!chain.release_next().await);

        let allowance = chain.get_allowance(&account(), Spender::BLusdAmm, Token::BLusd).await.unwrap();
        assert!(allowance.is_unlimited());
    }

    #[tokio::test]
    async fn test_failing_reads_and_disconnect() {
        let chain = funded_chain();
        chain.set_reads_failing(true).await;
        assert!(matches!(chain.get_protocol_snapshot().await, Err(Error::ChainCall { .. })));
        chain.set_reads_failing(false).await;
        assert!(chain.get_protocol_snapshot().await.is_ok());
        assert_eq!(chain.calls().await.snapshot_reads, 2);

        chain.set_connected(false).await;
        assert!(!chain.is_connected().await);
        assert!(chain.submit_claim_lp_rewards().await.is_err());
    }

    #[tokio::test]
    async fn test_revert_mode() {
        let chain = funded_chain().with_confirmation(ConfirmationMode::Revert);
        let handle = chain.submit_stake_liquidity(Decimal::ONE).await.unwrap();
        assert!(handle.hash.starts_with("0x"));
        assert!(handle.wait().await.is_err());
    }
}
