//! Derivation of `ProtocolInfo` and `Bond` figures from raw chain data.

use crate::core::bond::{Bond, BondRawRecord, BondStatus};
use crate::core::protocol::{ProtocolInfo, ProtocolRawState, VaultApys};
use crate::engine::accrual::{
    break_even_period_days, controller_adjusted_days, future_accrual_factor, market_price_premium,
    net_premium, rebond_period_days,
};
use crate::engine::valuation::{
    annualized_rate, average_bond_age_days, bond_token_apr, fair_price, floor_price_from_reserves,
    get_return, treasury_from_reserves,
};
use crate::error::Result;
use crate::utils::constants::SECONDS_PER_DAY;
use crate::utils::math::{Decimal, Period};

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL INFO
// ═══════════════════════════════════════════════════════════════════════════════

/// Derive protocol economics from a raw snapshot and the observed bLUSD price
pub fn build_protocol_info(
    raw: &ProtocolRawState,
    market_price: Decimal,
    apys: Option<&VaultApys>,
) -> Result<ProtocolInfo> {
    let supply = raw.bond_token_supply;
    let treasury = treasury_from_reserves(
        raw.b_amm_lusd_debt,
        raw.curve_sai,
        raw.pending_lusd,
        raw.permanent_lusd,
    )?;

    let floor_price = if supply.is_zero() {
        Decimal::ONE
    } else {
        floor_price_from_reserves(
            raw.b_amm_lusd_debt,
            raw.curve_sai,
            raw.pending_lusd,
            raw.permanent_lusd,
            supply,
        )?
    };

    let day = Decimal::from(SECONDS_PER_DAY);
    let bond_token_apr = match apys {
        Some(apys) => bond_token_apr(raw.b_amm_lusd_debt, raw.curve_sai, apys, supply, market_price)?,
        None => None,
    };

    let mut info = ProtocolInfo {
        bond_token_supply: supply,
        market_price,
        treasury,
        floor_price,
        claim_bond_fee: raw.chicken_in_fee,
        alpha_accrual_factor: raw.accrual_parameter_seconds.try_div(day)?,
        market_price_premium: Decimal::ZERO,
        has_market_premium: false,
        break_even_period_in_days: Period::Infinite,
        rebond_period_in_days: Period::Infinite,
        controller_target_age: raw.target_average_age_seconds.try_div(day)?,
        average_bond_age: average_bond_age_days(
            raw.total_weighted_start_times,
            raw.total_pending_deposits,
            raw.timestamp,
        )?,
        fair_price: fair_price(&treasury, supply)?,
        simulated_market_price: market_price,
        bond_token_apr,
        snapshot_timestamp: raw.timestamp,
    };
    apply_market_price(&mut info, market_price)?;

    Ok(info)
}

/// Recompute the price-dependent figures of `info` at a what-if price
///
/// Treasury, floor and controller figures are unchanged; premium, horizons
/// and the bLUSD APR follow the simulated price.
pub fn simulate_protocol_info(info: &ProtocolInfo, simulated_price: Decimal) -> Result<ProtocolInfo> {
    let mut simulated = info.clone();
    apply_market_price(&mut simulated, simulated_price)?;

    simulated.bond_token_apr = match info.bond_token_apr {
        Some(apr) if simulated_price.is_positive() => {
            Some(apr.try_mul(info.market_price)?.try_div(simulated_price)?)
        }
        _ => None,
    };

    Ok(simulated)
}

fn apply_market_price(info: &mut ProtocolInfo, market_price: Decimal) -> Result<()> {
    let premium = market_price_premium(market_price, info.floor_price)?;
    let alpha = info.alpha_accrual_factor;
    let fee = info.claim_bond_fee;

    info.market_price = market_price;
    info.simulated_market_price = market_price;
    info.market_price_premium = premium;
    info.has_market_premium = net_premium(premium, fee)? > Decimal::ONE;
    info.break_even_period_in_days = break_even_period_days(alpha, premium, fee)?;
    info.rebond_period_in_days = rebond_period_days(alpha, premium, fee)?;

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// BONDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Derive a bond's figures at time `now`
pub fn bond_from_record(record: &BondRawRecord, info: &ProtocolInfo, now: u64) -> Result<Bond> {
    let age_end = record.end_time.unwrap_or(now);
    let age_seconds = age_end.saturating_sub(record.start_time);
    let bond_age_in_days = Decimal::days_from_seconds(age_seconds);

    let mut bond = Bond {
        id: record.id.clone(),
        deposit: record.deposit,
        accrued: Decimal::ZERO,
        start_time: record.start_time,
        end_time: record.end_time,
        status: record.status,
        claimed_amount: record.claimed_amount,
        bond_age_in_days,
        break_even_accrual: None,
        rebond_accrual: None,
        break_even_time: None,
        rebond_time: None,
        market_value: Decimal::ZERO,
        claim_now_return: Decimal::ZERO,
        rebond_return: None,
        rebond_roi: None,
        rebond_apr: None,
        remaining_rebond_days: Period::ZERO,
        remaining_break_even_days: Period::ZERO,
    };

    if record.status != BondStatus::Pending {
        return Ok(bond);
    }

    let market_price = info.market_price;
    let after_fee = Decimal::ONE.try_sub(info.claim_bond_fee)?;
    let alpha = info.alpha_accrual_factor;

    bond.accrued = record.accrued;
    bond.market_value = record.accrued.try_mul(market_price)?;
    bond.claim_now_return = get_return(record.accrued.try_mul(after_fee)?, record.deposit, market_price)?
        .try_mul(record.deposit)?;

    let accrual_at = |period: Period| -> Result<Option<Decimal>> {
        match period {
            Period::Infinite => Ok(None),
            finite => Ok(Some(
                record.deposit.try_mul(future_accrual_factor(info.floor_price, finite, alpha)?)?,
            )),
        }
    };
    bond.break_even_accrual = accrual_at(info.break_even_period_in_days)?;
    bond.rebond_accrual = accrual_at(info.rebond_period_in_days)?;

    let remaining = |period: Period| {
        controller_adjusted_days(age_seconds, info.controller_target_age, info.average_bond_age, period)
    };
    bond.remaining_break_even_days = remaining(info.break_even_period_in_days)?;
    bond.remaining_rebond_days = remaining(info.rebond_period_in_days)?;

    bond.break_even_time = eta(now, bond.remaining_break_even_days)?;
    bond.rebond_time = eta(now, bond.remaining_rebond_days)?;

    if let Some(rebond_accrual) = bond.rebond_accrual {
        let roi = get_return(rebond_accrual.try_mul(after_fee)?, record.deposit, market_price)?;
        bond.rebond_roi = Some(roi);
        bond.rebond_return = Some(roi.try_mul(record.deposit)?);

        let horizon_days = bond_age_in_days.try_add(bond.remaining_rebond_days.finite_days("rebond")?)?;
        if horizon_days.is_positive() {
            bond.rebond_apr = Some(annualized_rate(roi, bond_age_in_days, bond.remaining_rebond_days)?);
        }
    }

    Ok(bond)
}

fn eta(now: u64, remaining: Period) -> Result<Option<u64>> {
    match remaining {
        Period::Infinite => Ok(None),
        Period::Finite(days) => Ok(Some(now.saturating_add(days.days_to_seconds()?))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bond::BondId;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    const DAY: u64 = 86_400;
    const NOW: u64 = 1_700_000_000;

    fn raw_state() -> ProtocolRawState {
        ProtocolRawState {
            bond_token_supply: Decimal::from_int(500),
            pending_lusd: Decimal::from_int(300),
            permanent_lusd: Decimal::from_int(100),
            b_amm_lusd_debt: Decimal::from_int(600),
            curve_sai: Decimal::from_int(500),
            chicken_in_fee: d("0.01"),
            accrual_parameter_seconds: Decimal::from(2 * DAY),
            target_average_age_seconds: Decimal::from(30 * DAY),
            total_weighted_start_times: Decimal::from(300 * (NOW - 10 * DAY)),
            total_pending_deposits: Decimal::from_int(300),
            amm_oracle_price: None,
            timestamp: NOW,
        }
    }

    fn pending_record() -> BondRawRecord {
        BondRawRecord {
            id: BondId::from("1"),
            deposit: Decimal::from_int(100),
            accrued: Decimal::from_int(40),
            start_time: NOW - 5 * DAY,
            end_time: None,
            status: BondStatus::Pending,
            claimed_amount: None,
        }
    }

    #[test]
    fn test_build_protocol_info() {
        // floor 1.4, market 2.1: premium 1.5
        let info = build_protocol_info(&raw_state(), d("2.1"), None).unwrap();

        assert_eq!(info.floor_price, d("1.4"));
        assert_eq!(info.market_price_premium, d("1.5"));
        assert_eq!(info.alpha_accrual_factor, Decimal::from_int(2));
        assert_eq!(info.controller_target_age, Decimal::from_int(30));
        assert_eq!(info.average_bond_age, Decimal::from_int(10));
        assert!(info.has_market_premium);
        assert!(info.break_even_period_in_days < info.rebond_period_in_days);
        assert!(info.treasury.is_consistent());
        assert!(info.price_bounds_hold());
        assert_eq!(info.simulated_market_price, info.market_price);
        assert_eq!(info.bond_token_apr, None);
    }

    #[test]
    fn test_bootstrap_defaults() {
        let mut raw = raw_state();
        raw.bond_token_supply = Decimal::ZERO;

        let info = build_protocol_info(&raw, d("1.05"), None).unwrap();
        assert!(info.is_bootstrap());
        assert_eq!(info.floor_price, Decimal::ONE);
        assert_eq!(info.fair_price.lower, Decimal::ONE);
        assert_eq!(info.fair_price.upper, Decimal::ONE);
    }

    #[test]
    fn test_simulated_info() {
        let apys = VaultApys { b_amm: d("0.1"), curve: d("0.1") };
        let info = build_protocol_info(&raw_state(), d("2.1"), Some(&apys)).unwrap();
        let simulated = simulate_protocol_info(&info, d("1.4")).unwrap();

        assert_eq!(simulated.market_price, d("1.4"));
        assert_eq!(simulated.simulated_market_price, d("1.4"));
        assert_eq!(simulated.market_price_premium, Decimal::ONE);
        assert!(!simulated.has_market_premium);
        assert_eq!(simulated.break_even_period_in_days, Period::Infinite);
        assert_eq!(simulated.floor_price, info.floor_price);
        assert_eq!(simulated.treasury, info.treasury);
        // APR scales inversely with price
        let expected = info.bond_token_apr.unwrap().try_mul(d("1.5")).unwrap();
        let diff = simulated.bond_token_apr.unwrap().try_sub(expected).unwrap();
        assert!(diff.raw().abs() < d("0.000000000001").raw());
    }

    #[test]
    fn test_pending_bond_metrics() {
        let info = build_protocol_info(&raw_state(), d("2.1"), None).unwrap();
        let bond = bond_from_record(&pending_record(), &info, NOW).unwrap();

        assert_eq!(bond.bond_age_in_days, Decimal::from_int(5));
        assert_eq!(bond.market_value, Decimal::from_int(84));
        // 40 * 0.99 * 2.1 - 100
        assert_eq!(bond.claim_now_return, d("-16.84"));
        assert!(bond.break_even_accrual.unwrap() < bond.rebond_accrual.unwrap());
        assert!(bond.break_even_time.unwrap() >= NOW);
        assert!(bond.rebond_time.unwrap() >= bond.break_even_time.unwrap());
        assert!(bond.rebond_roi.unwrap().is_positive());
        assert!(bond.rebond_apr.is_some());

        // Net value at break-even equals the deposit
        let at_break_even = bond
            .break_even_accrual
            .unwrap()
            .try_mul(d("0.99"))
            .unwrap()
            .try_mul(d("2.1"))
            .unwrap();
        assert!(at_break_even.try_sub(Decimal::from_int(100)).unwrap().raw().abs() < d("0.000000001").raw());
    }

    #[test]
    fn test_terminal_bond_has_no_return() {
        let info = build_protocol_info(&raw_state(), d("2.1"), None).unwrap();
        let mut record = pending_record();
        record.status = BondStatus::Claimed;
        record.end_time = Some(NOW - DAY);
        record.claimed_amount = Some(Decimal::from_int(39));

        let bond = bond_from_record(&record, &info, NOW).unwrap();
        assert_eq!(bond.accrued, Decimal::ZERO);
        assert_eq!(bond.claim_now_return, Decimal::ZERO);
        assert_eq!(bond.bond_age_in_days, Decimal::from_int(4));
        assert_eq!(bond.rebond_time, None);
        assert_eq!(bond.claimed_amount, Some(Decimal::from_int(39)));
    }

    #[test]
    fn test_bond_without_premium_never_breaks_even() {
        let info = build_protocol_info(&raw_state(), d("1.4"), None).unwrap();
        let bond = bond_from_record(&pending_record(), &info, NOW).unwrap();

        assert_eq!(bond.break_even_accrual, None);
        assert_eq!(bond.remaining_rebond_days, Period::Infinite);
        assert_eq!(bond.rebond_time, None);
        assert_eq!(bond.rebond_apr, None);
    }
}
