//! Floor price, treasury split, fair price bounds and return figures.

use crate::core::protocol::{FairPrice, Treasury, VaultApys};
use crate::error::{Error, Result};
use crate::utils::constants::{DAYS_PER_YEAR, SECONDS_PER_DAY};
use crate::utils::math::{Decimal, Period};

// ═══════════════════════════════════════════════════════════════════════════════
// TREASURY & FLOOR
// ═══════════════════════════════════════════════════════════════════════════════

/// LUSD backing the bLUSD supply: everything acquired minus the pending and
/// permanent buckets, never negative
fn reserve_from_holdings(
    bamm_debt: Decimal,
    curve_sai: Decimal,
    pending: Decimal,
    permanent: Decimal,
) -> Result<Decimal> {
    let acquired = bamm_debt.try_add(curve_sai)?;
    Ok(acquired.try_sub(pending)?.try_sub(permanent)?.clamp_non_negative())
}

/// Split the bond manager holdings into treasury buckets
pub fn treasury_from_reserves(
    bamm_debt: Decimal,
    curve_sai: Decimal,
    pending: Decimal,
    permanent: Decimal,
) -> Result<Treasury> {
    let reserve = reserve_from_holdings(bamm_debt, curve_sai, pending, permanent)?;
    Treasury::new(pending, reserve, permanent)
}

/// `(bamm_debt + curve_sai - pending - permanent) / supply`, clamped at zero
///
/// A zero supply has no floor price; callers handle the bootstrap state
/// before calling.
pub fn floor_price_from_reserves(
    bamm_debt: Decimal,
    curve_sai: Decimal,
    pending: Decimal,
    permanent: Decimal,
    supply: Decimal,
) -> Result<Decimal> {
    if supply.is_zero() {
        return Err(Error::InvalidState("floor price of zero bLUSD supply".into()));
    }
    reserve_from_holdings(bamm_debt, curve_sai, pending, permanent)?.try_div(supply)
}

/// Intrinsic value bounds of one bLUSD
///
/// The lower bound is the reserve backing (the floor price); the upper bound
/// adds the permanent bucket, which is released to bLUSD holders on
/// migration.
pub fn fair_price(treasury: &Treasury, supply: Decimal) -> Result<FairPrice> {
    if supply.is_zero() {
        return Ok(FairPrice::BOOTSTRAP);
    }

    Ok(FairPrice {
        lower: treasury.reserve.try_div(supply)?,
        upper: treasury.reserve.try_add(treasury.permanent)?.try_div(supply)?,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKET
// ═══════════════════════════════════════════════════════════════════════════════

/// Price implied by selling `input` bLUSD for `output` LUSD
pub fn marginal_market_price(input: Decimal, output: Decimal) -> Result<Decimal> {
    if input.is_zero() {
        return Err(Error::division_by_zero("marginal price: zero quote input"));
    }
    output.try_div(input)
}

/// Yearly treasury yield relative to the bLUSD market cap
///
/// All bucket yield flows into the reserve, so it accrues to bLUSD holders.
/// `None` when there is no market cap to relate it to.
pub fn bond_token_apr(
    bamm_debt: Decimal,
    curve_sai: Decimal,
    apys: &VaultApys,
    supply: Decimal,
    market_price: Decimal,
) -> Result<Option<Decimal>> {
    let market_cap = supply.try_mul(market_price)?;
    if market_cap.is_zero() {
        return Ok(None);
    }

    let yearly_yield = bamm_debt.try_mul(apys.b_amm)?.try_add(curve_sai.try_mul(apys.curve)?)?;
    Ok(Some(yearly_yield.try_div(market_cap)?))
}

/// Deposit-weighted average age of pending bonds, in days
pub fn average_bond_age_days(
    total_weighted_start_times: Decimal,
    total_pending_deposits: Decimal,
    now: u64,
) -> Result<Decimal> {
    if total_pending_deposits.is_zero() {
        return Ok(Decimal::ZERO);
    }

    let average_start = total_weighted_start_times.try_div(total_pending_deposits)?;
    let age_seconds = Decimal::from(now).try_sub(average_start)?.clamp_non_negative();
    age_seconds.try_div(Decimal::from(SECONDS_PER_DAY))
}

// ═══════════════════════════════════════════════════════════════════════════════
// RETURNS
// ═══════════════════════════════════════════════════════════════════════════════

/// Relative return of selling `accrued` bLUSD against the `deposit`
///
/// Zero for bonds that accrued nothing (cancelled, claimed or brand new).
pub fn get_return(accrued: Decimal, deposit: Decimal, market_price: Decimal) -> Result<Decimal> {
    if accrued.is_zero() {
        return Ok(Decimal::ZERO);
    }
    if deposit.is_zero() {
        return Err(Error::division_by_zero("return on zero deposit"));
    }

    accrued.try_mul(market_price)?.try_sub(deposit)?.try_div(deposit)
}

/// `total_return * 365 / (age + horizon)`
pub fn annualized_rate(total_return: Decimal, age_in_days: Decimal, horizon: Period) -> Result<Decimal> {
    let horizon_days = horizon.finite_days("annualization horizon")?;
    let total_days = age_in_days.try_add(horizon_days)?;
    if total_days.is_zero() {
        return Err(Error::division_by_zero("annualized rate over zero days"));
    }

    total_return
        .try_mul(Decimal::from_int(DAYS_PER_YEAR))?
        .try_div(total_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_floor_price() {
        let floor = floor_price_from_reserves(
            Decimal::from_int(600),
            Decimal::from_int(500),
            Decimal::from_int(300),
            Decimal::from_int(100),
            Decimal::from_int(500),
        )
        .unwrap();
        assert_eq!(floor, d("1.4"));
    }

    #[test]
    fn test_floor_price_clamped() {
        let floor = floor_price_from_reserves(
            Decimal::from_int(100),
            Decimal::ZERO,
            Decimal::from_int(300),
            Decimal::from_int(100),
            Decimal::from_int(10),
        )
        .unwrap();
        assert_eq!(floor, Decimal::ZERO);
    }

    #[test]
    fn test_floor_price_zero_supply() {
        let err = floor_price_from_reserves(
            Decimal::ONE,
            Decimal::ONE,
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_fair_price_bounds() {
        let treasury = treasury_from_reserves(
            Decimal::from_int(600),
            Decimal::from_int(500),
            Decimal::from_int(300),
            Decimal::from_int(100),
        )
        .unwrap();
        assert_eq!(treasury.reserve, Decimal::from_int(700));

        let fair = fair_price(&treasury, Decimal::from_int(500)).unwrap();
        assert_eq!(fair.lower, d("1.4"));
        assert_eq!(fair.upper, d("1.6"));
        assert_eq!(fair_price(&treasury, Decimal::ZERO).unwrap(), FairPrice::BOOTSTRAP);
    }

    #[test]
    fn test_get_return() {
        // 110 bLUSD at 1.1 against 100 LUSD: 21% return
        let ret = get_return(Decimal::from_int(110), Decimal::from_int(100), d("1.1")).unwrap();
        assert_eq!(ret, d("0.21"));

        let loss = get_return(Decimal::from_int(50), Decimal::from_int(100), Decimal::ONE).unwrap();
        assert_eq!(loss, d("-0.5"));

        assert_eq!(get_return(Decimal::ZERO, Decimal::ZERO, Decimal::ONE).unwrap(), Decimal::ZERO);
        assert!(get_return(Decimal::ONE, Decimal::ZERO, Decimal::ONE).is_err());
    }

    #[test]
    fn test_annualized_rate() {
        let rate = annualized_rate(d("0.1"), Decimal::from_int(30), Period::Finite(Decimal::from_int(43))).unwrap();
        assert_eq!(rate, d("0.5"));

        let err = annualized_rate(d("0.1"), Decimal::ONE, Period::Infinite).unwrap_err();
        assert!(matches!(err, Error::NotComputable(_)));
        assert!(annualized_rate(d("0.1"), Decimal::ZERO, Period::ZERO).is_err());
    }

    #[test]
    fn test_marginal_price() {
        assert_eq!(marginal_market_price(d("0.001"), d("0.00125")).unwrap(), d("1.25"));
        assert!(marginal_market_price(Decimal::ZERO, Decimal::ONE).is_err());
    }

    #[test]
    fn test_bond_token_apr() {
        let apys = VaultApys {
            b_amm: d("0.1"),
            curve: d("0.05"),
        };
        // (1000 * 0.1 + 2000 * 0.05) / (100 * 2)
        let apr = bond_token_apr(Decimal::from_int(1000), Decimal::from_int(2000), &apys, Decimal::from_int(100), Decimal::from_int(2)).unwrap();
        assert_eq!(apr, Some(Decimal::ONE));

        let none = bond_token_apr(Decimal::from_int(1000), Decimal::ZERO, &apys, Decimal::ZERO, Decimal::ONE).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn test_average_bond_age() {
        // 100 LUSD started at t=0 and 300 LUSD at t=4 days: average start 3 days
        let day = 86_400u64;
        let weighted = Decimal::from(300 * 4 * day);
        let age = average_bond_age_days(weighted, Decimal::from_int(400), 10 * day).unwrap();
        assert_eq!(age, Decimal::from_int(7));
        assert_eq!(average_bond_age_days(Decimal::ZERO, Decimal::ZERO, day).unwrap(), Decimal::ZERO);
    }

    proptest! {
        #[test]
        fn prop_floor_price_non_negative(
            bamm in 0u64..1_000_000_000,
            curve in 0u64..1_000_000_000,
            pending in 0u64..1_000_000_000,
            permanent in 0u64..1_000_000_000,
            supply in 1u64..1_000_000_000,
        ) {
            let floor = floor_price_from_reserves(
                Decimal::from(bamm),
                Decimal::from(curve),
                Decimal::from(pending),
                Decimal::from(permanent),
                Decimal::from(supply),
            ).unwrap();
            prop_assert!(!floor.is_negative());
        }

        #[test]
        fn prop_treasury_total_is_exact(
            bamm in 0u64..1_000_000_000_000,
            curve in 0u64..1_000_000_000_000,
            pending in 0u64..1_000_000_000_000,
            permanent in 0u64..1_000_000_000_000,
            scale in 0u32..18,
        ) {
            let at = |v: u64| Decimal::new(v as i64, scale);
            let treasury = treasury_from_reserves(at(bamm), at(curve), at(pending), at(permanent)).unwrap();
            prop_assert!(treasury.is_consistent());
            let sum = treasury.pending.try_add(treasury.reserve).unwrap().try_add(treasury.permanent).unwrap();
            prop_assert_eq!(treasury.total, sum);
        }

        #[test]
        fn prop_zero_accrual_has_no_return(deposit in 1u64..1_000_000_000, price in 0u64..1_000_000) {
            let ret = get_return(Decimal::ZERO, Decimal::from(deposit), Decimal::new(price as i64, 3)).unwrap();
            prop_assert_eq!(ret, Decimal::ZERO);
        }
    }
}
