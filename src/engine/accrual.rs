//! Accrual curve and its inverses.
//!
//! A pending bond accrues bLUSD along `deposit / floor * t / (t + alpha)`,
//! with `t` and `alpha` in days. Claiming pays `1 - fee` of the accrual, so
//! with `p = premium * (1 - fee)`:
//!
//! - break-even: `p * t / (t + alpha) = 1`, i.e. `t = alpha / (p - 1)`
//! - optimal rebond: `t = alpha * (1 + sqrt(p)) / (p - 1)`
//!
//! Both horizons are `Period::Infinite` when `p <= 1`.

use crate::error::{Error, Result};
use crate::utils::math::{Decimal, Period};

fn ensure_alpha(alpha: Decimal) -> Result<()> {
    if !alpha.is_positive() {
        return Err(Error::InvalidParameter {
            name: "alpha".into(),
            reason: format!("accrual parameter must be positive, got {}", alpha),
        });
    }
    Ok(())
}

fn ensure_fee(fee: Decimal) -> Result<()> {
    if fee.is_negative() || fee >= Decimal::ONE {
        return Err(Error::InvalidParameter {
            name: "fee".into(),
            reason: format!("claim fee must be in [0, 1), got {}", fee),
        });
    }
    Ok(())
}

/// Premium net of the claim fee, `premium * (1 - fee)`
pub fn net_premium(premium: Decimal, fee: Decimal) -> Result<Decimal> {
    ensure_fee(fee)?;
    if premium.is_negative() {
        return Err(Error::InvalidParameter {
            name: "premium".into(),
            reason: format!("premium cannot be negative, got {}", premium),
        });
    }
    premium.try_mul(Decimal::ONE.try_sub(fee)?)
}

/// `market_price / floor_price`
///
/// The floor price is never zero for a live protocol; a zero floor is
/// reported as `DivisionByZero`.
pub fn market_price_premium(market_price: Decimal, floor_price: Decimal) -> Result<Decimal> {
    if floor_price.is_zero() {
        return Err(Error::division_by_zero("market price premium: floor price is zero"));
    }
    market_price.try_div(floor_price)
}

/// Days after which claiming and selling returns the deposit
pub fn break_even_period_days(alpha: Decimal, premium: Decimal, fee: Decimal) -> Result<Period> {
    ensure_alpha(alpha)?;
    let p = net_premium(premium, fee)?;
    if p <= Decimal::ONE {
        return Ok(Period::Infinite);
    }

    Ok(Period::Finite(alpha.try_div(p.try_sub(Decimal::ONE)?)?))
}

/// Days after which claiming, selling and bonding again beats holding
pub fn rebond_period_days(alpha: Decimal, premium: Decimal, fee: Decimal) -> Result<Period> {
    ensure_alpha(alpha)?;
    let p = net_premium(premium, fee)?;
    if p <= Decimal::ONE {
        return Ok(Period::Infinite);
    }

    let numerator = alpha.try_mul(Decimal::ONE.try_add(p.try_sqrt()?)?)?;
    Ok(Period::Finite(numerator.try_div(p.try_sub(Decimal::ONE)?)?))
}

/// bLUSD accrued per LUSD deposited after `period`
///
/// Saturates at `1 / floor_price` for an infinite period.
pub fn future_accrual_factor(floor_price: Decimal, period: Period, alpha: Decimal) -> Result<Decimal> {
    ensure_alpha(alpha)?;
    if !floor_price.is_positive() {
        return Err(Error::division_by_zero("accrual factor: floor price is not positive"));
    }

    let fraction = match period {
        Period::Infinite => Decimal::ONE,
        Period::Finite(days) => {
            if days.is_negative() {
                return Err(Error::InvalidParameter {
                    name: "period".into(),
                    reason: format!("period cannot be negative, got {}", days),
                });
            }
            days.try_div(days.try_add(alpha)?)?
        }
    };

    fraction.try_div(floor_price)
}

/// Days remaining until `period` is reached by a bond of the given age,
/// corrected by the accrual controller
///
/// While the average pending bond age exceeds the controller target, the
/// contract shrinks the accrual parameter, pulling every horizon in by
/// `target_age / average_age`. Ages are in days.
pub fn controller_adjusted_days(
    bond_age_seconds: u64,
    target_age: Decimal,
    average_age: Decimal,
    period: Period,
) -> Result<Period> {
    let days = match period {
        Period::Infinite => return Ok(Period::Infinite),
        Period::Finite(days) => days,
    };

    let age = Decimal::days_from_seconds(bond_age_seconds);
    let remaining = days.try_sub(age)?.clamp_non_negative();

    if target_age.is_positive() && average_age > target_age {
        let adjusted = remaining.try_mul(target_age)?.try_div(average_age)?;
        return Ok(Period::Finite(adjusted));
    }

    Ok(Period::Finite(remaining))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_premium() {
        assert_eq!(market_price_premium(d("1.5"), d("1.2")).unwrap(), d("1.25"));
        let err = market_price_premium(d("1.5"), Decimal::ZERO).unwrap_err();
        assert!(matches!(err, Error::DivisionByZero { .. }));
    }

    #[test]
    fn test_break_even_before_rebond() {
        let alpha = Decimal::from_int(2);
        let premium = d("1.5");
        let fee = d("0.01");

        let break_even = break_even_period_days(alpha, premium, fee).unwrap();
        let rebond = rebond_period_days(alpha, premium, fee).unwrap();

        let break_even_days = break_even.days().unwrap();
        assert!(break_even_days.is_positive());
        assert!(break_even < rebond);

        // p = 1.485: alpha / 0.485
        assert!(break_even_days > d("4.1237") && break_even_days < d("4.1238"));
        // alpha * (1 + 1.21861) / 0.485
        let rebond_days = rebond.days().unwrap();
        assert!(rebond_days > d("9.148") && rebond_days < d("9.150"));
    }

    #[test]
    fn test_no_premium_never_breaks_even() {
        let alpha = Decimal::from_int(15);
        assert_eq!(break_even_period_days(alpha, d("1.01"), d("0.01")).unwrap(), Period::Infinite);
        assert_eq!(rebond_period_days(alpha, Decimal::ONE, Decimal::ZERO).unwrap(), Period::Infinite);
        assert_eq!(break_even_period_days(alpha, d("0.8"), Decimal::ZERO).unwrap(), Period::Infinite);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(break_even_period_days(Decimal::ZERO, d("2"), d("0.01")).is_err());
        assert!(rebond_period_days(Decimal::ONE, d("2"), Decimal::ONE).is_err());
        assert!(rebond_period_days(Decimal::ONE, d("-2"), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_accrual_factor_at_break_even() {
        // At the break-even horizon the net claim is worth exactly the deposit
        let alpha = Decimal::from_int(10);
        let floor = d("1.1");
        let premium = d("1.5");
        let fee = d("0.02");

        let period = break_even_period_days(alpha, premium, fee).unwrap();
        let factor = future_accrual_factor(floor, period, alpha).unwrap();
        let market_price = premium.try_mul(floor).unwrap();
        let value = factor
            .try_mul(Decimal::ONE.try_sub(fee).unwrap())
            .unwrap()
            .try_mul(market_price)
            .unwrap();

        assert!(value.try_sub(Decimal::ONE).unwrap().raw().abs() < d("0.000000000001").raw());
    }

    #[test]
    fn test_accrual_factor_saturates() {
        let floor = d("1.25");
        let alpha = Decimal::from_int(7);
        assert_eq!(future_accrual_factor(floor, Period::Infinite, alpha).unwrap(), d("0.8"));
        assert_eq!(future_accrual_factor(floor, Period::ZERO, alpha).unwrap(), Decimal::ZERO);
        assert!(future_accrual_factor(Decimal::ZERO, Period::ZERO, alpha).is_err());
    }

    #[test]
    fn test_controller_adjustment() {
        let period = Period::Finite(Decimal::from_int(30));
        let ten_days = 10 * 86_400;

        // Average below target: plain remaining time
        let plain = controller_adjusted_days(ten_days, Decimal::from_int(30), Decimal::from_int(20), period).unwrap();
        assert_eq!(plain, Period::Finite(Decimal::from_int(20)));

        // Average twice the target: remaining time halves
        let adjusted = controller_adjusted_days(ten_days, Decimal::from_int(30), Decimal::from_int(60), period).unwrap();
        assert_eq!(adjusted, Period::Finite(Decimal::from_int(10)));

        // Past the horizon
        let past = controller_adjusted_days(40 * 86_400, Decimal::from_int(30), Decimal::ZERO, period).unwrap();
        assert_eq!(past, Period::ZERO);

        let never = controller_adjusted_days(ten_days, Decimal::ONE, Decimal::ONE, Period::Infinite).unwrap();
        assert_eq!(never, Period::Infinite);
    }

    fn thousandths(n: u32) -> Decimal {
        Decimal::new(n as i64, 3)
    }

    proptest! {
        #[test]
        fn prop_rebond_non_increasing_in_premium(
            alpha in 1u32..100_000,
            premium in 500u32..5_000,
            step in 1u32..2_000,
            fee in 0u32..200,
        ) {
            let alpha = thousandths(alpha);
            let fee = thousandths(fee);
            let low = rebond_period_days(alpha, thousandths(premium), fee).unwrap();
            let high = rebond_period_days(alpha, thousandths(premium + step), fee).unwrap();
            prop_assert!(high <= low);
        }

        #[test]
        fn prop_rebond_not_before_break_even(
            alpha in 1u32..100_000,
            premium in 500u32..5_000,
            fee in 0u32..200,
        ) {
            let alpha = thousandths(alpha);
            let premium = thousandths(premium);
            let fee = thousandths(fee);
            let break_even = break_even_period_days(alpha, premium, fee).unwrap();
            let rebond = rebond_period_days(alpha, premium, fee).unwrap();
            prop_assert_eq!(break_even.is_finite(), rebond.is_finite());
            prop_assert!(rebond >= break_even);
        }

        #[test]
        fn prop_accrual_factor_monotone_and_bounded(
            floor in 1u32..10_000,
            alpha in 1u32..100_000,
            days in 0u32..100_000,
            step in 1u32..100_000,
        ) {
            let floor = thousandths(floor);
            let alpha = thousandths(alpha);
            let ceiling = future_accrual_factor(floor, Period::Infinite, alpha).unwrap();
            let earlier = future_accrual_factor(floor, Period::Finite(Decimal::from(days as u64)), alpha).unwrap();
            let later = future_accrual_factor(floor, Period::Finite(Decimal::from((days + step) as u64)), alpha).unwrap();
            prop_assert!(earlier <= later);
            prop_assert!(later <= ceiling);
        }

        #[test]
        fn prop_controller_monotone_in_period(
            age_days in 0u64..400,
            target in 1u32..100_000,
            average in 0u32..200_000,
            period in 0u32..400_000,
            step in 1u32..100_000,
        ) {
            let target = thousandths(target);
            let average = thousandths(average);
            let age = age_days * 86_400;
            let shorter = controller_adjusted_days(age, target, average, Period::Finite(thousandths(period))).unwrap();
            let longer = controller_adjusted_days(age, target, average, Period::Finite(thousandths(period + step))).unwrap();
            prop_assert!(shorter <= longer);
            prop_assert!(longer <= controller_adjusted_days(age, target, average, Period::Infinite).unwrap());
        }
    }
}
