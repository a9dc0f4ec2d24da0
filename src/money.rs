//! Money arithmetic in minor currency units.
//!
//! All amounts are exact decimal integers; no floating point enters any
//! ledger computation. Division is truncating with an explicit
//! remainder, so every split satisfies `quotient * divisor + remainder
//! == amount` exactly.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::error::{AppError, Result};
use crate::models::Currency;

/// Converts an amount in major units to minor units using the
/// currency's decimals table. Rejects amounts with more precision than
/// the currency's minor unit can represent.
pub fn to_minor_units(amount: Decimal, currency: Currency) -> Result<Decimal> {
    let scaled = amount * currency.minor_unit_scale();
    if scaled != scaled.trunc() {
        return Err(AppError::validation(format!(
            "amount {} has more precision than {} allows ({} decimal places)",
            amount,
            currency,
            currency.decimal_places()
        )));
    }
    Ok(scaled.normalize())
}

/// `to_minor_units` for float input. Non-finite values are rejected.
pub fn to_minor_units_f64(amount: f64, currency: Currency) -> Result<Decimal> {
    let amount = Decimal::from_f64(amount)
        .ok_or_else(|| AppError::validation(format!("amount {} is not a finite number", amount)))?;
    to_minor_units(amount, currency)
}

/// Integer division with truncation toward zero. The identity
/// `quotient * divisor + remainder == amount` holds exactly.
pub fn divide_with_remainder(amount: Decimal, divisor: Decimal) -> Result<(Decimal, Decimal)> {
    let quotient = amount
        .checked_div(divisor)
        .ok_or_else(|| AppError::validation("division by zero"))?
        .trunc();
    let remainder = amount - quotient * divisor;
    Ok((quotient, remainder))
}

/// A capture or refund amount split between the platform fee and the
/// merchant's share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub fee: Decimal,
    pub merchant_share: Decimal,
}

/// Splits `amount` by an integer fee percentage, truncating the fee
/// toward zero. `fee + merchant_share == amount` by construction; a fee
/// that rounds to zero leaves the full amount with the merchant.
pub fn split_fee(amount: Decimal, fee_percent: u32) -> FeeSplit {
    let fee = (amount * Decimal::from(fee_percent) / Decimal::from(100)).trunc();
    FeeSplit {
        fee,
        merchant_share: amount - fee,
    }
}
