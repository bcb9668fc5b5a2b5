//! Output amount arithmetic for escrow spends.
//!
//! Everything runs in whole satoshis so a computed output can never exceed
//! what the escrowed input pays: integer division floors each share.

use bitcoin::Amount;

use escrow_types::{EscrowError, Result, SplitRatio};

/// Convert a configured BTC amount.
pub fn amount_from_btc(btc: f64) -> Result<Amount> {
    Amount::from_btc(btc).map_err(|e| EscrowError::Config(format!("Invalid amount {}: {}", btc, e)))
}

/// Shares of a two-output release as `(local, counterparty)`.
///
/// The fee is reserved once per output before the split.
pub fn split_release(input: Amount, fee: Amount, split: SplitRatio) -> Result<(Amount, Amount)> {
    let total = split
        .total()
        .filter(|total| *total > 0)
        .ok_or_else(|| EscrowError::Config("release split total must be non-zero".to_string()))?;

    let reserved = fee
        .checked_mul(2)
        .ok_or_else(|| EscrowError::Config("release fee overflows".to_string()))?;
    let distributable = input.checked_sub(reserved).ok_or_else(|| {
        EscrowError::protocol(format!(
            "Escrow value {} does not cover release fees {}",
            input, reserved
        ))
    })?;

    let sats = u128::from(distributable.to_sat());
    let local = sats * u128::from(split.local) / u128::from(total);
    let counterparty = sats * u128::from(split.counterparty) / u128::from(total);

    // Both shares are bounded by `sats`, which came from a u64.
    Ok((
        Amount::from_sat(local as u64),
        Amount::from_sat(counterparty as u64),
    ))
}

/// Single refund output: the input minus one fee.
pub fn refund_amount(input: Amount, fee: Amount) -> Result<Amount> {
    input.checked_sub(fee).ok_or_else(|| {
        EscrowError::protocol(format!(
            "Escrow value {} does not cover refund fee {}",
            input, fee
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_truncates_to_satoshis() {
        let (local, counterparty) = split_release(
            Amount::from_btc(1.0).unwrap(),
            amount_from_btc(0.0001).unwrap(),
            SplitRatio::default(),
        )
        .unwrap();

        assert_eq!(local, Amount::from_sat(33_326_666));
        assert_eq!(counterparty, Amount::from_sat(66_653_333));
        assert!(local + counterparty <= Amount::from_btc(0.9999).unwrap());
    }

    #[test]
    fn test_split_never_overspends() {
        let fee = Amount::from_sat(10_000);
        for sats in [20_000u64, 20_001, 123_456_789, 99_999_999, 2_100_000_000_000_000] {
            for (l, c) in [(1u64, 2u64), (1, 1), (3, 7), (0, 1)] {
                let input = Amount::from_sat(sats);
                let (a, b) = split_release(input, fee, SplitRatio { local: l, counterparty: c })
                    .unwrap();
                assert!(a + b + fee <= input, "overspend for {} at {}:{}", sats, l, c);
            }
        }
    }

    #[test]
    fn test_input_below_fees_rejected() {
        let err = split_release(
            Amount::from_sat(15_000),
            Amount::from_sat(10_000),
            SplitRatio::default(),
        )
        .unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(refund_amount(Amount::from_sat(5), Amount::from_sat(10)).is_err());
    }

    #[test]
    fn test_refund_amount() {
        assert_eq!(
            refund_amount(Amount::from_sat(100_000_000), Amount::from_sat(10_000)).unwrap(),
            Amount::from_sat(99_990_000)
        );
    }

    #[test]
    fn test_negative_fee_rejected() {
        assert!(amount_from_btc(-1.0).is_err());
    }
}
