//! Conversion quotes between an allowed token and the fund token. The
//! submitted minimum is a conservative 95% of the computed amount so small
//! price drift between quoting and settlement does not fail the request.

use alloy::primitives::U256;
use decimal_util::adjust_decimals;
use serde::Serialize;

pub const CONSERVATIVE_PCT: u64 = 95;

/// One side of a conversion: the amount scale of the asset and the price
/// quoted for it at its own scale.
#[derive(Clone, Copy, Debug)]
pub struct QuoteLeg {
    pub decimals: u8,
    pub price: U256,
    pub price_decimals: u8,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct Quote {
    pub computed_amount_out: U256,
    pub min_amount_out: U256,
}

/// Quotes `amount_in` of the input asset in units of the output asset:
/// `amount_in * price_in / price_out`, with both the amount and the price
/// ratio rescaled to the output side's decimals first. All divisions round
/// down. Returns `None` when the output price is unknown (zero) or the
/// intermediate product overflows.
pub fn quote(amount_in: U256, input: &QuoteLeg, output: &QuoteLeg) -> Option<Quote> {
    if output.price.is_zero() {
        return None;
    }

    let amount = adjust_decimals(amount_in, input.decimals, output.decimals);
    let price_in = adjust_decimals(input.price, input.price_decimals, output.price_decimals);

    let computed_amount_out = amount.checked_mul(price_in)? / output.price;
    let min_amount_out =
        computed_amount_out.checked_mul(U256::from(CONSERVATIVE_PCT))? / U256::from(100u64);

    Some(Quote {
        computed_amount_out,
        min_amount_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(v: u128) -> U256 {
        U256::from(v)
    }

    #[test]
    fn test_deposit_quote_adjusts_scales() {
        // 100 units of a 6-decimal token priced at 1.0 (8-decimal oracle),
        // into an 18-decimal fund token priced at 2.0 (18 decimals):
        // 100 / 2 = 50 out, 47.5 after the 5% haircut.
        let input = QuoteLeg {
            decimals: 6,
            price: u(100_000_000),
            price_decimals: 8,
        };
        let output = QuoteLeg {
            decimals: 18,
            price: u(2_000_000_000_000_000_000),
            price_decimals: 18,
        };

        let q = quote(u(100_000_000), &input, &output).unwrap();
        assert_eq!(q.computed_amount_out, u(50_000_000_000_000_000_000));
        assert_eq!(q.min_amount_out, u(47_500_000_000_000_000_000));
    }

    #[test]
    fn test_withdrawal_quote_reverses_legs() {
        // 50 fund tokens at 2.0 back into the 6-decimal token at 1.0:
        // 100 out, 95 after the haircut.
        let input = QuoteLeg {
            decimals: 18,
            price: u(2_000_000_000_000_000_000),
            price_decimals: 18,
        };
        let output = QuoteLeg {
            decimals: 6,
            price: u(100_000_000),
            price_decimals: 8,
        };

        let q = quote(u(50_000_000_000_000_000_000), &input, &output).unwrap();
        assert_eq!(q.computed_amount_out, u(100_000_000));
        assert_eq!(q.min_amount_out, u(95_000_000));
    }

    #[test]
    fn test_quote_rounds_down() {
        // 1 wei of input at equal prices: 95% of 1 floors to 0.
        let leg = QuoteLeg {
            decimals: 18,
            price: u(1_000_000_000_000_000_000),
            price_decimals: 18,
        };

        let q = quote(u(1), &leg, &leg).unwrap();
        assert_eq!(q.computed_amount_out, u(1));
        assert_eq!(q.min_amount_out, U256::ZERO);
    }

    #[test]
    fn test_quote_without_output_price() {
        let input = QuoteLeg {
            decimals: 6,
            price: u(100_000_000),
            price_decimals: 8,
        };
        let output = QuoteLeg {
            decimals: 18,
            price: U256::ZERO,
            price_decimals: 18,
        };

        assert!(quote(u(1_000_000), &input, &output).is_none());
    }
}
