//! Bounded-random price sampling inside the bid/ask spread.

use crate::exchange::{CurrentPrice, MarketConstraint, Side, TickerSnapshot};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Samples a candidate trade price for one tick.
///
/// Preference order: a fresh depth-snapshot override when one is supplied,
/// otherwise a uniform draw inside the spread, otherwise (locked or
/// abnormal market) the listener's cached current price, falling back to
/// the last trade. The result is always clamped to the allowed band around
/// `last`.
pub struct PriceSampler {
    cache: CurrentPrice,
}

impl PriceSampler {
    pub fn new(cache: CurrentPrice) -> Self {
        Self { cache }
    }

    pub fn sample(&self, ticker: &TickerSnapshot, side: Side, depth_override: Decimal) -> Decimal {
        let price = if !depth_override.is_zero() {
            depth_override
        } else {
            let spread = ticker.sell - ticker.buy;
            if spread > Decimal::ZERO {
                // Decompose the spread into integer coefficient and scale,
                // draw an integer offset, and reconstruct at the same
                // scale. No float ever enters the arithmetic.
                let offset = rand::thread_rng().gen_range(0..spread.mantissa());
                ticker.buy + Decimal::from_i128_with_scale(offset, spread.scale())
            } else {
                let cached = self.cache.get();
                if cached.is_zero() {
                    ticker.last
                } else {
                    cached
                }
            }
        };

        clamp_to_band(price, side, ticker.last)
    }
}

/// Buy intents may not exceed 1.5x the last trade, sell intents may not
/// fall below 0.5x; violations are clamped to the bound, not rejected.
fn clamp_to_band(price: Decimal, side: Side, last: Decimal) -> Decimal {
    match side {
        Side::Buy => {
            let upper = last * dec!(1.5);
            if price > upper {
                upper
            } else {
                price
            }
        }
        Side::Sell => {
            let lower = last * dec!(0.5);
            if price < lower {
                lower
            } else {
                price
            }
        }
    }
}

/// Order quantity for a sampled price.
///
/// When the notional produced by the minimum size at this price falls below
/// the exchange's minimum amount, take `ceil(min_size / price)` instead so
/// the order clears the floor; markets without a constraint entry trade one
/// unit.
pub fn order_quantity(price: Decimal, constraint: Option<&MarketConstraint>) -> Decimal {
    match constraint {
        Some(constraint) => {
            if constraint.min_amount * price < constraint.min_amount {
                (constraint.min_size / price).ceil()
            } else {
                constraint.min_amount
            }
        }
        None => Decimal::ONE,
    }
}
