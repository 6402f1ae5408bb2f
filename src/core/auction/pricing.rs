use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Auction rule applied during winner resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum AuctionType {
    #[default]
    FirstPrice,
    SecondPrice,
}

/// Sort bid prices descending, stable so equal prices keep their
/// enumeration order
pub fn sort_prices_desc(prices: &mut [f64]) {
    prices.sort_by(|a, b| b.total_cmp(a));
}

/// Resolve the winner's clearing price for one impression.
///
/// `prices` must be sorted descending, the winner is the first
/// entry.
///
/// # Behavior
/// * first price - the winner pays its own bid
/// * second price - the winner pays the runner-up price plus the
///   increment, clamped to at least the floor. A lone bid clears
///   at the floor, or at its own price when no floor is set
pub fn clearing_price(
    rule: AuctionType,
    prices: &[f64],
    floor: f64,
    price_increment: f64,
) -> f64 {
    let top = prices[0];

    match rule {
        AuctionType::FirstPrice => top,
        AuctionType::SecondPrice => {
            if prices.len() >= 2 {
                (prices[1] + price_increment).max(floor)
            } else if floor > 0.0 {
                floor
            } else {
                top
            }
        }
    }
}
