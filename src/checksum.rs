//! Order book checksum validation.
//!
//! The exchange's checksum covers the top 10 levels of each side: format
//! each level's price then quantity to 8 decimal places, strip the decimal
//! point, strip leading zeros (an all-zero result becomes `"0"`), concatenate
//! bids-then-asks best-to-worst, and CRC-32 the resulting ASCII string.

use crate::types::PriceLevel;

const CHECKSUM_DEPTH: usize = 10;

fn format_component(value: f64) -> String {
    let formatted = format!("{:.8}", value);
    let stripped: String = formatted.chars().filter(|&c| c != '.').collect();
    let trimmed = stripped.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Builds the canonical checksum string for the given best-to-worst-sorted
/// bid and ask levels (only the top [`CHECKSUM_DEPTH`] of each are used).
pub fn checksum_string(bids: &[PriceLevel], asks: &[PriceLevel]) -> String {
    let mut out = String::new();
    for level in bids.iter().take(CHECKSUM_DEPTH) {
        out.push_str(&format_component(level.price));
        out.push_str(&format_component(level.quantity));
    }
    for level in asks.iter().take(CHECKSUM_DEPTH) {
        out.push_str(&format_component(level.price));
        out.push_str(&format_component(level.quantity));
    }
    out
}

/// CRC-32 (IEEE) of [`checksum_string`]'s output, for comparison against the
/// exchange-supplied checksum on a book snapshot/update message.
pub fn compute_checksum(bids: &[PriceLevel], asks: &[PriceLevel]) -> u32 {
    let s = checksum_string(bids, asks);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(s.as_bytes());
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: f64, quantity: f64) -> PriceLevel {
        PriceLevel { price, quantity }
    }

    #[test]
    fn golden_vector_two_levels_each_side() {
        let bids = vec![level(50000.0, 1.5), level(49999.0, 2.0)];
        let asks = vec![level(50001.0, 1.0), level(50002.0, 3.0)];
        assert_eq!(compute_checksum(&bids, &asks), 887781321);
    }

    #[test]
    fn golden_vector_single_level_each_side() {
        let bids = vec![level(50000.0, 1.0)];
        let asks = vec![level(50001.0, 1.0)];
        assert_eq!(compute_checksum(&bids, &asks), 3060493471);
    }

    #[test]
    fn golden_vector_empty_book() {
        assert_eq!(compute_checksum(&[], &[]), 0);
    }

    #[test]
    fn only_top_ten_levels_count() {
        let bids: Vec<PriceLevel> = (0..20).map(|i| level(100.0 - i as f64, 1.0)).collect();
        let asks: Vec<PriceLevel> = (0..20).map(|i| level(101.0 + i as f64, 1.0)).collect();
        let truncated_bids = &bids[..10];
        let truncated_asks = &asks[..10];
        assert_eq!(
            compute_checksum(&bids, &asks),
            compute_checksum(truncated_bids, truncated_asks)
        );
    }

    #[test]
    fn format_component_strips_point_and_leading_zeros() {
        assert_eq!(format_component(0.0), "0");
        assert_eq!(format_component(1.5), "150000000");
        assert_eq!(format_component(50000.0), "5000000000000");
    }
}
