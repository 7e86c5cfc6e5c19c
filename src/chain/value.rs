//! Token amount arithmetic: decimal conversion, fees and swap bounds
//!
//! Configured bounds and fees are expressed with 18 decimals and converted to
//! the source token's decimals before comparison.

use crate::config::{FeeConfig, SwapConfig};

use ethers::types::U256;

/// Decimals used for configured bounds and fees
pub const CONFIG_DECIMALS: u8 = 18;

/// Swap bounds for one multichain token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapLimits {
    pub maximum_swap: U256,
    pub minimum_swap: U256,
    pub big_value_threshold: U256,
}

/// Fee rule for one multichain token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRule {
    pub rate_per_million: u64,
    pub maximum_fee: U256,
    pub minimum_fee: U256,
}

fn parse_amount(field: &str, value: &str) -> Result<U256, String> {
    U256::from_dec_str(value.trim()).map_err(|e| format!("invalid {} '{}': {}", field, value, e))
}

impl TryFrom<&SwapConfig> for SwapLimits {
    type Error = String;

    fn try_from(config: &SwapConfig) -> Result<Self, Self::Error> {
        let limits = Self {
            maximum_swap: parse_amount("maximum_swap", &config.maximum_swap)?,
            minimum_swap: parse_amount("minimum_swap", &config.minimum_swap)?,
            big_value_threshold: parse_amount("big_value_threshold", &config.big_value_threshold)?,
        };
        if limits.minimum_swap > limits.maximum_swap {
            return Err(format!(
                "minimum_swap {} exceeds maximum_swap {}",
                limits.minimum_swap, limits.maximum_swap
            ));
        }
        Ok(limits)
    }
}

impl TryFrom<&FeeConfig> for FeeRule {
    type Error = String;

    fn try_from(config: &FeeConfig) -> Result<Self, Self::Error> {
        let rule = Self {
            rate_per_million: config.swap_fee_rate_per_million,
            maximum_fee: parse_amount("maximum_swap_fee", &config.maximum_swap_fee)?,
            minimum_fee: parse_amount("minimum_swap_fee", &config.minimum_swap_fee)?,
        };
        if rule.rate_per_million >= 1_000_000 {
            return Err(format!("fee rate {} per million too high", rule.rate_per_million));
        }
        if rule.minimum_fee > rule.maximum_fee {
            return Err(format!(
                "minimum_swap_fee {} exceeds maximum_swap_fee {}",
                rule.minimum_fee, rule.maximum_fee
            ));
        }
        Ok(rule)
    }
}

/// Rescale `value` from `from_decimals` to `to_decimals`.
///
/// Scaling down truncates; scaling up saturates at `U256::MAX`.
pub fn convert_token_value(value: U256, from_decimals: u8, to_decimals: u8) -> U256 {
    match from_decimals.cmp(&to_decimals) {
        std::cmp::Ordering::Equal => value,
        std::cmp::Ordering::Greater => {
            value / U256::exp10((from_decimals - to_decimals) as usize)
        }
        std::cmp::Ordering::Less => {
            value.saturating_mul(U256::exp10((to_decimals - from_decimals) as usize))
        }
    }
}

/// Fee charged on `value`, clamped to the configured minimum and maximum
pub fn calc_swap_fee(value: U256, fee: &FeeRule, from_decimals: u8) -> U256 {
    if fee.rate_per_million == 0 {
        return U256::zero();
    }
    let min_fee = convert_token_value(fee.minimum_fee, CONFIG_DECIMALS, from_decimals);
    let max_fee = convert_token_value(fee.maximum_fee, CONFIG_DECIMALS, from_decimals);

    let swap_fee = value.saturating_mul(U256::from(fee.rate_per_million)) / U256::from(1_000_000u64);
    if swap_fee < min_fee {
        min_fee
    } else if swap_fee > max_fee {
        max_fee
    } else {
        swap_fee
    }
}

/// Amount paid out on the destination chain, or zero when the fee eats the value
pub fn calc_swap_value(value: U256, fee: &FeeRule, from_decimals: u8, to_decimals: u8) -> U256 {
    let swap_fee = calc_swap_fee(value, fee, from_decimals);
    if value <= swap_fee {
        return U256::zero();
    }
    convert_token_value(value - swap_fee, from_decimals, to_decimals)
}

/// Whether `value` lies within the swap bounds and leaves something after fees
pub fn check_token_swap_value(
    value: U256,
    limits: &SwapLimits,
    fee: &FeeRule,
    from_decimals: u8,
    to_decimals: u8,
) -> bool {
    if value.is_zero() {
        return false;
    }
    let min_swap = convert_token_value(limits.minimum_swap, CONFIG_DECIMALS, from_decimals);
    let max_swap = convert_token_value(limits.maximum_swap, CONFIG_DECIMALS, from_decimals);
    if value < min_swap || value > max_swap {
        return false;
    }
    !calc_swap_value(value, fee, from_decimals, to_decimals).is_zero()
}

/// Whether `value` needs operator approval; a zero threshold disables the check
pub fn is_big_value_swap(value: U256, limits: &SwapLimits, from_decimals: u8) -> bool {
    if limits.big_value_threshold.is_zero() {
        return false;
    }
    value > convert_token_value(limits.big_value_threshold, CONFIG_DECIMALS, from_decimals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SwapLimits {
        // 1 .. 1_000_000 tokens, big value above 100_000 tokens
        SwapLimits {
            maximum_swap: U256::exp10(24),
            minimum_swap: U256::exp10(18),
            big_value_threshold: U256::exp10(23),
        }
    }

    fn fee() -> FeeRule {
        // 0.1%, clamped to 0.5 .. 100 tokens
        FeeRule {
            rate_per_million: 1000,
            maximum_fee: U256::exp10(20),
            minimum_fee: U256::exp10(17) * 5,
        }
    }

    #[test]
    fn test_convert_roundtrip_over_decimal_range() {
        let amount = U256::from(123_456_789u64);
        for from in 0..=30u8 {
            for to in 0..=30u8 {
                let value = amount * U256::exp10(from as usize);
                let converted = convert_token_value(value, from, to);
                assert_eq!(converted, amount * U256::exp10(to as usize), "{} -> {}", from, to);
                assert_eq!(convert_token_value(converted, to, from), value);
            }
        }
    }

    #[test]
    fn test_convert_truncates_and_saturates() {
        assert_eq!(convert_token_value(U256::from(1999), 3, 0), U256::one());
        assert_eq!(convert_token_value(U256::from(5), 6, 6), U256::from(5));
        assert_eq!(convert_token_value(U256::MAX, 0, 30), U256::MAX);
    }

    #[test]
    fn test_fee_is_clamped() {
        let fee = fee();
        // 0.1% of 10 tokens is below the minimum fee
        assert_eq!(calc_swap_fee(U256::exp10(7), &fee, 6), U256::from(500_000u64));
        // 0.1% of 1000 tokens
        assert_eq!(calc_swap_fee(U256::exp10(9), &fee, 6), U256::exp10(6));
        // 0.1% of 1_000_000 tokens is above the maximum fee
        assert_eq!(calc_swap_fee(U256::exp10(12), &fee, 6), U256::exp10(8));
    }

    #[test]
    fn test_swap_value_converts_after_fee() {
        // 1000 tokens with 6 decimals to 18 decimals, minus 1 token fee
        let value = calc_swap_value(U256::exp10(9), &fee(), 6, 18);
        assert_eq!(value, U256::exp10(18) * 999);
        assert!(calc_swap_value(U256::from(400_000u64), &fee(), 6, 18).is_zero());
    }

    #[test]
    fn test_check_token_swap_value_bounds() {
        let (limits, fee) = (limits(), fee());
        assert!(!check_token_swap_value(U256::zero(), &limits, &fee, 6, 18));
        assert!(!check_token_swap_value(U256::from(999_999u64), &limits, &fee, 6, 18));
        assert!(check_token_swap_value(U256::exp10(6), &limits, &fee, 6, 18));
        assert!(check_token_swap_value(U256::exp10(12), &limits, &fee, 6, 18));
        assert!(!check_token_swap_value(U256::exp10(12) + 1, &limits, &fee, 6, 18));
    }

    #[test]
    fn test_big_value() {
        let limits = limits();
        assert!(!is_big_value_swap(U256::exp10(11), &limits, 6));
        assert!(is_big_value_swap(U256::exp10(11) + 1, &limits, 6));

        let disabled = SwapLimits {
            big_value_threshold: U256::zero(),
            ..limits
        };
        assert!(!is_big_value_swap(U256::MAX, &disabled, 6));
    }

    #[test]
    fn test_limits_from_config() {
        let config = SwapConfig {
            maximum_swap: "100".into(),
            minimum_swap: "200".into(),
            big_value_threshold: "0".into(),
        };
        assert!(SwapLimits::try_from(&config).is_err());

        let config = FeeConfig {
            swap_fee_rate_per_million: 10,
            maximum_swap_fee: "x".into(),
            minimum_swap_fee: "0".into(),
        };
        assert!(FeeRule::try_from(&config).is_err());
    }
}
