use alloy::primitives::U256;
use anyhow::Error;

/// Amount in base units. Used for both consensus quantities and paratime base units.
pub type Quantity = U256;

/// Parses a decimal token amount such as `"1.5"` into base units with the given number of
/// decimals.
pub fn parse_denominated(amount: &str, decimals: u8) -> Result<Quantity, Error> {
    let amount = amount.trim();
    if amount.is_empty() {
        anyhow::bail!("amount is empty");
    }

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        anyhow::bail!("amount has no digits: '{amount}'");
    }
    if fraction.len() > usize::from(decimals) {
        anyhow::bail!("amount '{amount}' has more than {decimals} decimal places");
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        anyhow::bail!("amount '{amount}' is not a decimal number");
    }

    let padding = usize::from(decimals).saturating_sub(fraction.len());
    let digits = format!("{whole}{fraction}{}", "0".repeat(padding));
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(digits, 10).map_err(|e| anyhow::anyhow!("amount '{amount}' overflows: {e}"))
}

/// Converts base units into a float token value for gauges.
pub fn to_f64(amount: Quantity, decimals: u8) -> f64 {
    let value = amount.to_string().parse::<f64>().unwrap_or(0f64);
    value / 10f64.powi(i32::from(decimals))
}

/// Serializes quantities as decimal strings, the way the node gateway expects them.
pub mod serde_decimal {
    use super::Quantity;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Quantity, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Quantity, D::Error> {
        let value = String::deserialize(deserializer)?;
        Quantity::from_str_radix(&value, 10).map_err(de::Error::custom)
    }
}
