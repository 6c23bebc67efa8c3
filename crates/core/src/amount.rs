use rust_decimal::Decimal;
use std::str::FromStr;

/// Normalise a currency amount as printed on a receipt (`1,200.00`, `99`,
/// `4 500.5`) into a plain decimal string. Thousands separators and spaces
/// are dropped; the printed scale is kept, so `1,200.00` becomes `1200.00`.
pub fn normalize_amount(raw: &str) -> Option<String> {
    let clean: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if clean.is_empty() {
        return None;
    }
    let dec = Decimal::from_str(&clean).ok()?;
    if dec.is_sign_negative() {
        return None;
    }
    Some(dec.to_string())
}
