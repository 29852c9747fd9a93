//! Display formatting for decoded event arguments and fixed-point values.
//!
//! Rounding happens here and only here. Anything that compares or divides
//! amounts uses the raw integers or `fixed18_to_f64`.

use alloy::primitives::{Address, B256, U256};

/// Decimal places shown for 18-decimal amounts.
pub const DISPLAY_DECIMALS: u32 = 4;

fn scale_18() -> U256 {
    U256::from(10u64).pow(U256::from(18u64))
}

/// Render an 18-decimal amount rounded half-up to `DISPLAY_DECIMALS`,
/// trailing zeros trimmed, followed by the unit symbol.
pub fn format_amount(value: U256, symbol: &str) -> String {
    let step = U256::from(10u64).pow(U256::from(18 - DISPLAY_DECIMALS));
    let display_scale = U256::from(10u64).pow(U256::from(DISPLAY_DECIMALS));

    // round half-up at the display precision
    let rounded = value.saturating_add(step / U256::from(2u64)) / step;
    let whole = rounded / display_scale;
    let frac = rounded % display_scale;

    let mut out = whole.to_string();
    if !frac.is_zero() {
        let digits = format!("{:0>width$}", frac.to_string(), width = DISPLAY_DECIMALS as usize);
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    if !symbol.is_empty() {
        out.push(' ');
        out.push_str(symbol);
    }
    out
}

/// Unrounded conversion of an 18-decimal integer to f64.
pub fn fixed18_to_f64(value: U256) -> f64 {
    let scale = scale_18();
    let whole = value / scale;
    let frac = value % scale;
    let whole = match u128::try_from(whole) {
        Ok(w) => w as f64,
        Err(_) => return f64::INFINITY,
    };
    // frac < 10^18 always fits
    let frac = u128::try_from(frac).unwrap_or(0) as f64;
    whole + frac / 1e18
}

/// `0xC0AE…c5d9`
pub fn short_address(address: &Address) -> String {
    let full = address.to_string();
    format!("{}…{}", &full[..6], &full[full.len() - 4..])
}

/// `0x12345678…abcdef`
pub fn short_tx(hash: &str) -> String {
    if hash.len() <= 16 {
        return hash.to_string();
    }
    format!("{}…{}", &hash[..10], &hash[hash.len() - 6..])
}

/// Full lowercase hex form used as the persisted tx identity.
pub fn tx_hex(hash: &B256) -> String {
    format!("{hash:#x}")
}
