//! Display formatting for satoshi amounts

/// Unit an amount is rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Satoshis with thousands separators
    Sat,
    /// Bitcoin rounded to four decimals
    Btc,
    /// Parts per million, used for fee rates
    Ppm,
}

const SATS_PER_BTC: f64 = 100_000_000.0;

/// Render an amount of satoshis (or ppm) for display
pub fn format_amount(amount: u64, unit: Unit) -> String {
    match unit {
        Unit::Sat => format!("{} sats", group_thousands(amount)),
        Unit::Ppm => format!("{} ppm", group_thousands(amount)),
        Unit::Btc => {
            if amount == 0 {
                return "₿0.0".to_string();
            }
            let btc = amount as f64 / SATS_PER_BTC;
            let rounded = (btc * 10_000.0).round() / 10_000.0;
            format!("₿{}", rounded)
        }
    }
}

/// Compact form used in tight spaces: `1.5k`, `0.25m`
pub fn short_amount(amount: u64) -> String {
    if amount >= 100_000 {
        format!("{}m", amount as f64 / 1_000_000.0)
    } else if amount >= 1_000 {
        format!("{}k", amount as f64 / 1_000.0)
    } else {
        amount.to_string()
    }
}

fn group_thousands(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
