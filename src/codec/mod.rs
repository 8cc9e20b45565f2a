//! Fixed-point codec between ledger integers and human-readable strings.
//!
//! All scaling is done on decimal digit strings and integers; no value ever
//! passes through a floating-point type. For every raw value `r` and decimals
//! `d`, `from_display(&to_display(r, d, &keep_zeros), d) == r`.

use crate::domain::{BasisPointRate, RateError};
use chrono::TimeZone;
use ethers::types::{I256, U256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed amount: {0}")]
    MalformedAmount(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
}

impl From<RateError> for CodecError {
    fn from(err: RateError) -> Self {
        CodecError::OutOfRange(err.to_string())
    }
}

/// Where a unit symbol is attached when rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStyle {
    Prefix(String),
    Suffix(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayOptions {
    /// Keep all `decimals` fractional digits instead of trimming zeros.
    pub keep_trailing_zeros: bool,
    /// Insert `,` every three digits of the integer part.
    pub thousands_separator: bool,
    /// Unit symbol to attach, if any.
    pub units: Option<UnitStyle>,
}

impl DisplayOptions {
    pub fn exact() -> Self {
        DisplayOptions {
            keep_trailing_zeros: true,
            ..Default::default()
        }
    }

    pub fn grouped() -> Self {
        DisplayOptions {
            thousands_separator: true,
            ..Default::default()
        }
    }

    /// `$1,234.5`
    pub fn currency_units() -> Self {
        DisplayOptions {
            thousands_separator: true,
            units: Some(UnitStyle::Prefix("$".to_string())),
            ..Default::default()
        }
    }

    /// `1,234.5 ACME`
    pub fn share_units(symbol: &str) -> Self {
        DisplayOptions {
            thousands_separator: true,
            units: Some(UnitStyle::Suffix(format!(" {}", symbol))),
            ..Default::default()
        }
    }
}

/// Splits the decimal digits of a value into integer and fractional parts.
fn split_digits(digits: &str, decimals: usize) -> (String, String) {
    if decimals == 0 {
        return (digits.to_string(), String::new());
    }
    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals + 1 - digits.len()), digits)
    } else {
        digits.to_string()
    };
    let split = padded.len() - decimals;
    (padded[..split].to_string(), padded[split..].to_string())
}

fn group_thousands(int_part: &str) -> String {
    let len = int_part.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn render_magnitude(digits: &str, decimals: u8, opts: &DisplayOptions) -> String {
    let (int_part, frac_part) = split_digits(digits, decimals as usize);
    let frac = if opts.keep_trailing_zeros {
        frac_part.as_str()
    } else {
        frac_part.trim_end_matches('0')
    };
    let int_rendered = if opts.thousands_separator {
        group_thousands(&int_part)
    } else {
        int_part
    };
    if frac.is_empty() {
        int_rendered
    } else {
        format!("{}.{}", int_rendered, frac)
    }
}

fn attach_units(body: String, sign: &str, opts: &DisplayOptions) -> String {
    match &opts.units {
        None => format!("{}{}", sign, body),
        Some(UnitStyle::Prefix(p)) => format!("{}{}{}", sign, p, body),
        Some(UnitStyle::Suffix(s)) => format!("{}{}{}", sign, body, s),
    }
}

/// Renders `raw / 10^decimals` as a decimal string.
pub fn to_display(raw: U256, decimals: u8, opts: &DisplayOptions) -> String {
    let body = render_magnitude(&raw.to_string(), decimals, opts);
    attach_units(body, "", opts)
}

/// Renders a signed minor-unit value with the same rules as [`to_display`].
pub fn format_signed(value: I256, decimals: u8, opts: &DisplayOptions) -> String {
    let magnitude = value.unsigned_abs();
    let body = render_magnitude(&magnitude.to_string(), decimals, opts);
    let sign = if value.is_negative() { "-" } else { "" };
    attach_units(body, sign, opts)
}

/// Removes correctly placed thousands separators from an integer part.
fn strip_grouping(int_part: &str, original: &str) -> Result<String, CodecError> {
    let malformed = || CodecError::MalformedAmount(original.to_string());
    if int_part.is_empty() {
        return Err(malformed());
    }
    if !int_part.contains(',') {
        if !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        return Ok(int_part.to_string());
    }
    let mut out = String::with_capacity(int_part.len());
    for (i, group) in int_part.split(',').enumerate() {
        let valid_len = if i == 0 {
            (1..=3).contains(&group.len())
        } else {
            group.len() == 3
        };
        if !valid_len || !group.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        out.push_str(group);
    }
    Ok(out)
}

/// Parses a non-negative decimal numeral into minor units.
///
/// Rejects signs, exponents and more fractional digits than `decimals`; never
/// truncates.
pub fn from_display(text: &str, decimals: u8) -> Result<U256, CodecError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CodecError::MalformedAmount("empty amount".to_string()));
    }

    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (trimmed, None),
    };
    let int_digits = strip_grouping(int_part, trimmed)?;

    let frac = frac_part.unwrap_or("");
    if frac_part.is_some() && frac.is_empty() {
        return Err(CodecError::MalformedAmount(trimmed.to_string()));
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::MalformedAmount(trimmed.to_string()));
    }
    if frac.len() > decimals as usize {
        return Err(CodecError::MalformedAmount(format!(
            "{} has more than {} fractional digits",
            trimmed, decimals
        )));
    }

    let mut combined = int_digits;
    combined.push_str(frac);
    combined.push_str(&"0".repeat(decimals as usize - frac.len()));

    U256::from_dec_str(&combined)
        .map_err(|_| CodecError::MalformedAmount(format!("{} does not fit in 256 bits", trimmed)))
}

/// Like [`from_display`] but rejects zero.
pub fn positive_from_display(text: &str, decimals: u8, what: &str) -> Result<U256, CodecError> {
    let raw = from_display(text, decimals)?;
    if raw.is_zero() {
        return Err(CodecError::OutOfRange(format!("{} must be greater than zero", what)));
    }
    Ok(raw)
}

pub(crate) fn format_bps(bps: u128) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}

/// `bps / 100` with exactly two fractional digits and a `%` suffix.
pub fn format_rate(bps: i128) -> Result<String, CodecError> {
    if bps < 0 {
        return Err(CodecError::OutOfRange(format!(
            "rate {} bps is negative",
            bps
        )));
    }
    Ok(format_bps(bps.unsigned_abs()))
}

/// Parses a rate given as a percentage (`"2.5"`, `"2.50%"`) or in basis
/// points (`"250bps"`), enforcing `ceiling`.
pub fn parse_rate(text: &str, ceiling: u16) -> Result<BasisPointRate, CodecError> {
    let trimmed = text.trim();
    let bps = if let Some(bps_part) = trimmed.strip_suffix("bps") {
        from_display(bps_part.trim(), 0)?
    } else {
        let pct_part = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
        from_display(pct_part, 2)?
    };
    if bps > U256::from(BasisPointRate::MAX) {
        return Err(CodecError::OutOfRange(format!("rate {} exceeds 100%", trimmed)));
    }
    Ok(BasisPointRate::with_ceiling(bps.as_u64(), ceiling)?)
}

/// Locale-independent UTC rendering, or `N/A` for the unset sentinel.
pub fn format_timestamp(seconds: u64) -> String {
    if seconds == 0 {
        return "N/A".to_string();
    }
    let Ok(secs) = i64::try_from(seconds) else {
        return "N/A".to_string();
    };
    match chrono::Utc.timestamp_opt(secs, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "N/A".to_string(),
    }
}

fn unit(count: u64, singular: &str) -> String {
    if count == 1 {
        format!("1 {}", singular)
    } else {
        format!("{} {}s", count, singular)
    }
}

/// `90061 → "1 day, 1 hour, 1 minute, 1 second"`; zero components are omitted.
pub fn format_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "0 seconds".to_string();
    }
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;

    [(days, "day"), (hours, "hour"), (minutes, "minute"), (secs, "second")]
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, name)| unit(*n, name))
        .collect::<Vec<_>>()
        .join(", ")
}
