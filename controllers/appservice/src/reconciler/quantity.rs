//! Resource quantity comparison.
//!
//! The API server stores quantities in canonical form ("0.5" comes back as
//! "500m", "1.5Gi" as "1536Mi"), so owned resources are compared by value.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Nano units per whole unit; the smallest scale a quantity can carry.
const NANO_EXP: i32 = 9;

/// A quantity as compared by the Deployment comparator.
///
/// Values that do not parse fall back to their raw text, so a malformed
/// quantity still compares equal to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amount<'a> {
    Nanos(i128),
    Raw(&'a str),
}

impl<'a> Amount<'a> {
    pub fn of(q: &'a Quantity) -> Self {
        match nanos(&q.0) {
            Some(n) => Amount::Nanos(n),
            None => Amount::Raw(&q.0),
        }
    }
}

/// Multiplier and power of ten for a quantity suffix.
fn suffix_scale(suffix: &str) -> Option<(i128, i32)> {
    let scale = match suffix {
        "" => (1, 0),
        "n" => (1, -9),
        "u" => (1, -6),
        "m" => (1, -3),
        "k" => (1, 3),
        "M" => (1, 6),
        "G" => (1, 9),
        "T" => (1, 12),
        "P" => (1, 15),
        "E" => (1, 18),
        "Ki" => (1 << 10, 0),
        "Mi" => (1 << 20, 0),
        "Gi" => (1 << 30, 0),
        "Ti" => (1 << 40, 0),
        "Pi" => (1 << 50, 0),
        "Ei" => (1 << 60, 0),
        _ => {
            let exp = suffix.strip_prefix(['e', 'E'])?;
            (1, exp.parse::<i32>().ok()?)
        }
    };
    Some(scale)
}

/// Value of `raw` in nano units, rounded up like the API server does.
pub fn nanos(raw: &str) -> Option<i128> {
    let s = raw.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
        return None;
    }

    let mantissa: i128 = format!("{whole}{frac}").parse().ok()?;
    let (multiplier, exp10) = suffix_scale(suffix)?;
    let exp = exp10 + NANO_EXP - i32::try_from(frac.len()).ok()?;

    let scaled = mantissa.checked_mul(multiplier)?;
    let value = if exp >= 0 {
        scaled.checked_mul(10i128.checked_pow(exp.unsigned_abs())?)?
    } else {
        let divisor = 10i128.checked_pow(exp.unsigned_abs())?;
        (scaled + divisor - 1) / divisor
    };
    Some(if negative { -value } else { value })
}
