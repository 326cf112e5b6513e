//! Stroop amounts rendered as fixed 7-decimal strings.

pub const STROOPS_PER_UNIT: i64 = 10_000_000;

pub fn format(stroops: i64) -> String {
    let sign = if stroops < 0 { "-" } else { "" };
    let abs = stroops.unsigned_abs();
    let unit = STROOPS_PER_UNIT as u64;
    format!("{}{}.{:07}", sign, abs / unit, abs % unit)
}

/// Same as `format` for sums that can exceed `i64` (asset supply).
pub fn format_wide(stroops: i128) -> String {
    let sign = if stroops < 0 { "-" } else { "" };
    let abs = stroops.unsigned_abs();
    let unit = STROOPS_PER_UNIT as u128;
    format!("{}{}.{:07}", sign, abs / unit, abs % unit)
}
