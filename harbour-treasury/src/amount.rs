use harbour_dftx::COIN;

use crate::{Error, Result};

/// Parses a decimal coin amount ("20000.00000000") into satoshis without
/// going through floating point.
pub fn parse_decimal_amount(raw: &str) -> Result<i64> {
    let (negative, raw) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (whole, frac) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(Error::Conflict(format!("unparseable amount: {raw:?}")));
    }
    if frac.len() > 8 || !whole.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Conflict(format!("unparseable amount: {raw:?}")));
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| Error::Conflict(format!("unparseable amount: {raw:?}")))?
    };
    let mut frac_sats: i64 = 0;
    if !frac.is_empty() {
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::Conflict(format!("unparseable amount: {raw:?}")));
        }
        let padded = format!("{frac:0<8}");
        frac_sats = padded
            .parse()
            .map_err(|_| Error::Conflict(format!("unparseable amount: {raw:?}")))?;
    }

    let sats = whole
        .checked_mul(COIN)
        .and_then(|v| v.checked_add(frac_sats))
        .ok_or_else(|| Error::Conflict(format!("amount overflows: {raw:?}")))?;
    Ok(if negative { -sats } else { sats })
}

pub fn format_sats(sats: i64) -> String {
    let sign = if sats < 0 { "-" } else { "" };
    let abs = sats.unsigned_abs();
    format!("{sign}{}.{:08}", abs / COIN as u64, abs % COIN as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typical_amounts() {
        assert_eq!(parse_decimal_amount("20000.00000000").unwrap(), 20_000 * COIN);
        assert_eq!(parse_decimal_amount("0.00000001").unwrap(), 1);
        assert_eq!(parse_decimal_amount("1.5").unwrap(), 150_000_000);
        assert_eq!(parse_decimal_amount("42").unwrap(), 42 * COIN);
        assert_eq!(parse_decimal_amount("-0.5").unwrap(), -50_000_000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_decimal_amount("").is_err());
        assert!(parse_decimal_amount("1.123456789").is_err());
        assert!(parse_decimal_amount("12a.0").is_err());
    }

    #[test]
    fn round_trips_via_format() {
        for sats in [0i64, 1, COIN, 20_010 * COIN, -3 * COIN / 2] {
            assert_eq!(parse_decimal_amount(&format_sats(sats)).unwrap(), sats);
        }
    }
}
