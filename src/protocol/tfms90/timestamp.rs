use chrono::{DateTime, TimeZone, Utc};

use crate::errors::Tfms90Error;

/// TFMS90 timestamps are 8 hex digits, seconds since this epoch (§4.3).
fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
}

/// Parses an 8-hex-digit TFMS90 timestamp field (P6).
pub fn hex_to_ts(hex: &str) -> Result<DateTime<Utc>, Tfms90Error> {
    let seconds = u32::from_str_radix(hex, 16).map_err(|_| Tfms90Error::BadField {
        field: "timestamp",
        expected: "8 hex digits",
        value: hex.to_string(),
    })?;
    Ok(epoch() + chrono::Duration::seconds(seconds as i64))
}

/// Encodes a UTC instant back to the TFMS90 hex timestamp form.
pub fn ts_to_hex(ts: DateTime<Utc>) -> String {
    let seconds = (ts - epoch()).num_seconds().max(0) as u32;
    format!("{seconds:08X}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hex_is_epoch_start() {
        let ts = hex_to_ts("00000000").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn consecutive_hex_values_are_one_second_apart() {
        let a = hex_to_ts("00000001").unwrap();
        let b = hex_to_ts("00000002").unwrap();
        assert_eq!((b - a).num_seconds(), 1);
    }

    #[test]
    fn round_trips_through_hex() {
        let ts = hex_to_ts("2A3B4C5D").unwrap();
        assert_eq!(ts_to_hex(ts), "2A3B4C5D");
    }

    #[test]
    fn rejects_non_hex_field() {
        assert!(hex_to_ts("zzzzzzzz").is_err());
    }
}
