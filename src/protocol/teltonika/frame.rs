use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};

use crate::errors::FrameError;
use crate::telemetry::{Protocol, TelemetryRecord};

use super::cursor::Cursor;
use super::io_element::{parse_io_element, promote, CodecWidth};

const CODEC8: u8 = 0x08;
const CODEC8E: u8 = 0x8E;

/// Reads the IMEI handshake packet: `[2 B length][ASCII digits IMEI]`.
///
/// Returns `None` if the bytes don't decode as ASCII digits of the declared
/// length — the caller treats that as a rejected handshake (§4.4 IDENTIFY).
pub fn read_imei(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 2 {
        return None;
    }
    let length = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let digits = bytes.get(2..2 + length)?;
    if digits.is_empty() || !digits.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(String::from_utf8_lossy(digits).into_owned())
}

/// Byte sent in reply to an accepted IMEI handshake (§4.2).
pub const IMEI_ACCEPT: u8 = 0x01;
/// Byte reserved for a rejected IMEI handshake; unused on the accept path.
pub const IMEI_REJECT: u8 = 0x00;

/// A decoded Codec 8/8E frame: zero or more AVL records, plus the header
/// and trailing record counts if they disagreed (§7 Framing, S4) — the
/// caller logs a warning and keeps whatever prefix was decoded rather than
/// discarding the frame.
pub struct Frame {
    pub records: Vec<TelemetryRecord>,
    pub count_mismatch: Option<(u8, u8)>,
}

/// Decodes one Codec 8/8E frame (§4.2) for the given device id.
///
/// On a trailing/header record-count mismatch, the parsed prefix is
/// returned and the caller is expected to log a warning (§7 Framing); this
/// function does not log, it only reports a [`FrameError`] for conditions
/// that invalidate the whole frame (bad preamble, unknown codec, truncated
/// records).
pub fn decode_frame(bytes: &[u8], device_id: &str) -> Result<Frame, FrameError> {
    let mut cursor = Cursor::new(bytes);

    let preamble = cursor.take_u32()?;
    if preamble != 0 {
        return Err(FrameError::InvalidPreamble(preamble));
    }
    let _data_length = cursor.take_u32()?;
    let codec_id = cursor.take_u8()?;
    let width = match codec_id {
        CODEC8 => CodecWidth::Codec8,
        CODEC8E => CodecWidth::Codec8E,
        other => return Err(FrameError::UnsupportedCodec(other)),
    };

    let header_count = cursor.take_u8()?;
    let mut records = Vec::with_capacity(header_count as usize);
    for _ in 0..header_count {
        match decode_record(&mut cursor, width, device_id) {
            Ok(record) => records.push(record),
            Err(_) => break,
        }
    }

    let trailing_count = cursor.take_u8()?;
    let count_mismatch = if trailing_count != records.len() as u8 {
        Some((header_count, trailing_count))
    } else {
        None
    };

    Ok(Frame {
        records,
        count_mismatch,
    })
}

fn decode_record(
    cursor: &mut Cursor,
    width: CodecWidth,
    device_id: &str,
) -> Result<TelemetryRecord, FrameError> {
    let timestamp_ms = cursor.take_u64()?;
    let timestamp = millis_to_utc(timestamp_ms);
    let _priority = cursor.take_u8()?;

    let longitude = cursor.take_i32()? as f64 * 1e-7;
    let latitude = cursor.take_i32()? as f64 * 1e-7;
    let altitude = cursor.take_i16()? as f64;
    let angle = cursor.take_u16()?;
    let satellites = cursor.take_u8()?;
    let speed = cursor.take_u16()? as f64;

    let mut io_elements = BTreeMap::new();
    parse_io_element(cursor, width, &mut io_elements)?;
    let promotions = promote(&io_elements);

    Ok(TelemetryRecord {
        device_id: device_id.to_string(),
        protocol: Protocol::Teltonika,
        message_type: match width {
            CodecWidth::Codec8 => "codec_8".to_string(),
            CodecWidth::Codec8E => "codec_8E".to_string(),
        },
        timestamp,
        latitude,
        longitude,
        altitude: Some(altitude),
        speed: Some(speed),
        heading: TelemetryRecord::normalize_heading(angle),
        satellites: Some(satellites as u32),
        hdop: None,
        odometer: promotions.odometer,
        engine_hours: promotions.engine_hours,
        fuel_level: promotions.fuel_level,
        battery_voltage: promotions.battery_voltage,
        ignition: promotions.ignition,
        moving: promotions.moving,
        io_elements,
        raw_data: None,
    })
}

fn millis_to_utc(millis: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}

/// Builds the 4-byte big-endian ACK equal to the number of records accepted
/// (§4.2 "ACK", P2).
pub fn create_response(record_count: u32) -> [u8; 4] {
    record_count.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imei_handshake_reads_declared_length() {
        let bytes = b"\x00\x0f352094087456789";
        assert_eq!(read_imei(bytes).as_deref(), Some("352094087456789"));
    }

    #[test]
    fn imei_handshake_rejects_non_digits() {
        let bytes = b"\x00\x04abcd";
        assert_eq!(read_imei(bytes), None);
    }

    #[test]
    fn ack_round_trips_record_count() {
        assert_eq!(create_response(1), [0x00, 0x00, 0x00, 0x01]);
        assert_eq!(create_response(0), [0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn unsupported_codec_is_rejected() {
        let mut bytes = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x09];
        bytes.push(0x00);
        let err = decode_frame(&bytes, "imei").unwrap_err();
        assert!(matches!(err, FrameError::UnsupportedCodec(0x09)));
    }

    #[test]
    fn nonzero_preamble_is_rejected() {
        let bytes = vec![0x00, 0x00, 0x00, 0x01];
        let err = decode_frame(&bytes, "imei").unwrap_err();
        assert!(matches!(err, FrameError::InvalidPreamble(1)));
    }
}
