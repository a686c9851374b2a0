use chrono::Utc;

use crate::errors::Tfms90Error;
use crate::telemetry::{IoValue, Protocol, TelemetryRecord};

use super::timestamp::hex_to_ts;

/// A TFMS90 frame split on `,` with its leading `$` and trailing `#?`/`#`
/// terminator still present as ordinary fields — the positional indices in
/// `spec.md` §4.3 are defined against exactly this split, terminator
/// included.
pub struct ParsedFrame {
    pub token: String,
    pub msg_type: String,
    /// Raw field 3: `"000"` before a short id has been assigned, the
    /// decimal short id afterward.
    pub short_device_id_field: String,
    fields: Vec<String>,
}

impl ParsedFrame {
    fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

/// Splits and validates the outer framing of a TFMS90 message (§4.3, §6).
pub fn split_frame(text: &str) -> Result<ParsedFrame, Tfms90Error> {
    if !text.is_ascii() {
        return Err(Tfms90Error::NotAscii);
    }
    let trimmed = text.trim_end_matches(['\r', '\n']);
    let fields: Vec<String> = trimmed.split(',').map(str::to_string).collect();

    let msg_type = fields
        .get(2)
        .filter(|s| !s.is_empty())
        .ok_or(Tfms90Error::MissingMessageType)?
        .clone();
    let token = fields.get(1).cloned().unwrap_or_default();
    let short_device_id_field = fields.get(3).cloned().unwrap_or_default();

    Ok(ParsedFrame {
        token,
        msg_type,
        short_device_id_field,
        fields,
    })
}

fn required_len(msg_type: &str) -> usize {
    match msg_type {
        "LG" => 7,
        "TD" | "TDA" => 18,
        "TS" => 10,
        "TE" => 19,
        "HA2" | "HB2" | "HC2" => 8,
        "FLF" | "FLD" => 11,
        "HB" | "OS3" | "STAT" => 4,
        _ => 4,
    }
}

fn parse_f64(frame: &ParsedFrame, index: usize, name: &'static str) -> Result<f64, Tfms90Error> {
    let raw = frame.field(index).unwrap_or("");
    raw.parse().map_err(|_| Tfms90Error::BadField {
        field: name,
        expected: "decimal number",
        value: raw.to_string(),
    })
}

fn parse_u16(frame: &ParsedFrame, index: usize, name: &'static str) -> Result<u16, Tfms90Error> {
    let raw = frame.field(index).unwrap_or("");
    raw.parse().map_err(|_| Tfms90Error::BadField {
        field: name,
        expected: "integer",
        value: raw.to_string(),
    })
}

fn parse_ts(frame: &ParsedFrame, index: usize) -> Result<chrono::DateTime<Utc>, Tfms90Error> {
    hex_to_ts(frame.field(index).unwrap_or(""))
}

/// Registration payload carried by `LG` (§4.3 login handshake). Handled
/// separately from [`build_record`] because it drives a registry
/// side-effect rather than producing a telemetry row (§9 Open Question c).
pub struct LoginPayload {
    pub imei: String,
    pub firmware_version: String,
    pub sim_iccid: String,
}

pub fn parse_login(frame: &ParsedFrame) -> Result<LoginPayload, Tfms90Error> {
    if frame.fields.len() < required_len("LG") {
        return Err(Tfms90Error::TooFewFields {
            msg_type: "LG".to_string(),
            needed: required_len("LG"),
            got: frame.fields.len(),
        });
    }
    Ok(LoginPayload {
        imei: frame.field(4).unwrap_or("").to_string(),
        firmware_version: frame.field(5).unwrap_or("").to_string(),
        sim_iccid: frame.field(6).unwrap_or("").to_string(),
    })
}

/// Builds the telemetry record for a non-`LG` message type (§4.3 table).
///
/// Returns `Err(UnknownMessageType)` for a `msg_type` outside the closed
/// set the sniffer already validated, which should not occur in practice
/// since the sniffer and handler both consult the same set.
pub fn build_record(
    frame: &ParsedFrame,
    device_id: &str,
) -> Result<TelemetryRecord, Tfms90Error> {
    let msg_type = frame.msg_type.as_str();
    let needed = required_len(msg_type);
    if frame.fields.len() < needed && !matches!(msg_type, "HB" | "OS3" | "STAT") {
        return Err(Tfms90Error::TooFewFields {
            msg_type: msg_type.to_string(),
            needed,
            got: frame.fields.len(),
        });
    }

    let mut record = blank_record(device_id, msg_type);

    match msg_type {
        "TD" | "TDA" => {
            record.timestamp = parse_ts(frame, 5)?;
            record.latitude = parse_f64(frame, 6, "latitude")?;
            record.longitude = parse_f64(frame, 7, "longitude")?;
            record.speed = Some(parse_f64(frame, 8, "speed")?);
            record.heading = TelemetryRecord::normalize_heading(parse_u16(frame, 9, "heading")?);
            record.satellites = Some(parse_u16(frame, 10, "satellites")? as u32);
            record.hdop = Some(parse_f64(frame, 11, "hdop")?);
            record.fuel_level = Some(parse_f64(frame, 12, "fuel_level")?);
            record.odometer = Some(parse_f64(frame, 13, "odometer")? / 1000.0);
            let status_flags = frame.field(14).unwrap_or("0");
            let flags = u32::from_str_radix(status_flags, 16).unwrap_or(0);
            record.ignition = Some(flags & 0x1 != 0);
            if let Ok(battery) = parse_f64(frame, 17, "battery_voltage") {
                record.battery_voltage = Some(battery);
            }
        }
        "TS" => {
            record.timestamp = parse_ts(frame, 5)?;
            record.fuel_level = Some(parse_f64(frame, 6, "fuel_level")?);
            record.latitude = parse_f64(frame, 7, "latitude")?;
            record.longitude = parse_f64(frame, 8, "longitude")?;
            record.heading = TelemetryRecord::normalize_heading(parse_u16(frame, 9, "heading")?);
            record
                .io_elements
                .insert("event_type".to_string(), IoValue::Text("trip_start".to_string()));
        }
        "TE" => {
            let start_ts = parse_ts(frame, 5)?;
            let end_ts = parse_ts(frame, 6)?;
            let duration_s = parse_u16(frame, 7, "duration_seconds")?;
            let start_fuel = parse_f64(frame, 9, "start_fuel")?;
            let end_fuel = parse_f64(frame, 10, "end_fuel")?;
            let distance_km = parse_f64(frame, 11, "distance_km")?;
            let start_lat = parse_f64(frame, 14, "start_latitude")?;
            let start_lon = parse_f64(frame, 15, "start_longitude")?;
            let end_lat = parse_f64(frame, 16, "end_latitude")?;
            let end_lon = parse_f64(frame, 17, "end_longitude")?;
            let heading = parse_u16(frame, 18, "heading")?;

            record.timestamp = end_ts;
            record.latitude = end_lat;
            record.longitude = end_lon;
            record.heading = TelemetryRecord::normalize_heading(heading);
            record.fuel_level = Some(end_fuel);

            record
                .io_elements
                .insert("event_type".to_string(), IoValue::Text("trip_end".to_string()));
            record
                .io_elements
                .insert("start_timestamp".to_string(), IoValue::Text(start_ts.to_rfc3339()));
            record
                .io_elements
                .insert("end_timestamp".to_string(), IoValue::Text(end_ts.to_rfc3339()));
            record
                .io_elements
                .insert("duration_seconds".to_string(), IoValue::Integer(duration_s as i64));
            record
                .io_elements
                .insert("start_fuel".to_string(), IoValue::Float(start_fuel));
            record
                .io_elements
                .insert("end_fuel".to_string(), IoValue::Float(end_fuel));
            record
                .io_elements
                .insert("distance_km".to_string(), IoValue::Float(distance_km));
            record
                .io_elements
                .insert("start_latitude".to_string(), IoValue::Float(start_lat));
            record
                .io_elements
                .insert("start_longitude".to_string(), IoValue::Float(start_lon));
        }
        "HA2" | "HB2" | "HC2" => {
            record.timestamp = parse_ts(frame, 5)?;
            record.latitude = parse_f64(frame, 6, "latitude")?;
            record.longitude = parse_f64(frame, 7, "longitude")?;
            let event_type = match msg_type {
                "HA2" => "harsh_accel",
                "HB2" => "harsh_brake",
                _ => "harsh_corner",
            };
            record
                .io_elements
                .insert("event_type".to_string(), IoValue::Text(event_type.to_string()));
        }
        "FLF" | "FLD" => {
            record.timestamp = parse_ts(frame, 5)?;
            let before = parse_f64(frame, 6, "fuel_before")?;
            let after = parse_f64(frame, 7, "fuel_after")?;
            let amount = parse_f64(frame, 8, "fuel_amount")?;
            record.latitude = parse_f64(frame, 9, "latitude")?;
            record.longitude = parse_f64(frame, 10, "longitude")?;
            record.fuel_level = Some(after);
            let event_type = if msg_type == "FLF" { "fuel_fill" } else { "fuel_drain" };
            record
                .io_elements
                .insert("event_type".to_string(), IoValue::Text(event_type.to_string()));
            record.io_elements.insert("fuel_before".to_string(), IoValue::Float(before));
            record.io_elements.insert("fuel_after".to_string(), IoValue::Float(after));
            record.io_elements.insert("fuel_amount".to_string(), IoValue::Float(amount));
        }
        "HB" | "OS3" | "STAT" => {
            record.timestamp = frame
                .field(5)
                .filter(|s| !s.is_empty())
                .and_then(|hex| hex_to_ts(hex).ok())
                .unwrap_or_else(Utc::now);
        }
        other => {
            return Err(Tfms90Error::UnknownMessageType(other.to_string()));
        }
    }

    Ok(record)
}

fn blank_record(device_id: &str, msg_type: &str) -> TelemetryRecord {
    TelemetryRecord {
        device_id: device_id.to_string(),
        protocol: Protocol::Tfms90,
        message_type: msg_type.to_string(),
        timestamp: Utc::now(),
        latitude: 0.0,
        longitude: 0.0,
        altitude: None,
        speed: None,
        heading: None,
        satellites: None,
        hdop: None,
        odometer: None,
        engine_hours: None,
        fuel_level: None,
        battery_voltage: None,
        ignition: None,
        moving: None,
        io_elements: Default::default(),
        raw_data: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_login_frame() {
        let frame = split_frame("$,0,LG,000,867762040399039,2.0.1,8997000000000000000,#?").unwrap();
        assert_eq!(frame.msg_type, "LG");
        assert_eq!(frame.short_device_id_field, "000");
        let login = parse_login(&frame).unwrap();
        assert_eq!(login.imei, "867762040399039");
        assert_eq!(login.firmware_version, "2.0.1");
    }

    #[test]
    fn builds_td_record_with_promotions() {
        let text = "$,0,TD,100,1,2A3B4C5D,12.971600,77.594600,30,90,8,0.8,40.0,15000,01,00,00,12.4,#?";
        let frame = split_frame(text).unwrap();
        let record = build_record(&frame, "867762040399039").unwrap();
        assert_eq!(record.message_type, "TD");
        assert!(record.ignition.unwrap());
        assert_eq!(record.fuel_level, Some(40.0));
        assert_eq!(record.odometer, Some(15.0));
        assert_eq!(record.battery_voltage, Some(12.4));
    }

    #[test]
    fn builds_flf_record_with_after_as_fuel_level() {
        let text = "$,5,FLF,100,1,2A3B4C5D,40.0,70.0,30.0,12.9716,77.5946,#?";
        let frame = split_frame(text).unwrap();
        let record = build_record(&frame, "000000000000000").unwrap();
        assert_eq!(record.fuel_level, Some(70.0));
        assert_eq!(
            record.io_elements.get("event_type"),
            Some(&IoValue::Text("fuel_fill".to_string()))
        );
    }

    #[test]
    fn too_few_fields_is_rejected() {
        let frame = split_frame("$,0,TD,100,#?").unwrap();
        let err = build_record(&frame, "imei").unwrap_err();
        assert!(matches!(err, Tfms90Error::TooFewFields { .. }));
    }
}
