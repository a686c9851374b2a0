use std::collections::BTreeMap;

use crate::errors::FrameError;
use crate::telemetry::IoValue;

use super::cursor::Cursor;

/// Codec 8 uses 1-byte ID/count fields throughout; Codec 8E widens IDs and
/// counts to 2 bytes and adds a fifth variable-length group (§4.2 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecWidth {
    Codec8,
    Codec8E,
}

/// Parses one I/O element starting at the cursor's current offset and
/// writes its fixed/variable values into `io_elements` keyed `io_<id>` or
/// `io_<id>_var`.
///
/// Four fixed-width groups (1/2/4/8-byte values) are always present; the
/// variable-length group is present only for [`CodecWidth::Codec8E`].
pub fn parse_io_element(
    cursor: &mut Cursor,
    width: CodecWidth,
    io_elements: &mut BTreeMap<String, IoValue>,
) -> Result<(), FrameError> {
    let _event_io_id = take_id(cursor, width)?;
    let _total_count = take_count(cursor, width)?;

    parse_fixed_group(cursor, width, io_elements, 1)?;
    parse_fixed_group(cursor, width, io_elements, 2)?;
    parse_fixed_group(cursor, width, io_elements, 4)?;
    parse_fixed_group(cursor, width, io_elements, 8)?;

    if width == CodecWidth::Codec8E {
        parse_variable_group(cursor, io_elements)?;
    }

    Ok(())
}

fn take_id(cursor: &mut Cursor, width: CodecWidth) -> Result<u16, FrameError> {
    match width {
        CodecWidth::Codec8 => cursor.take_u8().map(u16::from),
        CodecWidth::Codec8E => cursor.take_u16(),
    }
}

fn take_count(cursor: &mut Cursor, width: CodecWidth) -> Result<u16, FrameError> {
    take_id(cursor, width)
}

fn parse_fixed_group(
    cursor: &mut Cursor,
    width: CodecWidth,
    io_elements: &mut BTreeMap<String, IoValue>,
    value_width: usize,
) -> Result<(), FrameError> {
    let count = take_count(cursor, width)?;
    for _ in 0..count {
        let id = take_id(cursor, width)?;
        let value = match value_width {
            1 => IoValue::Integer(cursor.take_u8()? as i64),
            2 => IoValue::Integer(cursor.take_u16()? as i64),
            4 => IoValue::Integer(cursor.take_u32()? as i64),
            8 => IoValue::Integer(cursor.take_u64()? as i64),
            _ => unreachable!("fixed I/O group widths are 1/2/4/8 bytes"),
        };
        io_elements.insert(format!("io_{id}"), value);
    }
    Ok(())
}

fn parse_variable_group(
    cursor: &mut Cursor,
    io_elements: &mut BTreeMap<String, IoValue>,
) -> Result<(), FrameError> {
    let count = cursor.take_u16()?;
    for _ in 0..count {
        let id = cursor.take_u16()?;
        let length = cursor.take_u16()? as usize;
        let bytes = cursor.take_bytes(length)?.to_vec();
        io_elements.insert(format!("io_{id}_var"), IoValue::Bytes(bytes));
    }
    Ok(())
}

/// Applies the post-decode I/O-ID to typed-field promotion table (§4.2).
pub struct Promotions {
    pub ignition: Option<bool>,
    pub moving: Option<bool>,
    pub battery_voltage: Option<f64>,
    pub odometer: Option<f64>,
    pub fuel_level: Option<f64>,
    pub engine_hours: Option<f64>,
}

pub fn promote(io_elements: &BTreeMap<String, IoValue>) -> Promotions {
    Promotions {
        ignition: io_elements.get("io_239").map(IoValue::is_truthy),
        moving: io_elements.get("io_240").map(IoValue::is_truthy),
        battery_voltage: io_elements
            .get("io_67")
            .and_then(IoValue::as_f64)
            .map(|mv| mv / 1000.0),
        odometer: io_elements
            .get("io_16")
            .and_then(IoValue::as_f64)
            .map(|m| m / 1000.0),
        fuel_level: io_elements.get("io_70").and_then(IoValue::as_f64),
        engine_hours: io_elements
            .get("io_15")
            .and_then(IoValue::as_f64)
            .map(|s| s / 3600.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codec8_single_byte_group() {
        // event id=1, total=1, group counts: 1x1B(id=239,val=1), rest zero
        let bytes = [0x01, 0x01, 0x01, 239, 0x01, 0x00, 0x00, 0x00];
        let mut cursor = Cursor::new(&bytes);
        let mut io_elements = BTreeMap::new();
        parse_io_element(&mut cursor, CodecWidth::Codec8, &mut io_elements).unwrap();
        assert_eq!(io_elements.get("io_239"), Some(&IoValue::Integer(1)));
    }

    #[test]
    fn fuel_promotion_passes_through_as_f64() {
        let mut io_elements = BTreeMap::new();
        io_elements.insert("io_70".to_string(), IoValue::Integer(40));
        let promotions = promote(&io_elements);
        assert_eq!(promotions.fuel_level, Some(40.0));
    }

    #[test]
    fn battery_voltage_converted_from_millivolts() {
        let mut io_elements = BTreeMap::new();
        io_elements.insert("io_67".to_string(), IoValue::Integer(12400));
        let promotions = promote(&io_elements);
        assert_eq!(promotions.battery_voltage, Some(12.4));
    }

    #[test]
    fn codec8e_variable_group_is_hex_eligible_bytes() {
        // event id=0, total=0 (2B each), 4 empty fixed groups (2B count each), then var group count=1, id=1, len=2, value
        let bytes = [
            0x00, 0x00, // event id
            0x00, 0x00, // total count
            0x00, 0x00, // 1B group count
            0x00, 0x00, // 2B group count
            0x00, 0x00, // 4B group count
            0x00, 0x00, // 8B group count
            0x00, 0x01, // var group count
            0x00, 0x01, // var id
            0x00, 0x02, // var length
            0xDE, 0xAD,
        ];
        let mut cursor = Cursor::new(&bytes);
        let mut io_elements = BTreeMap::new();
        parse_io_element(&mut cursor, CodecWidth::Codec8E, &mut io_elements).unwrap();
        assert_eq!(
            io_elements.get("io_1_var"),
            Some(&IoValue::Bytes(vec![0xDE, 0xAD]))
        );
        assert_eq!(cursor.offset(), bytes.len());
    }
}
