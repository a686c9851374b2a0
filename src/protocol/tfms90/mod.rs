pub mod alias_map;
pub mod messages;
pub mod timestamp;

pub use alias_map::AliasMap;
pub use messages::{build_record, parse_login, split_frame, LoginPayload, ParsedFrame};
pub use timestamp::{hex_to_ts, ts_to_hex};

/// Builds the login ACK: `$,0,ACK,<short_id>,#?\n` (§4.3, §6).
pub fn login_ack(short_device_id: u32) -> String {
    format!("$,0,ACK,{short_device_id},#?\n")
}

/// Builds the data ACK: `$,<token>,ACK,<short_device_id>,<num_records>,#?\n`.
pub fn data_ack(token: &str, short_device_id: &str, num_records: usize) -> String {
    format!("$,{token},ACK,{short_device_id},{num_records},#?\n")
}
