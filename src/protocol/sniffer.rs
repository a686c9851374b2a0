/// Known TFMS90 message types (§4.1), used only to classify the first packet.
const TFMS90_MESSAGE_TYPES: &[&str] = &[
    "LG", "TD", "TDA", "TS", "TE", "HA2", "HB2", "HC2", "OS3", "FLF", "FLD", "STAT", "FCR", "HB",
    "DHR", "ERR", "GEO", "DID", "TMP",
];

/// Classification returned by [`sniff`]; `Unknown` means the handler closes
/// the connection without selecting a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniff {
    Teltonika,
    Tfms90,
    Unknown,
}

/// Classifies the first bytes read from a connection (§4.1).
///
/// Total and panic-free for any input (P1): the Teltonika test is tried
/// first because a valid IMEI login is strictly binary and cannot collide
/// with the ASCII `$` prefix the TFMS90 test requires.
pub fn sniff(bytes: &[u8]) -> Sniff {
    if looks_like_teltonika(bytes) {
        return Sniff::Teltonika;
    }
    if looks_like_tfms90(bytes) {
        return Sniff::Tfms90;
    }
    Sniff::Unknown
}

fn looks_like_teltonika(bytes: &[u8]) -> bool {
    if bytes.len() < 17 {
        return false;
    }
    let length = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    if !(10..=20).contains(&length) {
        return false;
    }
    let Some(digits) = bytes.get(2..2 + length) else {
        return false;
    };
    digits.iter().all(|b| b.is_ascii_digit())
}

fn looks_like_tfms90(bytes: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return false;
    };
    let trimmed = text.trim_end();
    if !trimmed.starts_with('$') {
        return false;
    }
    let fields: Vec<&str> = trimmed.split(',').collect();
    match fields.get(2) {
        Some(msg_type) => TFMS90_MESSAGE_TYPES.contains(msg_type),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_teltonika_imei_login() {
        let bytes = b"\x00\x0f352094087456789";
        assert_eq!(sniff(bytes), Sniff::Teltonika);
    }

    #[test]
    fn classifies_tfms90_login() {
        let bytes = b"$,0,LG,000,867762040399039,2.0.1,89970000000000000000,#?";
        assert_eq!(sniff(bytes), Sniff::Tfms90);
    }

    #[test]
    fn unknown_for_garbage() {
        assert_eq!(sniff(b"garbage"), Sniff::Unknown);
        assert_eq!(sniff(&[]), Sniff::Unknown);
    }

    #[test]
    fn never_panics_on_arbitrary_bytes() {
        for seed in 0u8..=255 {
            let bytes: Vec<u8> = (0..32).map(|i| seed.wrapping_mul(i)).collect();
            let _ = sniff(&bytes);
        }
    }

    #[test]
    fn tfms90_requires_known_message_type() {
        let bytes = b"$,0,XX,000,#?";
        assert_eq!(sniff(bytes), Sniff::Unknown);
    }
}
