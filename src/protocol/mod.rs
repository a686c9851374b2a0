pub mod sniffer;
pub mod teltonika;
pub mod tfms90;

pub use sniffer::{sniff, Sniff};

use crate::telemetry::Protocol;

/// The capability set chosen once per connection by the sniffer (§9
/// "Abstract base parser"): which wire format a connection speaks.
///
/// Identify/handshake/steady-state parsing differ enough between the two
/// protocols (binary handshake vs. a multi-field login with a registry
/// side-effect) that [`crate::connection::ConnectionHandler`] dispatches on
/// this tag directly to the `teltonika`/`tfms90` modules rather than behind
/// a single `parse` trait method; this type only carries the classification
/// and its derived protocol tag through the connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserVariant {
    Teltonika,
    Tfms90,
}

impl ParserVariant {
    pub fn from_sniff(sniff: Sniff) -> Option<Self> {
        match sniff {
            Sniff::Teltonika => Some(ParserVariant::Teltonika),
            Sniff::Tfms90 => Some(ParserVariant::Tfms90),
            Sniff::Unknown => None,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            ParserVariant::Teltonika => Protocol::Teltonika,
            ParserVariant::Tfms90 => Protocol::Tfms90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sniff_has_no_variant() {
        assert_eq!(ParserVariant::from_sniff(Sniff::Unknown), None);
    }

    #[test]
    fn variant_protocol_tag_matches() {
        assert_eq!(ParserVariant::Teltonika.protocol(), Protocol::Teltonika);
        assert_eq!(ParserVariant::Tfms90.protocol(), Protocol::Tfms90);
    }
}
