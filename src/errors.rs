use thiserror::Error;

/// Errors raised while decoding a Codec 8/8E frame (`spec.md` §4.2).
///
/// Framing errors are non-fatal to the connection (§7): the handler logs and
/// drops the frame, keeping whatever prefix of records was already decoded.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too short: need {needed} bytes at offset {offset}, got {available}")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("invalid preamble: expected all-zero, got {0:08x}")]
    InvalidPreamble(u32),
    #[error("unsupported codec id: {0:#04x}")]
    UnsupportedCodec(u8),
}

/// Errors raised while decoding a TFMS90 text frame (`spec.md` §4.3).
#[derive(Debug, Error)]
pub enum Tfms90Error {
    #[error("frame is not valid ASCII")]
    NotAscii,
    #[error("frame has no message type field")]
    MissingMessageType,
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("message type {msg_type} needs {needed} fields, got {got}")]
    TooFewFields {
        msg_type: String,
        needed: usize,
        got: usize,
    },
    #[error("field {field} could not be parsed as {expected}: {value}")]
    BadField {
        field: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("IMEI {0} is not pre-provisioned")]
    UnknownImei(String),
}

/// Errors from the [`crate::registry::DeviceRegistry`] port.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry backend error: {0}")]
    Backend(String),
    #[error("device not found: {0}")]
    NotFound(String),
}

/// Errors from the [`crate::sink::TelemetrySink`] port.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        RegistryError::Backend(err.to_string())
    }
}

impl From<sqlx::Error> for SinkError {
    fn from(err: sqlx::Error) -> Self {
        SinkError::Backend(err.to_string())
    }
}

/// The classification a [`crate::connection::ConnectionHandler`] needs to
/// apply the per-category policy from `spec.md` §7.
///
/// This is deliberately a flat enum rather than a chain of `Box<dyn Error>`
/// sources: the handler's main loop matches on the category, not on the
/// message, to decide whether the connection stays open.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("framing error: {0}")]
    Framing(String),
    #[error("identity error: {0}")]
    Identity(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl From<FrameError> for ConnectionError {
    fn from(err: FrameError) -> Self {
        ConnectionError::Framing(err.to_string())
    }
}

impl From<Tfms90Error> for ConnectionError {
    fn from(err: Tfms90Error) -> Self {
        match err {
            Tfms90Error::UnknownImei(_) => ConnectionError::Identity(err.to_string()),
            other => ConnectionError::Parse(other.to_string()),
        }
    }
}

impl From<RegistryError> for ConnectionError {
    fn from(err: RegistryError) -> Self {
        ConnectionError::Persistence(err.to_string())
    }
}

impl From<SinkError> for ConnectionError {
    fn from(err: SinkError) -> Self {
        ConnectionError::Persistence(err.to_string())
    }
}

/// Raised at boot when configuration is invalid (§7 "Fatal").
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
