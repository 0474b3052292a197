//! Collector-wide error taxonomy

use std::net::IpAddr;

/// Errors surfaced by the Store port (§4.2)
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(String),

    #[error("unique constraint violated on {0}")]
    UniqueViolation(String),
}

/// Errors surfaced while parsing a raw log line (§4.3, §7)
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum ParseError {
    #[error("line does not start with 'L ' after normalization")]
    NotParseable,

    #[error("unrecognized event shape: {0}")]
    Unrecognized(String),

    #[error("malformed field: {0}")]
    MalformedField(String),
}

/// Errors surfaced by Ingress authentication (§4.4, §7)
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unknown sender {ip}:{port}")]
    UnknownSender { ip: IpAddr, port: u16 },
}

/// Errors surfaced during identity resolution (§4.5, §7)
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("event of type {0:?} requires a meta block but none was present")]
    MissingMeta(crate::store::EventType),
}

/// Errors surfaced by configuration loading (§6, §7)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// The unified error type threaded through Processor -> Ingress (§7)
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("handler error: {0}")]
    Handler(String),
}
