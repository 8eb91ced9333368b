use crate::openflow::DatapathId;
use crate::services::SwitchPort;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("switch {0:#018x} not available")]
    SwitchUnavailable(DatapathId),

    #[error("none or more than one VLAN for device {device} on input port {port}")]
    AmbiguousVlan { device: String, port: SwitchPort },

    #[error("output to {0} forbidden for address space")]
    PortForbidden(SwitchPort),

    #[error("TTL expired")]
    TtlExpired,

    #[error("tunnel error: {0}")]
    Tunnel(String),

    #[error("write to switch {switch:#018x} failed: {reason}")]
    Write { switch: DatapathId, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
