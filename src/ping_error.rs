use std::io;

pub type PingResult<T> = std::result::Result<T, PingError>;

#[derive(Debug, thiserror::Error)]
pub enum PingError {
    #[error("could not resolve {host}: {message}")]
    Resolution { host: String, message: String },

    #[error("could not open ICMP socket: {0}")]
    SocketOpen(#[source] io::Error),

    #[error("could not send echo request {sequence_number}: {source}")]
    Send {
        sequence_number: u16,
        #[source]
        source: io::Error,
    },

    #[error("reading from ICMP socket failed: {0}")]
    ReadFault(#[source] io::Error),

    #[error("could not decode ICMP message: {0}")]
    Decode(String),

    #[error("unhandled ICMP message type {icmp_type} (code {icmp_code})")]
    Classification { icmp_type: u8, icmp_code: u8 },

    #[error("packet loss is undefined when no packet was sent")]
    UndefinedLoss,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PingError {
    /// Errors that abort the run before any probe leaves the host.
    pub fn is_construction_error(&self) -> bool {
        matches!(self, PingError::Resolution { .. } | PingError::SocketOpen(_))
    }
}
