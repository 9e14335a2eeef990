use thiserror::Error;

/// Errors surfaced by the realtime client.
///
/// Nothing here is fatal to the owning process; every variant leaves the
/// client in a well-defined, re-connectable state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealtimeError {
    /// The WebSocket handshake could not be completed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The established transport reported a runtime error
    #[error("Transport error: {0}")]
    Transport(String),

    /// An inbound frame was not a valid envelope
    #[error("Malformed envelope: {0}")]
    Parse(String),

    /// The server closed the connection with a non-normal close code
    #[error("Connection closed abnormally (code {code})")]
    AbnormalClose { code: u16 },

    /// All reconnect attempts have been used up
    #[error("Reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, RealtimeError>;
