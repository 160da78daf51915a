// Error types for the clock transport and the time-value layer

use thiserror::Error;

/// Result type for transport, port and configuration operations
pub type ClockResult<T> = Result<T, ClockError>;

/// Errors raised by the clock generator, the synchronizer and their MIDI ports
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("Failed to initialize MIDI client: {0}")]
    MidiInit(String),

    #[error("MIDI port '{0}' not found")]
    PortNotFound(String),

    #[error("No MIDI port available")]
    NoPorts,

    #[error("Failed to connect MIDI port: {0}")]
    Connect(String),

    #[error("Failed to send clock message: {0}")]
    Send(String),

    #[error("Failed to spawn clock thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("Clock context is no longer running")]
    ContextClosed,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid persisted time signature {0:?}")]
    InvalidTimeSignature([u8; 2]),
}

/// Reasons a raw bar-beat string was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseTimeError {
    #[error("malformed bar-beat time '{0}'")]
    Malformed(String),

    #[error("bar-beat time '{0}' has a zero unit")]
    ZeroUnit(String),

    #[error("bar-beat time '{0}' does not fit the value range")]
    Overflow(String),
}
