// MIDI real-time transport messages

/// Single-byte system real-time message used for clock sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealTimeMessage {
    /// One tick elapsed
    Clock,
    /// Reset to zero and begin
    Start,
    /// Resume without reset
    Continue,
    /// Halt
    Stop,
}

impl RealTimeMessage {
    pub const CLOCK: u8 = 0xF8;
    pub const START: u8 = 0xFA;
    pub const CONTINUE: u8 = 0xFB;
    pub const STOP: u8 = 0xFC;

    /// Parse a RAW MIDI message
    /// Only a leading real-time status byte is recognised
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes.first().copied().and_then(Self::from_byte)
    }

    pub fn from_byte(status: u8) -> Option<Self> {
        match status {
            Self::CLOCK => Some(Self::Clock),
            Self::START => Some(Self::Start),
            Self::CONTINUE => Some(Self::Continue),
            Self::STOP => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Clock => Self::CLOCK,
            Self::Start => Self::START,
            Self::Continue => Self::CONTINUE,
            Self::Stop => Self::STOP,
        }
    }
}

/// Real-time message with a monotonic timestamp
///
/// Outgoing messages carry the generator's tick count; incoming ones the
/// driver timestamp in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedMessage {
    pub message: RealTimeMessage,
    pub timestamp: u64,
}

impl TimedMessage {
    pub fn new(message: RealTimeMessage, timestamp: u64) -> Self {
        Self { message, timestamp }
    }
}
