// Tempo Clock - MIDI clock generation, clock following and exact bar-beat time

pub mod clock;
pub mod config;
pub mod error;
pub mod messaging;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use clock::{ClockGenerator, ClockStatus, Subscription, TimeSynchronizer};
pub use config::EngineConfig;
pub use error::{ClockError, ClockResult, ParseTimeError};
pub use midi::event::{RealTimeMessage, TimedMessage};
pub use midi::output::ClockSink;
pub use sequencer::{BarBeatTime, Fraction, TimeSignature, Transport, TransportState, Units};
