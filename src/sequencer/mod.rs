// Sequencer module
// Exact musical time, time signatures and the transport that owns the clocks

pub mod fraction;
pub mod time_signature;
pub mod timeline;
pub mod transport;

pub use fraction::Fraction;
pub use time_signature::TimeSignature;
pub use timeline::{BarBeatTime, Units};
pub use transport::{Transport, TransportState};
