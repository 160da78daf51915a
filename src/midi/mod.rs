// MIDI wire protocol and ports for clock sync

pub mod device;
pub mod event;
pub mod input;
pub mod output;

pub use device::{MidiDeviceInfo, MidiDeviceManager};
pub use event::{RealTimeMessage, TimedMessage};
pub use input::MidiClockInput;
pub use output::{ClockSink, MidiClockOutput};
