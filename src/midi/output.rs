// MIDI Output - Outgoing clock wire

use crossbeam_channel::Sender;
use midir::MidiOutputConnection;

use crate::error::{ClockError, ClockResult};
use crate::midi::device::MidiDeviceManager;
use crate::midi::event::TimedMessage;

/// Destination of the generator's real-time messages
///
/// A failing `send` drops only that message; the generator logs it and
/// keeps ticking.
pub trait ClockSink: Send {
    fn send(&mut self, message: TimedMessage) -> ClockResult<()>;
}

impl ClockSink for Box<dyn ClockSink> {
    fn send(&mut self, message: TimedMessage) -> ClockResult<()> {
        (**self).send(message)
    }
}

/// In-process wire: messages are forwarded on a channel
impl ClockSink for Sender<TimedMessage> {
    fn send(&mut self, message: TimedMessage) -> ClockResult<()> {
        Sender::send(self, message).map_err(|e| ClockError::Send(e.to_string()))
    }
}

/// Clock output on a hardware or virtual MIDI port
pub struct MidiClockOutput {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidiClockOutput {
    /// Connects to the named output port, or the first one when `port` is `None`
    pub fn connect(port: Option<&str>) -> ClockResult<Self> {
        let (midi_out, port, port_name) = MidiDeviceManager::new().output_port(port)?;
        let connection = midi_out
            .connect(&port, "tempo-clock-output")
            .map_err(|e| ClockError::Connect(e.to_string()))?;

        log::info!("MIDI clock output connected: {}", port_name);
        Ok(Self {
            connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl ClockSink for MidiClockOutput {
    fn send(&mut self, message: TimedMessage) -> ClockResult<()> {
        log::trace!("-> {:?} @ {}", message.message, message.timestamp);
        self.connection
            .send(&[message.message.as_byte()])
            .map_err(|e| ClockError::Send(e.to_string()))
    }
}
