// MIDI Input - Reception of real-time clock messages

use midir::MidiInputConnection;

use crate::error::{ClockError, ClockResult};
use crate::midi::device::MidiDeviceManager;
use crate::midi::event::{RealTimeMessage, TimedMessage};

/// Incoming clock port
///
/// The driver callback runs on a latency-critical thread: it only decodes the
/// status byte and hands the message to `on_message`, which must not block.
/// Closing happens once, when this value is dropped.
pub struct MidiClockInput {
    _connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiClockInput {
    /// Connects to the named input port, or the first one when `port` is `None`
    pub fn connect<F>(port: Option<&str>, mut on_message: F) -> ClockResult<Self>
    where
        F: FnMut(TimedMessage) + Send + 'static,
    {
        let (mut midi_in, port, port_name) = MidiDeviceManager::new().input_port(port)?;
        // Real-time messages are filtered out by default
        midi_in.ignore(midir::Ignore::None);

        let connection = midi_in
            .connect(
                &port,
                "tempo-clock-input",
                move |timestamp, message, _| {
                    if let Some(message) = RealTimeMessage::from_bytes(message) {
                        on_message(TimedMessage::new(message, timestamp));
                    }
                },
                (),
            )
            .map_err(|e| ClockError::Connect(e.to_string()))?;

        log::info!("MIDI clock input connected: {}", port_name);
        Ok(Self {
            _connection: connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}
