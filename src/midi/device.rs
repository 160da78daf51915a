// MIDI device lookup for clock ports

use midir::{MidiInput, MidiInputPort, MidiOutput, MidiOutputPort};

use crate::error::{ClockError, ClockResult};

/// Client name used for every midir handle opened by this crate
pub const CLIENT_NAME: &str = "Tempo Clock";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Port enumeration and lookup for inputs and outputs
pub struct MidiDeviceManager;

impl MidiDeviceManager {
    pub fn new() -> Self {
        Self
    }

    /// Lists every MIDI input port (empty when the MIDI client cannot be created)
    pub fn list_input_ports(&self) -> Vec<MidiDeviceInfo> {
        match MidiInput::new(CLIENT_NAME) {
            Ok(midi_in) => describe_ports(&midi_in.ports(), "midi_in", |p| midi_in.port_name(p).ok()),
            Err(e) => {
                log::warn!("Cannot scan MIDI inputs: {}", e);
                Vec::new()
            }
        }
    }

    /// Lists every MIDI output port (empty when the MIDI client cannot be created)
    pub fn list_output_ports(&self) -> Vec<MidiDeviceInfo> {
        match MidiOutput::new(CLIENT_NAME) {
            Ok(midi_out) => {
                describe_ports(&midi_out.ports(), "midi_out", |p| midi_out.port_name(p).ok())
            }
            Err(e) => {
                log::warn!("Cannot scan MIDI outputs: {}", e);
                Vec::new()
            }
        }
    }

    /// Input port by name, or the first one when `name` is `None`
    pub fn input_port(&self, name: Option<&str>) -> ClockResult<(MidiInput, MidiInputPort, String)> {
        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| ClockError::MidiInit(e.to_string()))?;
        let (port, port_name) = pick_port(midi_in.ports(), name, |p| midi_in.port_name(p).ok())?;
        Ok((midi_in, port, port_name))
    }

    /// Output port by name, or the first one when `name` is `None`
    pub fn output_port(&self, name: Option<&str>) -> ClockResult<(MidiOutput, MidiOutputPort, String)> {
        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|e| ClockError::MidiInit(e.to_string()))?;
        let (port, port_name) = pick_port(midi_out.ports(), name, |p| midi_out.port_name(p).ok())?;
        Ok((midi_out, port, port_name))
    }
}

impl Default for MidiDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_ports<P>(
    ports: &[P],
    prefix: &str,
    port_name: impl Fn(&P) -> Option<String>,
) -> Vec<MidiDeviceInfo> {
    ports
        .iter()
        .enumerate()
        .filter_map(|(index, port)| {
            port_name(port).map(|name| MidiDeviceInfo {
                id: format!("{}_{}", prefix, index),
                name,
                // The first port is treated as the default
                is_default: index == 0,
            })
        })
        .collect()
}

fn pick_port<P>(
    ports: Vec<P>,
    name: Option<&str>,
    port_name: impl Fn(&P) -> Option<String>,
) -> ClockResult<(P, String)> {
    match name {
        Some(wanted) => ports
            .into_iter()
            .find_map(|port| {
                port_name(&port)
                    .filter(|n| n == wanted)
                    .map(|n| (port, n))
            })
            .ok_or_else(|| ClockError::PortNotFound(wanted.to_string())),
        None => {
            let port = ports.into_iter().next().ok_or(ClockError::NoPorts)?;
            let name = port_name(&port).unwrap_or_else(|| "Unknown".to_string());
            Ok((port, name))
        }
    }
}
