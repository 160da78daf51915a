// Engine configuration - Units, time signature and MIDI ports, loaded from RON

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clock::synchronizer::DEFAULT_QUEUE_CAPACITY;
use crate::error::{ClockError, ClockResult};
use crate::sequencer::time_signature::TimeSignature;
use crate::sequencer::timeline::Units;

/// Startup configuration of a [`Transport`](crate::sequencer::Transport)
///
/// ```ron
/// (
///     units: (beats_per_bar: 3, beats_per_minute: 90, subbeat_divisor: 480),
///     time_signature_bytes: Some((4, 2)),
///     output_port: Some("IAC Driver Bus 1"),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub units: Units,
    /// Persisted `[beat_unit, log2(beats_per_bar)]`; overrides `units.beats_per_bar`
    pub time_signature_bytes: Option<[u8; 2]>,
    /// Clock output port; `None` loops the generator into the synchronizer
    pub output_port: Option<String>,
    /// Clock input port followed by the synchronizer
    pub input_port: Option<String>,
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            units: Units::default(),
            time_signature_bytes: None,
            output_port: None,
            input_port: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn from_ron_str(text: &str) -> ClockResult<Self> {
        let config: Self = ron::from_str(text)
            .map_err(|e| ClockError::Config(format!("Failed to parse RON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ClockResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron_str(&text)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn to_ron_string(&self) -> ClockResult<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ClockError::Config(format!("Failed to serialize RON: {}", e)))
    }

    pub fn validate(&self) -> ClockResult<()> {
        if Units::try_new(
            self.units.beats_per_bar(),
            self.units.beats_per_minute(),
            self.units.subbeat_divisor(),
        )
        .is_none()
        {
            return Err(ClockError::Config("units must all be greater than zero".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ClockError::Config("queue_capacity must be greater than zero".to_string()));
        }
        self.time_signature()?;
        Ok(())
    }

    /// Configured signature, or `beats_per_bar`/4 when none is persisted
    pub fn time_signature(&self) -> ClockResult<TimeSignature> {
        match self.time_signature_bytes {
            Some(bytes) => TimeSignature::from_bytes(bytes),
            None => {
                let beats_per_bar = u8::try_from(self.units.beats_per_bar()).map_err(|_| {
                    ClockError::Config(format!(
                        "beats_per_bar {} does not fit a time signature",
                        self.units.beats_per_bar()
                    ))
                })?;
                Ok(TimeSignature::new(beats_per_bar, 4))
            }
        }
    }

    /// Units with beats-per-bar taken from the time signature
    pub fn effective_units(&self) -> ClockResult<Units> {
        let signature = self.time_signature()?;
        Ok(signature.units(self.units.beats_per_minute(), self.units.subbeat_divisor()))
    }
}
