// Transport - Playback control over a clock generator and a time synchronizer
// Owns both contexts and keeps their tempo and time signature in step

use crate::clock::generator::ClockGenerator;
use crate::clock::synchronizer::TimeSynchronizer;
use crate::config::EngineConfig;
use crate::error::ClockResult;
use crate::sequencer::time_signature::TimeSignature;
use crate::sequencer::timeline::{BarBeatTime, Units};

/// Transport state (play/pause/stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    /// Check if transport is stopped or paused
    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped | TransportState::Paused)
    }
}

/// Transport controller
///
/// The generator and the synchronizer are handed in by the caller, so
/// several independent transports can live in one process. Fields drop in
/// order: the generator stops sending before the synchronizer shuts down.
pub struct Transport {
    generator: ClockGenerator,
    synchronizer: TimeSynchronizer,
    state: TransportState,
    time_signature: TimeSignature,
    units: Units,
}

impl Transport {
    /// Wires an existing generator and synchronizer together
    pub fn new(
        generator: ClockGenerator,
        synchronizer: TimeSynchronizer,
        time_signature: TimeSignature,
        units: Units,
    ) -> Self {
        Self {
            generator,
            synchronizer,
            state: TransportState::Stopped,
            time_signature,
            units,
        }
    }

    /// Generator looped in-process into the synchronizer, no MIDI ports
    pub fn loopback(config: &EngineConfig) -> ClockResult<Self> {
        config.validate()?;
        let units = config.effective_units()?;
        let synchronizer = TimeSynchronizer::new(units, config.queue_capacity)?;
        let generator = ClockGenerator::new(synchronizer.sink(), units.beats_per_minute())?;
        Ok(Self::new(generator, synchronizer, config.time_signature()?, units))
    }

    /// Opens the configured MIDI ports; without an output port the generator
    /// loops into the synchronizer
    pub fn from_config(config: &EngineConfig) -> ClockResult<Self> {
        config.validate()?;
        let units = config.effective_units()?;
        let mut synchronizer = TimeSynchronizer::new(units, config.queue_capacity)?;
        if let Some(port) = config.input_port.as_deref() {
            synchronizer.connect_midi_input(Some(port))?;
        }

        let generator = match config.output_port.as_deref() {
            Some(port) => ClockGenerator::with_midi_output(Some(port), units.beats_per_minute())?,
            None => ClockGenerator::new(synchronizer.sink(), units.beats_per_minute())?,
        };

        log::info!(
            "Transport ready: {} at {} BPM",
            config.time_signature()?,
            units.beats_per_minute()
        );
        Ok(Self::new(generator, synchronizer, config.time_signature()?, units))
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Starts from zero, or continues when paused
    ///
    /// A pause before the first tick leaves nothing to continue from, so the
    /// clock restarts instead.
    pub fn play(&mut self) -> ClockResult<()> {
        match self.state {
            TransportState::Playing => return Ok(()),
            TransportState::Paused => {
                self.generator.flush()?;
                if self.generator.is_paused() {
                    self.generator.resume()?;
                } else {
                    self.generator.start()?;
                }
            }
            TransportState::Stopped => self.generator.start()?,
        }
        self.state = TransportState::Playing;
        Ok(())
    }

    /// Stops the clock, keeping the position
    pub fn pause(&mut self) -> ClockResult<()> {
        if self.state != TransportState::Playing {
            return Ok(());
        }
        self.generator.stop()?;
        self.state = TransportState::Paused;
        Ok(())
    }

    /// Stops the clock and rewinds to zero
    pub fn stop(&mut self) -> ClockResult<()> {
        self.generator.stop()?;
        self.generator.reset()?;
        // Clocks already in flight must land before the rewind
        self.generator.flush()?;
        self.synchronizer.flush()?;
        self.synchronizer.seek(BarBeatTime::zero(self.units))?;
        self.state = TransportState::Stopped;
        Ok(())
    }

    /// Toggle play/pause
    pub fn toggle_play(&mut self) -> ClockResult<()> {
        if self.state.is_playing() {
            self.pause()
        } else {
            self.play()
        }
    }

    pub fn tempo(&self) -> u32 {
        self.units.beats_per_minute()
    }

    pub fn set_tempo(&mut self, beats_per_minute: u32) -> ClockResult<()> {
        assert!(beats_per_minute > 0, "Beats per minute must be > 0");
        self.units = self.units.with_beats_per_minute(beats_per_minute);
        self.generator.set_tempo(beats_per_minute)?;
        self.synchronizer.set_units(self.units)
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    /// Changes the bar length; the current position keeps its total beats
    pub fn set_time_signature(&mut self, time_signature: TimeSignature) -> ClockResult<()> {
        self.time_signature = time_signature;
        self.units = time_signature.units(self.units.beats_per_minute(), self.units.subbeat_divisor());
        self.synchronizer.set_units(self.units)
    }

    pub fn units(&self) -> Units {
        self.units
    }

    /// Latest position published by the synchronizer
    pub fn position(&self) -> BarBeatTime {
        self.synchronizer.current_time()
    }

    /// Position as `BBB:b.sss`
    pub fn position_display(&self) -> String {
        self.position().display_string()
    }

    pub fn generator(&self) -> &ClockGenerator {
        &self.generator
    }

    pub fn synchronizer(&self) -> &TimeSynchronizer {
        &self.synchronizer
    }

    /// Waits for the generator, then the synchronizer, to drain their queues
    pub fn flush(&self) -> ClockResult<()> {
        self.generator.flush()?;
        self.synchronizer.flush()
    }
}
