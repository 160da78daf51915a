// Clock generator - Outgoing MIDI clock at a tempo-derived rate
// Start/stop/resume/reset are serialized with the timer on one thread

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::select;

use crate::error::{ClockError, ClockResult};
use crate::messaging::channels::{GeneratorReceiver, GeneratorSender, create_generator_channel};
use crate::messaging::command::GeneratorCommand;
use crate::midi::event::{RealTimeMessage, TimedMessage};
use crate::midi::output::{ClockSink, MidiClockOutput};

/// Generator resolution, ticks per beat
pub const TICKS_PER_BEAT: u32 = 480;

const NANOS_PER_MINUTE: u64 = 60_000_000_000;

/// Tick period at `beats_per_minute`
pub fn nanos_per_tick(beats_per_minute: u32) -> u64 {
    assert!(beats_per_minute > 0, "Beats per minute must be > 0");
    NANOS_PER_MINUTE / beats_per_minute as u64 / TICKS_PER_BEAT as u64
}

/// Generator state readable from any thread
#[derive(Debug)]
pub struct ClockStatus {
    running: AtomicBool,
    ticks: AtomicU64,
    beats_per_minute: AtomicU32,
}

impl ClockStatus {
    fn new(beats_per_minute: u32) -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            beats_per_minute: AtomicU32::new(beats_per_minute),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stopped with a non-zero tick counter
    pub fn is_paused(&self) -> bool {
        !self.is_running() && self.tick_count() > 0
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn beats_per_minute(&self) -> u32 {
        self.beats_per_minute.load(Ordering::Acquire)
    }
}

/// Run/pause/stop state machine of the generator.
///
/// Only the owner of the periodic timer drives it; [`ClockGenerator`] wraps
/// it in its own thread. Transitions that are not valid in the current state
/// are ignored and return `false`.
pub struct GeneratorCore<S: ClockSink> {
    sink: S,
    beats_per_minute: u32,
    nanos_per_tick: u64,
    ticks: u64,
    running: bool,
    status: Arc<ClockStatus>,
}

impl<S: ClockSink> GeneratorCore<S> {
    pub fn new(sink: S, beats_per_minute: u32) -> Self {
        let nanos_per_tick = nanos_per_tick(beats_per_minute);
        Self {
            sink,
            beats_per_minute,
            nanos_per_tick,
            ticks: 0,
            running: false,
            status: ClockStatus::new(beats_per_minute),
        }
    }

    pub fn status(&self) -> Arc<ClockStatus> {
        Arc::clone(&self.status)
    }

    /// Sends Start, zeroes the counter and starts ticking
    pub fn start(&mut self) -> bool {
        if self.running {
            log::debug!("Clock start ignored: already running");
            return false;
        }
        self.emit(RealTimeMessage::Start);
        self.ticks = 0;
        self.running = true;
        self.publish();
        log::info!("Clock started at {} BPM", self.beats_per_minute);
        true
    }

    /// Stops ticking and sends Stop, keeping the counter
    pub fn stop(&mut self) -> bool {
        if !self.running {
            log::debug!("Clock stop ignored: not running");
            return false;
        }
        self.running = false;
        self.emit(RealTimeMessage::Stop);
        self.publish();
        log::info!("Clock stopped at tick {}", self.ticks);
        true
    }

    /// Sends Continue and ticks on from the kept counter
    pub fn resume(&mut self) -> bool {
        if !self.is_paused() {
            log::debug!("Clock resume ignored: not paused");
            return false;
        }
        self.emit(RealTimeMessage::Continue);
        self.running = true;
        self.publish();
        log::info!("Clock resumed at tick {}", self.ticks);
        true
    }

    /// Zeroes the counter of a stopped clock, no message is sent
    pub fn reset(&mut self) -> bool {
        if self.running {
            log::debug!("Clock reset ignored: running");
            return false;
        }
        self.ticks = 0;
        self.publish();
        true
    }

    /// One timer firing
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        self.ticks += 1;
        self.emit(RealTimeMessage::Clock);
        self.publish();
    }

    /// Changes the tick period; the counter is untouched
    pub fn set_tempo(&mut self, beats_per_minute: u32) {
        self.nanos_per_tick = nanos_per_tick(beats_per_minute);
        self.beats_per_minute = beats_per_minute;
        self.publish();
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.nanos_per_tick)
    }

    pub fn nanos_per_tick(&self) -> u64 {
        self.nanos_per_tick
    }

    pub fn beats_per_minute(&self) -> u32 {
        self.beats_per_minute
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        !self.running && self.ticks > 0
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn emit(&mut self, message: RealTimeMessage) {
        if let Err(e) = self.sink.send(TimedMessage::new(message, self.ticks)) {
            log::warn!("Dropped {:?} at tick {}: {}", message, self.ticks, e);
        }
    }

    fn publish(&self) {
        self.status.running.store(self.running, Ordering::Release);
        self.status.ticks.store(self.ticks, Ordering::Release);
        self.status
            .beats_per_minute
            .store(self.beats_per_minute, Ordering::Release);
    }
}

/// Clock generator running on its own serial context.
///
/// Control calls are queued to that context so a transition never races a
/// timer firing; they return before the transition has happened. `stop()`
/// may let one more Clock through.
pub struct ClockGenerator {
    commands: GeneratorSender,
    status: Arc<ClockStatus>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ClockGenerator {
    /// Spawns the generator context sending to `sink`
    pub fn new<S: ClockSink + 'static>(sink: S, beats_per_minute: u32) -> ClockResult<Self> {
        let core = GeneratorCore::new(sink, beats_per_minute);
        let status = core.status();
        let (commands, receiver) = create_generator_channel();

        let thread = thread::Builder::new()
            .name("clock-generator".to_string())
            .spawn(move || run_generator(core, receiver))
            .map_err(ClockError::ThreadSpawn)?;

        Ok(Self {
            commands,
            status,
            thread: Some(thread),
        })
    }

    /// Generator on a MIDI output port; failing to open the port is fatal
    pub fn with_midi_output(port: Option<&str>, beats_per_minute: u32) -> ClockResult<Self> {
        let output = MidiClockOutput::connect(port).inspect_err(|e| {
            log::error!("Clock generator unavailable: {}", e);
        })?;
        Self::new(output, beats_per_minute)
    }

    pub fn start(&self) -> ClockResult<()> {
        self.dispatch(GeneratorCommand::Start)
    }

    pub fn stop(&self) -> ClockResult<()> {
        self.dispatch(GeneratorCommand::Stop)
    }

    pub fn resume(&self) -> ClockResult<()> {
        self.dispatch(GeneratorCommand::Resume)
    }

    pub fn reset(&self) -> ClockResult<()> {
        self.dispatch(GeneratorCommand::Reset)
    }

    pub fn set_tempo(&self, beats_per_minute: u32) -> ClockResult<()> {
        assert!(beats_per_minute > 0, "Beats per minute must be > 0");
        self.dispatch(GeneratorCommand::SetTempo(beats_per_minute))
    }

    /// Blocks until every command queued before this call has been handled
    pub fn flush(&self) -> ClockResult<()> {
        let (ack, done) = crossbeam_channel::bounded(1);
        self.dispatch(GeneratorCommand::Flush(ack))?;
        done.recv().map_err(|_| ClockError::ContextClosed)
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.status.is_paused()
    }

    pub fn tick_count(&self) -> u64 {
        self.status.tick_count()
    }

    pub fn beats_per_minute(&self) -> u32 {
        self.status.beats_per_minute()
    }

    fn dispatch(&self, command: GeneratorCommand) -> ClockResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ClockError::ContextClosed)
    }
}

impl Drop for ClockGenerator {
    fn drop(&mut self) {
        let _ = self.commands.send(GeneratorCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Clock generator thread panicked");
            }
        }
    }
}

/// Generator context: one select over control commands and the armed timer
fn run_generator<S: ClockSink>(mut core: GeneratorCore<S>, commands: GeneratorReceiver) {
    let mut deadline: Option<Instant> = None;
    let mut last_fire = Instant::now();

    loop {
        let timer = match deadline {
            Some(at) => crossbeam_channel::at(at),
            None => crossbeam_channel::never(),
        };

        select! {
            recv(commands) -> command => {
                let Ok(command) = command else { break };
                match command {
                    GeneratorCommand::Start => {
                        if core.start() {
                            last_fire = Instant::now();
                            deadline = Some(last_fire + core.interval());
                        }
                    }
                    GeneratorCommand::Stop => {
                        if core.stop() {
                            deadline = None;
                        }
                    }
                    GeneratorCommand::Resume => {
                        if core.resume() {
                            last_fire = Instant::now();
                            deadline = Some(last_fire + core.interval());
                        }
                    }
                    GeneratorCommand::Reset => {
                        core.reset();
                    }
                    GeneratorCommand::SetTempo(beats_per_minute) => {
                        core.set_tempo(beats_per_minute);
                        if deadline.is_some() {
                            deadline = Some(last_fire + core.interval());
                        }
                        log::info!("Clock tempo set to {} BPM", beats_per_minute);
                    }
                    GeneratorCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                    GeneratorCommand::Shutdown => break,
                }
            }
            recv(timer) -> _ => {
                core.tick();
                let now = Instant::now();
                let interval = core.interval();
                let mut next = deadline.unwrap_or(now) + interval;
                // Fell more than a tick behind: resynchronise instead of bursting
                if next + interval < now {
                    log::warn!("Clock timer late, resynchronising at tick {}", core.tick_count());
                    next = now + interval;
                }
                last_fire = now;
                deadline = Some(next);
            }
        }
    }

    log::debug!("Clock generator context finished at tick {}", core.tick_count());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Receiver, Sender};

    /// Records every message, optionally failing every send
    struct RecordingSink {
        sent: Vec<TimedMessage>,
        fail: bool,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                sent: Vec::new(),
                fail: false,
            }
        }

        fn messages(&self) -> Vec<RealTimeMessage> {
            self.sent.iter().map(|m| m.message).collect()
        }
    }

    impl ClockSink for RecordingSink {
        fn send(&mut self, message: TimedMessage) -> ClockResult<()> {
            if self.fail {
                return Err(ClockError::Send("port gone".to_string()));
            }
            self.sent.push(message);
            Ok(())
        }
    }

    #[test]
    fn test_nanos_per_tick() {
        // 120 BPM: 0.5 s per beat / 480
        assert_eq!(nanos_per_tick(120), 1_041_666);
        assert_eq!(nanos_per_tick(60), 2_083_333);
    }

    #[test]
    fn test_start_then_stop() {
        let mut core = GeneratorCore::new(RecordingSink::new(), 120);
        assert!(core.start());
        assert!(core.stop());
        assert_eq!(
            core.sink().messages(),
            vec![RealTimeMessage::Start, RealTimeMessage::Stop]
        );
        assert!(!core.is_running());
        assert!(!core.is_paused());
    }

    #[test]
    fn test_ticks_are_timestamped() {
        let mut core = GeneratorCore::new(RecordingSink::new(), 120);
        core.tick();
        assert_eq!(core.tick_count(), 0);

        core.start();
        core.tick();
        core.tick();
        let clocks: Vec<u64> = core
            .sink()
            .sent
            .iter()
            .filter(|m| m.message == RealTimeMessage::Clock)
            .map(|m| m.timestamp)
            .collect();
        assert_eq!(clocks, vec![1, 2]);
    }

    #[test]
    fn test_pause_resume_and_reset() {
        let mut core = GeneratorCore::new(RecordingSink::new(), 120);
        assert!(!core.resume());

        core.start();
        core.tick();
        core.tick();
        core.stop();
        assert!(core.is_paused());
        assert_eq!(core.tick_count(), 2);

        assert!(!core.stop());
        assert!(core.resume());
        core.tick();
        assert_eq!(core.tick_count(), 3);
        assert!(!core.reset());
        assert!(!core.start());

        core.stop();
        assert!(core.reset());
        assert_eq!(core.tick_count(), 0);
        assert!(!core.is_paused());

        assert_eq!(
            core.sink().messages(),
            vec![
                RealTimeMessage::Start,
                RealTimeMessage::Clock,
                RealTimeMessage::Clock,
                RealTimeMessage::Stop,
                RealTimeMessage::Continue,
                RealTimeMessage::Clock,
                RealTimeMessage::Stop,
            ]
        );
    }

    #[test]
    fn test_start_from_paused_restarts_at_zero() {
        let mut core = GeneratorCore::new(RecordingSink::new(), 120);
        core.start();
        core.tick();
        core.stop();
        assert!(core.start());
        assert_eq!(core.tick_count(), 0);
    }

    #[test]
    fn test_tempo_change_keeps_count() {
        let mut core = GeneratorCore::new(RecordingSink::new(), 120);
        core.start();
        core.tick();
        core.set_tempo(60);
        assert_eq!(core.tick_count(), 1);
        assert_eq!(core.nanos_per_tick(), 2_083_333);
        assert_eq!(core.status().beats_per_minute(), 60);
    }

    #[test]
    fn test_send_failures_do_not_stop_the_clock() {
        let mut sink = RecordingSink::new();
        sink.fail = true;
        let mut core = GeneratorCore::new(sink, 120);
        assert!(core.start());
        core.tick();
        core.tick();
        assert!(core.is_running());
        assert_eq!(core.tick_count(), 2);
    }

    #[test]
    fn test_status_mirrors_core() {
        let mut core = GeneratorCore::new(RecordingSink::new(), 120);
        let status = core.status();
        core.start();
        core.tick();
        assert!(status.is_running());
        assert_eq!(status.tick_count(), 1);
        core.stop();
        assert!(status.is_paused());
    }

    fn channel_generator(bpm: u32) -> (ClockGenerator, Receiver<TimedMessage>) {
        let (tx, rx): (Sender<TimedMessage>, _) = crossbeam_channel::unbounded();
        (ClockGenerator::new(tx, bpm).unwrap(), rx)
    }

    #[test]
    fn test_threaded_start_stop() {
        let (generator, rx) = channel_generator(120);
        generator.start().unwrap();
        generator.stop().unwrap();
        generator.flush().unwrap();

        assert!(!generator.is_running());
        let control: Vec<RealTimeMessage> = rx
            .try_iter()
            .map(|m| m.message)
            .filter(|m| *m != RealTimeMessage::Clock)
            .collect();
        assert_eq!(control, vec![RealTimeMessage::Start, RealTimeMessage::Stop]);
    }

    #[test]
    fn test_threaded_ticks_arrive() {
        // 600 BPM: about 0.2 ms per tick
        let (generator, rx) = channel_generator(600);
        generator.start().unwrap();

        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.message, RealTimeMessage::Start);
        for expected in 1..=5 {
            let clock = rx.recv_timeout(Duration::from_secs(1)).unwrap();
            assert_eq!(clock.message, RealTimeMessage::Clock);
            assert_eq!(clock.timestamp, expected);
        }

        generator.stop().unwrap();
        generator.flush().unwrap();
        assert!(generator.is_paused());
        let paused_at = generator.tick_count();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(generator.tick_count(), paused_at);
    }

    #[test]
    fn test_threaded_tempo_change_rearms_timer() {
        let (generator, rx) = channel_generator(600);
        generator.start().unwrap();
        for _ in 0..=5 {
            rx.recv_timeout(Duration::from_secs(1)).unwrap();
        }

        // 1 BPM: 125 ms per tick
        generator.set_tempo(1).unwrap();
        generator.flush().unwrap();
        assert_eq!(generator.beats_per_minute(), 1);
        let slowed_at = generator.tick_count();
        thread::sleep(Duration::from_millis(40));
        assert!(generator.tick_count() <= slowed_at + 1);

        generator.set_tempo(600).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while generator.tick_count() < slowed_at + 20 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        generator.stop().unwrap();
        generator.flush().unwrap();
        assert!(generator.tick_count() >= slowed_at + 20);

        // The counter never skips across the tempo changes
        let clocks: Vec<u64> = rx
            .try_iter()
            .filter(|m| m.message == RealTimeMessage::Clock)
            .map(|m| m.timestamp)
            .collect();
        assert_eq!(clocks.first(), Some(&6));
        assert!(clocks.windows(2).all(|pair| pair[1] == pair[0] + 1));
        assert_eq!(clocks.last(), Some(&generator.tick_count()));
    }
}
