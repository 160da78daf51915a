// Time synchronizer - Follows an incoming MIDI clock one subbeat per pulse
// and dispatches time callbacks on its own serial context

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{TrySendError, select};

use crate::clock::registry::{
    ExactRegistry, PredicateRegistry, SubscriberId, TimeCallback, TimePredicate,
};
use crate::error::{ClockError, ClockResult};
use crate::messaging::channels::{
    SyncReceiver, SyncSender, WireReceiver, WireSender, create_sync_channel, create_wire_channel,
};
use crate::messaging::command::SyncCommand;
use crate::midi::event::{RealTimeMessage, TimedMessage};
use crate::midi::input::MidiClockInput;
use crate::midi::output::ClockSink;
use crate::sequencer::timeline::{BarBeatTime, Units};

/// Default capacity of the incoming clock queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Current time, the two callback registries and the suppression flag.
///
/// Every mutation of the time runs the dispatch once: exact-time callbacks
/// first, then predicated ones, each in registration order.
pub struct SyncCore {
    current: BarBeatTime,
    exact: ExactRegistry,
    predicated: PredicateRegistry,
    suppressed: bool,
}

impl SyncCore {
    pub fn new(units: Units) -> Self {
        Self {
            current: BarBeatTime::zero(units),
            exact: ExactRegistry::new(),
            predicated: PredicateRegistry::new(),
            suppressed: false,
        }
    }

    pub fn current(&self) -> BarBeatTime {
        self.current
    }

    /// Applies one wire message
    pub fn handle_message(&mut self, message: RealTimeMessage) {
        match message {
            RealTimeMessage::Clock => {
                let units = self.current.units();
                self.current = self.current + BarBeatTime::from_ticks(1, units);
                self.dispatch();
            }
            RealTimeMessage::Start => {
                self.current = BarBeatTime::zero(self.current.units());
                log::debug!("Sync start, time reset to zero");
                self.dispatch();
            }
            RealTimeMessage::Continue | RealTimeMessage::Stop => {
                log::debug!("Sync received {:?} at {}", message, self.current);
            }
        }
    }

    /// Fires the callbacks due at the current time, unless suppressed
    pub fn dispatch(&mut self) -> usize {
        if self.suppressed {
            return 0;
        }
        let time = self.current;
        self.exact.fire(&time) + self.predicated.fire(&time)
    }

    /// Registers `callback` at `time`, re-expressed in the current units
    pub fn subscribe_at(&mut self, id: SubscriberId, time: BarBeatTime, callback: TimeCallback) {
        if time.is_null() {
            log::warn!("Subscription {:?} at null time ignored", id);
            return;
        }
        self.exact.insert(id, time.with_units(self.current.units()), callback);
    }

    pub fn subscribe_when(
        &mut self,
        id: SubscriberId,
        predicate: TimePredicate,
        callback: TimeCallback,
    ) {
        self.predicated.insert(id, predicate, callback);
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let removed_exact = self.exact.remove(id);
        let removed_predicated = self.predicated.remove(id);
        removed_exact || removed_predicated
    }

    pub fn set_suppressed(&mut self, suppressed: bool) {
        self.suppressed = suppressed;
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Re-expresses the current time in new units (time signature or tempo edit)
    pub fn set_units(&mut self, units: Units) {
        self.current = self.current.with_units(units);
        self.exact.rebase(units);
    }

    /// Jumps to `time`; a seek never dispatches, even at a registered time
    pub fn seek(&mut self, time: BarBeatTime) {
        if time.is_null() {
            log::warn!("Seek to null time ignored");
            return;
        }
        self.current = time.with_units(self.current.units());
    }

    pub fn subscriber_count(&self) -> usize {
        self.exact.len() + self.predicated.len()
    }
}

/// Registration token; dropping it unregisters the callback
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    commands: SyncSender,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Keeps the callback registered for the synchronizer's whole lifetime
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.active {
            let _ = self.commands.send(SyncCommand::Unsubscribe(self.id));
        }
    }
}

/// In-process wire into a synchronizer, for a generator in the same process
pub struct SyncSink {
    wire: WireSender,
}

impl ClockSink for SyncSink {
    fn send(&mut self, message: TimedMessage) -> ClockResult<()> {
        match self.wire.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ClockError::Send("sync queue full".to_string())),
            Err(TrySendError::Disconnected(_)) => Err(ClockError::ContextClosed),
        }
    }
}

/// Time synchronizer running on its own serial context.
///
/// Incoming messages, registrations and callbacks all run on that context.
/// Clock bytes arrive on a bounded wire queue; control requests on an
/// unbounded one, so callbacks may subscribe or drop subscriptions freely.
/// Each queue is handled in its own arrival order.
pub struct TimeSynchronizer {
    commands: SyncSender,
    wire: WireSender,
    current: Arc<Mutex<BarBeatTime>>,
    next_id: AtomicU64,
    input: Option<MidiClockInput>,
    thread: Option<thread::JoinHandle<()>>,
}

impl TimeSynchronizer {
    pub fn new(units: Units, queue_capacity: usize) -> ClockResult<Self> {
        let core = SyncCore::new(units);
        let current = Arc::new(Mutex::new(core.current()));
        let (commands, receiver) = create_sync_channel();
        let (wire, wire_receiver) = create_wire_channel(queue_capacity);

        let snapshot = Arc::clone(&current);
        let thread = thread::Builder::new()
            .name("time-sync".to_string())
            .spawn(move || run_synchronizer(core, receiver, wire_receiver, snapshot))
            .map_err(ClockError::ThreadSpawn)?;

        Ok(Self {
            commands,
            wire,
            current,
            next_id: AtomicU64::new(1),
            input: None,
            thread: Some(thread),
        })
    }

    /// Follows the clock of a MIDI input port, or the first one when `port` is `None`
    pub fn connect_midi_input(&mut self, port: Option<&str>) -> ClockResult<()> {
        let wire = self.wire.clone();
        let input = MidiClockInput::connect(port, move |message| {
            if let Err(TrySendError::Full(_)) = wire.try_send(message) {
                log::warn!("Sync queue full, {:?} dropped", message.message);
            }
        })?;
        // Replacing an input closes the previous port
        self.input = Some(input);
        Ok(())
    }

    /// Wire endpoint for an in-process generator
    pub fn sink(&self) -> SyncSink {
        SyncSink {
            wire: self.wire.clone(),
        }
    }

    /// Queues one wire message behind earlier control requests
    pub fn deliver(&self, message: TimedMessage) -> ClockResult<()> {
        self.dispatch(SyncCommand::Message(message))
    }

    /// Fires `callback` each time the synchronizer reaches exactly `time`
    pub fn subscribe_at<F>(&self, time: BarBeatTime, callback: F) -> ClockResult<Subscription>
    where
        F: FnMut(&BarBeatTime) + Send + 'static,
    {
        let id = self.next_subscriber_id();
        self.dispatch(SyncCommand::SubscribeAt {
            id,
            time,
            callback: Box::new(callback),
        })?;
        Ok(self.subscription(id))
    }

    /// Fires `callback` at every time for which `predicate` holds
    pub fn subscribe_when<P, F>(&self, predicate: P, callback: F) -> ClockResult<Subscription>
    where
        P: Fn(&BarBeatTime) -> bool + Send + 'static,
        F: FnMut(&BarBeatTime) + Send + 'static,
    {
        let id = self.next_subscriber_id();
        self.dispatch(SyncCommand::SubscribeWhen {
            id,
            predicate: Box::new(predicate),
            callback: Box::new(callback),
        })?;
        Ok(self.subscription(id))
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    pub fn set_suppressed(&self, suppressed: bool) -> ClockResult<()> {
        self.dispatch(SyncCommand::SetSuppressed(suppressed))
    }

    pub fn set_units(&self, units: Units) -> ClockResult<()> {
        self.dispatch(SyncCommand::SetUnits(units))
    }

    /// Jumps to `time` without firing callbacks on the way
    pub fn seek(&self, time: BarBeatTime) -> ClockResult<()> {
        self.dispatch(SyncCommand::Seek(time))
    }

    /// Latest time published by the synchronizer context
    pub fn current_time(&self) -> BarBeatTime {
        match self.current.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Blocks until every request and wire message queued before this call
    /// has been handled
    pub fn flush(&self) -> ClockResult<()> {
        let (ack, done) = crossbeam_channel::bounded(1);
        self.dispatch(SyncCommand::Flush(ack))?;
        done.recv().map_err(|_| ClockError::ContextClosed)
    }

    pub fn input_port_name(&self) -> Option<&str> {
        self.input.as_ref().map(|input| input.port_name())
    }

    fn next_subscriber_id(&self) -> SubscriberId {
        SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn subscription(&self, id: SubscriberId) -> Subscription {
        Subscription {
            id,
            commands: self.commands.clone(),
            active: true,
        }
    }

    fn dispatch(&self, command: SyncCommand) -> ClockResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ClockError::ContextClosed)
    }
}

impl Drop for TimeSynchronizer {
    fn drop(&mut self) {
        // Close the port first so no message arrives after shutdown
        self.input.take();
        let _ = self.commands.send(SyncCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Time synchronizer thread panicked");
            }
        }
    }
}

fn run_synchronizer(
    mut core: SyncCore,
    commands: SyncReceiver,
    wire: WireReceiver,
    snapshot: Arc<Mutex<BarBeatTime>>,
) {
    loop {
        select! {
            recv(commands) -> command => {
                let Ok(command) = command else { break };
                match command {
                    SyncCommand::Message(message) => core.handle_message(message.message),
                    SyncCommand::SubscribeAt { id, time, callback } => {
                        core.subscribe_at(id, time, callback)
                    }
                    SyncCommand::SubscribeWhen {
                        id,
                        predicate,
                        callback,
                    } => core.subscribe_when(id, predicate, callback),
                    SyncCommand::Unsubscribe(id) => {
                        core.unsubscribe(id);
                    }
                    SyncCommand::SetSuppressed(suppressed) => core.set_suppressed(suppressed),
                    SyncCommand::SetUnits(units) => core.set_units(units),
                    SyncCommand::Seek(time) => core.seek(time),
                    SyncCommand::Flush(ack) => {
                        // Wire messages sent before the flush are already queued
                        for message in wire.try_iter() {
                            core.handle_message(message.message);
                        }
                        publish(&snapshot, &core);
                        let _ = ack.send(());
                    }
                    SyncCommand::Shutdown => break,
                }
            }
            recv(wire) -> message => {
                let Ok(message) = message else { break };
                core.handle_message(message.message);
            }
        }
        publish(&snapshot, &core);
    }

    log::debug!("Time synchronizer context finished at {}", core.current().to_raw_string());
}

fn publish(snapshot: &Mutex<BarBeatTime>, core: &SyncCore) {
    if let Ok(mut current) = snapshot.lock() {
        *current = core.current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Arc<Mutex<Vec<BarBeatTime>>>, impl FnMut(&BarBeatTime) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |t: &BarBeatTime| sink.lock().unwrap().push(*t))
    }

    fn pulses(core: &mut SyncCore, count: usize) {
        for _ in 0..count {
            core.handle_message(RealTimeMessage::Clock);
        }
    }

    #[test]
    fn test_one_beat_of_pulses() {
        let mut core = SyncCore::new(Units::default());
        pulses(&mut core, 480);
        let now = core.current();
        assert_eq!((now.bar(), now.beat(), now.subbeat()), (0, 1, 0));
    }

    #[test]
    fn test_exact_callback_fires_once() {
        let mut core = SyncCore::new(Units::default());
        let (seen, callback) = counter();
        let target = BarBeatTime::new(1, 0, 0, Units::default(), false);
        core.subscribe_at(SubscriberId(1), target, Box::new(callback));

        pulses(&mut core, 1920 + 500);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], target);
        assert_eq!(seen[0].ticks(), 1920);
    }

    #[test]
    fn test_start_resets_and_fires_zero() {
        let mut core = SyncCore::new(Units::default());
        let (seen, callback) = counter();
        core.subscribe_at(SubscriberId(1), BarBeatTime::default(), Box::new(callback));

        pulses(&mut core, 100);
        core.handle_message(RealTimeMessage::Start);
        assert!(core.current().is_zero());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_continue_and_stop_keep_time() {
        let mut core = SyncCore::new(Units::default());
        pulses(&mut core, 10);
        core.handle_message(RealTimeMessage::Stop);
        core.handle_message(RealTimeMessage::Continue);
        assert_eq!(core.current().ticks(), 10);
    }

    #[test]
    fn test_predicate_sees_every_step() {
        let mut core = SyncCore::new(Units::default());
        let (seen, callback) = counter();
        core.subscribe_when(
            SubscriberId(1),
            Box::new(|t: &BarBeatTime| t.subbeat() == 0),
            Box::new(callback),
        );
        pulses(&mut core, 480 * 4);
        let beats: Vec<u32> = seen.lock().unwrap().iter().map(|t| t.beat()).collect();
        assert_eq!(beats, vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_exact_before_predicated() {
        let mut core = SyncCore::new(Units::default());
        let order = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&order), Arc::clone(&order));
        core.subscribe_when(
            SubscriberId(1),
            Box::new(|_: &BarBeatTime| true),
            Box::new(move |_: &BarBeatTime| a.lock().unwrap().push("predicated")),
        );
        core.subscribe_at(
            SubscriberId(2),
            BarBeatTime::from_ticks(1, Units::default()),
            Box::new(move |_: &BarBeatTime| b.lock().unwrap().push("exact")),
        );
        core.handle_message(RealTimeMessage::Clock);
        assert_eq!(*order.lock().unwrap(), vec!["exact", "predicated"]);
    }

    #[test]
    fn test_suppression_skips_dispatch() {
        let mut core = SyncCore::new(Units::default());
        let (seen, callback) = counter();
        core.subscribe_when(SubscriberId(1), Box::new(|_: &BarBeatTime| true), Box::new(callback));

        core.set_suppressed(true);
        pulses(&mut core, 5);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(core.current().ticks(), 5);
        assert_eq!(core.subscriber_count(), 1);

        core.set_suppressed(false);
        pulses(&mut core, 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_seek_does_not_fire() {
        let mut core = SyncCore::new(Units::default());
        let (seen, callback) = counter();
        let target = BarBeatTime::parse("2:0.0").unwrap();
        core.subscribe_at(SubscriberId(1), target, Box::new(callback));

        core.seek(target);
        assert_eq!(core.current(), target);
        assert!(seen.lock().unwrap().is_empty());
        assert!(!core.is_suppressed());

        core.seek(BarBeatTime::null());
        assert_eq!(core.current(), target);

        // Seeking leaves the suppression flag as it was
        core.set_suppressed(true);
        core.seek(BarBeatTime::default());
        assert!(core.is_suppressed());
        assert!(core.current().is_zero());
    }

    #[test]
    fn test_unsubscribe() {
        let mut core = SyncCore::new(Units::default());
        let (seen, callback) = counter();
        core.subscribe_when(SubscriberId(7), Box::new(|_: &BarBeatTime| true), Box::new(callback));
        assert!(core.unsubscribe(SubscriberId(7)));
        assert!(!core.unsubscribe(SubscriberId(7)));
        pulses(&mut core, 3);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_set_units_rescales_current_time() {
        let mut core = SyncCore::new(Units::default());
        pulses(&mut core, 480 * 5);
        core.set_units(Units::new(3, 120, 960));
        let now = core.current();
        assert_eq!(now.beats(), 5);
        assert_eq!((now.bar(), now.beat()), (1, 2));

        // Pulses now advance at the new resolution
        pulses(&mut core, 960);
        assert_eq!(core.current().beats(), 6);
    }

    #[test]
    fn test_threaded_delivery_and_subscription() {
        let synchronizer = TimeSynchronizer::new(Units::default(), 64).unwrap();
        let (seen, callback) = counter();
        let subscription = synchronizer
            .subscribe_at(BarBeatTime::from_ticks(3, Units::default()), callback)
            .unwrap();

        for tick in 1..=5 {
            synchronizer
                .deliver(TimedMessage::new(RealTimeMessage::Clock, tick))
                .unwrap();
        }
        synchronizer.flush().unwrap();
        assert_eq!(synchronizer.current_time().ticks(), 5);
        assert_eq!(seen.lock().unwrap().len(), 1);

        synchronizer.unsubscribe(subscription);
        synchronizer
            .deliver(TimedMessage::new(RealTimeMessage::Start, 0))
            .unwrap();
        synchronizer.seek(BarBeatTime::from_ticks(2, Units::default())).unwrap();
        for tick in 1..=2 {
            synchronizer
                .deliver(TimedMessage::new(RealTimeMessage::Clock, tick))
                .unwrap();
        }
        synchronizer.flush().unwrap();
        assert_eq!(synchronizer.current_time().ticks(), 4);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_sink_reports_full_queue() {
        let synchronizer = TimeSynchronizer::new(Units::default(), 1).unwrap();
        let mut sink = synchronizer.sink();
        let mut failures = 0;
        for tick in 0..100 {
            if sink.send(TimedMessage::new(RealTimeMessage::Clock, tick)).is_err() {
                failures += 1;
            }
        }
        synchronizer.flush().unwrap();
        let ticks = synchronizer.current_time().ticks();
        assert_eq!(ticks + failures, 100);
    }

    #[test]
    fn test_exact_time_in_other_units() {
        let mut core = SyncCore::new(Units::default());
        let (seen, callback) = counter();
        // Bar 1 of 3/4 is three beats in
        let waltz_bar = BarBeatTime::new(1, 0, 0, Units::new(3, 120, 480), false);
        core.subscribe_at(SubscriberId(1), waltz_bar, Box::new(callback));

        pulses(&mut core, 2000);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].ticks(), 1440);
        assert_eq!(seen[0].units(), Units::default());
    }

    #[test]
    fn test_set_units_moves_registrations() {
        let mut core = SyncCore::new(Units::default());
        let (seen, callback) = counter();
        core.subscribe_at(SubscriberId(1), BarBeatTime::parse("1:0.0").unwrap(), Box::new(callback));

        let waltz = Units::new(3, 120, 480);
        core.set_units(waltz);
        pulses(&mut core, 1920 + 10);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], BarBeatTime::new(1, 1, 0, waltz, false));
    }

    #[test]
    fn test_callback_may_drop_its_subscription_under_load() {
        use std::sync::atomic::AtomicUsize;

        let synchronizer = TimeSynchronizer::new(Units::default(), 1).unwrap();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let fired = Arc::new(AtomicUsize::new(0));

        let (own, count) = (Arc::clone(&slot), Arc::clone(&fired));
        let subscription = synchronizer
            .subscribe_when(
                |_: &BarBeatTime| true,
                move |_: &BarBeatTime| {
                    count.fetch_add(1, Ordering::SeqCst);
                    own.lock().unwrap().take();
                },
            )
            .unwrap();
        *slot.lock().unwrap() = Some(subscription);
        synchronizer.flush().unwrap();

        // Keep the wire queue full while the callback unsubscribes
        let mut sink = synchronizer.sink();
        for tick in 0..500 {
            let _ = sink.send(TimedMessage::new(RealTimeMessage::Clock, tick));
        }
        synchronizer.flush().unwrap();
        let after_load = fired.load(Ordering::SeqCst);
        assert!(after_load >= 1);

        synchronizer
            .deliver(TimedMessage::new(RealTimeMessage::Clock, 500))
            .unwrap();
        synchronizer.flush().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), after_load);
        assert!(slot.lock().unwrap().is_none());
    }
}
