// Communication channels into the two serial contexts

use crate::messaging::command::{GeneratorCommand, SyncCommand};
use crate::midi::event::TimedMessage;
use crossbeam_channel::{Receiver, Sender};

pub type GeneratorSender = Sender<GeneratorCommand>;
pub type GeneratorReceiver = Receiver<GeneratorCommand>;

/// Control requests are rare, the generator queue is unbounded
pub fn create_generator_channel() -> (GeneratorSender, GeneratorReceiver) {
    crossbeam_channel::unbounded()
}

pub type SyncSender = Sender<SyncCommand>;
pub type SyncReceiver = Receiver<SyncCommand>;

/// Registrations and control requests for the synchronizer
///
/// Unbounded: callbacks running on the synchronizer context may send here.
pub fn create_sync_channel() -> (SyncSender, SyncReceiver) {
    crossbeam_channel::unbounded()
}

pub type WireSender = Sender<TimedMessage>;
pub type WireReceiver = Receiver<TimedMessage>;

/// Incoming clock bytes; bounded so a flood cannot grow memory without limit
pub fn create_wire_channel(capacity: usize) -> (WireSender, WireReceiver) {
    assert!(capacity > 0, "Wire queue capacity must be > 0");
    crossbeam_channel::bounded(capacity)
}
