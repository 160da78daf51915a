// Clock module
// Generator emits the MIDI clock, synchronizer follows one and fires time callbacks

pub mod generator;
pub mod registry;
pub mod synchronizer;

pub use generator::{ClockGenerator, ClockStatus, GeneratorCore, TICKS_PER_BEAT};
pub use registry::{SubscriberId, TimeCallback, TimePredicate};
pub use synchronizer::{Subscription, SyncCore, SyncSink, TimeSynchronizer};
