// Command types - Messages into the generator and synchronizer contexts

use crossbeam_channel::Sender;

use crate::clock::registry::{SubscriberId, TimeCallback, TimePredicate};
use crate::midi::event::TimedMessage;
use crate::sequencer::timeline::{BarBeatTime, Units};

/// Requests handled on the generator context
#[derive(Debug)]
pub enum GeneratorCommand {
    Start,
    Stop,
    Resume,
    Reset,
    SetTempo(u32),
    /// Acknowledged once every earlier command has been handled
    Flush(Sender<()>),
    Shutdown,
}

/// Requests handled on the synchronizer context
pub enum SyncCommand {
    Message(TimedMessage),
    SubscribeAt {
        id: SubscriberId,
        time: BarBeatTime,
        callback: TimeCallback,
    },
    SubscribeWhen {
        id: SubscriberId,
        predicate: TimePredicate,
        callback: TimeCallback,
    },
    Unsubscribe(SubscriberId),
    SetSuppressed(bool),
    SetUnits(Units),
    Seek(BarBeatTime),
    Flush(Sender<()>),
    Shutdown,
}

impl std::fmt::Debug for SyncCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommand::Message(message) => write!(f, "Message({:?})", message),
            SyncCommand::SubscribeAt { id, time, .. } => {
                write!(f, "SubscribeAt({:?}, {})", id, time.to_raw_string())
            }
            SyncCommand::SubscribeWhen { id, .. } => write!(f, "SubscribeWhen({:?})", id),
            SyncCommand::Unsubscribe(id) => write!(f, "Unsubscribe({:?})", id),
            SyncCommand::SetSuppressed(suppressed) => write!(f, "SetSuppressed({})", suppressed),
            SyncCommand::SetUnits(units) => write!(f, "SetUnits({})", units),
            SyncCommand::Seek(time) => write!(f, "Seek({})", time.to_raw_string()),
            SyncCommand::Flush(_) => write!(f, "Flush"),
            SyncCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}
