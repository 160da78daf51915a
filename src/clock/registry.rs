// Callback registries - Exact-time and predicated callbacks for the synchronizer

use std::collections::{BTreeMap, HashMap};

use crate::sequencer::timeline::{BarBeatTime, Units};

/// Callback fired with the time it became due at
pub type TimeCallback = Box<dyn FnMut(&BarBeatTime) + Send>;

/// Condition over the current time
pub type TimePredicate = Box<dyn Fn(&BarBeatTime) -> bool + Send>;

/// Identifies one registration; ids grow in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

/// Callbacks keyed by the exact time they are due at
#[derive(Default)]
pub struct ExactRegistry {
    by_time: BTreeMap<BarBeatTime, BTreeMap<SubscriberId, TimeCallback>>,
    times: HashMap<SubscriberId, BarBeatTime>,
}

impl ExactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` at `time`, replacing a previous registration of `id`
    pub fn insert(&mut self, id: SubscriberId, time: BarBeatTime, callback: TimeCallback) {
        self.remove(id);
        self.by_time.entry(time).or_default().insert(id, callback);
        self.times.insert(id, time);
    }

    pub fn remove(&mut self, id: SubscriberId) -> bool {
        let Some(time) = self.times.remove(&id) else {
            return false;
        };
        if let Some(callbacks) = self.by_time.get_mut(&time) {
            callbacks.remove(&id);
            if callbacks.is_empty() {
                self.by_time.remove(&time);
            }
        }
        true
    }

    /// Invokes every callback registered at `time`, in registration order
    pub fn fire(&mut self, time: &BarBeatTime) -> usize {
        match self.by_time.get_mut(time) {
            Some(callbacks) => {
                for callback in callbacks.values_mut() {
                    callback(time);
                }
                callbacks.len()
            }
            None => 0,
        }
    }

    /// Re-expresses every registered time in `units`, keeping registration order
    pub fn rebase(&mut self, units: Units) {
        let by_time = std::mem::take(&mut self.by_time);
        for (time, callbacks) in by_time {
            let time = time.with_units(units);
            for (id, callback) in callbacks {
                self.by_time.entry(time).or_default().insert(id, callback);
                self.times.insert(id, time);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Callbacks fired whenever their predicate holds
#[derive(Default)]
pub struct PredicateRegistry {
    entries: BTreeMap<SubscriberId, (TimePredicate, TimeCallback)>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: SubscriberId, predicate: TimePredicate, callback: TimeCallback) {
        self.entries.insert(id, (predicate, callback));
    }

    pub fn remove(&mut self, id: SubscriberId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Evaluates every predicate against `time`, in registration order
    pub fn fire(&mut self, time: &BarBeatTime) -> usize {
        let mut fired = 0;
        for (predicate, callback) in self.entries.values_mut() {
            if predicate(time) {
                callback(time);
                fired += 1;
            }
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
