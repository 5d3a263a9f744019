//! Per-session state store with copy-on-write snapshots.
//!
//! A render pass holds a [`Snapshot`] for its whole duration. Writes never touch
//! a snapshot that was already handed out: every `set` builds a new map, so
//! `Snapshot::ptr_eq` tells consumers whether anything changed in between.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::Value;

pub type StateMap = IndexMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot(Rc<StateMap>);

impl Snapshot {
    pub fn new(state: StateMap) -> Self {
        Self(Rc::new(state))
    }

    pub fn map(&self) -> &StateMap {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&Snapshot)>;

pub struct StateStore {
    snapshot: Snapshot,
    revision: u64,
    dirty: bool,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl StateStore {
    pub fn seeded(state: StateMap) -> Self {
        Self {
            snapshot: Snapshot::new(state),
            revision: 0,
            dirty: false,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Absent keys read as `None`; callers supply their own fallback.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.snapshot.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let mut next = StateMap::clone(self.snapshot.map());
        next.insert(key.into(), value.into());
        self.snapshot = Snapshot::new(next);
        self.revision += 1;
        self.dirty = true;
    }

    /// Swaps in a whole new state. Nothing of the previous map survives.
    pub fn replace(&mut self, state: StateMap) {
        self.snapshot = Snapshot::new(state);
        self.revision += 1;
        self.dirty = true;
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.clone()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&Snapshot) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Notifies every listener once with the latest snapshot if anything was
    /// written since the previous flush.
    pub fn flush(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.dirty = false;
        let snapshot = self.snapshot.clone();
        for (_, listener) in &mut self.listeners {
            listener(&snapshot);
        }
        true
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("state", self.snapshot.map())
            .field("revision", &self.revision)
            .field("dirty", &self.dirty)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
