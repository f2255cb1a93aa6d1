//! Bounded, LRU-ordered table of in-progress flows.
//!
//! Grounded in the `LinkedHashMap` + `raw_entry_mut` idiom from the
//! teacher's own `examples/video/src/main.rs`: lookups promote the entry to
//! the back of the eviction order, and once the table is at capacity the
//! oldest entry is popped off the front. Unlike that example (which just
//! serializes and drops the evicted session), eviction here hands the
//! caller the evicted [`FlowRecord`] so it can be flushed through
//! [`FlowRecord::destroy`] if a PE was mid-reassembly.

use hashlink::linked_hash_map::RawEntryMut;
use hashlink::LinkedHashMap;

use crate::flow::key::FlowKey;
use crate::flow::record::FlowRecord;

/// Which side of a stored flow an observed packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client-to-server: matches the flow's key as stored (the SYN sender).
    ClientToServer,
    /// Server-to-client: matches the stored key's reversal.
    ServerToClient,
}

pub struct FlowTable {
    entries: LinkedHashMap<FlowKey, FlowRecord>,
    capacity: usize,
}

impl FlowTable {
    pub fn new(capacity: usize) -> Self {
        FlowTable {
            entries: LinkedHashMap::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts a newly-observed flow (keyed by its SYN-direction tuple),
    /// evicting the least-recently-used entry first if the table is full.
    /// Returns the evicted record, if any.
    pub fn insert(&mut self, key: FlowKey, record: FlowRecord) -> Option<FlowRecord> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front().map(|(_, v)| v)
        } else {
            None
        };
        self.entries.insert(key, record);
        evicted
    }

    /// Looks up the flow that `observed_key` belongs to, trying the client
    /// direction first and falling back to the reversed (server) direction.
    /// Promotes the matched entry to the back of the LRU order.
    pub fn lookup_mut(&mut self, observed_key: &FlowKey) -> Option<(&mut FlowRecord, Direction)> {
        match self.entries.raw_entry_mut().from_key(observed_key) {
            RawEntryMut::Occupied(mut occupied) => {
                occupied.to_back();
                return Some((occupied.into_mut(), Direction::ClientToServer));
            }
            RawEntryMut::Vacant(_) => {}
        }

        let reversed = observed_key.reversed();
        match self.entries.raw_entry_mut().from_key(&reversed) {
            RawEntryMut::Occupied(mut occupied) => {
                occupied.to_back();
                Some((occupied.into_mut(), Direction::ServerToClient))
            }
            RawEntryMut::Vacant(_) => None,
        }
    }

    /// Removes a flow outright (FIN/RST close or abandonment), returning it
    /// if present under `key` or its reversal.
    pub fn remove(&mut self, key: &FlowKey) -> Option<FlowRecord> {
        if let Some(record) = self.entries.remove(key) {
            return Some(record);
        }
        self.entries.remove(&key.reversed())
    }

    /// Drains every remaining flow, e.g. at shutdown, so each can be run
    /// through [`FlowRecord::destroy`] and flushed if mid-PE.
    pub fn drain(&mut self) -> impl Iterator<Item = FlowRecord> + '_ {
        std::iter::from_fn(move || self.entries.pop_front().map(|(_, v)| v))
    }
}
