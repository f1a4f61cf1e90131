//! Discrete-event scheduling.
//!
//! The PHY never talks to a global event loop. It receives a [`Scheduler`]
//! capability on every call that may need to schedule or cancel something,
//! which lets unit tests drive it with a fake clock.
//!
//! [`EventQueue`] is the timeline used by the simulation driver:
//! - events are ordered by due time, then by scheduling order
//! - every scheduled event gets an [`EventId`] and can be cancelled
//! - cancelled events never fire

use super::time::SimTime;
use super::types::PacketBurst;
use std::collections::{BTreeMap, HashMap};

/// Handle of a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        EventId(raw)
    }
}

/// Data handed from the slot scheduler to the transmit path 1 ns after the
/// slot boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTransmission {
    pub burst: PacketBurst,
    pub duration: SimTime,
    pub slot_index: u64,
    pub mcs: u8,
    pub tb_size_bits: u32,
    pub rb_bitmap: Vec<usize>,
}

/// Events a single device's PHY schedules for itself.
#[derive(Debug, Clone, PartialEq)]
pub enum PhyEvent {
    StartSlot(u64),
    SendDataChannels(DataTransmission),
    EndTransmit,
    EndReceiveData,
    EndReceiveControl,
}

/// Scheduling capability injected into the PHY.
pub trait Scheduler {
    /// Current simulated time.
    fn now(&self) -> SimTime;

    /// Schedule `event` to fire after `delay`.
    fn schedule(&mut self, delay: SimTime, event: PhyEvent) -> EventId;

    /// Cancel a pending event. Cancelling an event that already fired or was
    /// already cancelled is a no-op.
    fn cancel(&mut self, id: EventId);
}

/// Ordered timeline of pending events.
pub struct EventQueue<E> {
    now: SimTime,
    next_id: u64,
    events: BTreeMap<(SimTime, EventId), E>,
    // id -> due time, for cancellation
    pending: HashMap<EventId, SimTime>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        EventQueue {
            now: SimTime::ZERO,
            next_id: 0,
            events: BTreeMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule at an absolute time. Times in the past are clamped to now.
    pub fn schedule_at(&mut self, at: SimTime, event: E) -> EventId {
        let at = at.max(self.now);
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.events.insert((at, id), event);
        self.pending.insert(id, at);
        id
    }

    pub fn schedule_in(&mut self, delay: SimTime, event: E) -> EventId {
        self.schedule_at(self.now + delay, event)
    }

    /// Returns `true` if the event was still pending.
    pub fn cancel(&mut self, id: EventId) -> bool {
        match self.pending.remove(&id) {
            Some(at) => self.events.remove(&(at, id)).is_some(),
            None => false,
        }
    }

    /// Pop the next due event and advance the clock to its time.
    pub fn pop(&mut self) -> Option<(SimTime, E)> {
        let ((at, id), event) = self.events.pop_first()?;
        self.pending.remove(&id);
        self.now = at;
        Some((at, event))
    }

    pub fn peek_time(&self) -> Option<SimTime> {
        self.events.keys().next().map(|(at, _)| *at)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
