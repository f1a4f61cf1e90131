//! Deterministic doubles for unit tests.

use super::error_model::{TbStats, TransportBlockErrorModel};
use super::scheduler::{EventId, PhyEvent, Scheduler};
use super::spectrum::SpectrumValue;
use super::time::SimTime;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScheduledEvent {
    pub(crate) id: EventId,
    pub(crate) at: SimTime,
    pub(crate) event: PhyEvent,
}

/// Manual clock that records what the PHY schedules and cancels.
#[derive(Debug, Default)]
pub(crate) struct FakeScheduler {
    now: SimTime,
    next_id: u64,
    pub(crate) scheduled: Vec<ScheduledEvent>,
    pub(crate) cancelled: Vec<EventId>,
}

impl FakeScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_now(&mut self, t: SimTime) {
        self.now = t;
    }

    /// Scheduled events that have not been cancelled, in scheduling order.
    pub(crate) fn pending(&self) -> Vec<&ScheduledEvent> {
        self.scheduled.iter().filter(|e| !self.cancelled.contains(&e.id)).collect()
    }

    pub(crate) fn last(&self) -> Option<&ScheduledEvent> {
        self.scheduled.last()
    }
}

impl Scheduler for FakeScheduler {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule(&mut self, delay: SimTime, event: PhyEvent) -> EventId {
        let id = EventId::from_raw(self.next_id);
        self.next_id += 1;
        self.scheduled.push(ScheduledEvent {
            id,
            at: self.now + delay,
            event,
        });
        id
    }

    fn cancel(&mut self, id: EventId) {
        self.cancelled.push(id);
    }
}

/// Error model returning a fixed BLER regardless of SINR.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixedBler(pub(crate) f64);

impl TransportBlockErrorModel for FixedBler {
    fn tb_decodification_stats(&self, _sinr: &SpectrumValue, _rb_map: &[usize], _size_bits: u32, _mcs: u8, _harq_mi: &[f64]) -> TbStats {
        TbStats { tbler: self.0, mi_total: 1.0 - self.0 }
    }
}
