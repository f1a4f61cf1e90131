//! Minimal sidelink MAC.
//!
//! Devices share a fixed scheduling pattern that repeats every subframe: slot
//! `i` of each subframe belongs to at most one device. On its own slots a MAC
//! hands one burst to the PHY: every queued packet that shares the destination
//! of the oldest one, tagged with the sender's RNTI and the slot address.

use super::error::{PhyError, PhyResult};
use super::phy::PhySapUser;
use super::types::{MacPduTag, Packet, PacketBurst, Rnti, SfnSf};
use std::collections::VecDeque;

/// Assign slot `i` of every subframe to the `i`-th device.
///
/// # Errors
///
/// `InvalidConfiguration` if there are more devices than slots per subframe.
pub fn build_scheduling_pattern(devices: &[Rnti], slots_per_subframe: u32) -> PhyResult<Vec<Option<Rnti>>> {
    if devices.len() > slots_per_subframe as usize {
        return Err(PhyError::InvalidConfiguration(format!(
            "too many devices: {} devices for {} slots per subframe",
            devices.len(),
            slots_per_subframe
        )));
    }
    let mut pattern = vec![None; slots_per_subframe as usize];
    for (slot, rnti) in devices.iter().enumerate() {
        log::debug!("slot {} assigned to rnti {}", slot, rnti);
        pattern[slot] = Some(*rnti);
    }
    Ok(pattern)
}

pub struct SidelinkMac {
    rnti: Rnti,
    sf_allocation: Vec<Option<Rnti>>,
    tx_buffer: VecDeque<Packet>,
    symbols_per_slot: u8,
}

impl SidelinkMac {
    pub fn new(rnti: Rnti, symbols_per_slot: u8) -> Self {
        SidelinkMac {
            rnti,
            sf_allocation: Vec::new(),
            tx_buffer: VecDeque::new(),
            symbols_per_slot,
        }
    }

    pub fn rnti(&self) -> Rnti {
        self.rnti
    }

    pub fn set_sf_allocation_info(&mut self, pattern: Vec<Option<Rnti>>) {
        self.sf_allocation = pattern;
    }

    pub fn sf_allocation_info(&self) -> &[Option<Rnti>] {
        &self.sf_allocation
    }

    /// Queue an application packet for `destination` (`None` broadcasts).
    pub fn enqueue(&mut self, payload: Vec<u8>, destination: Option<Rnti>) {
        self.tx_buffer.push_back(Packet::new(payload).with_destination(destination));
    }

    pub fn queued_packets(&self) -> usize {
        self.tx_buffer.len()
    }

    fn owns_slot(&self, sfn: SfnSf) -> bool {
        self.sf_allocation.get(sfn.slot as usize).copied().flatten() == Some(self.rnti)
    }
}

impl PhySapUser for SidelinkMac {
    fn slot_indication(&mut self, _slot_index: u64, sfn: SfnSf) -> Option<PacketBurst> {
        if !self.owns_slot(sfn) {
            return None;
        }
        let destination = self.tx_buffer.front()?.destination;
        let tag = MacPduTag {
            sfn,
            sym_start: 0,
            num_sym: self.symbols_per_slot,
        };

        let mut burst = PacketBurst::new();
        let mut remaining = VecDeque::with_capacity(self.tx_buffer.len());
        for packet in self.tx_buffer.drain(..) {
            if packet.destination == destination {
                burst.push(packet.with_bearer(self.rnti).with_pdu_tag(tag));
            } else {
                remaining.push_back(packet);
            }
        }
        self.tx_buffer = remaining;
        Some(burst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: u8) -> SfnSf {
        SfnSf { frame: 0, subframe: 0, slot: n }
    }

    #[test]
    fn pattern_assigns_one_slot_per_device() {
        let p = build_scheduling_pattern(&[5, 9], 4).unwrap();
        assert_eq!(p, vec![Some(5), Some(9), None, None]);
    }

    #[test]
    fn too_many_devices_is_rejected() {
        assert!(matches!(build_scheduling_pattern(&[1, 2, 3, 4, 5], 4), Err(PhyError::InvalidConfiguration(_))));
    }

    #[test]
    fn mac_only_sends_on_its_own_slot() {
        let mut mac = SidelinkMac::new(9, 14);
        mac.set_sf_allocation_info(build_scheduling_pattern(&[5, 9], 4).unwrap());
        mac.enqueue(vec![1; 10], Some(5));
        assert!(mac.slot_indication(0, slot(0)).is_none());
        let burst = mac.slot_indication(1, slot(1)).unwrap();
        assert_eq!(burst.len(), 1);
        let p = &burst.packets()[0];
        assert_eq!(p.bearer.map(|b| b.rnti), Some(9));
        assert_eq!(p.pdu.map(|t| t.sfn), Some(slot(1)));
        assert_eq!(p.pdu.map(|t| t.num_sym), Some(14));
        assert_eq!(mac.queued_packets(), 0);
    }

    #[test]
    fn burst_groups_packets_by_destination_of_oldest() {
        let mut mac = SidelinkMac::new(1, 14);
        mac.set_sf_allocation_info(vec![Some(1)]);
        mac.enqueue(vec![1], Some(2));
        mac.enqueue(vec![2], Some(3));
        mac.enqueue(vec![3], Some(2));

        let first = mac.slot_indication(0, slot(0)).unwrap();
        let payloads: Vec<u8> = first.packets().iter().map(|p| p.payload[0]).collect();
        assert_eq!(payloads, vec![1, 3]);
        assert_eq!(mac.queued_packets(), 1);

        let second = mac.slot_indication(1, slot(0)).unwrap();
        assert_eq!(second.packets()[0].destination, Some(3));
        assert!(mac.slot_indication(2, slot(0)).is_none());
    }
}
