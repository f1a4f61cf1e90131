//! Sidelink PHY: the slot clock in front of one spectrum PHY.
//!
//! Every slot period the PHY:
//! 1. gives the MAC its slot indication (the MAC may hand over a burst),
//! 2. if a burst is queued, builds the transmit PSD over all chunks, dequeues
//!    the oldest burst and schedules the transmission 1 ns later so it runs
//!    after everything else due at the slot boundary,
//! 3. schedules the next slot exactly one slot period later.
//!
//! The slot counter never stalls: an empty queue only skips the transmission.

use super::config::PhyMacConfig;
use super::error::{PhyError, PhyResult};
use super::error_model::MAX_MCS;
use super::scheduler::{DataTransmission, EventId, PhyEvent, Scheduler};
use super::signal::SignalParameters;
use super::signal_calculations::{noise_power_spectral_density, tx_power_spectral_density};
use super::spectrum_phy::{RxWindowSummary, SidelinkSpectrumPhy};
use super::time::SimTime;
use super::types::{ControlMessage, ExpectedTransportBlock, PacketBurst, Rnti, SfnSf, SidelinkControlInfo};
use log::{debug, trace};
use std::collections::{BTreeSet, VecDeque};

pub const DEFAULT_TX_POWER_DBM: f64 = 30.0;
pub const DEFAULT_NOISE_FIGURE_DB: f64 = 5.0;

/// MAC side of the PHY/MAC interface.
pub trait PhySapUser {
    /// Slot indication, delivered before the PHY inspects its queue. A returned
    /// burst is queued for transmission.
    fn slot_indication(&mut self, slot_index: u64, sfn: SfnSf) -> Option<PacketBurst>;
}

pub struct SidelinkPhy {
    config: PhyMacConfig,
    spectrum_phy: SidelinkSpectrumPhy,
    tx_power_dbm: f64,
    noise_figure_db: f64,
    mcs: u8,
    packet_burst_buffer: VecDeque<PacketBurst>,
    // devices paired with this one
    peers: BTreeSet<Rnti>,
    slot_event: Option<EventId>,
    // SendDataChannels due 1 ns after the slot boundary
    pending_send: Option<EventId>,
    current_slot: u64,
}

impl SidelinkPhy {
    /// Wrap a spectrum PHY and install the noise PSD for the default noise figure.
    pub fn new(mut spectrum_phy: SidelinkSpectrumPhy, config: PhyMacConfig) -> Self {
        spectrum_phy.set_noise_power_spectral_density(noise_power_spectral_density(&config, DEFAULT_NOISE_FIGURE_DB));
        SidelinkPhy {
            config,
            spectrum_phy,
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            noise_figure_db: DEFAULT_NOISE_FIGURE_DB,
            mcs: 0,
            packet_burst_buffer: VecDeque::new(),
            peers: BTreeSet::new(),
            slot_event: None,
            pending_send: None,
            current_slot: 0,
        }
    }

    /// Schedule slot 0 at the current instant.
    pub fn start(&mut self, sched: &mut dyn Scheduler) {
        self.slot_event = Some(sched.schedule(SimTime::ZERO, PhyEvent::StartSlot(0)));
    }

    pub fn rnti(&self) -> Rnti {
        self.spectrum_phy.rnti()
    }

    pub fn config(&self) -> &PhyMacConfig {
        &self.config
    }

    pub fn spectrum_phy(&self) -> &SidelinkSpectrumPhy {
        &self.spectrum_phy
    }

    pub fn spectrum_phy_mut(&mut self) -> &mut SidelinkSpectrumPhy {
        &mut self.spectrum_phy
    }

    pub fn set_tx_power(&mut self, dbm: f64) {
        self.tx_power_dbm = dbm;
    }

    pub fn tx_power(&self) -> f64 {
        self.tx_power_dbm
    }

    /// Set the noise figure and rebuild the noise PSD of the spectrum PHY.
    pub fn set_noise_figure(&mut self, db: f64) {
        self.noise_figure_db = db;
        self.spectrum_phy.set_noise_power_spectral_density(noise_power_spectral_density(&self.config, db));
    }

    pub fn noise_figure(&self) -> f64 {
        self.noise_figure_db
    }

    pub fn set_mcs(&mut self, mcs: u8) -> PhyResult<()> {
        if mcs > MAX_MCS {
            return Err(PhyError::InvalidConfiguration(format!("mcs {} outside 0..={}", mcs, MAX_MCS)));
        }
        self.mcs = mcs;
        Ok(())
    }

    pub fn mcs(&self) -> u8 {
        self.mcs
    }

    pub fn add_packet_burst(&mut self, burst: PacketBurst) {
        self.packet_burst_buffer.push_back(burst);
    }

    pub fn queued_bursts(&self) -> usize {
        self.packet_burst_buffer.len()
    }

    /// Register a paired device; control information from unknown devices is ignored.
    pub fn add_device(&mut self, rnti: Rnti) {
        self.peers.insert(rnti);
    }

    pub fn is_paired_with(&self, rnti: Rnti) -> bool {
        self.peers.contains(&rnti)
    }

    /// Index of the last slot started.
    pub fn current_slot(&self) -> u64 {
        self.current_slot
    }

    /// Slot tick.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if the dequeued burst does not fit a transport
    /// block size.
    pub fn start_slot(&mut self, slot_index: u64, mac: &mut dyn PhySapUser, sched: &mut dyn Scheduler) -> PhyResult<()> {
        self.current_slot = slot_index;
        let sfn = self.config.sfn_sf(slot_index);
        trace!("rnti {}: slot {} ({})", self.rnti(), slot_index, sfn);

        if let Some(burst) = mac.slot_indication(slot_index, sfn) {
            self.add_packet_burst(burst);
        }
        if !self.packet_burst_buffer.is_empty() {
            self.sl_data(slot_index, sched)?;
        }
        self.slot_event = Some(sched.schedule(self.config.slot_period(), PhyEvent::StartSlot(slot_index + 1)));
        Ok(())
    }

    fn sl_data(&mut self, slot_index: u64, sched: &mut dyn Scheduler) -> PhyResult<()> {
        let rb_bitmap = self.set_sub_channels_for_transmission();
        let Some(burst) = self.packet_burst_buffer.pop_front() else {
            return Ok(());
        };
        let tb_size_bits = tb_size_bits(burst.size())?;
        debug!("rnti {}: slot {} sending burst of {} packets ({} bits)", self.rnti(), slot_index, burst.len(), tb_size_bits);
        let tx = DataTransmission {
            burst,
            duration: self.config.slot_period(),
            slot_index,
            mcs: self.mcs,
            tb_size_bits,
            rb_bitmap,
        };
        self.pending_send = Some(sched.schedule(SimTime::ONE_NANO, PhyEvent::SendDataChannels(tx)));
        Ok(())
    }

    /// Use every chunk and install the matching transmit PSD.
    fn set_sub_channels_for_transmission(&mut self) -> Vec<usize> {
        let chunks: Vec<usize> = (0..self.config.total_num_chunks()).collect();
        let psd = tx_power_spectral_density(&self.config, self.tx_power_dbm, &chunks);
        self.spectrum_phy.set_tx_power_spectral_density(psd);
        chunks
    }

    /// Hand a prepared burst to the spectrum PHY together with its SCI.
    pub fn send_data_channels(&mut self, tx: DataTransmission, sched: &mut dyn Scheduler) -> PhyResult<()> {
        self.pending_send = None;
        let destination = tx.burst.packets().first().and_then(|p| p.destination);
        let sci = SidelinkControlInfo {
            source: self.rnti(),
            destination,
            mcs: tx.mcs,
            tb_size_bits: tx.tb_size_bits,
            rb_bitmap: tx.rb_bitmap,
            ndi: 1,
            rv: 0,
            sym_start: 0,
            num_sym: self.config.symbols_per_slot as u8,
        };
        self.spectrum_phy
            .start_transmit_data(tx.burst, vec![ControlMessage::Sci(sci)], tx.duration, tx.slot_index, sched)
    }

    /// Deliver a signal from the medium.
    ///
    /// SCIs from paired devices addressed to this device register the block
    /// they announce before the spectrum PHY sees the signal.
    pub fn receive_signal(&mut self, signal: SignalParameters, sched: &mut dyn Scheduler) -> PhyResult<()> {
        let me = self.rnti();
        for msg in &signal.ctrl_msgs {
            if let ControlMessage::Sci(sci) = msg {
                if sci.is_addressed_to(me) && self.peers.contains(&sci.source) {
                    self.spectrum_phy.expect_transport_block(sci.source, ExpectedTransportBlock::from(sci));
                }
            }
        }
        self.spectrum_phy.on_signal_arrival(signal, sched)
    }

    /// Dispatch one of this device's own events.
    pub fn handle_event(&mut self, event: PhyEvent, mac: &mut dyn PhySapUser, sched: &mut dyn Scheduler) -> PhyResult<Option<RxWindowSummary>> {
        match event {
            PhyEvent::StartSlot(slot) => self.start_slot(slot, mac, sched)?,
            PhyEvent::SendDataChannels(tx) => self.send_data_channels(tx, sched)?,
            PhyEvent::EndTransmit => self.spectrum_phy.on_end_transmit(sched)?,
            PhyEvent::EndReceiveData => return self.spectrum_phy.on_end_receive_data(sched).map(Some),
            PhyEvent::EndReceiveControl => self.spectrum_phy.on_end_receive_control(sched)?,
        }
        Ok(None)
    }

    /// Stop the slot clock and reset the spectrum PHY.
    pub fn reset(&mut self, sched: &mut dyn Scheduler) {
        for event in [self.slot_event.take(), self.pending_send.take()].into_iter().flatten() {
            sched.cancel(event);
        }
        self.packet_burst_buffer.clear();
        self.spectrum_phy.reset(sched);
    }
}

/// Transport block size in bits of a burst of `bytes` bytes.
fn tb_size_bits(bytes: usize) -> PhyResult<u32> {
    bytes
        .checked_mul(8)
        .and_then(|bits| u32::try_from(bits).ok())
        .ok_or_else(|| PhyError::InvalidConfiguration(format!("burst of {} bytes exceeds the transport block size range", bytes)))
}
