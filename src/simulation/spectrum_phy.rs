//! Sidelink spectrum PHY: the transmit/receive state machine of one radio.
//!
//! The PHY is in exactly one [`RadioState`] at any instant:
//!
//! ```text
//!            start_transmit_*             on_end_transmit
//!   IDLE ─────────────────────▶ TX ─────────────────────▶ IDLE
//!   IDLE ──data signal──▶ RX_DATA ──on_end_receive_data──▶ IDLE
//!   IDLE ──ctrl signal──▶ RX_CTRL ──on_end_receive_control─▶ IDLE
//! ```
//!
//! Signals that arrive while a window of the same kind is open must share the
//! window's start time and duration; they are merged into the window. Any other
//! overlap is a scheduling bug and is returned as a [`PhyError`], which the
//! simulation treats as fatal.
//!
//! At the end of a data window every expected transport block is run through
//! the error model and a uniform draw decides corruption (probability equal to
//! the BLER). Packets are forwarded upward only when they belong to a peer with
//! an expected, uncorrupted block.

use super::channel::ChannelPort;
use super::error::{PhyError, PhyResult};
use super::error_model::{MiErrorModel, TransportBlockErrorModel};
use super::interference::{InterferenceAccumulator, SinrObserver};
use super::scheduler::{EventId, PhyEvent, Scheduler};
use super::signal::{AntennaModel, SignalParameters};
use super::spectrum::SpectrumValue;
use super::time::SimTime;
use super::types::{ControlMessage, ExpectedTransportBlock, Packet, PacketBurst, RadioState, Rnti, RxPacketTrace};
use log::{debug, info, trace};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Upward delivery of a successfully decoded packet.
pub type RxDataCallback = Box<dyn FnMut(Packet)>;
/// Upward delivery of the control messages of a closed window.
pub type RxCtrlCallback = Box<dyn FnMut(Vec<ControlMessage>)>;
/// Per-packet reception trace, enhanced reporting only.
pub type RxPacketTraceCallback = Box<dyn FnMut(RxPacketTrace)>;

/// Reporting behaviour, fixed when the PHY is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportingMode {
    #[default]
    Standard,
    /// Emit an [`RxPacketTrace`] for every matched packet. Packets must then
    /// carry a MAC PDU tag.
    Enhanced,
}

/// Outcome of one closed data window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RxWindowSummary {
    pub sinr_avg: f64,
    pub sinr_min: f64,
    pub forwarded: usize,
    /// Packets dropped because their block was corrupted.
    pub corrupted_packets: usize,
    /// Packets dropped because no block was expected from their peer.
    pub unmatched_packets: usize,
    pub corrupted_tbs: usize,
    pub evaluated_tbs: usize,
}

pub struct SidelinkSpectrumPhy {
    rnti: Rnti,
    state: RadioState,
    reporting: ReportingMode,
    component_carrier_id: u8,

    channel: Option<ChannelPort>,
    antenna: Option<AntennaModel>,
    tx_psd: Option<SpectrumValue>,

    interference: InterferenceAccumulator,
    sinr_perceived: SpectrumValue,

    expected_tbs: BTreeMap<Rnti, ExpectedTransportBlock>,
    rx_packet_bursts: Vec<PacketBurst>,
    rx_ctrl_msgs: Vec<ControlMessage>,
    first_rx_start: SimTime,
    first_rx_duration: SimTime,

    end_tx_event: Option<EventId>,
    end_rx_data_event: Option<EventId>,
    end_rx_ctrl_event: Option<EventId>,

    error_model: Box<dyn TransportBlockErrorModel>,
    data_error_model_enabled: bool,
    random: Box<dyn RngCore>,

    rx_data_ok: Option<RxDataCallback>,
    rx_ctrl_ok: Option<RxCtrlCallback>,
    rx_packet_trace: Option<RxPacketTraceCallback>,
}

impl SidelinkSpectrumPhy {
    /// Create an idle PHY for device `rnti`.
    ///
    /// The error model defaults to [`MiErrorModel`] and the corruption draws to
    /// a ChaCha8 stream seeded with the RNTI; use [`Self::set_random_stream`]
    /// to inject a different one.
    pub fn new(rnti: Rnti, reporting: ReportingMode) -> Self {
        SidelinkSpectrumPhy {
            rnti,
            state: RadioState::Idle,
            reporting,
            component_carrier_id: 0,
            channel: None,
            antenna: None,
            tx_psd: None,
            interference: InterferenceAccumulator::new(),
            sinr_perceived: SpectrumValue::default(),
            expected_tbs: BTreeMap::new(),
            rx_packet_bursts: Vec::new(),
            rx_ctrl_msgs: Vec::new(),
            first_rx_start: SimTime::ZERO,
            first_rx_duration: SimTime::ZERO,
            end_tx_event: None,
            end_rx_data_event: None,
            end_rx_ctrl_event: None,
            error_model: Box::new(MiErrorModel),
            data_error_model_enabled: true,
            random: Box::new(ChaCha8Rng::seed_from_u64(u64::from(rnti))),
            rx_data_ok: None,
            rx_ctrl_ok: None,
            rx_packet_trace: None,
        }
    }

    pub fn rnti(&self) -> Rnti {
        self.rnti
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    pub fn reporting_mode(&self) -> ReportingMode {
        self.reporting
    }

    pub fn set_channel(&mut self, channel: ChannelPort) {
        self.channel = Some(channel);
    }

    pub fn set_antenna(&mut self, antenna: AntennaModel) {
        self.antenna = Some(antenna);
    }

    pub fn antenna(&self) -> Option<&AntennaModel> {
        self.antenna.as_ref()
    }

    pub fn set_tx_power_spectral_density(&mut self, psd: SpectrumValue) {
        self.tx_psd = Some(psd);
    }

    pub fn tx_power_spectral_density(&self) -> Option<&SpectrumValue> {
        self.tx_psd.as_ref()
    }

    pub fn set_noise_power_spectral_density(&mut self, psd: SpectrumValue) {
        self.interference.set_noise_psd(psd);
    }

    pub fn noise_power_spectral_density(&self) -> Option<&SpectrumValue> {
        self.interference.noise_psd()
    }

    pub fn set_error_model(&mut self, model: Box<dyn TransportBlockErrorModel>) {
        self.error_model = model;
    }

    pub fn set_data_error_model_enabled(&mut self, enabled: bool) {
        self.data_error_model_enabled = enabled;
    }

    pub fn set_random_stream(&mut self, random: Box<dyn RngCore>) {
        self.random = random;
    }

    pub fn set_component_carrier_id(&mut self, id: u8) {
        self.component_carrier_id = id;
    }

    pub fn set_rx_data_ok_callback(&mut self, cb: RxDataCallback) {
        self.rx_data_ok = Some(cb);
    }

    pub fn set_rx_ctrl_ok_callback(&mut self, cb: RxCtrlCallback) {
        self.rx_ctrl_ok = Some(cb);
    }

    pub fn set_rx_packet_trace_callback(&mut self, cb: RxPacketTraceCallback) {
        self.rx_packet_trace = Some(cb);
    }

    pub fn add_sinr_observer(&mut self, observer: SinrObserver) {
        self.interference.add_sinr_observer(observer);
    }

    /// SINR curve of the last closed data window.
    pub fn sinr_perceived(&self) -> &SpectrumValue {
        &self.sinr_perceived
    }

    pub fn expected_tb(&self, peer: Rnti) -> Option<&ExpectedTransportBlock> {
        self.expected_tbs.get(&peer)
    }

    pub fn num_expected_tbs(&self) -> usize {
        self.expected_tbs.len()
    }

    pub fn num_rx_bursts(&self) -> usize {
        self.rx_packet_bursts.len()
    }

    pub fn num_rx_ctrl_msgs(&self) -> usize {
        self.rx_ctrl_msgs.len()
    }

    /// Register (or overwrite) the block expected from `peer` in the coming
    /// data window.
    pub fn expect_transport_block(&mut self, peer: Rnti, tb: ExpectedTransportBlock) {
        trace!("rnti {}: expecting tb from {} ({} bits, mcs {})", self.rnti, peer, tb.size_bits, tb.mcs);
        self.expected_tbs.insert(peer, tb);
    }

    fn check_can_transmit(&self) -> PhyResult<()> {
        match self.state {
            RadioState::Idle => Ok(()),
            RadioState::Transmitting => Err(PhyError::TransmitWhileTransmitting),
            state @ (RadioState::ReceivingData | RadioState::ReceivingControl) => Err(PhyError::TransmitWhileReceiving(state)),
        }
    }

    fn transmit(&mut self, mut params: SignalParameters, sched: &mut dyn Scheduler) -> PhyResult<()> {
        self.check_can_transmit()?;
        let psd = self.tx_psd.clone().ok_or(PhyError::MissingConfiguration("transmit power spectral density"))?;
        let antenna = self.antenna.clone().ok_or(PhyError::MissingConfiguration("antenna"))?;
        let channel = self.channel.as_ref().ok_or(PhyError::MissingConfiguration("spectrum channel"))?;

        params.psd = psd;
        params.tx_antenna = antenna;
        let duration = params.duration;
        channel.start_tx(params)?;

        self.change_state(RadioState::Transmitting, sched.now());
        self.end_tx_event = Some(sched.schedule(duration, PhyEvent::EndTransmit));
        Ok(())
    }

    /// Start a data transmission carrying `burst` and `ctrl_msgs`.
    ///
    /// # Errors
    ///
    /// Fails if the PHY is not idle, or if channel, antenna or transmit PSD
    /// have not been configured.
    pub fn start_transmit_data(&mut self, burst: PacketBurst, ctrl_msgs: Vec<ControlMessage>, duration: SimTime, slot_index: u64, sched: &mut dyn Scheduler) -> PhyResult<()> {
        debug!("rnti {}: tx data slot {} ({} packets, {} ctrl) for {}", self.rnti, slot_index, burst.len(), ctrl_msgs.len(), duration);
        let params = SignalParameters {
            psd: SpectrumValue::default(),
            duration,
            packet_burst: Some(burst),
            ctrl_msgs,
            tx_antenna: AntennaModel::default(),
            slot_index,
            sender: self.rnti,
            control_only: false,
        };
        self.transmit(params, sched)
    }

    /// Start a control-only transmission.
    pub fn start_transmit_control(&mut self, ctrl_msgs: Vec<ControlMessage>, duration: SimTime, sched: &mut dyn Scheduler) -> PhyResult<()> {
        debug!("rnti {}: tx control ({} msgs) for {}", self.rnti, ctrl_msgs.len(), duration);
        let params = SignalParameters {
            psd: SpectrumValue::default(),
            duration,
            packet_burst: None,
            ctrl_msgs,
            tx_antenna: AntennaModel::default(),
            slot_index: 0,
            sender: self.rnti,
            control_only: true,
        };
        self.transmit(params, sched)
    }

    pub fn on_end_transmit(&mut self, sched: &mut dyn Scheduler) -> PhyResult<()> {
        if self.state != RadioState::Transmitting {
            return Err(PhyError::UnexpectedEndOfTransmission(self.state));
        }
        self.end_tx_event = None;
        self.change_state(RadioState::Idle, sched.now());
        Ok(())
    }

    /// Handle a signal delivered by the medium.
    pub fn on_signal_arrival(&mut self, signal: SignalParameters, sched: &mut dyn Scheduler) -> PhyResult<()> {
        if signal.is_data() {
            self.start_rx_data(signal, sched)
        } else {
            self.start_rx_ctrl(signal, sched)
        }
    }

    /// Open a window, or verify that a concurrent signal matches the open one.
    fn join_window(&mut self, signal: &SignalParameters, target: RadioState, sched: &mut dyn Scheduler) -> PhyResult<()> {
        let now = sched.now();
        if self.state == RadioState::Idle {
            self.interference.reset();
            self.first_rx_start = now;
            self.first_rx_duration = signal.duration;
            let (event, slot) = match target {
                RadioState::ReceivingControl => (PhyEvent::EndReceiveControl, &mut self.end_rx_ctrl_event),
                _ => (PhyEvent::EndReceiveData, &mut self.end_rx_data_event),
            };
            *slot = Some(sched.schedule(signal.duration, event));
            self.change_state(target, now);
        } else if self.first_rx_start != now || self.first_rx_duration != signal.duration {
            return Err(PhyError::MisalignedConcurrentSignal {
                window_start: self.first_rx_start,
                window_duration: self.first_rx_duration,
                start: now,
                duration: signal.duration,
            });
        }
        self.interference.add_signal(now, &signal.psd, signal.duration);
        Ok(())
    }

    fn start_rx_data(&mut self, signal: SignalParameters, sched: &mut dyn Scheduler) -> PhyResult<()> {
        match self.state {
            RadioState::Transmitting => return Err(PhyError::ReceiveWhileTransmitting),
            RadioState::ReceivingControl => return Err(PhyError::DataDuringControl),
            RadioState::Idle | RadioState::ReceivingData => {}
        }
        self.join_window(&signal, RadioState::ReceivingData, sched)?;

        if self.expected_tbs.contains_key(&signal.sender) {
            self.interference.start_rx(sched.now(), &signal.psd);
        }
        if let Some(burst) = signal.packet_burst {
            if !burst.is_empty() {
                self.rx_packet_bursts.push(burst);
            }
        }
        self.rx_ctrl_msgs.extend(signal.ctrl_msgs);
        trace!("rnti {}: {} simultaneous rx bursts", self.rnti, self.rx_packet_bursts.len());
        Ok(())
    }

    fn start_rx_ctrl(&mut self, signal: SignalParameters, sched: &mut dyn Scheduler) -> PhyResult<()> {
        match self.state {
            RadioState::Transmitting => return Err(PhyError::ReceiveWhileTransmitting),
            RadioState::ReceivingData => return Err(PhyError::ControlDuringData),
            RadioState::Idle | RadioState::ReceivingControl => {}
        }
        self.join_window(&signal, RadioState::ReceivingControl, sched)?;
        self.rx_ctrl_msgs.extend(signal.ctrl_msgs);
        Ok(())
    }

    /// Close the data window: decide corruption, forward packets and control
    /// messages, return to idle.
    pub fn on_end_receive_data(&mut self, sched: &mut dyn Scheduler) -> PhyResult<RxWindowSummary> {
        if self.state != RadioState::ReceivingData {
            return Err(PhyError::UnexpectedEndOfReception(self.state));
        }
        self.end_rx_data_event = None;
        let now = sched.now();

        self.sinr_perceived = self.interference.end_rx(now)?;
        let mut summary = RxWindowSummary {
            sinr_avg: self.sinr_perceived.mean(),
            sinr_min: self.sinr_perceived.min().unwrap_or(0.0),
            ..Default::default()
        };

        if self.data_error_model_enabled && !self.rx_packet_bursts.is_empty() {
            for (peer, tb) in self.expected_tbs.iter_mut() {
                let stats = self.error_model.tb_decodification_stats(&self.sinr_perceived, &tb.rb_bitmap, tb.size_bits, tb.mcs, &[]);
                tb.tbler = stats.tbler;
                tb.mi = stats.mi_total;
                tb.corrupted = self.random.gen_range(0.0..1.0) < stats.tbler;
                summary.evaluated_tbs += 1;
                if tb.corrupted {
                    summary.corrupted_tbs += 1;
                    info!(
                        "rnti {}: tb from {} size {} mcs {} rbs {} rv {} tbler {:.4} corrupted",
                        self.rnti,
                        peer,
                        tb.size_bits,
                        tb.mcs,
                        tb.rb_bitmap.len(),
                        tb.rv,
                        stats.tbler
                    );
                }
            }
        }

        let bursts = std::mem::take(&mut self.rx_packet_bursts);
        for packet in bursts.into_iter().flat_map(PacketBurst::into_packets) {
            if packet.size() == 0 {
                continue;
            }
            let peer = packet.bearer.ok_or(PhyError::MissingPacketTag { size: packet.size() })?.rnti;
            let Some(tb) = self.expected_tbs.get(&peer) else {
                trace!("rnti {}: no expected tb from {}, packet dropped", self.rnti, peer);
                summary.unmatched_packets += 1;
                continue;
            };

            if self.reporting == ReportingMode::Enhanced {
                let pdu = packet.pdu.ok_or(PhyError::MissingPduTag(peer))?;
                if let Some(cb) = self.rx_packet_trace.as_mut() {
                    cb(RxPacketTrace {
                        receiver: self.rnti,
                        rnti: peer,
                        tb_size: tb.size_bits,
                        frame: pdu.sfn.frame,
                        subframe: pdu.sfn.subframe,
                        slot: pdu.sfn.slot,
                        mcs: tb.mcs,
                        rv: tb.rv,
                        sinr_avg: summary.sinr_avg,
                        sinr_min: summary.sinr_min,
                        mi: tb.mi,
                        tbler: tb.tbler,
                        corrupted: tb.corrupted,
                        sym_start: tb.sym_start,
                        num_sym: tb.num_sym,
                        cc_id: self.component_carrier_id,
                    });
                }
            }

            if tb.corrupted {
                info!("rnti {}: TB failed, packet of {} bytes from {} dropped", self.rnti, packet.size(), peer);
                summary.corrupted_packets += 1;
            } else {
                summary.forwarded += 1;
                if let Some(cb) = self.rx_data_ok.as_mut() {
                    cb(packet);
                }
            }
        }

        self.forward_ctrl_msgs();
        self.expected_tbs.clear();
        self.change_state(RadioState::Idle, now);
        Ok(summary)
    }

    /// Close a control-only window. Control is assumed reliably decoded.
    ///
    /// Expected transport blocks survive: they describe upcoming data.
    pub fn on_end_receive_control(&mut self, sched: &mut dyn Scheduler) -> PhyResult<()> {
        if self.state != RadioState::ReceivingControl {
            return Err(PhyError::UnexpectedEndOfReception(self.state));
        }
        self.end_rx_ctrl_event = None;
        self.interference.reset();
        self.forward_ctrl_msgs();
        self.change_state(RadioState::Idle, sched.now());
        Ok(())
    }

    fn forward_ctrl_msgs(&mut self) {
        let msgs = std::mem::take(&mut self.rx_ctrl_msgs);
        if msgs.is_empty() {
            return;
        }
        if let Some(cb) = self.rx_ctrl_ok.as_mut() {
            cb(msgs);
        }
    }

    /// Cancel every pending event and drop all transient buffers.
    pub fn reset(&mut self, sched: &mut dyn Scheduler) {
        for event in [self.end_tx_event.take(), self.end_rx_data_event.take(), self.end_rx_ctrl_event.take()].into_iter().flatten() {
            sched.cancel(event);
        }
        self.state = RadioState::Idle;
        self.rx_ctrl_msgs.clear();
        self.expected_tbs.clear();
        self.rx_packet_bursts.clear();
        self.interference.reset();
    }

    fn change_state(&mut self, new_state: RadioState, now: SimTime) {
        debug!("rnti {}: {} -> {} at {}", self.rnti, self.state, new_state, now);
        self.state = new_state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::testing::{FakeScheduler, FixedBler};
    use crate::simulation::types::{MacPduTag, SfnSf};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc::Receiver;

    const BANDS: usize = 8;
    const SLOT: SimTime = SimTime::from_micros(250);

    fn configured_phy(rnti: Rnti, reporting: ReportingMode) -> (SidelinkSpectrumPhy, Receiver<SignalParameters>) {
        let mut phy = SidelinkSpectrumPhy::new(rnti, reporting);
        let (port, medium) = ChannelPort::pair();
        phy.set_channel(port);
        phy.set_antenna(AntennaModel::default());
        phy.set_tx_power_spectral_density(SpectrumValue::constant(BANDS, 1e-9));
        phy.set_noise_power_spectral_density(SpectrumValue::constant(BANDS, 1e-18));
        (phy, medium)
    }

    fn packet(peer: Rnti, len: usize) -> Packet {
        Packet::new(vec![peer as u8; len]).with_bearer(peer).with_pdu_tag(MacPduTag {
            sfn: SfnSf::default(),
            sym_start: 0,
            num_sym: 14,
        })
    }

    fn data_signal(sender: Rnti, packets: Vec<Packet>, duration: SimTime) -> SignalParameters {
        SignalParameters {
            psd: SpectrumValue::constant(BANDS, 1e-12),
            duration,
            packet_burst: Some(PacketBurst::from_packets(packets)),
            ctrl_msgs: Vec::new(),
            tx_antenna: AntennaModel::default(),
            slot_index: 0,
            sender,
            control_only: false,
        }
    }

    fn ctrl_signal(sender: Rnti, duration: SimTime) -> SignalParameters {
        SignalParameters {
            psd: SpectrumValue::constant(BANDS, 1e-12),
            duration,
            packet_burst: None,
            ctrl_msgs: vec![ControlMessage::Generic { source: sender, label: "beacon".into() }],
            tx_antenna: AntennaModel::default(),
            slot_index: 0,
            sender,
            control_only: true,
        }
    }

    fn expected() -> ExpectedTransportBlock {
        ExpectedTransportBlock::new(1, 800, 0, (0..BANDS).collect(), 0, 0, 14)
    }

    fn collect_data(phy: &mut SidelinkSpectrumPhy) -> Rc<RefCell<Vec<Packet>>> {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&sink);
        phy.set_rx_data_ok_callback(Box::new(move |p| s.borrow_mut().push(p)));
        sink
    }

    #[test]
    fn transmit_goes_through_medium_and_returns_to_idle() {
        let (mut phy, medium) = configured_phy(1, ReportingMode::Standard);
        let mut sched = FakeScheduler::new();
        let burst = PacketBurst::from_packets(vec![packet(1, 10)]);
        phy.start_transmit_data(burst.clone(), Vec::new(), SLOT, 4, &mut sched).unwrap();

        assert_eq!(phy.state(), RadioState::Transmitting);
        let sent = medium.try_recv().unwrap();
        assert_eq!(sent.packet_burst, Some(burst));
        assert_eq!(sent.slot_index, 4);
        assert_eq!(sent.psd, SpectrumValue::constant(BANDS, 1e-9));
        let end = sched.last().unwrap();
        assert_eq!((end.at, &end.event), (SLOT, &PhyEvent::EndTransmit));

        sched.set_now(SLOT);
        phy.on_end_transmit(&mut sched).unwrap();
        assert_eq!(phy.state(), RadioState::Idle);
    }

    #[test]
    fn overlapping_transmissions_are_fatal() {
        let (mut phy, _medium) = configured_phy(1, ReportingMode::Standard);
        let mut sched = FakeScheduler::new();
        phy.start_transmit_data(PacketBurst::new(), Vec::new(), SLOT, 0, &mut sched).unwrap();
        sched.set_now(SimTime::from_micros(100));
        assert_eq!(phy.start_transmit_data(PacketBurst::new(), Vec::new(), SLOT, 1, &mut sched), Err(PhyError::TransmitWhileTransmitting));
        assert_eq!(phy.start_transmit_control(Vec::new(), SLOT, &mut sched), Err(PhyError::TransmitWhileTransmitting));
    }

    #[test]
    fn transmit_while_receiving_is_fatal() {
        let (mut phy, _medium) = configured_phy(2, ReportingMode::Standard);
        let mut sched = FakeScheduler::new();
        phy.on_signal_arrival(data_signal(1, vec![packet(1, 5)], SLOT), &mut sched).unwrap();
        assert_eq!(
            phy.start_transmit_data(PacketBurst::new(), Vec::new(), SLOT, 0, &mut sched),
            Err(PhyError::TransmitWhileReceiving(RadioState::ReceivingData))
        );
    }

    #[test]
    fn receive_while_transmitting_is_fatal() {
        let (mut phy, _medium) = configured_phy(1, ReportingMode::Standard);
        let mut sched = FakeScheduler::new();
        phy.start_transmit_control(Vec::new(), SLOT, &mut sched).unwrap();
        assert_eq!(phy.on_signal_arrival(data_signal(2, Vec::new(), SLOT), &mut sched), Err(PhyError::ReceiveWhileTransmitting));
        assert_eq!(phy.on_signal_arrival(ctrl_signal(2, SLOT), &mut sched), Err(PhyError::ReceiveWhileTransmitting));
    }

    #[test]
    fn missing_configuration_is_fatal() {
        let mut phy = SidelinkSpectrumPhy::new(1, ReportingMode::Standard);
        let mut sched = FakeScheduler::new();
        assert!(matches!(
            phy.start_transmit_data(PacketBurst::new(), Vec::new(), SLOT, 0, &mut sched),
            Err(PhyError::MissingConfiguration(_))
        ));
        phy.set_tx_power_spectral_density(SpectrumValue::constant(BANDS, 1.0));
        phy.set_antenna(AntennaModel::default());
        assert_eq!(
            phy.start_transmit_control(Vec::new(), SLOT, &mut sched),
            Err(PhyError::MissingConfiguration("spectrum channel"))
        );
        assert_eq!(phy.state(), RadioState::Idle);
    }

    #[test]
    fn data_and_control_windows_do_not_mix() {
        let (mut phy, _medium) = configured_phy(3, ReportingMode::Standard);
        let mut sched = FakeScheduler::new();
        phy.on_signal_arrival(data_signal(1, Vec::new(), SLOT), &mut sched).unwrap();
        assert_eq!(phy.on_signal_arrival(ctrl_signal(2, SLOT), &mut sched), Err(PhyError::ControlDuringData));

        let (mut phy, _medium) = configured_phy(3, ReportingMode::Standard);
        phy.on_signal_arrival(ctrl_signal(2, SLOT), &mut sched).unwrap();
        assert_eq!(phy.on_signal_arrival(data_signal(1, Vec::new(), SLOT), &mut sched), Err(PhyError::DataDuringControl));
    }

    #[test]
    fn same_instant_different_duration_is_fatal() {
        let (mut phy, _medium) = configured_phy(3, ReportingMode::Standard);
        let mut sched = FakeScheduler::new();
        phy.on_signal_arrival(data_signal(1, vec![packet(1, 5)], SLOT), &mut sched).unwrap();
        let err = phy.on_signal_arrival(data_signal(2, vec![packet(2, 5)], SimTime::from_micros(125)), &mut sched).unwrap_err();
        assert!(matches!(err, PhyError::MisalignedConcurrentSignal { .. }));
    }

    #[test]
    fn later_arrival_in_open_window_is_fatal() {
        let (mut phy, _medium) = configured_phy(3, ReportingMode::Standard);
        let mut sched = FakeScheduler::new();
        phy.on_signal_arrival(ctrl_signal(1, SLOT), &mut sched).unwrap();
        sched.set_now(SimTime::from_nanos(1));
        assert!(matches!(phy.on_signal_arrival(ctrl_signal(2, SLOT), &mut sched), Err(PhyError::MisalignedConcurrentSignal { .. })));
    }

    #[test]
    fn only_packets_from_expected_peer_are_forwarded() {
        let (mut phy, _medium) = configured_phy(9, ReportingMode::Standard);
        let received = collect_data(&mut phy);
        let mut sched = FakeScheduler::new();
        phy.expect_transport_block(1, expected());

        let signal = data_signal(1, vec![packet(1, 20), packet(2, 20), packet(1, 30), packet(3, 5)], SLOT);
        phy.on_signal_arrival(signal, &mut sched).unwrap();
        assert_eq!(phy.state(), RadioState::ReceivingData);
        assert_eq!(sched.last().map(|e| (e.at, e.event.clone())), Some((SLOT, PhyEvent::EndReceiveData)));

        sched.set_now(SLOT);
        let summary = phy.on_end_receive_data(&mut sched).unwrap();

        let peers: Vec<Rnti> = received.borrow().iter().map(|p| p.bearer.unwrap().rnti).collect();
        assert_eq!(peers, vec![1, 1]);
        assert_eq!(summary.forwarded, 2);
        assert_eq!(summary.unmatched_packets, 2);
        assert_eq!(summary.corrupted_tbs, 0);
        assert_eq!(phy.state(), RadioState::Idle);
        assert_eq!(phy.num_expected_tbs(), 0);
        assert_eq!(phy.num_rx_bursts(), 0);
    }

    #[test]
    fn corrupted_block_drops_its_packets() {
        let (mut phy, _medium) = configured_phy(9, ReportingMode::Standard);
        phy.set_error_model(Box::new(FixedBler(1.0)));
        let received = collect_data(&mut phy);
        let mut sched = FakeScheduler::new();
        phy.expect_transport_block(1, expected());
        phy.on_signal_arrival(data_signal(1, vec![packet(1, 20)], SLOT), &mut sched).unwrap();
        sched.set_now(SLOT);
        let summary = phy.on_end_receive_data(&mut sched).unwrap();
        assert!(received.borrow().is_empty());
        assert_eq!(summary.corrupted_packets, 1);
        assert_eq!(summary.corrupted_tbs, 1);
    }

    #[test]
    fn disabled_error_model_never_corrupts() {
        let (mut phy, _medium) = configured_phy(9, ReportingMode::Standard);
        phy.set_error_model(Box::new(FixedBler(1.0)));
        phy.set_data_error_model_enabled(false);
        let received = collect_data(&mut phy);
        let mut sched = FakeScheduler::new();
        phy.expect_transport_block(1, expected());
        phy.on_signal_arrival(data_signal(1, vec![packet(1, 20)], SLOT), &mut sched).unwrap();
        sched.set_now(SLOT);
        phy.on_end_receive_data(&mut sched).unwrap();
        assert_eq!(received.borrow().len(), 1);
    }

    #[test]
    fn corruption_fraction_converges_to_bler() {
        for bler in [0.1, 0.5, 0.8] {
            let (mut phy, _medium) = configured_phy(9, ReportingMode::Standard);
            phy.set_error_model(Box::new(FixedBler(bler)));
            phy.set_random_stream(Box::new(ChaCha8Rng::seed_from_u64(42)));
            let mut sched = FakeScheduler::new();
            let trials = 4000;
            let mut corrupted = 0;
            for i in 0..trials {
                let t = SimTime::from_micros(250 * i);
                sched.set_now(t);
                phy.expect_transport_block(1, expected());
                phy.on_signal_arrival(data_signal(1, vec![packet(1, 8)], SLOT), &mut sched).unwrap();
                sched.set_now(t + SLOT);
                corrupted += phy.on_end_receive_data(&mut sched).unwrap().corrupted_tbs;
            }
            let fraction = corrupted as f64 / trials as f64;
            assert!((fraction - bler).abs() < 0.03, "bler {} observed {}", bler, fraction);
        }
    }

    #[test]
    fn missing_bearer_tag_is_fatal_but_empty_packets_are_skipped() {
        let (mut phy, _medium) = configured_phy(9, ReportingMode::Standard);
        let mut sched = FakeScheduler::new();
        phy.expect_transport_block(1, expected());
        phy.on_signal_arrival(data_signal(1, vec![Packet::new(Vec::new()), Packet::new(vec![1; 4])], SLOT), &mut sched).unwrap();
        sched.set_now(SLOT);
        assert_eq!(phy.on_end_receive_data(&mut sched), Err(PhyError::MissingPacketTag { size: 4 }));
    }

    #[test]
    fn enhanced_mode_traces_matched_packets() {
        let (mut phy, _medium) = configured_phy(9, ReportingMode::Enhanced);
        let traces = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&traces);
        phy.set_rx_packet_trace_callback(Box::new(move |t| sink.borrow_mut().push(t)));
        phy.set_component_carrier_id(2);
        let mut sched = FakeScheduler::new();
        phy.expect_transport_block(1, expected());
        phy.on_signal_arrival(data_signal(1, vec![packet(1, 20), packet(4, 20)], SLOT), &mut sched).unwrap();
        sched.set_now(SLOT);
        phy.on_end_receive_data(&mut sched).unwrap();

        let traces = traces.borrow();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].rnti, 1);
        assert_eq!(traces[0].receiver, 9);
        assert_eq!(traces[0].tb_size, 800);
        assert_eq!(traces[0].cc_id, 2);
        // 1e-12 / 1e-18
        assert!((traces[0].sinr_avg - 1e6).abs() < 1.0);
    }

    #[test]
    fn enhanced_mode_requires_pdu_tag() {
        let (mut phy, _medium) = configured_phy(9, ReportingMode::Enhanced);
        let mut sched = FakeScheduler::new();
        phy.expect_transport_block(1, expected());
        phy.on_signal_arrival(data_signal(1, vec![Packet::new(vec![0; 4]).with_bearer(1)], SLOT), &mut sched).unwrap();
        sched.set_now(SLOT);
        assert_eq!(phy.on_end_receive_data(&mut sched), Err(PhyError::MissingPduTag(1)));
    }

    #[test]
    fn control_window_merges_and_forwards_messages() {
        let (mut phy, _medium) = configured_phy(9, ReportingMode::Standard);
        let ctrl = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&ctrl);
        phy.set_rx_ctrl_ok_callback(Box::new(move |msgs| sink.borrow_mut().extend(msgs)));
        let mut sched = FakeScheduler::new();
        phy.expect_transport_block(4, expected());
        phy.on_signal_arrival(ctrl_signal(1, SLOT), &mut sched).unwrap();
        phy.on_signal_arrival(ctrl_signal(2, SLOT), &mut sched).unwrap();
        assert_eq!(phy.state(), RadioState::ReceivingControl);
        sched.set_now(SLOT);
        phy.on_end_receive_control(&mut sched).unwrap();

        let sources: Vec<Rnti> = ctrl.borrow().iter().map(ControlMessage::source).collect();
        assert_eq!(sources, vec![1, 2]);
        assert_eq!(phy.state(), RadioState::Idle);
        assert!(phy.expected_tb(4).is_some());
    }

    #[test]
    fn ending_a_window_that_never_started_is_fatal() {
        let (mut phy, _medium) = configured_phy(9, ReportingMode::Standard);
        let mut sched = FakeScheduler::new();
        assert_eq!(phy.on_end_receive_data(&mut sched), Err(PhyError::UnexpectedEndOfReception(RadioState::Idle)));
        assert_eq!(phy.on_end_receive_control(&mut sched), Err(PhyError::UnexpectedEndOfReception(RadioState::Idle)));
        assert_eq!(phy.on_end_transmit(&mut sched), Err(PhyError::UnexpectedEndOfTransmission(RadioState::Idle)));
    }

    #[test]
    fn reset_twice_leaves_idle_and_empty() {
        let (mut phy, _medium) = configured_phy(9, ReportingMode::Standard);
        let mut sched = FakeScheduler::new();
        phy.expect_transport_block(1, expected());
        phy.on_signal_arrival(data_signal(1, vec![packet(1, 20)], SLOT), &mut sched).unwrap();
        assert_eq!(sched.pending().len(), 1);

        for _ in 0..2 {
            phy.reset(&mut sched);
            assert_eq!(phy.state(), RadioState::Idle);
            assert_eq!(phy.num_expected_tbs(), 0);
            assert_eq!(phy.num_rx_bursts(), 0);
            assert_eq!(phy.num_rx_ctrl_msgs(), 0);
            assert!(sched.pending().is_empty());
        }
        assert_eq!(sched.cancelled.len(), 1);

        // usable again after reset
        phy.start_transmit_control(Vec::new(), SLOT, &mut sched).unwrap();
        assert_eq!(phy.state(), RadioState::Transmitting);
    }
}
