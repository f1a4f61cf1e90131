//! Simulation driver: one event timeline shared by every vehicle.
//!
//! High-level flow of each step:
//! 1) Pop the next due event. PHY events go to the owning vehicle's PHY,
//!    traffic events feed the vehicle's MAC queue.
//! 2) Drain the shared medium. Every transmission made during the step is
//!    fanned out, with positions taken at the current instant, and delivered
//!    to the other vehicles' PHYs.
//! 3) Drain the upward indications (decoded packets, control messages, traces,
//!    SINR reports) into per-vehicle statistics.
//!
//! Any [`PhyError`] halts the run. At the end every PHY is reset.

use super::channel::{ChannelPort, LinkEndpoint, SpectrumChannel};
use super::error::{PhyError, PhyResult};
use super::geometry::{ConstantVelocity, MobilityModel};
use super::mac::{SidelinkMac, build_scheduling_pattern};
use super::phy::SidelinkPhy;
use super::scheduler::{EventId, EventQueue, PhyEvent, Scheduler};
use super::signal::{AntennaModel, SignalParameters};
use super::signal_calculations::linear_to_db;
use super::spectrum::SpectrumValue;
use super::spectrum_phy::{ReportingMode, RxWindowSummary, SidelinkSpectrumPhy};
use super::time::SimTime;
use super::types::{Packet, RadioState, Rnti, RxPacketTrace};
use crate::common::scene::{Scene, TrafficFlow};
use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};

/// Entry of the shared timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Phy { rnti: Rnti, event: PhyEvent },
    /// Next application packet of a vehicle.
    Traffic { rnti: Rnti },
}

/// Scheduler handed to one vehicle's PHY: tags its events with the RNTI.
pub struct DeviceScheduler<'a> {
    queue: &'a mut EventQueue<SimEvent>,
    rnti: Rnti,
}

impl<'a> DeviceScheduler<'a> {
    pub fn new(queue: &'a mut EventQueue<SimEvent>, rnti: Rnti) -> Self {
        DeviceScheduler { queue, rnti }
    }
}

impl Scheduler for DeviceScheduler<'_> {
    fn now(&self) -> SimTime {
        self.queue.now()
    }

    fn schedule(&mut self, delay: SimTime, event: PhyEvent) -> EventId {
        self.queue.schedule_in(delay, SimEvent::Phy { rnti: self.rnti, event })
    }

    fn cancel(&mut self, id: EventId) {
        self.queue.cancel(id);
    }
}

/// Upward notifications raised by the PHY callbacks.
#[derive(Debug, Clone)]
enum DeviceIndication {
    Data { rnti: Rnti, packet: Packet },
    Control { rnti: Rnti, count: usize },
    Trace(RxPacketTrace),
    Sinr { rnti: Rnti, mean: f64 },
}

/// Per-vehicle counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStats {
    pub packets_generated: u64,
    pub bursts_sent: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    /// Received packets that were broadcast.
    pub broadcast_received: u64,
    pub ctrl_msgs_received: u64,
    pub evaluated_tbs: u64,
    pub corrupted_tbs: u64,
    pub dropped_corrupted: u64,
    pub dropped_unmatched: u64,
    pub rx_windows: u64,
    /// Mean of the per-window average SINR, in dB.
    pub mean_sinr_db: Option<f64>,
    #[serde(skip)]
    sinr_sum: f64,
}

impl DeviceStats {
    fn record_window(&mut self, summary: &RxWindowSummary) {
        self.evaluated_tbs += summary.evaluated_tbs as u64;
        self.corrupted_tbs += summary.corrupted_tbs as u64;
        self.dropped_corrupted += summary.corrupted_packets as u64;
        self.dropped_unmatched += summary.unmatched_packets as u64;
    }

    fn record_sinr(&mut self, mean: f64) {
        self.rx_windows += 1;
        self.sinr_sum += mean;
        self.mean_sinr_db = Some(linear_to_db(self.sinr_sum / self.rx_windows as f64));
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub end_time_us: f64,
    pub events_processed: u64,
    pub devices: BTreeMap<Rnti, DeviceStats>,
    /// Per-packet reception traces, enhanced reporting only.
    pub traces: Vec<RxPacketTrace>,
}

struct Device {
    phy: SidelinkPhy,
    mac: SidelinkMac,
    mobility: ConstantVelocity,
    antenna: AntennaModel,
    traffic: Option<TrafficFlow>,
    generated: u64,
    stats: DeviceStats,
}

pub struct Simulation {
    queue: EventQueue<SimEvent>,
    devices: BTreeMap<Rnti, Device>,
    channel: SpectrumChannel,
    medium: Receiver<SignalParameters>,
    indications: Receiver<DeviceIndication>,
    traces: Vec<RxPacketTrace>,
    end_time: SimTime,
    events_processed: u64,
}

impl Simulation {
    /// Build every vehicle of a validated scene and start its slot clock.
    ///
    /// Slot `i` of each subframe belongs to the `i`-th vehicle of the scene.
    /// Every vehicle is paired with every other one.
    pub fn from_scene(scene: &Scene) -> PhyResult<Self> {
        let config = scene.phy_mac_config().map_err(PhyError::InvalidConfiguration)?;
        let rntis: Vec<Rnti> = scene.vehicles.iter().map(|v| v.rnti).collect();
        let pattern = build_scheduling_pattern(&rntis, config.slots_per_subframe)?;
        let mode = if scene.phy.enhanced_reporting {
            ReportingMode::Enhanced
        } else {
            ReportingMode::Standard
        };

        let (medium_tx, medium) = mpsc::channel::<SignalParameters>();
        let (ind_tx, indications) = mpsc::channel::<DeviceIndication>();
        let mut devices = BTreeMap::new();

        for v in &scene.vehicles {
            let antenna = AntennaModel {
                gain_db: scene.phy.antenna_gain_db,
            };
            let mut sp = SidelinkSpectrumPhy::new(v.rnti, mode);
            sp.set_channel(ChannelPort::new(medium_tx.clone()));
            sp.set_antenna(antenna.clone());
            sp.set_data_error_model_enabled(scene.phy.error_model_enabled);
            sp.set_random_stream(Box::new(ChaCha8Rng::seed_from_u64(scene.seed.wrapping_add(u64::from(v.rnti)))));
            install_callbacks(&mut sp, v.rnti, mode, &ind_tx);

            let mut phy = SidelinkPhy::new(sp, config.clone());
            phy.set_tx_power(scene.phy.tx_power_dbm);
            phy.set_noise_figure(scene.phy.noise_figure_db);
            phy.set_mcs(scene.phy.mcs)?;
            for peer in rntis.iter().filter(|r| **r != v.rnti) {
                phy.add_device(*peer);
            }

            let mut mac = SidelinkMac::new(v.rnti, config.symbols_per_slot as u8);
            mac.set_sf_allocation_info(pattern.clone());

            devices.insert(
                v.rnti,
                Device {
                    phy,
                    mac,
                    mobility: ConstantVelocity::new(v.position, v.velocity),
                    antenna,
                    traffic: v.traffic.clone(),
                    generated: 0,
                    stats: DeviceStats::default(),
                },
            );
        }

        let channel = SpectrumChannel::new(scene.path_loss.clone(), config.centre_frequency_hz, scene.seed)
            .with_blockers(scene.blockers.clone(), scene.blockage_loss_db);

        let mut queue = EventQueue::new();
        // traffic first, so packets due at a slot boundary make that slot
        for (rnti, device) in &devices {
            if let Some(flow) = &device.traffic {
                queue.schedule_at(SimTime::from_micros(flow.start_us), SimEvent::Traffic { rnti: *rnti });
            }
        }
        for (rnti, device) in devices.iter_mut() {
            device.phy.start(&mut DeviceScheduler::new(&mut queue, *rnti));
        }

        info!(
            "Simulation ready: {} vehicles, numerology {}, {} RBs, slot {}",
            devices.len(),
            config.numerology_index,
            config.num_rb,
            config.slot_period()
        );

        Ok(Simulation {
            queue,
            devices,
            channel,
            medium,
            indications,
            traces: Vec::new(),
            end_time: SimTime::from_millis(scene.duration_ms),
            events_processed: 0,
        })
    }

    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    /// Radio state of a vehicle, `None` for an unknown RNTI.
    pub fn device_state(&self, rnti: Rnti) -> Option<RadioState> {
        self.devices.get(&rnti).map(|d| d.phy.spectrum_phy().state())
    }

    /// Run until the end time, then reset every PHY.
    pub fn run(&mut self) -> PhyResult<SimulationReport> {
        while let Some(at) = self.queue.peek_time() {
            if at > self.end_time {
                break;
            }
            self.step()?;
        }
        self.teardown();
        info!("Simulation finished at {} after {} events", self.queue.now(), self.events_processed);
        Ok(self.report())
    }

    /// Process one event and everything it triggered. Returns `false` when the
    /// timeline is empty.
    pub fn step(&mut self) -> PhyResult<bool> {
        let Some((now, event)) = self.queue.pop() else {
            return Ok(false);
        };
        self.events_processed += 1;
        match event {
            SimEvent::Phy { rnti, event } => {
                let device = self.devices.get_mut(&rnti).ok_or(PhyError::UnknownDevice(rnti))?;
                let mut sched = DeviceScheduler::new(&mut self.queue, rnti);
                if let Some(summary) = device.phy.handle_event(event, &mut device.mac, &mut sched)? {
                    device.stats.record_window(&summary);
                }
            }
            SimEvent::Traffic { rnti } => self.generate_traffic(rnti)?,
        }
        self.deliver_signals(now)?;
        self.drain_indications();
        Ok(true)
    }

    fn generate_traffic(&mut self, rnti: Rnti) -> PhyResult<()> {
        let device = self.devices.get_mut(&rnti).ok_or(PhyError::UnknownDevice(rnti))?;
        let Some(flow) = &device.traffic else {
            return Ok(());
        };
        let seq = device.generated;
        let mut payload = vec![0u8; flow.packet_size];
        for (dst, src) in payload.iter_mut().zip(seq.to_be_bytes()) {
            *dst = src;
        }
        device.mac.enqueue(payload, flow.destination);
        device.generated += 1;
        device.stats.packets_generated += 1;
        self.queue.schedule_in(SimTime::from_micros(flow.interval_us), SimEvent::Traffic { rnti });
        Ok(())
    }

    /// Fan out every transmission made since the last drain.
    fn deliver_signals(&mut self, now: SimTime) -> PhyResult<()> {
        while let Ok(signal) = self.medium.try_recv() {
            let sender = self.devices.get_mut(&signal.sender).ok_or(PhyError::UnknownDevice(signal.sender))?;
            sender.stats.bursts_sent += 1;
            sender.stats.packets_sent += signal.packet_burst.as_ref().map_or(0, |b| b.len() as u64);

            let endpoints: BTreeMap<Rnti, LinkEndpoint> = self
                .devices
                .iter()
                .map(|(rnti, d)| {
                    (
                        *rnti,
                        LinkEndpoint {
                            position: d.mobility.position_at(now),
                            antenna: d.antenna.clone(),
                        },
                    )
                })
                .collect();

            debug!("{}: rnti {} transmits in slot {}", now, signal.sender, signal.slot_index);
            for (rnti, copy) in self.channel.propagate(&signal, &endpoints)? {
                let device = self.devices.get_mut(&rnti).ok_or(PhyError::UnknownDevice(rnti))?;
                device.phy.receive_signal(copy, &mut DeviceScheduler::new(&mut self.queue, rnti))?;
            }
        }
        Ok(())
    }

    fn drain_indications(&mut self) {
        while let Ok(ind) = self.indications.try_recv() {
            match ind {
                DeviceIndication::Data { rnti, packet } => {
                    if let Some(d) = self.devices.get_mut(&rnti) {
                        d.stats.packets_received += 1;
                        d.stats.bytes_received += packet.size() as u64;
                        if packet.destination.is_none() {
                            d.stats.broadcast_received += 1;
                        }
                    }
                }
                DeviceIndication::Control { rnti, count } => {
                    if let Some(d) = self.devices.get_mut(&rnti) {
                        d.stats.ctrl_msgs_received += count as u64;
                    }
                }
                DeviceIndication::Sinr { rnti, mean } => {
                    if let Some(d) = self.devices.get_mut(&rnti) {
                        d.stats.record_sinr(mean);
                    }
                }
                DeviceIndication::Trace(trace) => self.traces.push(trace),
            }
        }
    }

    fn teardown(&mut self) {
        for (rnti, device) in self.devices.iter_mut() {
            device.phy.reset(&mut DeviceScheduler::new(&mut self.queue, *rnti));
        }
        self.drain_indications();
        if !self.queue.is_empty() {
            debug!("{} events left after the end time", self.queue.len());
        }
    }

    fn report(&self) -> SimulationReport {
        SimulationReport {
            end_time_us: self.queue.now().as_micros_f64(),
            events_processed: self.events_processed,
            devices: self.devices.iter().map(|(rnti, d)| (*rnti, d.stats.clone())).collect(),
            traces: self.traces.clone(),
        }
    }
}

/// Route the PHY's upward callbacks into the indication channel.
fn install_callbacks(sp: &mut SidelinkSpectrumPhy, rnti: Rnti, mode: ReportingMode, tx: &Sender<DeviceIndication>) {
    let data_tx = tx.clone();
    sp.set_rx_data_ok_callback(Box::new(move |packet| {
        if data_tx.send(DeviceIndication::Data { rnti, packet }).is_err() {
            warn!("rnti {}: indication channel closed, packet lost", rnti);
        }
    }));

    let ctrl_tx = tx.clone();
    sp.set_rx_ctrl_ok_callback(Box::new(move |msgs| {
        if ctrl_tx.send(DeviceIndication::Control { rnti, count: msgs.len() }).is_err() {
            warn!("rnti {}: indication channel closed, control messages lost", rnti);
        }
    }));

    let sinr_tx = tx.clone();
    sp.add_sinr_observer(Box::new(move |sinr: &SpectrumValue| {
        if sinr_tx.send(DeviceIndication::Sinr { rnti, mean: sinr.mean() }).is_err() {
            warn!("rnti {}: indication channel closed, SINR report lost", rnti);
        }
    }));

    if mode == ReportingMode::Enhanced {
        let trace_tx = tx.clone();
        sp.set_rx_packet_trace_callback(Box::new(move |trace| {
            if trace_tx.send(DeviceIndication::Trace(trace)).is_err() {
                warn!("rnti {}: indication channel closed, rx trace lost", rnti);
            }
        }));
    }
}
