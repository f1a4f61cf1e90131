//! Shared wireless medium.
//!
//! A PHY hands every transmission to its [`ChannelPort`]. The simulation
//! drains the port and asks the [`SpectrumChannel`] to fan the signal out:
//! each other registered vehicle receives its own copy, with the PSD scaled by
//! the link gain (antenna gains minus path loss, plus blockage when a blocker
//! cuts the line of sight). Propagation delay is neglected.

use super::error::{PhyError, PhyResult};
use super::geometry::{Blocker, Position, distance, is_blocked};
use super::signal::{AntennaModel, SignalParameters};
use super::signal_calculations::{PathLossParameters, calculate_path_loss, db_to_linear};
use super::types::Rnti;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, Sender, channel};

/// Transmit handle of one PHY onto the medium.
#[derive(Debug, Clone)]
pub struct ChannelPort {
    tx: Sender<SignalParameters>,
}

impl ChannelPort {
    pub fn new(tx: Sender<SignalParameters>) -> Self {
        ChannelPort { tx }
    }

    /// Create a port and the receiving end the medium drains.
    pub fn pair() -> (ChannelPort, Receiver<SignalParameters>) {
        let (tx, rx) = channel();
        (ChannelPort { tx }, rx)
    }

    pub fn start_tx(&self, params: SignalParameters) -> PhyResult<()> {
        self.tx.send(params).map_err(|_| PhyError::ChannelClosed)
    }
}

/// Where a vehicle is and which antenna it receives with, at the instant of a
/// transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEndpoint {
    pub position: Position,
    pub antenna: AntennaModel,
}

pub struct SpectrumChannel {
    path_loss: PathLossParameters,
    frequency_hz: f64,
    blockers: Vec<Blocker>,
    blockage_loss_db: f64,
    rng: ChaCha8Rng,
}

impl SpectrumChannel {
    pub fn new(path_loss: PathLossParameters, frequency_hz: f64, seed: u64) -> Self {
        SpectrumChannel {
            path_loss,
            frequency_hz,
            blockers: Vec::new(),
            blockage_loss_db: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn with_blockers(mut self, blockers: Vec<Blocker>, blockage_loss_db: f64) -> Self {
        self.blockers = blockers;
        self.blockage_loss_db = blockage_loss_db;
        self
    }

    /// Link gain in dB between a transmitting and a receiving endpoint.
    pub fn link_gain_db(&mut self, tx: &LinkEndpoint, rx: &LinkEndpoint) -> f64 {
        let d = distance(&tx.position, &rx.position);
        let mut loss = calculate_path_loss(d, self.frequency_hz, &self.path_loss, &mut self.rng);
        if is_blocked(&tx.position, &rx.position, &self.blockers) {
            loss += self.blockage_loss_db;
        }
        tx.antenna.gain_db + rx.antenna.gain_db - loss
    }

    /// Fan a transmitted signal out to every endpoint except the sender, in
    /// RNTI order.
    pub fn propagate(&mut self, signal: &SignalParameters, endpoints: &BTreeMap<Rnti, LinkEndpoint>) -> PhyResult<Vec<(Rnti, SignalParameters)>> {
        let sender = endpoints.get(&signal.sender).ok_or(PhyError::UnknownDevice(signal.sender))?;
        let tx = LinkEndpoint {
            position: sender.position,
            antenna: signal.tx_antenna.clone(),
        };
        let mut copies = Vec::with_capacity(endpoints.len().saturating_sub(1));
        for (rnti, rx) in endpoints {
            if *rnti == signal.sender {
                continue;
            }
            let gain_db = self.link_gain_db(&tx, rx);
            log::trace!("channel: {} -> {} gain {:.1} dB", signal.sender, rnti, gain_db);
            copies.push((*rnti, signal.with_gain(db_to_linear(gain_db))));
        }
        Ok(copies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::spectrum::SpectrumValue;
    use crate::simulation::time::SimTime;
    use crate::simulation::types::{Packet, PacketBurst};

    fn endpoint(x: f64) -> LinkEndpoint {
        LinkEndpoint {
            position: Position::new(x, 0.0),
            antenna: AntennaModel::default(),
        }
    }

    fn signal(sender: Rnti) -> SignalParameters {
        SignalParameters {
            psd: SpectrumValue::constant(3, 1.0),
            duration: SimTime::from_micros(250),
            packet_burst: Some(PacketBurst::from_packets(vec![Packet::new(vec![1; 4]).with_bearer(sender)])),
            ctrl_msgs: Vec::new(),
            tx_antenna: AntennaModel { gain_db: 3.0 },
            slot_index: 0,
            sender,
            control_only: false,
        }
    }

    fn medium() -> SpectrumChannel {
        let pl = PathLossParameters {
            path_loss_exponent: 2.0,
            shadowing_sigma: 0.0,
            path_loss_at_reference_distance: Some(40.0),
        };
        SpectrumChannel::new(pl, 28e9, 1)
    }

    #[test]
    fn fan_out_skips_sender_and_scales_psd() {
        let mut ch = medium();
        let endpoints: BTreeMap<Rnti, LinkEndpoint> = [(1, endpoint(0.0)), (2, endpoint(10.0)), (3, endpoint(100.0))].into_iter().collect();
        let copies = ch.propagate(&signal(1), &endpoints).unwrap();
        let receivers: Vec<Rnti> = copies.iter().map(|(r, _)| *r).collect();
        assert_eq!(receivers, vec![2, 3]);
        // 3 dB tx gain - (40 + 20 log10 d)
        let near = copies[0].1.psd.values()[0];
        let far = copies[1].1.psd.values()[0];
        assert!((near - db_to_linear(3.0 - 60.0)).abs() / near < 1e-9);
        assert!((far - db_to_linear(3.0 - 80.0)).abs() / far < 1e-9);
        assert_eq!(copies[0].1.packet_burst, signal(1).packet_burst);
    }

    #[test]
    fn blockers_add_loss() {
        let truck = Blocker {
            top_left: Position::new(4.0, -1.0),
            bottom_right: Position::new(6.0, 1.0),
        };
        let mut ch = medium().with_blockers(vec![truck], 20.0);
        let g = ch.link_gain_db(&endpoint(0.0), &endpoint(10.0));
        assert!((g - (-80.0)).abs() < 1e-9);
    }

    #[test]
    fn unknown_sender_is_fatal() {
        let mut ch = medium();
        let endpoints: BTreeMap<Rnti, LinkEndpoint> = [(2, endpoint(0.0))].into_iter().collect();
        assert_eq!(ch.propagate(&signal(9), &endpoints).unwrap_err(), PhyError::UnknownDevice(9));
    }

    #[test]
    fn port_reports_closed_medium() {
        let (port, rx) = ChannelPort::pair();
        port.start_tx(signal(1)).unwrap();
        assert_eq!(rx.try_recv().map(|s| s.sender), Ok(1));
        drop(rx);
        assert_eq!(port.start_tx(signal(1)).unwrap_err(), PhyError::ChannelClosed);
    }
}
