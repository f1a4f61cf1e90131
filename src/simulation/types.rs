//! Type definitions shared by the PHY, the MAC glue and the simulation driver.
//!
//! Contains:
//! - Radio identifiers and the radio state enumeration
//! - Frame/subframe/slot addressing derived from the scalar slot index
//! - Packets, packet bursts and their tags
//! - Sidelink control messages
//! - Expected transport blocks and reception trace records

use serde::Serialize;
use std::fmt;

/// Radio network temporary identifier of a sidelink device.
pub type Rnti = u16;

/// Transmit/receive state of a single radio front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RadioState {
    #[default]
    Idle,
    Transmitting,
    ReceivingData,
    ReceivingControl,
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RadioState::Idle => "IDLE",
            RadioState::Transmitting => "TX",
            RadioState::ReceivingData => "RX_DATA",
            RadioState::ReceivingControl => "RX_CTRL",
        };
        f.write_str(name)
    }
}

/// Frame / subframe / slot triple.
///
/// Never stored as independent state: it is always derived from the scalar
/// slot counter through [`crate::simulation::config::PhyMacConfig::sfn_sf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct SfnSf {
    pub frame: u16,
    pub subframe: u8,
    pub slot: u8,
}

impl fmt::Display for SfnSf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.frame, self.subframe, self.slot)
    }
}

/// Identifies the peer a packet belongs to. Required on every non-empty packet
/// that crosses the air interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RadioBearerTag {
    pub rnti: Rnti,
}

/// MAC PDU information attached by the transmitting MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MacPduTag {
    pub sfn: SfnSf,
    pub sym_start: u8,
    pub num_sym: u8,
}

/// One higher-layer packet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Packet {
    pub payload: Vec<u8>,
    pub bearer: Option<RadioBearerTag>,
    pub pdu: Option<MacPduTag>,
    /// Final destination; `None` means broadcast to every paired device.
    pub destination: Option<Rnti>,
}

impl Packet {
    pub fn new(payload: Vec<u8>) -> Self {
        Packet { payload, ..Default::default() }
    }

    pub fn with_bearer(mut self, rnti: Rnti) -> Self {
        self.bearer = Some(RadioBearerTag { rnti });
        self
    }

    pub fn with_pdu_tag(mut self, tag: MacPduTag) -> Self {
        self.pdu = Some(tag);
        self
    }

    pub fn with_destination(mut self, destination: Option<Rnti>) -> Self {
        self.destination = destination;
        self
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Ordered batch of packets sent within one transport block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PacketBurst {
    packets: Vec<Packet>,
}

impl PacketBurst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_packets(packets: Vec<Packet>) -> Self {
        PacketBurst { packets }
    }

    pub fn push(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn packets_mut(&mut self) -> &mut Vec<Packet> {
        &mut self.packets
    }

    /// Consume the burst, yielding its packets in order.
    pub fn into_packets(self) -> Vec<Packet> {
        self.packets
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Total payload size in bytes.
    pub fn size(&self) -> usize {
        self.packets.iter().map(Packet::size).sum()
    }
}

/// Sidelink control information describing the data carried in the same slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SidelinkControlInfo {
    pub source: Rnti,
    /// `None` addresses every receiver.
    pub destination: Option<Rnti>,
    pub mcs: u8,
    pub tb_size_bits: u32,
    pub rb_bitmap: Vec<usize>,
    pub ndi: u8,
    pub rv: u8,
    pub sym_start: u8,
    pub num_sym: u8,
}

impl SidelinkControlInfo {
    pub fn is_addressed_to(&self, rnti: Rnti) -> bool {
        self.destination.is_none_or(|d| d == rnti)
    }
}

/// Control messages carried alongside (or instead of) data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ControlMessage {
    Sci(SidelinkControlInfo),
    /// Opaque higher-layer signalling, forwarded untouched.
    Generic { source: Rnti, label: String },
}

impl ControlMessage {
    pub fn source(&self) -> Rnti {
        match self {
            ControlMessage::Sci(sci) => sci.source,
            ControlMessage::Generic { source, .. } => *source,
        }
    }
}

/// A block this receiver has been told to expect from a given peer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectedTransportBlock {
    pub ndi: u8,
    pub size_bits: u32,
    pub mcs: u8,
    pub rb_bitmap: Vec<usize>,
    pub rv: u8,
    /// Block error rate computed at window close.
    pub tbler: f64,
    /// Mutual-information metric computed at window close.
    pub mi: f64,
    pub corrupted: bool,
    pub sym_start: u8,
    pub num_sym: u8,
}

impl ExpectedTransportBlock {
    pub fn new(ndi: u8, size_bits: u32, mcs: u8, rb_bitmap: Vec<usize>, rv: u8, sym_start: u8, num_sym: u8) -> Self {
        ExpectedTransportBlock {
            ndi,
            size_bits,
            mcs,
            rb_bitmap,
            rv,
            tbler: 0.0,
            mi: 0.0,
            corrupted: false,
            sym_start,
            num_sym,
        }
    }
}

impl From<&SidelinkControlInfo> for ExpectedTransportBlock {
    fn from(sci: &SidelinkControlInfo) -> Self {
        ExpectedTransportBlock::new(sci.ndi, sci.tb_size_bits, sci.mcs, sci.rb_bitmap.clone(), sci.rv, sci.sym_start, sci.num_sym)
    }
}

/// One per-packet reception record produced in enhanced reporting mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RxPacketTrace {
    pub receiver: Rnti,
    pub rnti: Rnti,
    pub tb_size: u32,
    pub frame: u16,
    pub subframe: u8,
    pub slot: u8,
    pub mcs: u8,
    pub rv: u8,
    pub sinr_avg: f64,
    pub sinr_min: f64,
    pub mi: f64,
    pub tbler: f64,
    pub corrupted: bool,
    pub sym_start: u8,
    pub num_sym: u8,
    pub cc_id: u8,
}
