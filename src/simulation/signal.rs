//! Descriptor of one physical transmission on the shared medium.

use super::spectrum::SpectrumValue;
use super::time::SimTime;
use super::types::{ControlMessage, PacketBurst, Rnti};
use serde::{Deserialize, Serialize};

/// Antenna of a radio front-end, reduced to a fixed gain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntennaModel {
    pub gain_db: f64,
}

impl Default for AntennaModel {
    fn default() -> Self {
        AntennaModel { gain_db: 0.0 }
    }
}

/// One in-flight transmission.
///
/// Built by the transmitting PHY and never modified after it is handed to the
/// medium. The medium gives every receiver its own clone; `Clone` copies the
/// packet burst and control messages deeply, so a receiver can never observe
/// another receiver's (or the sender's) changes.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalParameters {
    pub psd: SpectrumValue,
    pub duration: SimTime,
    pub packet_burst: Option<PacketBurst>,
    pub ctrl_msgs: Vec<ControlMessage>,
    pub tx_antenna: AntennaModel,
    pub slot_index: u64,
    /// Transmitting device.
    pub sender: Rnti,
    /// Control-only signal (no data channel).
    pub control_only: bool,
}

impl SignalParameters {
    /// A signal is a data signal unless it was sent on the control-only path.
    pub fn is_data(&self) -> bool {
        !self.control_only
    }

    /// Copy with the power spectral density scaled by a linear gain.
    pub fn with_gain(&self, gain_linear: f64) -> SignalParameters {
        SignalParameters {
            psd: &self.psd * gain_linear,
            ..self.clone()
        }
    }
}
