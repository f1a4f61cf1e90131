//! Fatal error conditions of the physical layer.
//!
//! Every variant describes a broken invariant in the caller (bad scheduling,
//! missing setup), never a modeled radio outcome. Transport block corruption
//! is reported through the reception path, not through this type.

use super::time::SimTime;
use super::types::{RadioState, Rnti};
use thiserror::Error;

pub type PhyResult<T> = Result<T, PhyError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhyError {
    #[error("cannot transmit while receiving (state {0})")]
    TransmitWhileReceiving(RadioState),

    #[error("cannot transmit while a different transmission is still on")]
    TransmitWhileTransmitting,

    #[error("cannot receive while transmitting")]
    ReceiveWhileTransmitting,

    #[error("cannot receive data during a control reception window")]
    DataDuringControl,

    #[error("cannot receive control during a data reception window")]
    ControlDuringData,

    /// Concurrent signals in one window must share start time and duration.
    #[error("concurrent signal mismatch: window opened at {window_start} for {window_duration}, signal at {start} for {duration}")]
    MisalignedConcurrentSignal {
        window_start: SimTime,
        window_duration: SimTime,
        start: SimTime,
        duration: SimTime,
    },

    #[error("end of transmission fired in state {0}")]
    UnexpectedEndOfTransmission(RadioState),

    #[error("end of reception fired in state {0}")]
    UnexpectedEndOfReception(RadioState),

    #[error("missing configuration: {0}")]
    MissingConfiguration(&'static str),

    #[error("shared medium is no longer attached")]
    ChannelClosed,

    #[error("packet of {size} bytes carries no radio bearer tag")]
    MissingPacketTag { size: usize },

    #[error("packet from rnti {0} carries no MAC PDU tag")]
    MissingPduTag(Rnti),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown device rnti {0}")]
    UnknownDevice(Rnti),
}
