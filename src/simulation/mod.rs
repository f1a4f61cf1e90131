//! Sidelink simulation core module.
//!
//! This module provides the complete simulation infrastructure for a group of
//! vehicles sharing one mmWave sidelink channel. It integrates:
//! - A discrete-event timeline with cancellable events
//! - Per-vehicle slot scheduling and a minimal MAC
//! - The spectrum PHY transmit/receive state machine
//! - Interference accumulation and SINR computation
//! - A mutual-information transport block error model
//! - Signal propagation with path loss, shadowing and blockage
//!
//! ## Module Organization
//!
//! - `time`, `scheduler`: simulated clock and event queue
//! - `config`: frame structure derived from the numerology
//! - `types`, `signal`, `spectrum`: packets, control messages, signal envelopes
//! - `spectrum_phy`, `interference`, `error_model`: the receive chain
//! - `phy`, `mac`: slot clock and the MAC in front of it
//! - `channel`, `geometry`, `signal_calculations`: the shared medium
//! - `network`: the simulation driver
//!
//! ## Public API
//!
//! The main entry point is [`Simulation::from_scene`] followed by
//! [`Simulation::run`].

pub mod channel;
pub mod config;
pub mod error;
pub mod error_model;
pub mod geometry;
pub mod interference;
pub mod mac;
pub mod network;
pub mod phy;
pub mod scheduler;
pub mod signal;
pub mod signal_calculations;
pub mod spectrum;
pub mod spectrum_phy;
pub mod time;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{PhyError, PhyResult};
pub use network::{Simulation, SimulationReport};
pub use spectrum_phy::{ReportingMode, SidelinkSpectrumPhy};
pub use time::SimTime;
