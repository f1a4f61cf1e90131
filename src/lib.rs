//! mmWave sidelink PHY simulator.
//!
//! - `common`: scene loading and validation
//! - `simulation`: spectrum PHY, slot scheduler, interference, error model
//!   and the event-driven simulation that ties vehicles together

pub mod common;
pub mod simulation;
