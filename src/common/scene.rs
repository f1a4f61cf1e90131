//! Scene loading, parsing, and validation logic.
//!
//! A scene describes one simulation run: frame numerology, radio parameters,
//! propagation model, static blockers and the vehicles with their traffic.
//! Scenes are read from JSON or, when the file name ends in `.toml`, TOML.

use crate::simulation::config::PhyMacConfig;
use crate::simulation::error_model::MAX_MCS;
use crate::simulation::geometry::{Blocker, Position};
use crate::simulation::signal_calculations::PathLossParameters;
use crate::simulation::types::Rnti;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Error type for scene loading failures.
#[derive(Error, Debug)]
pub enum SceneLoadError {
    #[error("Failed to read file: {0}")]
    FileReadError(String),
    #[error("Failed to parse scene: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

fn default_seed() -> u64 {
    1
}

fn default_numerology() -> u8 {
    2
}

fn default_bandwidth() -> f64 {
    1e8
}

fn default_centre_frequency() -> f64 {
    28e9
}

fn default_blockage_loss() -> f64 {
    20.0
}

fn default_tx_power() -> f64 {
    30.0
}

fn default_noise_figure() -> f64 {
    5.0
}

fn default_true() -> bool {
    true
}

/// Radio parameters shared by every vehicle.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PhyParameters {
    /// Transmit power in dBm.
    #[serde(default = "default_tx_power")]
    pub tx_power_dbm: f64,
    /// Receiver noise figure in dB.
    #[serde(default = "default_noise_figure")]
    pub noise_figure_db: f64,
    #[serde(default)]
    pub mcs: u8,
    /// Disable to forward every expected block regardless of SINR.
    #[serde(default = "default_true")]
    pub error_model_enabled: bool,
    /// Emit per-packet reception traces and SINR reports.
    #[serde(default)]
    pub enhanced_reporting: bool,
    #[serde(default)]
    pub antenna_gain_db: f64,
}

impl Default for PhyParameters {
    fn default() -> Self {
        PhyParameters {
            tx_power_dbm: default_tx_power(),
            noise_figure_db: default_noise_figure(),
            mcs: 0,
            error_model_enabled: true,
            enhanced_reporting: false,
            antenna_gain_db: 0.0,
        }
    }
}

/// Periodic application traffic of one vehicle.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TrafficFlow {
    /// Receiving vehicle; absent for broadcast.
    #[serde(default)]
    pub destination: Option<Rnti>,
    /// Payload size in bytes.
    pub packet_size: usize,
    /// Time between packets in microseconds.
    pub interval_us: u64,
    /// First packet time in microseconds.
    #[serde(default)]
    pub start_us: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Vehicle {
    pub rnti: Rnti,
    pub position: Position,
    /// Meters per second.
    #[serde(default)]
    pub velocity: Position,
    #[serde(default)]
    pub traffic: Option<TrafficFlow>,
}

/// Root structure representing the entire scene.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Scene {
    /// Seed of every random stream in the run.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Simulated time in milliseconds.
    pub duration_ms: u64,
    #[serde(default = "default_numerology")]
    pub numerology: u8,
    #[serde(default = "default_bandwidth")]
    pub bandwidth_hz: f64,
    #[serde(default = "default_centre_frequency")]
    pub centre_frequency_hz: f64,
    #[serde(default)]
    pub phy: PhyParameters,
    #[serde(default)]
    pub path_loss: PathLossParameters,
    /// Static rectangles that cut line of sight.
    #[serde(default)]
    pub blockers: Vec<Blocker>,
    /// Extra loss on blocked links, in dB.
    #[serde(default = "default_blockage_loss")]
    pub blockage_loss_db: f64,
    pub vehicles: Vec<Vehicle>,
}

impl Scene {
    /// Frame structure of this scene.
    pub fn phy_mac_config(&self) -> Result<PhyMacConfig, String> {
        PhyMacConfig::from_numerology(self.numerology, self.bandwidth_hz)
            .map(|c| c.with_centre_frequency(self.centre_frequency_hz))
            .map_err(|e| e.to_string())
    }
}

/// Parse scene text, TOML or JSON.
pub fn parse_scene(data: &str, toml_format: bool) -> Result<Scene, SceneLoadError> {
    let scene: Scene = if toml_format {
        toml::from_str(data)
            .context("Invalid TOML format")
            .map_err(|e| SceneLoadError::ParseError(format!("{:#}", e)))?
    } else {
        serde_json::from_str(data)
            .context("Invalid JSON format")
            .map_err(|e| SceneLoadError::ParseError(format!("{:#}", e)))?
    };
    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;
    Ok(scene)
}

/// Load and parse a scene from a file.
///
/// # Parameters
///
/// * `path` - Path to the scene file; `.toml` selects TOML, anything else JSON
///
/// # Returns
///
/// Parsed and validated Scene or an error.
pub fn load_scene(path: &str) -> Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path))
        .map_err(|e| SceneLoadError::FileReadError(format!("{:#}", e)))?;
    let toml_format = Path::new(path).extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    parse_scene(&data, toml_format)
}

/// Validate scene configuration.
///
/// # Returns
///
/// `Ok(())` if validation passes, `Err(String)` with error description otherwise.
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    const MIN_TX_POWER: f64 = -50.0;
    const MAX_TX_POWER: f64 = 50.0;

    if scene.duration_ms == 0 {
        return Err("duration_ms must be positive".to_string());
    }

    let config = scene.phy_mac_config()?;

    if scene.vehicles.is_empty() {
        return Err("Scene must contain at least one vehicle".to_string());
    }
    if scene.vehicles.len() > config.slots_per_subframe as usize {
        return Err(format!(
            "Too many vehicles: {} vehicles but only {} slots per subframe",
            scene.vehicles.len(),
            config.slots_per_subframe
        ));
    }

    let mut rntis = HashSet::new();
    for v in &scene.vehicles {
        if !rntis.insert(v.rnti) {
            return Err(format!("Duplicate rnti found: {}", v.rnti));
        }
    }

    for v in &scene.vehicles {
        let Some(flow) = &v.traffic else {
            continue;
        };
        if flow.packet_size == 0 {
            return Err(format!("Vehicle {} traffic packet_size must be positive", v.rnti));
        }
        if flow.interval_us == 0 {
            return Err(format!("Vehicle {} traffic interval_us must be positive", v.rnti));
        }
        if let Some(dest) = flow.destination {
            if dest == v.rnti {
                return Err(format!("Vehicle {} sends traffic to itself", v.rnti));
            }
            if !rntis.contains(&dest) {
                return Err(format!("Vehicle {} sends traffic to unknown rnti {}", v.rnti, dest));
            }
        }
    }

    let phy = &scene.phy;
    if phy.tx_power_dbm < MIN_TX_POWER || phy.tx_power_dbm > MAX_TX_POWER {
        return Err(format!(
            "tx_power_dbm {} outside realistic range ({} to {} dBm)",
            phy.tx_power_dbm, MIN_TX_POWER, MAX_TX_POWER
        ));
    }
    if phy.noise_figure_db < 0.0 {
        return Err("Invalid noise_figure_db, must be non-negative".to_string());
    }
    if phy.mcs > MAX_MCS {
        return Err(format!("Invalid mcs {}, must be 0-{}", phy.mcs, MAX_MCS));
    }

    if scene.path_loss.path_loss_exponent <= 0.0 {
        return Err("Invalid path_loss_exponent, must be positive".to_string());
    }
    if scene.path_loss.shadowing_sigma < 0.0 {
        return Err("Invalid shadowing_sigma, must be non-negative".to_string());
    }
    if scene.blockage_loss_db < 0.0 {
        return Err("Invalid blockage_loss_db, must be non-negative".to_string());
    }
    for (idx, b) in scene.blockers.iter().enumerate() {
        if b.top_left.x >= b.bottom_right.x || b.top_left.y >= b.bottom_right.y {
            return Err(format!(
                "Blocker {} has invalid geometry: top-left ({}, {}) must be strictly less than bottom-right ({}, {})",
                idx, b.top_left.x, b.top_left.y, b.bottom_right.x, b.bottom_right.y
            ));
        }
    }

    Ok(())
}
