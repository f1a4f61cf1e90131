//! Radio signal and link budget calculations.
//!
//! Contains helpers for:
//! - dB / linear and dBm / mW / W conversions
//! - Thermal noise and transmit power spectral densities over the configured chunks
//! - Log-distance path loss with optional log-normal shadowing
//!
//! Units:
//! - Power: dBm, mW and W (conversions provided)
//! - Power spectral density: W/Hz per chunk
//! - Distance: meters

use super::config::PhyMacConfig;
use super::spectrum::SpectrumValue;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Thermal noise density at T0 = 290 K.
pub const KT_DBM_PER_HZ: f64 = -174.0;
const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Parameters defining the radio channel propagation model.
///
/// These constants drive the log-distance path loss model with log-normal
/// shadowing used by the shared medium between every pair of vehicles.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PathLossParameters {
    /// Path loss exponent (n).
    ///
    /// - n = 2.0: Free space
    /// - n = 2.0 to 2.5: Highway line-of-sight
    /// - n = 3.0 and above: Urban with blockage
    pub path_loss_exponent: f64,

    /// Standard deviation for log-normal shadowing (σ) in dB.
    ///
    /// A value of 0.0 disables shadowing.
    #[serde(default)]
    pub shadowing_sigma: f64,

    /// Path loss at the reference distance d₀ = 1 m in dB.
    ///
    /// When absent, the free-space loss at the carrier frequency is used.
    #[serde(default)]
    pub path_loss_at_reference_distance: Option<f64>,
}

impl Default for PathLossParameters {
    fn default() -> Self {
        PathLossParameters {
            path_loss_exponent: 2.0,
            shadowing_sigma: 0.0,
            path_loss_at_reference_distance: None,
        }
    }
}

pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

pub fn linear_to_db(linear: f64) -> f64 {
    10.0 * linear.log10()
}

/// Convert dBm to milliwatts.
///
/// `mW = 10^(dBm / 10)`
pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

/// Convert milliwatts to dBm.
pub fn mw_to_dbm(mw: f64) -> f64 {
    10.0 * mw.log10()
}

pub fn dbm_to_watts(dbm: f64) -> f64 {
    dbm_to_mw(dbm) / 1000.0
}

/// Build the receiver noise power spectral density.
///
/// The same density (W/Hz) is placed in every chunk:
///
/// ```text
/// N0 = 10^((kT + NF) / 10) mW/Hz,  kT = -174 dBm/Hz
/// ```
///
/// # Parameters
///
/// * `config` - frame configuration, gives the number of chunks
/// * `noise_figure_db` - receiver noise figure
pub fn noise_power_spectral_density(config: &PhyMacConfig, noise_figure_db: f64) -> SpectrumValue {
    let density = dbm_to_watts(KT_DBM_PER_HZ + noise_figure_db);
    SpectrumValue::constant(config.total_num_chunks(), density)
}

/// Build the transmit power spectral density.
///
/// Total power is spread evenly over the active chunks; every other chunk
/// carries zero power. Indices outside the configured bandwidth are ignored.
///
/// # Parameters
///
/// * `config` - frame configuration, gives chunk count and width
/// * `tx_power_dbm` - total transmit power
/// * `active_chunks` - indices of the chunks used for this transmission
pub fn tx_power_spectral_density(config: &PhyMacConfig, tx_power_dbm: f64, active_chunks: &[usize]) -> SpectrumValue {
    let n = config.total_num_chunks();
    let mut psd = SpectrumValue::zeros(n);
    let active: Vec<usize> = active_chunks.iter().copied().filter(|&i| i < n).collect();
    if active.is_empty() {
        return psd;
    }
    let density = dbm_to_watts(tx_power_dbm) / (active.len() as f64 * config.chunk_width_hz);
    let values = psd.values_mut();
    for i in active {
        values[i] = density;
    }
    psd
}

/// Free-space path loss at 1 m for a carrier frequency, in dB.
pub fn free_space_reference_loss(frequency_hz: f64) -> f64 {
    20.0 * (4.0 * std::f64::consts::PI * frequency_hz / SPEED_OF_LIGHT).log10()
}

/// Calculate the path loss (in dB) at a given distance using a log-distance
/// path loss model with log-normal shadowing.
///
/// # Formula
///
/// ```text
/// PL(d) = PL(d₀) + 10 × n × log₁₀(d/d₀) + X_σ
/// where d₀ = 1 meter (reference distance)
/// ```
///
/// # Parameters
///
/// - `distance`: distance between transmitter and receiver in meters
/// - `frequency_hz`: carrier frequency, used when no reference loss is configured
/// - `params`: path loss model parameters
/// - `rng`: random stream used for the shadowing sample
///
/// # Notes
///
/// - For distances < 1.0 meter, the reference loss (plus shadowing) is returned
/// - Each call samples a new shadowing value when σ > 0
pub fn calculate_path_loss<R: Rng + ?Sized>(distance: f64, frequency_hz: f64, params: &PathLossParameters, rng: &mut R) -> f64 {
    let pl0 = params
        .path_loss_at_reference_distance
        .unwrap_or_else(|| free_space_reference_loss(frequency_hz));
    let path_loss = if distance < 1.0 {
        pl0
    } else {
        pl0 + 10.0 * params.path_loss_exponent * distance.log10()
    };
    // Sample log-normal shadowing as a Normal(0, sigma) in dB
    let shadowing = match Normal::new(0.0, params.shadowing_sigma) {
        Ok(normal) if params.shadowing_sigma > 0.0 => normal.sample(rng),
        _ => 0.0,
    };
    path_loss + shadowing
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn config() -> PhyMacConfig {
        PhyMacConfig::from_numerology(2, 1e8).unwrap()
    }

    fn default_pathloss() -> PathLossParameters {
        PathLossParameters {
            path_loss_exponent: 2.0,
            shadowing_sigma: 0.0,
            path_loss_at_reference_distance: Some(40.0),
        }
    }

    #[test]
    fn dbm_mw_conversion_roundtrip_reasonable() {
        for v in [-100.0, -50.0, 0.0, 10.0, 30.0] {
            assert!((v - mw_to_dbm(dbm_to_mw(v))).abs() < 1e-9);
        }
        assert!((dbm_to_watts(30.0) - 1.0).abs() < 1e-12);
        assert!((linear_to_db(db_to_linear(7.5)) - 7.5).abs() < 1e-12);
    }

    #[test]
    fn noise_psd_matches_kt_plus_noise_figure() {
        let c = config();
        let n = noise_power_spectral_density(&c, 5.0);
        assert_eq!(n.num_bands(), c.total_num_chunks());
        let expected = 1e-3 * 10f64.powf((-174.0 + 5.0) / 10.0);
        for v in n.values() {
            assert!((v - expected).abs() / expected < 1e-12);
        }
    }

    #[test]
    fn tx_psd_integrates_to_total_power() {
        let c = config();
        let active: Vec<usize> = (0..c.total_num_chunks()).collect();
        let psd = tx_power_spectral_density(&c, 30.0, &active);
        let total = psd.integrate(c.chunk_width_hz);
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tx_psd_only_on_active_chunks() {
        let c = config();
        let psd = tx_power_spectral_density(&c, 20.0, &[0, 5, 10_000]);
        let nonzero: Vec<usize> = psd.values().iter().enumerate().filter(|(_, v)| **v > 0.0).map(|(i, _)| i).collect();
        assert_eq!(nonzero, vec![0, 5]);
        assert!((psd.integrate(c.chunk_width_hz) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn path_loss_grows_with_distance() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let p = default_pathloss();
        let near = calculate_path_loss(10.0, 28e9, &p, &mut rng);
        let far = calculate_path_loss(100.0, 28e9, &p, &mut rng);
        assert!((near - 60.0).abs() < 1e-9);
        assert!((far - 80.0).abs() < 1e-9);
        assert_eq!(calculate_path_loss(0.5, 28e9, &p, &mut rng), 40.0);
    }

    #[test]
    fn free_space_reference_at_28_ghz() {
        // ~61.4 dB at 1 m
        assert!((free_space_reference_loss(28e9) - 61.38).abs() < 0.05);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let p = PathLossParameters::default();
        assert!((calculate_path_loss(1.0, 28e9, &p, &mut rng) - free_space_reference_loss(28e9)).abs() < 1e-9);
    }

    #[test]
    fn shadowing_is_reproducible_with_same_seed() {
        let p = PathLossParameters {
            shadowing_sigma: 4.0,
            ..default_pathloss()
        };
        let mut a = ChaCha8Rng::seed_from_u64(9);
        let mut b = ChaCha8Rng::seed_from_u64(9);
        let xs: Vec<f64> = (0..5).map(|_| calculate_path_loss(50.0, 28e9, &p, &mut a)).collect();
        let ys: Vec<f64> = (0..5).map(|_| calculate_path_loss(50.0, 28e9, &p, &mut b)).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().any(|x| (x - xs[0]).abs() > 1e-6));
    }
}
