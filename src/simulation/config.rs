//! Frame structure configuration.
//!
//! A [`PhyMacConfig`] is built once from a numerology index and a channel
//! bandwidth and is read-only afterwards. Only numerologies 2 (60 kHz) and
//! 3 (120 kHz) are supported for sidelink.

use super::error::{PhyError, PhyResult};
use super::time::SimTime;
use super::types::SfnSf;
use serde::Serialize;

pub const SYMBOLS_PER_SLOT: u32 = 14;
pub const SUBCARRIERS_PER_RB: u32 = 12;
pub const SUBFRAMES_PER_FRAME: u32 = 10;
/// Subframe duration in microseconds.
pub const SUBFRAME_PERIOD_US: f64 = 1000.0;
/// Frame numbers wrap at this value.
pub const MAX_FRAME_NUMBER: u64 = 1024;
pub const DEFAULT_CENTRE_FREQUENCY_HZ: f64 = 28e9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhyMacConfig {
    pub numerology_index: u8,
    pub bandwidth_hz: f64,
    pub centre_frequency_hz: f64,
    pub subcarrier_spacing_hz: f64,
    pub symbols_per_slot: u32,
    pub slots_per_subframe: u32,
    pub subframes_per_frame: u32,
    pub subframe_period_us: f64,
    pub slot_period_us: f64,
    pub symbol_period_us: f64,
    pub num_rb: u32,
    pub num_chunks_per_rb: u32,
    pub chunk_width_hz: f64,
}

impl PhyMacConfig {
    /// Derive the frame structure for a numerology index and a bandwidth.
    ///
    /// # Parameters
    ///
    /// * `index` - numerology index, 2 or 3
    /// * `bandwidth_hz` - total channel bandwidth
    ///
    /// # Returns
    ///
    /// The configuration, or `InvalidConfiguration` if the index is not
    /// supported or the bandwidth cannot hold a single resource block.
    pub fn from_numerology(index: u8, bandwidth_hz: f64) -> PhyResult<Self> {
        if index != 2 && index != 3 {
            return Err(PhyError::InvalidConfiguration(format!("numerology index {} is not valid (expected 2 or 3)", index)));
        }
        let subcarrier_spacing_hz = 15_000.0 * 2f64.powi(index as i32);
        let slots_per_subframe = 1u32 << index;
        let chunk_width_hz = SUBCARRIERS_PER_RB as f64 * subcarrier_spacing_hz;
        if !bandwidth_hz.is_finite() || bandwidth_hz < chunk_width_hz {
            return Err(PhyError::InvalidConfiguration(format!(
                "bandwidth {} Hz is smaller than one resource block ({} Hz)",
                bandwidth_hz, chunk_width_hz
            )));
        }
        let num_rb = (bandwidth_hz / chunk_width_hz).floor() as u32;

        Ok(PhyMacConfig {
            numerology_index: index,
            bandwidth_hz,
            centre_frequency_hz: DEFAULT_CENTRE_FREQUENCY_HZ,
            subcarrier_spacing_hz,
            symbols_per_slot: SYMBOLS_PER_SLOT,
            slots_per_subframe,
            subframes_per_frame: SUBFRAMES_PER_FRAME,
            subframe_period_us: SUBFRAME_PERIOD_US,
            slot_period_us: SUBFRAME_PERIOD_US / slots_per_subframe as f64,
            symbol_period_us: 1e6 / subcarrier_spacing_hz,
            num_rb,
            num_chunks_per_rb: 1,
            chunk_width_hz,
        })
    }

    pub fn with_centre_frequency(mut self, hz: f64) -> Self {
        self.centre_frequency_hz = hz;
        self
    }

    pub fn slot_period(&self) -> SimTime {
        SimTime::from_micros_f64(self.slot_period_us)
    }

    pub fn symbol_period(&self) -> SimTime {
        SimTime::from_micros_f64(self.symbol_period_us)
    }

    pub fn total_num_chunks(&self) -> usize {
        (self.num_rb * self.num_chunks_per_rb) as usize
    }

    /// Centre frequency of every chunk, lowest first.
    pub fn chunk_centre_frequencies(&self) -> Vec<f64> {
        let n = self.total_num_chunks();
        let low = self.centre_frequency_hz - (n as f64 * self.chunk_width_hz) / 2.0;
        (0..n).map(|i| low + (i as f64 + 0.5) * self.chunk_width_hz).collect()
    }

    /// Frame/subframe/slot of a scalar slot index.
    pub fn sfn_sf(&self, slot_index: u64) -> SfnSf {
        let spsf = self.slots_per_subframe as u64;
        let sfpf = self.subframes_per_frame as u64;
        SfnSf {
            frame: ((slot_index / (spsf * sfpf)) % MAX_FRAME_NUMBER) as u16,
            subframe: ((slot_index / spsf) % sfpf) as u8,
            slot: (slot_index % spsf) as u8,
        }
    }

    /// Position of a scalar slot index inside its subframe.
    pub fn slot_in_subframe(&self, slot_index: u64) -> usize {
        (slot_index % self.slots_per_subframe as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numerology_two_at_100_mhz() {
        let c = PhyMacConfig::from_numerology(2, 1e8).unwrap();
        assert_eq!(c.subcarrier_spacing_hz, 60_000.0);
        assert!((c.symbol_period_us - 16.67).abs() < 0.01);
        assert_eq!(c.symbols_per_slot, 14);
        assert_eq!(c.slots_per_subframe, 4);
        assert_eq!(c.slot_period(), SimTime::from_micros(250));
        assert_eq!(c.num_rb, (1e8_f64 / (60_000.0 * 12.0)).floor() as u32);
        assert_eq!(c.num_rb, 138);
        assert_eq!(c.chunk_width_hz, 720_000.0);
        assert_eq!(c.total_num_chunks(), 138);
    }

    #[test]
    fn numerology_three_halves_the_slot() {
        let c = PhyMacConfig::from_numerology(3, 4e8).unwrap();
        assert_eq!(c.subcarrier_spacing_hz, 120_000.0);
        assert_eq!(c.slots_per_subframe, 8);
        assert_eq!(c.slot_period(), SimTime::from_micros(125));
        assert_eq!(c.num_rb, 277);
    }

    #[test]
    fn unsupported_numerologies_are_rejected() {
        for idx in [0, 1, 4, 7] {
            assert!(matches!(PhyMacConfig::from_numerology(idx, 1e8), Err(PhyError::InvalidConfiguration(_))));
        }
        assert!(PhyMacConfig::from_numerology(2, 1000.0).is_err());
    }

    #[test]
    fn sfn_sf_is_derived_from_scalar_slot() {
        let c = PhyMacConfig::from_numerology(2, 1e8).unwrap();
        assert_eq!(c.sfn_sf(0), SfnSf { frame: 0, subframe: 0, slot: 0 });
        assert_eq!(c.sfn_sf(5), SfnSf { frame: 0, subframe: 1, slot: 1 });
        assert_eq!(c.sfn_sf(41), SfnSf { frame: 1, subframe: 0, slot: 1 });
        // 1024 frames of 40 slots wrap back to frame 0
        assert_eq!(c.sfn_sf(1024 * 40 + 3).frame, 0);
        assert_eq!(c.slot_in_subframe(7), 3);
    }

    #[test]
    fn chunk_frequencies_are_centred() {
        let c = PhyMacConfig::from_numerology(2, 1e8).unwrap().with_centre_frequency(28e9);
        let f = c.chunk_centre_frequencies();
        assert_eq!(f.len(), c.total_num_chunks());
        let mid = (f[0] + f[f.len() - 1]) / 2.0;
        assert!((mid - 28e9).abs() < 1.0);
    }
}
