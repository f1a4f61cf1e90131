//! Transport block error model.
//!
//! The PHY consumes any [`TransportBlockErrorModel`]; the default is a
//! mutual-information based model:
//!
//! 1. Per allocated resource block, the normalised mutual information of the
//!    MCS's constellation is bounded by Shannon: `min(log2(1 + sinr), Q) / Q`.
//! 2. The mean over the allocation is the block's MI metric (MIB), combined
//!    with MI from earlier HARQ attempts and capped at 1.
//! 3. The block is segmented into code blocks (max 6144 bits, 24-bit CRC).
//! 4. Each code block fails with `0.5 * erfc((MIB - ECR) / (sqrt(2) * c))`,
//!    where ECR is the MCS's effective coding rate and `c` narrows as code
//!    blocks grow.
//! 5. The transport block fails if any code block fails.
//!
//! The model is deterministic; the corruption coin flip lives in the PHY.

use super::spectrum::SpectrumValue;

pub const MAX_MCS: u8 = 28;
/// Maximum code block size in bits.
const MAX_CODE_BLOCK_SIZE: u32 = 6144;
/// CRC length appended to the transport block and to each code block.
const CRC_LEN: u32 = 24;

/// Effective coding rate per MCS index.
const EFFECTIVE_CODING_RATE: [f64; 29] = [
    0.08, 0.1, 0.11, 0.15, 0.19, 0.24, 0.3, 0.37, 0.44, 0.51, // QPSK
    0.3, 0.33, 0.37, 0.42, 0.48, 0.54, 0.6, // 16QAM
    0.43, 0.45, 0.5, 0.55, 0.6, 0.65, 0.7, 0.75, 0.8, 0.85, 0.89, 0.92, // 64QAM
];

/// Output of one error model evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TbStats {
    /// Transport block error rate in [0, 1].
    pub tbler: f64,
    /// Mutual-information metric including earlier HARQ attempts.
    pub mi_total: f64,
}

/// Block error rate oracle consumed by the PHY at the end of a data window.
pub trait TransportBlockErrorModel {
    /// # Parameters
    ///
    /// * `sinr` - perceived linear SINR per chunk
    /// * `rb_map` - indices of the allocated resource blocks
    /// * `size_bits` - transport block size
    /// * `mcs` - modulation and coding scheme index
    /// * `harq_mi` - MI accumulated by earlier attempts of the same block
    fn tb_decodification_stats(&self, sinr: &SpectrumValue, rb_map: &[usize], size_bits: u32, mcs: u8, harq_mi: &[f64]) -> TbStats;
}

/// Bits per symbol of the constellation used by an MCS index.
pub fn modulation_order(mcs: u8) -> u32 {
    match mcs {
        0..=9 => 2,
        10..=16 => 4,
        _ => 6,
    }
}

pub fn effective_coding_rate(mcs: u8) -> f64 {
    EFFECTIVE_CODING_RATE[mcs.min(MAX_MCS) as usize]
}

/// Code block segmentation: (number of code blocks, bits per code block).
pub fn code_block_segmentation(size_bits: u32) -> (u32, u32) {
    let b = size_bits + CRC_LEN;
    if b <= MAX_CODE_BLOCK_SIZE {
        (1, b)
    } else {
        let c = b.div_ceil(MAX_CODE_BLOCK_SIZE - CRC_LEN);
        (c, (b + c * CRC_LEN).div_ceil(c))
    }
}

// Abramowitz & Stegun approximation 7.1.26
fn erfc(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.3275911 * x.abs());
    let poly = t * (0.254829592 + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    let result = poly * (-x * x).exp();
    if x >= 0.0 { result } else { 2.0 - result }
}

/// Spread of the BLER waterfall for a code block size.
fn waterfall_spread(code_block_bits: u32) -> f64 {
    (0.2 * (40.0 / code_block_bits.max(40) as f64).sqrt()).max(0.01)
}

/// Mutual-information error model.
#[derive(Debug, Clone, Copy, Default)]
pub struct MiErrorModel;

impl MiErrorModel {
    /// Mean normalised MI over the allocated resource blocks, or `None` if no
    /// allocated index falls inside the SINR curve.
    pub fn mutual_information(sinr: &SpectrumValue, rb_map: &[usize], mcs: u8) -> Option<f64> {
        let q = modulation_order(mcs) as f64;
        let per_rb: Vec<f64> = rb_map
            .iter()
            .filter_map(|&rb| sinr.values().get(rb))
            .map(|&s| (1.0 + s.max(0.0)).log2().min(q) / q)
            .collect();
        if per_rb.is_empty() {
            None
        } else {
            Some(per_rb.iter().sum::<f64>() / per_rb.len() as f64)
        }
    }
}

impl TransportBlockErrorModel for MiErrorModel {
    fn tb_decodification_stats(&self, sinr: &SpectrumValue, rb_map: &[usize], size_bits: u32, mcs: u8, harq_mi: &[f64]) -> TbStats {
        let Some(mib) = Self::mutual_information(sinr, rb_map, mcs) else {
            return TbStats { tbler: 1.0, mi_total: 0.0 };
        };
        let mi_total = (mib + harq_mi.iter().sum::<f64>()).min(1.0);

        let (num_cb, cb_size) = code_block_segmentation(size_bits);
        let c = waterfall_spread(cb_size);
        let cbler = (0.5 * erfc((mi_total - effective_coding_rate(mcs)) / (std::f64::consts::SQRT_2 * c))).clamp(0.0, 1.0);
        let tbler = 1.0 - (1.0 - cbler).powi(num_cb as i32);

        TbStats {
            tbler: tbler.clamp(0.0, 1.0),
            mi_total,
        }
    }
}
