//! Interference accumulation and SINR computation for one receiver.
//!
//! Every signal that reaches the receiver during a reception window is added
//! as a contribution (PSD, start time, duration). One of them is marked as the
//! signal of interest. When the window closes, the SINR per chunk is averaged
//! over the window:
//!
//! ```text
//! SINR_k(t) = S_k / (I_k(t) - S_k + N_k)
//! ```
//!
//! where `I_k(t)` is the sum of all contributions active at `t` and `N_k` the
//! configured noise floor. Registered observers receive the final curve.

use super::error::{PhyError, PhyResult};
use super::spectrum::SpectrumValue;
use super::time::SimTime;

/// Receives the per-chunk SINR at every window close.
pub type SinrObserver = Box<dyn FnMut(&SpectrumValue)>;

#[derive(Debug, Clone)]
struct Contribution {
    psd: SpectrumValue,
    start: SimTime,
    duration: SimTime,
}

impl Contribution {
    fn end(&self) -> SimTime {
        self.start + self.duration
    }

    fn is_active_at(&self, t: SimTime) -> bool {
        self.start <= t && t < self.end()
    }
}

#[derive(Default)]
pub struct InterferenceAccumulator {
    noise_psd: Option<SpectrumValue>,
    contributions: Vec<Contribution>,
    rx_signal: Option<SpectrumValue>,
    rx_start: Option<SimTime>,
    observers: Vec<SinrObserver>,
}

impl InterferenceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed noise floor, in W/Hz per chunk.
    pub fn set_noise_psd(&mut self, psd: SpectrumValue) {
        self.noise_psd = Some(psd);
    }

    pub fn noise_psd(&self) -> Option<&SpectrumValue> {
        self.noise_psd.as_ref()
    }

    pub fn add_sinr_observer(&mut self, observer: SinrObserver) {
        self.observers.push(observer);
    }

    /// Accumulate one contributor arriving at `now`.
    pub fn add_signal(&mut self, now: SimTime, psd: &SpectrumValue, duration: SimTime) {
        log::trace!("interference: add signal at {} for {} ({:e} W/Hz)", now, duration, psd.sum());
        self.contributions.push(Contribution {
            psd: psd.clone(),
            start: now,
            duration,
        });
    }

    /// Mark the signal of interest. The first call opens the window; within
    /// one window the receiver keeps the strongest marked signal.
    pub fn start_rx(&mut self, now: SimTime, psd: &SpectrumValue) {
        if self.rx_start.is_none() {
            self.rx_start = Some(now);
        }
        match &self.rx_signal {
            Some(current) if current.sum() >= psd.sum() => {}
            _ => self.rx_signal = Some(psd.clone()),
        }
    }

    pub fn is_receiving(&self) -> bool {
        self.rx_start.is_some() || !self.contributions.is_empty()
    }

    pub fn num_contributions(&self) -> usize {
        self.contributions.len()
    }

    /// Close the window at `now`, notify observers and return the averaged SINR.
    ///
    /// A window without a signal of interest yields a zero SINR on every chunk.
    pub fn end_rx(&mut self, now: SimTime) -> PhyResult<SpectrumValue> {
        let noise = self
            .noise_psd
            .clone()
            .ok_or(PhyError::MissingConfiguration("noise power spectral density"))?;
        let start = self
            .rx_start
            .or_else(|| self.contributions.iter().map(|c| c.start).min())
            .unwrap_or(now);
        let signal = self.rx_signal.clone().unwrap_or_else(|| SpectrumValue::zeros(noise.num_bands()));

        let sinr = self.average_sinr(start, now, &signal, &noise);
        for observer in self.observers.iter_mut() {
            observer(&sinr);
        }

        self.contributions.clear();
        self.rx_signal = None;
        self.rx_start = None;
        Ok(sinr)
    }

    /// Drop the current window without notifying observers.
    pub fn reset(&mut self) {
        self.contributions.clear();
        self.rx_signal = None;
        self.rx_start = None;
    }

    fn sinr_at(&self, t: SimTime, signal: &SpectrumValue, noise: &SpectrumValue) -> SpectrumValue {
        let mut total = SpectrumValue::zeros(noise.num_bands());
        for c in self.contributions.iter().filter(|c| c.is_active_at(t)) {
            total += &c.psd;
        }
        let values = noise
            .values()
            .iter()
            .enumerate()
            .map(|(k, n)| {
                let s = signal.values().get(k).copied().unwrap_or(0.0);
                let i = (total.values()[k] - s).max(0.0);
                s / (i + n)
            })
            .collect();
        SpectrumValue::from_values(values)
    }

    fn average_sinr(&self, start: SimTime, end: SimTime, signal: &SpectrumValue, noise: &SpectrumValue) -> SpectrumValue {
        if end <= start {
            return self.sinr_at(start, signal, noise);
        }

        let mut breakpoints = vec![start, end];
        for c in &self.contributions {
            for t in [c.start, c.end()] {
                if t > start && t < end {
                    breakpoints.push(t);
                }
            }
        }
        breakpoints.sort();
        breakpoints.dedup();

        let mut acc = SpectrumValue::zeros(noise.num_bands());
        for w in breakpoints.windows(2) {
            let dt = (w[1] - w[0]).as_nanos() as f64;
            acc += &(&self.sinr_at(w[0], signal, noise) * dt);
        }
        &acc * (1.0 / (end - start).as_nanos() as f64)
    }
}
