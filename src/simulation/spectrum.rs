//! Per-band spectral values.
//!
//! A [`SpectrumValue`] holds one `f64` per chunk of the configured bandwidth.
//! It is used for power spectral densities (W/Hz) and for SINR curves (linear).
//! Binary operations are element-wise over the common prefix of both operands.

use serde::Serialize;
use std::ops::{Add, AddAssign, Div, Mul, Sub};

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SpectrumValue {
    values: Vec<f64>,
}

impl SpectrumValue {
    pub fn zeros(bands: usize) -> Self {
        SpectrumValue { values: vec![0.0; bands] }
    }

    pub fn constant(bands: usize, value: f64) -> Self {
        SpectrumValue { values: vec![value; bands] }
    }

    pub fn from_values(values: Vec<f64>) -> Self {
        SpectrumValue { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn num_bands(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Mean over all bands, 0 for an empty value.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() { 0.0 } else { self.sum() / self.values.len() as f64 }
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    /// Integrated power over a uniform band width.
    pub fn integrate(&self, band_width_hz: f64) -> f64 {
        self.sum() * band_width_hz
    }

    fn zip_with(&self, rhs: &SpectrumValue, f: impl Fn(f64, f64) -> f64) -> SpectrumValue {
        SpectrumValue {
            values: self.values.iter().zip(rhs.values.iter()).map(|(a, b)| f(*a, *b)).collect(),
        }
    }
}

impl Add for &SpectrumValue {
    type Output = SpectrumValue;

    fn add(self, rhs: &SpectrumValue) -> SpectrumValue {
        self.zip_with(rhs, |a, b| a + b)
    }
}

impl Sub for &SpectrumValue {
    type Output = SpectrumValue;

    fn sub(self, rhs: &SpectrumValue) -> SpectrumValue {
        self.zip_with(rhs, |a, b| a - b)
    }
}

impl Div for &SpectrumValue {
    type Output = SpectrumValue;

    fn div(self, rhs: &SpectrumValue) -> SpectrumValue {
        self.zip_with(rhs, |a, b| a / b)
    }
}

impl Mul<f64> for &SpectrumValue {
    type Output = SpectrumValue;

    fn mul(self, factor: f64) -> SpectrumValue {
        SpectrumValue {
            values: self.values.iter().map(|v| v * factor).collect(),
        }
    }
}

impl AddAssign<&SpectrumValue> for SpectrumValue {
    fn add_assign(&mut self, rhs: &SpectrumValue) {
        if self.values.len() < rhs.values.len() {
            self.values.resize(rhs.values.len(), 0.0);
        }
        for (a, b) in self.values.iter_mut().zip(rhs.values.iter()) {
            *a += b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_wise_arithmetic() {
        let a = SpectrumValue::from_values(vec![1.0, 2.0, 3.0]);
        let b = SpectrumValue::from_values(vec![1.0, 1.0, 2.0]);
        assert_eq!((&a + &b).values(), &[2.0, 3.0, 5.0]);
        assert_eq!((&a - &b).values(), &[0.0, 1.0, 1.0]);
        assert_eq!((&a / &b).values(), &[1.0, 2.0, 1.5]);
        assert_eq!((&a * 2.0).values(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn statistics() {
        let a = SpectrumValue::from_values(vec![4.0, 1.0, 7.0]);
        assert_eq!(a.sum(), 12.0);
        assert_eq!(a.mean(), 4.0);
        assert_eq!(a.min(), Some(1.0));
        assert_eq!(a.max(), Some(7.0));
        assert_eq!(SpectrumValue::default().mean(), 0.0);
        assert_eq!(SpectrumValue::default().min(), None);
    }

    #[test]
    fn add_assign_grows_empty_accumulator() {
        let mut acc = SpectrumValue::default();
        acc += &SpectrumValue::constant(3, 0.5);
        acc += &SpectrumValue::constant(3, 0.25);
        assert_eq!(acc.values(), &[0.75, 0.75, 0.75]);
    }
}
