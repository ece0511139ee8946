//! Per-frame energy vectors and the checked arithmetic the composer is
//! built on. All values are kcal/mol.

use serde::Serialize;
use std::ops::Index;

use crate::error::LengthError;

/// An append-only sequence of per-frame energies. Vectors are combined
/// elementwise only when their lengths match; the checked operations make
/// the mismatch explicit instead of panicking.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnergyVector(Vec<f64>);

impl EnergyVector {
    pub fn new() -> EnergyVector {
        EnergyVector(Vec::new())
    }

    pub fn with_capacity(n: usize) -> EnergyVector {
        EnergyVector(Vec::with_capacity(n))
    }

    pub fn from_values(values: Vec<f64>) -> EnergyVector {
        EnergyVector(values)
    }

    pub fn push(&mut self, value: f64) {
        self.0.push(value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// The last `n` frames (or all of them when the vector is shorter).
    pub fn tail(&self, n: usize) -> &[f64] {
        let start = self.0.len().saturating_sub(n);
        &self.0[start..]
    }

    pub fn avg(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        self.0.iter().sum::<f64>() / self.0.len() as f64
    }

    /// Population standard deviation, `sqrt(<x^2> - <x>^2)`.
    pub fn stdev(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        let n = self.0.len() as f64;
        let mean = self.avg();
        let meansq = self.0.iter().map(|x| x * x).sum::<f64>() / n;
        (meansq - mean * mean).abs().sqrt()
    }

    /// Standard error of the mean.
    pub fn sem(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        self.stdev() / (self.0.len() as f64).sqrt()
    }

    pub fn checked_add(&self, other: &EnergyVector) -> Result<EnergyVector, LengthError> {
        if self.len() != other.len() {
            return Err(LengthError {
                left: self.len(),
                right: other.len(),
            });
        }
        Ok(EnergyVector(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| a + b)
                .collect(),
        ))
    }

    pub fn checked_sub(&self, other: &EnergyVector) -> Result<EnergyVector, LengthError> {
        if self.len() != other.len() {
            return Err(LengthError {
                left: self.len(),
                right: other.len(),
            });
        }
        Ok(EnergyVector(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| a - b)
                .collect(),
        ))
    }

    pub fn scale(&self, factor: f64) -> EnergyVector {
        EnergyVector(self.0.iter().map(|x| x * factor).collect())
    }
}

impl Index<usize> for EnergyVector {
    type Output = f64;
    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}

impl FromIterator<f64> for EnergyVector {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        EnergyVector(iter.into_iter().collect())
    }
}

/// The result of subtracting correlated-or-not energy vectors: per-frame
/// when the lengths line up, independent mean/variance propagation when
/// they do not.
#[derive(Debug, Clone, Serialize)]
pub enum Diff {
    PerFrame(EnergyVector),
    Independent { mean: f64, stdev: f64 },
}

impl Diff {
    /// `a - b`, falling back to independent-variance propagation on a
    /// length mismatch.
    pub fn between(a: &EnergyVector, b: &EnergyVector) -> Diff {
        match a.checked_sub(b) {
            Ok(v) => Diff::PerFrame(v),
            Err(_) => Diff::Independent {
                mean: a.avg() - b.avg(),
                stdev: (a.stdev().powi(2) + b.stdev().powi(2)).sqrt(),
            },
        }
    }

    pub fn avg(&self) -> f64 {
        match self {
            Diff::PerFrame(v) => v.avg(),
            Diff::Independent { mean, .. } => *mean,
        }
    }

    pub fn stdev(&self) -> f64 {
        match self {
            Diff::PerFrame(v) => v.stdev(),
            Diff::Independent { stdev, .. } => *stdev,
        }
    }

    pub fn per_frame(&self) -> Option<&EnergyVector> {
        match self {
            Diff::PerFrame(v) => Some(v),
            Diff::Independent { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec3() -> EnergyVector {
        EnergyVector::from_values(vec![1.0, 2.0, 3.0])
    }

    #[test]
    fn statistics() {
        let v = vec3();
        assert!((v.avg() - 2.0).abs() < 1e-12);
        let expected = (2.0f64 / 3.0).sqrt();
        assert!((v.stdev() - expected).abs() < 1e-12);
        assert!((v.sem() - expected / 3.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn empty_vector_statistics_are_zero() {
        let v = EnergyVector::new();
        assert_eq!(v.avg(), 0.0);
        assert_eq!(v.stdev(), 0.0);
    }

    #[test]
    fn checked_arithmetic_requires_matching_lengths() {
        let a = vec3();
        let b = EnergyVector::from_values(vec![1.0, 1.0, 1.0]);
        assert_eq!(
            a.checked_sub(&b).unwrap(),
            EnergyVector::from_values(vec![0.0, 1.0, 2.0])
        );
        let short = EnergyVector::from_values(vec![1.0]);
        let err = a.checked_sub(&short).unwrap_err();
        assert_eq!((err.left, err.right), (3, 1));
    }

    #[test]
    fn diff_falls_back_to_variance_propagation() {
        let long: EnergyVector = (0..100).map(|i| i as f64).collect();
        let short = EnergyVector::from_values(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let d = Diff::between(&long, &short);
        assert!(d.per_frame().is_none());
        assert!((d.avg() - (long.avg() - short.avg())).abs() < 1e-12);
        let expected = (long.stdev().powi(2) + short.stdev().powi(2)).sqrt();
        assert!((d.stdev() - expected).abs() < 1e-12);
    }

    #[test]
    fn tail_window() {
        let v = vec3();
        assert_eq!(v.tail(2), &[2.0, 3.0]);
        assert_eq!(v.tail(10), &[1.0, 2.0, 3.0]);
    }
}
