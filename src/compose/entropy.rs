//! Entropy estimators computed from the interaction-energy distribution:
//! interaction entropy (IE) and C2 entropy, both evaluated on the tail
//! window of the gas-phase interaction energy, plus the small helpers
//! that combine entropy terms with enthalpy deltas.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::parse::energy::{Diff, EnergyVector};

/// Boltzmann constant in kcal/(mol K).
pub const K_B: f64 = 0.001987203611;

/// An interaction-energy sigma above this makes IE/C2 unreliable.
pub const SIGMA_RELIABILITY_LIMIT: f64 = 3.6;

/// Bootstrap resamples behind the C2 stdev and confidence interval.
const C2_BOOTSTRAP_RESAMPLES: usize = 2000;

#[derive(Debug, Clone, Serialize)]
pub struct InteractionEntropy {
    /// Window size (frames, counted from the end of the trajectory).
    pub frames: usize,
    /// Stdev of the interaction energy over the window.
    pub sigma: f64,
    /// Running `-T*dS` estimate across the window; the last entry is the
    /// converged value.
    pub data: EnergyVector,
    /// `-T*dS`, kcal/mol.
    pub value: f64,
    /// Spread of the running estimate, for the +/- column.
    pub stdev: f64,
}

impl InteractionEntropy {
    pub fn reliable(&self) -> bool {
        self.sigma <= SIGMA_RELIABILITY_LIMIT
    }
}

/// Interaction entropy over the last `window` frames of the gas-phase
/// interaction energy: `-T*dS = kT * ln(<exp(dE/kT)>)` with
/// `dE = E - <E>`.
pub fn interaction_entropy(
    egas: &EnergyVector,
    temperature: f64,
    window: usize,
) -> InteractionEntropy {
    let tail = egas.tail(window);
    let kt = K_B * temperature;
    let n = tail.len().max(1) as f64;
    let mean = tail.iter().sum::<f64>() / n;
    let sigma = {
        let meansq = tail.iter().map(|x| x * x).sum::<f64>() / n;
        (meansq - mean * mean).abs().sqrt()
    };

    // running estimate: at frame i, the ln-mean-exp over frames 0..=i
    let mut data = EnergyVector::with_capacity(tail.len());
    let mut acc = 0.0f64;
    for (i, e) in tail.iter().enumerate() {
        acc += ((e - mean) / kt).exp();
        data.push(kt * (acc / (i + 1) as f64).ln());
    }
    let value = if data.is_empty() {
        0.0
    } else {
        data[data.len() - 1]
    };
    let stdev = data.stdev();
    InteractionEntropy {
        frames: tail.len(),
        sigma,
        data,
        value,
        stdev,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct C2Entropy {
    pub frames: usize,
    pub sigma: f64,
    /// `-T*dS = sigma^2 / (2kT)`, kcal/mol.
    pub value: f64,
    /// Bootstrap stdev over the resampled windows.
    pub c2_std: f64,
    /// Bootstrap 95% confidence interval.
    pub ci: (f64, f64),
}

impl C2Entropy {
    pub fn reliable(&self) -> bool {
        self.sigma <= SIGMA_RELIABILITY_LIMIT
    }
}

fn c2_of(values: &[f64], kt: f64) -> f64 {
    let n = values.len().max(1) as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    var / (2.0 * kt)
}

/// C2 entropy over the same tail window as IE, with a bootstrap for the
/// stdev and 95% confidence interval.
pub fn c2_entropy(egas: &EnergyVector, temperature: f64, window: usize) -> C2Entropy {
    c2_entropy_seeded(egas, temperature, window, StdRng::from_entropy())
}

fn c2_entropy_seeded(
    egas: &EnergyVector,
    temperature: f64,
    window: usize,
    mut rng: StdRng,
) -> C2Entropy {
    let tail = egas.tail(window);
    let kt = K_B * temperature;
    let n = tail.len().max(1) as f64;
    let mean = tail.iter().sum::<f64>() / n;
    let sigma = {
        let meansq = tail.iter().map(|x| x * x).sum::<f64>() / n;
        (meansq - mean * mean).abs().sqrt()
    };
    let value = c2_of(tail, kt);

    let mut samples = Vec::with_capacity(C2_BOOTSTRAP_RESAMPLES);
    if !tail.is_empty() {
        let mut resample = vec![0.0f64; tail.len()];
        for _ in 0..C2_BOOTSTRAP_RESAMPLES {
            for slot in resample.iter_mut() {
                *slot = tail[rng.gen_range(0..tail.len())];
            }
            samples.push(c2_of(&resample, kt));
        }
    }
    samples.sort_by(|a, b| a.partial_cmp(b).expect("c2 samples are finite"));
    let (c2_std, ci) = if samples.is_empty() {
        (0.0, (0.0, 0.0))
    } else {
        let m = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / samples.len() as f64;
        let lo = samples[(samples.len() as f64 * 0.025) as usize];
        let hi = samples[((samples.len() as f64 * 0.975) as usize).min(samples.len() - 1)];
        (var.sqrt(), (lo, hi))
    };

    C2Entropy {
        frames: tail.len(),
        sigma,
        value,
        c2_std,
        ci,
    }
}

/// `dG = dH + (-T*dS)` where the entropy term is a per-frame vector
/// (normal modes): elementwise when the frames line up, independent
/// propagation otherwise. Returns `(mean, stdev)`.
pub fn combine_with_entropy_vector(dh: &Diff, minus_tds: &EnergyVector) -> (f64, f64) {
    if let Some(v) = dh.per_frame() {
        if let Ok(sum) = v.checked_add(minus_tds) {
            return (sum.avg(), sum.stdev());
        }
    }
    (
        dh.avg() + minus_tds.avg(),
        (dh.stdev().powi(2) + minus_tds.stdev().powi(2)).sqrt(),
    )
}

/// `ddG = dG_mutant - dG_normal` for alanine scanning, matched-length
/// where possible.
pub fn alanine_delta(mutant: &Diff, normal: &Diff) -> (f64, f64) {
    if let (Some(m), Some(n)) = (mutant.per_frame(), normal.per_frame()) {
        if let Ok(diff) = m.checked_sub(n) {
            return (diff.avg(), diff.stdev());
        }
    }
    (
        mutant.avg() - normal.avg(),
        (mutant.stdev().powi(2) + normal.stdev().powi(2)).sqrt(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ie_window_selects_the_tail() {
        let egas: EnergyVector = (0..100).map(|i| (i % 7) as f64 - 3.0).collect();
        let ie = interaction_entropy(&egas, 298.15, 25);
        assert_eq!(ie.frames, 25);
        assert_eq!(ie.data.len(), 25);
        // the converged value is the last running entry
        assert!((ie.value - ie.data[24]).abs() < 1e-12);
        // ln-mean-exp is bounded below by the mean of dE (which is ~0)
        assert!(ie.value >= 0.0);
    }

    #[test]
    fn ie_of_a_constant_signal_is_zero() {
        let egas = EnergyVector::from_values(vec![-7.5; 40]);
        let ie = interaction_entropy(&egas, 298.15, 10);
        assert!(ie.value.abs() < 1e-12);
        assert!(ie.sigma.abs() < 1e-12);
        assert!(ie.reliable());
    }

    #[test]
    fn ie_reliability_flag_follows_sigma() {
        // alternate +/-6 kcal/mol: sigma is 6, well past the limit
        let egas: EnergyVector = (0..50).map(|i| if i % 2 == 0 { 6.0 } else { -6.0 }).collect();
        let ie = interaction_entropy(&egas, 298.15, 50);
        assert!(ie.sigma > SIGMA_RELIABILITY_LIMIT);
        assert!(!ie.reliable());
    }

    #[test]
    fn c2_matches_the_closed_form() {
        let egas: EnergyVector = (0..64).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let c2 = c2_entropy_seeded(&egas, 298.15, 64, StdRng::seed_from_u64(7));
        let kt = K_B * 298.15;
        assert!((c2.value - 1.0 / (2.0 * kt)).abs() < 1e-9);
        // bootstrap brackets the point estimate
        assert!(c2.ci.0 <= c2.value && c2.value <= c2.ci.1);
        assert!(c2.c2_std > 0.0);
    }

    #[test]
    fn entropy_vector_combination_falls_back_on_length_mismatch() {
        let dh = Diff::PerFrame((0..100).map(|i| -(i as f64) / 10.0).collect());
        let minus_tds = EnergyVector::from_values(vec![5.0; 5]);
        let (mean, stdev) = combine_with_entropy_vector(&dh, &minus_tds);
        let dh_v = dh.per_frame().unwrap();
        assert!((mean - (dh_v.avg() + 5.0)).abs() < 1e-12);
        assert!((stdev - dh_v.stdev()).abs() < 1e-12); // tds stdev is zero
    }

    #[test]
    fn alanine_delta_prefers_matched_frames() {
        let norm = Diff::PerFrame(EnergyVector::from_values(vec![-10.0, -11.0]));
        let mutant = Diff::PerFrame(EnergyVector::from_values(vec![-8.0, -9.0]));
        let (mean, stdev) = alanine_delta(&mutant, &norm);
        assert!((mean - 2.0).abs() < 1e-12);
        assert!(stdev.abs() < 1e-12);

        let short = Diff::PerFrame(EnergyVector::from_values(vec![-8.0]));
        let (mean, _) = alanine_delta(&short, &norm);
        assert!((mean - (-8.0 + 10.5)).abs() < 1e-12);
    }
}
