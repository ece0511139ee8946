//! Binding-energy composition: `delta = complex - (receptor + ligand)`
//! per term, per-frame in the single-trajectory protocol and through
//! independent mean/variance propagation in the multiple-trajectory
//! protocol.

use serde::Serialize;

use crate::parse::energy::{Diff, EnergyVector};
use crate::parse::outputs::EnergyTerms;
use crate::plan::frames::TrajectoryProtocol;

/// Term-keyed deltas, insertion-ordered like [`EnergyTerms`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeltaTerms {
    terms: Vec<(String, Diff)>,
}

impl DeltaTerms {
    pub fn get(&self, name: &str) -> Option<&Diff> {
        self.terms.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Diff)> {
        self.terms.iter().map(|(n, d)| (n.as_str(), d))
    }
}

/// One model's assembled result for one system.
#[derive(Debug, Clone, Serialize)]
pub struct ModelResult {
    pub complex: EnergyTerms,
    pub receptor: Option<EnergyTerms>,
    pub ligand: Option<EnergyTerms>,
    pub delta: Option<DeltaTerms>,
    pub protocol: TrajectoryProtocol,
}

impl ModelResult {
    /// A stability run: complex energies only, nothing cancels.
    pub fn stability(complex: EnergyTerms, protocol: TrajectoryProtocol) -> ModelResult {
        ModelResult {
            complex,
            receptor: None,
            ligand: None,
            delta: None,
            protocol,
        }
    }

    pub fn delta_total(&self) -> Option<&Diff> {
        self.delta.as_ref().and_then(|d| d.get("TOTAL"))
    }

    pub fn delta_g_gas(&self) -> Option<&Diff> {
        self.delta.as_ref().and_then(|d| d.get("G gas"))
    }
}

/// A term missing from one partner contributes zero for every frame (a
/// single-residue ligand has no internal terms to speak of, but its
/// record still spans all frames).
fn term_or_zeros(terms: &EnergyTerms, name: &str, frames: usize) -> EnergyVector {
    match terms.get(name) {
        Some(v) => v.clone(),
        None => EnergyVector::from_values(vec![0.0; frames]),
    }
}

/// Assemble the binding result for one model. Term order follows the
/// complex record.
pub fn compose_binding(
    complex: EnergyTerms,
    receptor: EnergyTerms,
    ligand: EnergyTerms,
    protocol: TrajectoryProtocol,
) -> ModelResult {
    let mut delta = DeltaTerms::default();
    for (name, com) in complex.iter() {
        let rec = term_or_zeros(&receptor, name, com.len());
        let lig = term_or_zeros(&ligand, name, com.len());
        let diff = match protocol {
            TrajectoryProtocol::Single => match rec.checked_add(&lig) {
                // LengthError here means the partners cover different
                // frames; fall back to uncorrelated statistics.
                Ok(sum) => Diff::between(com, &sum),
                Err(_) => independent(com, &rec, &lig),
            },
            TrajectoryProtocol::Multiple => independent(com, &rec, &lig),
        };
        delta.terms.push((name.to_string(), diff));
    }
    ModelResult {
        complex,
        receptor: Some(receptor),
        ligand: Some(ligand),
        delta: Some(delta),
        protocol,
    }
}

fn independent(com: &EnergyVector, rec: &EnergyVector, lig: &EnergyVector) -> Diff {
    Diff::Independent {
        mean: com.avg() - rec.avg() - lig.avg(),
        stdev: (com.stdev().powi(2) + rec.stdev().powi(2) + lig.stdev().powi(2)).sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms_of(pairs: &[(&str, &[f64])]) -> EnergyTerms {
        let mut t = EnergyTerms::new();
        for (name, values) in pairs {
            t.insert(name, EnergyVector::from_values(values.to_vec()));
        }
        t
    }

    #[test]
    fn single_trajectory_subtracts_per_frame() {
        let com = terms_of(&[("TOTAL", &[-10.0, -12.0, -14.0])]);
        let rec = terms_of(&[("TOTAL", &[-4.0, -5.0, -6.0])]);
        let lig = terms_of(&[("TOTAL", &[-1.0, -1.0, -1.0])]);
        let result = compose_binding(com, rec, lig, TrajectoryProtocol::Single);
        let delta = result.delta_total().unwrap();
        let v = delta.per_frame().expect("single trajectory keeps frames");
        assert_eq!(v.values(), &[-5.0, -6.0, -7.0]);
    }

    #[test]
    fn multiple_trajectory_propagates_variance() {
        let com = terms_of(&[("TOTAL", &[-10.0, -12.0, -14.0])]);
        let rec = terms_of(&[("TOTAL", &[-4.0, -5.0])]);
        let lig = terms_of(&[("TOTAL", &[-1.0, -1.0, -1.0, -1.0])]);
        let result = compose_binding(
            com.clone(),
            rec.clone(),
            lig.clone(),
            TrajectoryProtocol::Multiple,
        );
        let delta = result.delta_total().unwrap();
        assert!(delta.per_frame().is_none());
        let com_v = com.get("TOTAL").unwrap();
        let rec_v = rec.get("TOTAL").unwrap();
        let lig_v = lig.get("TOTAL").unwrap();
        assert!((delta.avg() - (com_v.avg() - rec_v.avg() - lig_v.avg())).abs() < 1e-12);
        let expected = (com_v.stdev().powi(2) + rec_v.stdev().powi(2) + lig_v.stdev().powi(2))
            .sqrt();
        assert!((delta.stdev() - expected).abs() < 1e-12);
    }

    #[test]
    fn single_trajectory_falls_back_on_mismatched_partners() {
        let com = terms_of(&[("TOTAL", &[-10.0, -12.0, -14.0])]);
        let rec = terms_of(&[("TOTAL", &[-4.0, -5.0])]);
        let lig = terms_of(&[("TOTAL", &[-1.0])]);
        let result = compose_binding(com, rec, lig, TrajectoryProtocol::Single);
        assert!(result.delta_total().unwrap().per_frame().is_none());
    }

    #[test]
    fn missing_partner_terms_count_as_zero() {
        // a single-residue ligand has no DIHED record
        let com = terms_of(&[("DIHED", &[3.0, 3.0])]);
        let rec = terms_of(&[("DIHED", &[1.0, 1.0])]);
        let lig = EnergyTerms::new();
        let result = compose_binding(com, rec, lig, TrajectoryProtocol::Single);
        let delta = result.delta.as_ref().unwrap().get("DIHED").unwrap();
        assert_eq!(delta.per_frame().unwrap().values(), &[2.0, 2.0]);
    }
}
