//! Parser for per-residue and pairwise energy-decomposition records.
//!
//! The solver prints one line per (component, residue[, residue]) tuple
//! per frame, the component being `TDC` (total), `SDC` (sidechain), or
//! `BDC` (backbone). Columns are internal, van der Waals, electrostatic,
//! polar solvation, and surface area; the surface column is converted to
//! an energy with the model's surface tension.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use strum_macros::Display;

use crate::error::EndstateError;
use crate::parse::energy::EnergyVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize)]
pub enum Component {
    #[strum(serialize = "TDC")]
    Total,
    #[strum(serialize = "SDC")]
    Sidechain,
    #[strum(serialize = "BDC")]
    Backbone,
}

impl Component {
    fn from_token(token: &str) -> Option<Component> {
        match token {
            "TDC" => Some(Component::Total),
            "SDC" => Some(Component::Sidechain),
            "BDC" => Some(Component::Backbone),
            _ => None,
        }
    }
}

/// Energy-term names of a decomposition row, report order.
pub const DECOMP_TERMS: [&str; 6] = ["Internal", "van der Waals", "Electrostatic", "Polar Solv.", "Non-Polar Solv.", "TOTAL"];

#[derive(Debug, Clone, Default, Serialize)]
pub struct DecompTerms {
    pub internal: EnergyVector,
    pub vdw: EnergyVector,
    pub eel: EnergyVector,
    pub pol: EnergyVector,
    pub sas: EnergyVector,
    pub total: EnergyVector,
}

impl DecompTerms {
    pub fn term(&self, name: &str) -> &EnergyVector {
        match name {
            "Internal" => &self.internal,
            "van der Waals" => &self.vdw,
            "Electrostatic" => &self.eel,
            "Polar Solv." => &self.pol,
            "Non-Polar Solv." => &self.sas,
            "TOTAL" => &self.total,
            other => panic!("unknown decomposition term {}", other),
        }
    }

    fn push_row(&mut self, row: [f64; 5]) {
        let [internal, vdw, eel, pol, sas] = row;
        self.internal.push(internal);
        self.vdw.push(vdw);
        self.eel.push(eel);
        self.pol.push(pol);
        self.sas.push(sas);
        self.total.push(internal + vdw + eel + pol + sas);
    }
}

/// `(residue index, paired residue index)` within the parsed species;
/// the second member is only set for pairwise decomposition.
pub type ResKey = (usize, Option<usize>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecompKind {
    PerResidue,
    Pairwise,
}

/// One species' decomposition table.
#[derive(Debug, Clone, Serialize)]
pub struct DecompOutput {
    pub kind: DecompKind,
    #[serde(serialize_with = "string_keyed")]
    pub data: BTreeMap<Component, BTreeMap<ResKey, DecompTerms>>,
}

/// JSON object keys have to be strings; residues become `"5"` and pairs
/// `"5->7"`.
fn string_keyed<S: serde::Serializer>(
    data: &BTreeMap<Component, BTreeMap<ResKey, DecompTerms>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut out: BTreeMap<String, BTreeMap<String, &DecompTerms>> = BTreeMap::new();
    for (component, rows) in data {
        let entry = out.entry(component.to_string()).or_default();
        for (key, terms) in rows {
            let label = match key.1 {
                Some(second) => format!("{}->{}", key.0, second),
                None => key.0.to_string(),
            };
            entry.insert(label, terms);
        }
    }
    serde::Serialize::serialize(&out, serializer)
}

impl DecompOutput {
    /// Parse the rank shards of one species' record. `idecomp` 1/2 are
    /// per-residue, 3/4 pairwise.
    pub fn parse(
        workdir: &Path,
        template: &str,
        ranks: usize,
        idecomp: i64,
        surften: f64,
    ) -> Result<DecompOutput> {
        let kind = if idecomp <= 2 {
            DecompKind::PerResidue
        } else {
            DecompKind::Pairwise
        };
        let mut data: BTreeMap<Component, BTreeMap<ResKey, DecompTerms>> = BTreeMap::new();
        for rank in 0..ranks {
            let path: PathBuf = workdir.join(template.replace("%d", &rank.to_string()));
            let text = std::fs::read_to_string(&path).map_err(|e| EndstateError::Parse {
                path: path.clone(),
                reason: format!("could not read decomposition output: {}", e),
            })?;
            for line in text.lines() {
                let mut fields = line.split_whitespace();
                let Some(component) = fields.next().and_then(Component::from_token) else {
                    continue;
                };
                let parse_err = |what: &str| EndstateError::Parse {
                    path: path.clone(),
                    reason: format!("bad decomposition row (missing {what}): `{line}`"),
                };
                let residue: usize = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| parse_err("residue"))?;
                let pair: Option<usize> = match kind {
                    DecompKind::PerResidue => None,
                    DecompKind::Pairwise => Some(
                        fields
                            .next()
                            .and_then(|f| f.parse().ok())
                            .ok_or_else(|| parse_err("residue pair"))?,
                    ),
                };
                let mut row = [0.0f64; 5];
                for slot in row.iter_mut() {
                    *slot = fields
                        .next()
                        .and_then(|f| f.parse().ok())
                        .ok_or_else(|| parse_err("energy column"))?;
                }
                row[4] *= surften;
                data.entry(component)
                    .or_default()
                    .entry((residue, pair))
                    .or_default()
                    .push_row(row);
            }
        }
        if data.is_empty() {
            return Err(EndstateError::Parse {
                path: workdir.join(template.replace("%d", "0")),
                reason: "no decomposition rows found".to_string(),
            }
            .into());
        }
        Ok(DecompOutput { kind, data })
    }

    pub fn get(&self, component: Component, key: &ResKey) -> Option<&DecompTerms> {
        self.data.get(&component).and_then(|m| m.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn per_residue_rows_accumulate_frames() {
        let dir = tempfile::tempdir().unwrap();
        let frame = "\
TDC 1 0.5 -1.0 2.0 -0.5 100.0
TDC 2 0.1 -0.2 0.3 -0.4 50.0
SDC 1 0.2 -0.5 1.0 -0.2 40.0
";
        fs::write(dir.path().join("complex_gb.mdout.0"), format!("{frame}{frame}")).unwrap();
        fs::write(dir.path().join("complex_gb.mdout.1"), frame).unwrap();
        let out =
            DecompOutput::parse(dir.path(), "complex_gb.mdout.%d", 2, 1, 0.0072).unwrap();
        assert_eq!(out.kind, DecompKind::PerResidue);
        let res1 = out.get(Component::Total, &(1, None)).unwrap();
        assert_eq!(res1.internal.len(), 3);
        let expected_total = 0.5 - 1.0 + 2.0 - 0.5 + 100.0 * 0.0072;
        assert!((res1.total[0] - expected_total).abs() < 1e-9);
        assert!(out.get(Component::Sidechain, &(1, None)).is_some());
        assert!(out.get(Component::Backbone, &(1, None)).is_none());
    }

    #[test]
    fn pairwise_rows_carry_both_residues() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("complex_gb.mdout.0"),
            "TDC 1 2 0.5 -1.0 2.0 -0.5 0.0\nTDC 2 1 0.5 -1.0 2.0 -0.5 0.0\n",
        )
        .unwrap();
        let out = DecompOutput::parse(dir.path(), "complex_gb.mdout.%d", 1, 3, 0.0).unwrap();
        assert_eq!(out.kind, DecompKind::Pairwise);
        assert!(out.get(Component::Total, &(1, Some(2))).is_some());
        assert!(out.get(Component::Total, &(1, None)).is_none());
    }

    #[test]
    fn malformed_rows_are_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.mdout.0"), "TDC 1 0.5 -1.0\n").unwrap();
        assert!(DecompOutput::parse(dir.path(), "x.mdout.%d", 1, 1, 0.0).is_err());
    }

    #[test]
    fn records_without_rows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.mdout.0"), "nothing here\n").unwrap();
        assert!(DecompOutput::parse(dir.path(), "x.mdout.%d", 1, 1, 0.0).is_err());
    }
}
