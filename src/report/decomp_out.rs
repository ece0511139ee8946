//! The decomposition report: per-residue (or pairwise) contribution
//! tables for every species, plus the binding delta per residue.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::Path;

use crate::input::RunConfig;
use crate::parse::decomp::{Component, DecompOutput, DecompTerms, ResKey, DECOMP_TERMS};
use crate::parse::energy::Diff;
use crate::residues::ResidueMap;
use crate::results::{DecompSet, RunResults};

fn model_title(model: crate::parse::outputs::Model) -> &'static str {
    match model {
        crate::parse::outputs::Model::Gb => {
            "Energy Decomposition Analysis (All units kcal/mol): Generalized Born solvent"
        }
        _ => "Energy Decomposition Analysis (All units kcal/mol): Poisson Boltzmann solvent",
    }
}

fn component_title(component: Component) -> &'static str {
    match component {
        Component::Total => "Total Energy Decomposition:",
        Component::Sidechain => "Sidechain Energy Decomposition:",
        Component::Backbone => "Backbone Energy Decomposition:",
    }
}

fn key_label(map: &[crate::residues::Residue], key: &ResKey) -> String {
    let label = |idx: usize| {
        map.get(idx - 1)
            .map(|r| r.label())
            .unwrap_or_else(|| format!("#{}", idx))
    };
    match key.1 {
        Some(second) => format!("{} -> {}", label(key.0), label(second)),
        None => label(key.0),
    }
}

fn components_for(verbose: i64, table: &DecompOutput) -> Vec<Component> {
    table
        .data
        .keys()
        .copied()
        .filter(|c| verbose >= 1 || *c == Component::Total)
        .collect()
}

fn species_tables(
    out: &mut String,
    label: &str,
    table: &DecompOutput,
    residues: &[crate::residues::Residue],
    verbose: i64,
) {
    let _ = writeln!(out, "{}:", label);
    for component in components_for(verbose, table) {
        let _ = writeln!(out, "{}", component_title(component));
        let _ = write!(out, "{:<26}", "Residue");
        for term in DECOMP_TERMS {
            let _ = write!(out, "{:>22}", term);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "=".repeat(26 + 22 * DECOMP_TERMS.len()));
        if let Some(rows) = table.data.get(&component) {
            for (key, terms) in rows {
                let _ = write!(out, "{:<26}", key_label(residues, key));
                for term in DECOMP_TERMS {
                    let v = terms.term(term);
                    let _ = write!(out, "{:>12.4} +/- {:>6.4}", v.avg(), v.stdev());
                }
                let _ = writeln!(out);
            }
        }
        let _ = writeln!(out);
    }
}

/// Map a complex residue index onto the owning partner's table and local
/// index.
fn partner_key(map: &ResidueMap, idx: usize) -> Option<(bool, usize)> {
    let res = map.complex.get(idx - 1)?;
    let is_receptor = res.owner == "REC";
    let list = if is_receptor { &map.receptor } else { &map.ligand };
    let local = list
        .iter()
        .position(|r| r.matches(&res.chain, res.number, &res.icode))?;
    Some((is_receptor, local + 1))
}

/// The unmutated partner's row matching a complex-indexed key.
/// Cross-partner pairs have no counterpart and contribute their full
/// complex value to the delta.
fn partner_terms<'a>(
    map: &ResidueMap,
    key: &ResKey,
    component: Component,
    receptor: &'a DecompOutput,
    ligand: &'a DecompOutput,
) -> Option<&'a DecompTerms> {
    let (is_receptor, local) = partner_key(map, key.0)?;
    let table = if is_receptor { receptor } else { ligand };
    let local_key = match key.1 {
        None => (local, None),
        Some(second) => {
            let (second_rec, second_local) = partner_key(map, second)?;
            if second_rec != is_receptor {
                return None;
            }
            (local, Some(second_local))
        }
    };
    table.get(component, &local_key)
}

fn delta_tables(
    out: &mut String,
    set: &DecompSet,
    map: &ResidueMap,
    verbose: i64,
) {
    let (Some(receptor), Some(ligand)) = (&set.receptor, &set.ligand) else {
        return;
    };
    let _ = writeln!(out, "DELTAS:");
    for component in components_for(verbose, &set.complex) {
        let _ = writeln!(out, "{}", component_title(component));
        let Some(rows) = set.complex.data.get(&component) else {
            continue;
        };
        let _ = writeln!(
            out,
            "{:<26}{:>22}{:>22}",
            "Residue", "Average", "Std. Dev."
        );
        let _ = writeln!(out, "{}", "=".repeat(70));
        for (key, com_terms) in rows {
            let diff = match partner_terms(map, key, component, receptor, ligand) {
                Some(partner) => Diff::between(&com_terms.total, &partner.total),
                None => Diff::PerFrame(com_terms.total.clone()),
            };
            let _ = writeln!(
                out,
                "{:<26}{:>22.4}{:>22.4}",
                key_label(&map.complex, key),
                diff.avg(),
                diff.stdev()
            );
        }
        let _ = writeln!(out);
    }
}

/// Write the decomposition report. `csv_format` swaps the fixed-width
/// tables for comma-separated rows.
pub fn write_decomp_report(
    path: &Path,
    cfg: &RunConfig,
    results: &RunResults,
    map: &ResidueMap,
    mutant_map: Option<&ResidueMap>,
) -> Result<()> {
    let verbose = cfg.decomp.dec_verbose;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "| Run on {}",
        chrono::Local::now().format("%a %b %e %T %Y")
    );
    if cfg.gbrun {
        let _ = writeln!(out, "| GB non-polar solvation energies calculated with gbsa=2");
    }
    for (system, system_map, label) in [
        (results.normal.as_ref(), Some(map), ""),
        (results.mutant.as_ref(), mutant_map, "Mutant "),
    ] {
        let (Some(system), Some(system_map)) = (system, system_map) else {
            continue;
        };
        for (model, set) in &system.decomp {
            let _ = writeln!(out, "\n{}{}", label, model_title(*model));
            let _ = writeln!(out);
            species_tables(&mut out, "Complex", &set.complex, &system_map.complex, verbose);
            if let Some(rec) = &set.receptor {
                species_tables(&mut out, "Receptor", rec, &system_map.receptor, verbose);
            }
            if let Some(lig) = &set.ligand {
                species_tables(&mut out, "Ligand", lig, &system_map.ligand, verbose);
            }
            delta_tables(&mut out, set, system_map, verbose);
        }
    }
    if cfg.decomp.csv_format {
        // same content, one value per cell
        let csv_text = out
            .lines()
            .map(|l| l.split_whitespace().collect::<Vec<_>>().join(","))
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(path, csv_text)
    } else {
        std::fs::write(path, out)
    }
    .with_context(|| format!("could not write the decomposition report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::decomp::DecompKind;
    use crate::parse::energy::EnergyVector;
    use crate::residues::Residue;
    use std::collections::BTreeMap;

    fn residue(index: usize, number: i64, name: &str, owner: &str) -> Residue {
        Residue {
            index,
            chain: "A".to_string(),
            number,
            icode: String::new(),
            name: name.to_string(),
            owner: owner.to_string(),
        }
    }

    fn table(rows: &[(usize, f64)]) -> DecompOutput {
        let mut data: BTreeMap<Component, BTreeMap<ResKey, DecompTerms>> = BTreeMap::new();
        let mut inner = BTreeMap::new();
        for (idx, v) in rows {
            let mut terms = DecompTerms::default();
            terms.internal = EnergyVector::from_values(vec![*v, *v]);
            terms.total = EnergyVector::from_values(vec![*v, *v]);
            inner.insert((*idx, None), terms);
        }
        data.insert(Component::Total, inner);
        DecompOutput {
            kind: DecompKind::PerResidue,
            data,
        }
    }

    #[test]
    fn delta_subtracts_the_owning_partner() {
        let complex = vec![
            residue(1, 10, "GLY", "REC"),
            residue(2, 11, "ARG", "REC"),
            residue(3, 1, "LIG", "LIG"),
        ];
        let map = ResidueMap {
            receptor: complex[..2].to_vec(),
            ligand: complex[2..].to_vec(),
            complex,
            receptor_mask: ":1-2".to_string(),
            ligand_mask: ":3".to_string(),
        };
        let set = DecompSet {
            complex: table(&[(1, 5.0), (2, 6.0), (3, 7.0)]),
            receptor: Some(table(&[(1, 1.0), (2, 2.0)])),
            ligand: Some(table(&[(1, 3.0)])),
        };
        let mut out = String::new();
        delta_tables(&mut out, &set, &map, 0);
        assert!(out.contains("A:GLY:10"));
        // 5 - 1 = 4, 6 - 2 = 4, 7 - 3 = 4
        assert_eq!(out.matches("4.0000").count(), 3);
    }
}
