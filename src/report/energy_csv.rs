//! Optional per-frame CSV dump of every energy vector, one row per frame
//! per species, grouped by model.

use anyhow::{Context, Result};
use std::path::Path;

use crate::compose::binding::ModelResult;
use crate::parse::outputs::EnergyTerms;
use crate::results::RunResults;

fn species_rows(
    w: &mut csv::Writer<std::fs::File>,
    label: &str,
    terms: &EnergyTerms,
) -> Result<()> {
    let names: Vec<&str> = terms.iter().map(|(n, _)| n).collect();
    if names.is_empty() {
        return Ok(());
    }
    w.write_record([label])?;
    let mut header = vec!["Frame".to_string()];
    header.extend(names.iter().map(|n| n.to_string()));
    w.write_record(&header)?;
    let frames = terms.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
    for frame in 0..frames {
        let mut row = vec![(frame + 1).to_string()];
        for (_, v) in terms.iter() {
            row.push(if frame < v.len() {
                format!("{:.4}", v[frame])
            } else {
                String::new()
            });
        }
        w.write_record(&row)?;
    }
    w.write_record([""])?;
    Ok(())
}

fn model_rows(
    w: &mut csv::Writer<std::fs::File>,
    title: &str,
    result: &ModelResult,
) -> Result<()> {
    w.write_record([title])?;
    species_rows(w, "Complex", &result.complex)?;
    if let Some(rec) = &result.receptor {
        species_rows(w, "Receptor", rec)?;
    }
    if let Some(lig) = &result.ligand {
        species_rows(w, "Ligand", lig)?;
    }
    if let Some(delta) = &result.delta {
        let mut per_frame = EnergyTerms::new();
        for (name, d) in delta.iter() {
            if let Some(v) = d.per_frame() {
                per_frame.insert(&format!("DELTA {}", name), v.clone());
            }
        }
        species_rows(w, "Delta", &per_frame)?;
    }
    Ok(())
}

/// Dump every model of every system into one CSV file.
pub fn write_energy_csv(path: &Path, results: &RunResults) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("could not create {}", path.display()))?;
    let mut w = csv::WriterBuilder::new().flexible(true).from_writer(file);
    for (system, label) in [
        (results.normal.as_ref(), ""),
        (results.mutant.as_ref(), "Mutant "),
    ] {
        let Some(system) = system else { continue };
        for (model, result) in &system.models {
            model_rows(&mut w, &format!("{}{} energy results", label, model), result)?;
        }
        if let Some(nm) = &system.nmode {
            model_rows(&mut w, &format!("{}NMODE entropy results", label), nm)?;
        }
    }
    w.flush()?;
    Ok(())
}
