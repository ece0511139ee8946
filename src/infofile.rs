//! The run info file: a JSON summary of what was computed and where the
//! pieces live, written by the master once the calculations finish.

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

use crate::input::RunConfig;
use crate::plan::frames::FramePlan;

pub struct InfoInputs<'a> {
    pub cfg: &'a RunConfig,
    pub frames: &'a FramePlan,
    pub receptor_mask: &'a str,
    pub ligand_mask: &'a str,
    pub mutation_label: Option<&'a str>,
    pub ranks: usize,
    pub chamber: bool,
    pub input_text: &'a str,
    pub files: serde_json::Value,
    pub timings: &'a [(String, String)],
}

pub fn write_info(path: &Path, inputs: &InfoInputs) -> Result<()> {
    let doc = json!({
        "version": env!("CARGO_PKG_VERSION"),
        "numframes": inputs.frames.energy.count,
        "numframes_nmode": inputs.frames.nmode.map(|f| f.count).unwrap_or(0),
        "protocol": inputs.frames.protocol,
        "receptor_mask": inputs.receptor_mask,
        "ligand_mask": inputs.ligand_mask,
        "mutation": inputs.mutation_label,
        "size": inputs.ranks,
        "using_chamber": inputs.chamber,
        "stability": inputs.cfg.stability,
        "input_file": inputs.input_text,
        "files": inputs.files,
        "timings": inputs.timings,
    });
    std::fs::write(path, serde_json::to_string_pretty(&doc)?)
        .with_context(|| format!("could not write {}", path.display()))
}
