//! The self-describing structured archive: one JSON document mirroring
//! the full result tree, the validated configuration, and the run
//! metadata, for downstream analysis tools.

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

use crate::input::RunConfig;
use crate::plan::frames::FramePlan;
use crate::results::RunResults;

pub struct ArchiveInputs<'a> {
    pub cfg: &'a RunConfig,
    pub frames: &'a FramePlan,
    pub results: &'a RunResults,
    pub input_text: &'a str,
    pub files: serde_json::Value,
    pub ranks: usize,
    pub chamber: bool,
    pub timings: &'a [(String, String)],
}

pub fn write_archive(path: &Path, inputs: &ArchiveInputs) -> Result<()> {
    let doc = json!({
        "INPUT": inputs.cfg,
        "FILES": inputs.files,
        "INFO": {
            "size": inputs.ranks,
            "numframes": inputs.frames.energy.count,
            "numframes_nmode": inputs.frames.nmode.map(|f| f.count).unwrap_or(0),
            "protocol": inputs.frames.protocol,
            "mut_str": inputs.results.mutation_label,
            "using_chamber": inputs.chamber,
            "input_file": inputs.input_text,
            "timings": inputs.timings,
        },
        "normal": inputs.results.normal,
        "mutant": inputs.results.mutant,
    });
    std::fs::write(path, serde_json::to_string_pretty(&doc)?)
        .with_context(|| format!("could not write the results archive to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ParsedInput;
    use crate::plan::frames::{FramePlan, TrajectoryCounts, TrajectoryProtocol};

    #[test]
    fn archive_mirrors_the_result_groups() {
        let parsed = ParsedInput::from_str("&gb\n/\n").unwrap();
        let cfg = RunConfig::build(&parsed, false).unwrap();
        let counts = TrajectoryCounts {
            numframes: 4,
            receptor_frames: 4,
            ligand_frames: 4,
            numframes_nmode: 0,
        };
        let frames = FramePlan::reconcile(&cfg, TrajectoryProtocol::Single, counts).unwrap();
        let results = RunResults::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("RESULTS_endstate.json");
        write_archive(
            &path,
            &ArchiveInputs {
                cfg: &cfg,
                frames: &frames,
                results: &results,
                input_text: "&gb\n/\n",
                files: serde_json::json!({"complex_prmtop": "com.prmtop"}),
                ranks: 2,
                chamber: false,
                timings: &[("Total calculation time:".to_string(), "1.000s".to_string())],
            },
        )
        .unwrap();
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["INFO"]["numframes"], 4);
        assert_eq!(doc["INPUT"]["gbrun"], true);
        assert!(doc["normal"].is_null());
    }
}
