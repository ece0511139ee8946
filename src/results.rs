//! The top-level result aggregate and the assembly stage that parses all
//! solver outputs into it once execution has finished.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::compose::binding::{compose_binding, ModelResult};
use crate::compose::entropy::{c2_entropy, interaction_entropy, C2Entropy, InteractionEntropy};
use crate::input::RunConfig;
use crate::parse::decomp::DecompOutput;
use crate::parse::outputs::{fill_composite_terms, Model, ModelParse, QhOutput};
use crate::plan::frames::{FramePlan, TrajectoryProtocol};

/// Decomposition tables for one model.
#[derive(Debug, Clone, Serialize)]
pub struct DecompSet {
    pub complex: DecompOutput,
    pub receptor: Option<DecompOutput>,
    pub ligand: Option<DecompOutput>,
}

/// Everything computed for one system (normal or mutant).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CalcResults {
    /// Solvation-model results in report order.
    pub models: Vec<(Model, ModelResult)>,
    /// Normal-mode `-T*S`-style terms per species, same delta machinery
    /// as the energy models.
    pub nmode: Option<ModelResult>,
    pub qh: Option<QhOutput>,
    pub ie: Vec<(Model, InteractionEntropy)>,
    pub c2: Vec<(Model, C2Entropy)>,
    pub decomp: Vec<(Model, DecompSet)>,
}

/// Results for the whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResults {
    pub normal: Option<CalcResults>,
    pub mutant: Option<CalcResults>,
    pub mutation_label: Option<String>,
}

pub struct AssembleContext<'a> {
    pub cfg: &'a RunConfig,
    pub frames: &'a FramePlan,
    pub workdir: &'a Path,
    pub ranks: usize,
    /// Global intermediate prefix (`_ENDSTATE_`).
    pub pre: &'a str,
}

impl AssembleContext<'_> {
    /// Parse and compose one system. `mutant` switches to the
    /// `mutant_`-prefixed intermediates.
    pub fn assemble_system(&self, mutant: bool) -> Result<CalcResults> {
        let cfg = self.cfg;
        let sys = if mutant {
            format!("{}mutant_", self.pre)
        } else {
            self.pre.to_string()
        };
        let mut results = CalcResults::default();

        let enabled: [(Model, bool); 4] = [
            (Model::Gb, cfg.gbrun),
            (Model::Pb, cfg.pbrun),
            (Model::RismStd, cfg.rismrun_std),
            (Model::RismGf, cfg.rismrun_gf),
        ];
        for (model, on) in enabled {
            if !on {
                continue;
            }
            let result = self.assemble_model(model, &sys)?;
            if cfg.general.interaction_entropy || cfg.general.c2_entropy {
                if let Some(egas) = result.delta_g_gas().and_then(|d| d.per_frame()) {
                    if cfg.general.interaction_entropy {
                        results.ie.push((
                            model,
                            interaction_entropy(
                                egas,
                                cfg.general.temperature,
                                self.frames.ie_frames,
                            ),
                        ));
                    }
                    if cfg.general.c2_entropy {
                        results.c2.push((
                            model,
                            c2_entropy(egas, cfg.general.temperature, self.frames.c2_frames),
                        ));
                    }
                }
            }
            results.models.push((model, result));
        }

        if cfg.nmoderun {
            results.nmode = Some(self.assemble_nmode(&sys)?);
        }
        if cfg.general.qh_entropy {
            let path = self.workdir.join(format!("{sys}cpptraj_entropy.out"));
            results.qh = Some(QhOutput::from_file(&path, cfg.general.temperature)?);
        }
        if cfg.decomprun {
            for (model, on) in [(Model::Gb, cfg.gbrun), (Model::Pb, cfg.pbrun)] {
                if !on {
                    continue;
                }
                results.decomp.push((model, self.assemble_decomp(model, &sys)?));
            }
        }
        Ok(results)
    }

    fn model_basename(model: Model) -> &'static str {
        match model {
            Model::Gb => "gb.mdout",
            Model::Pb => "pb.mdout",
            Model::RismStd | Model::RismGf => "rism.mdout",
        }
    }

    fn assemble_model(&self, model: Model, sys: &str) -> Result<ModelResult> {
        let cfg = self.cfg;
        let parser = ModelParse {
            workdir: self.workdir,
            ranks: self.ranks,
            polardecomp: cfg.rism.polardecomp,
            surften: cfg.gb.surften,
            surfoff: cfg.gb.surfoff,
        };
        let base = Self::model_basename(model);
        let parse_species = |species: &str| -> Result<crate::parse::outputs::EnergyTerms> {
            let mdout = format!("{sys}{species}_{base}.%d");
            let surf = (model == Model::Gb).then(|| format!("{sys}{species}_gb_surf.dat.%d"));
            let mut terms = parser.parse(model, &mdout, surf.as_deref())?;
            let origin = self.workdir.join(mdout.replace("%d", "0"));
            fill_composite_terms(
                &mut terms,
                model,
                cfg.pb.inp,
                cfg.rism.polardecomp,
                &origin,
            )?;
            terms.check_lengths(self.frames.energy.count, &origin)?;
            Ok(terms)
        };

        let complex = parse_species("complex")?;
        if cfg.stability {
            return Ok(ModelResult::stability(complex, self.frames.protocol));
        }
        let receptor = parse_species("receptor")?;
        let ligand = parse_species("ligand")?;
        Ok(compose_binding(
            complex,
            receptor,
            ligand,
            self.frames.protocol,
        ))
    }

    fn assemble_nmode(&self, sys: &str) -> Result<ModelResult> {
        let cfg = self.cfg;
        let temperature = cfg.general.temperature;
        let parse_species = |species: &str| {
            crate::parse::outputs::parse_nmode(
                self.workdir,
                &format!("{sys}{species}_nm.out.%d"),
                self.ranks,
                temperature,
            )
        };
        let complex = parse_species("complex")?;
        if cfg.stability {
            return Ok(ModelResult::stability(complex, self.frames.protocol));
        }
        let receptor = parse_species("receptor")?;
        let ligand = parse_species("ligand")?;
        Ok(compose_binding(
            complex,
            receptor,
            ligand,
            self.frames.protocol,
        ))
    }

    fn assemble_decomp(&self, model: Model, sys: &str) -> Result<DecompSet> {
        let cfg = self.cfg;
        let surften = match model {
            Model::Gb => cfg.gb.surften,
            _ => cfg.pb.cavity_surften,
        };
        let base = Self::model_basename(model);
        let parse_species = |species: &str| {
            DecompOutput::parse(
                self.workdir,
                &format!("{sys}{species}_{base}.%d"),
                self.ranks,
                cfg.decomp.idecomp,
                surften,
            )
        };
        let complex = parse_species("complex")?;
        let (receptor, ligand) = if cfg.stability {
            (None, None)
        } else {
            (Some(parse_species("receptor")?), Some(parse_species("ligand")?))
        };
        Ok(DecompSet {
            complex,
            receptor,
            ligand,
        })
    }
}

/// Sniff whether a topology came out of a CHARMM conversion; those carry
/// Urey-Bradley, improper, and CMAP sections the standard set lacks.
pub fn is_chamber_topology(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(text) => text.contains("CHARMM_UREY_BRADLEY") || text.contains("CHARMM force field"),
        Err(_) => false,
    }
}

/// The trajectory protocol follows from whether the partners brought
/// their own trajectories.
pub fn protocol_from_inputs(
    receptor_trajs: bool,
    ligand_trajs: bool,
) -> TrajectoryProtocol {
    if receptor_trajs || ligand_trajs {
        TrajectoryProtocol::Multiple
    } else {
        TrajectoryProtocol::Single
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ParsedInput;
    use crate::plan::frames::{FramePlan, TrajectoryCounts};
    use std::fs;

    fn gb_cfg(extra: &str) -> RunConfig {
        let text = format!("&general\n startframe=1, endframe=2, {extra}\n/\n&gb\n/\n");
        let parsed = ParsedInput::from_str(&text).unwrap();
        RunConfig::build(&parsed, false).unwrap()
    }

    fn frame(total_shift: f64) -> String {
        format!(
            " BOND = 1.0  ANGLE = 2.0  DIHED = 3.0\n VDWAALS = {}  EEL = -10.0  EGB = -5.0\n 1-4 VDW = 0.5  1-4 EEL = 0.5\n",
            -4.0 + total_shift
        )
    }

    fn write_species(dir: &Path, sys: &str, species: &str, shift: f64) {
        fs::write(
            dir.join(format!("{sys}{species}_gb.mdout.0")),
            format!("{}{}", frame(shift), frame(shift)),
        )
        .unwrap();
        fs::write(
            dir.join(format!("{sys}{species}_gb_surf.dat.0")),
            "#Frame SURF\n1 100.0\n2 100.0\n",
        )
        .unwrap();
    }

    #[test]
    fn assembles_a_minimal_gb_binding_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = gb_cfg("interaction_entropy = 1");
        write_species(dir.path(), "_E_", "complex", 0.0);
        write_species(dir.path(), "_E_", "receptor", 1.0);
        write_species(dir.path(), "_E_", "ligand", 2.0);
        let counts = TrajectoryCounts {
            numframes: 2,
            receptor_frames: 2,
            ligand_frames: 2,
            numframes_nmode: 0,
        };
        let frames = FramePlan::reconcile(&cfg, TrajectoryProtocol::Single, counts).unwrap();
        let ctx = AssembleContext {
            cfg: &cfg,
            frames: &frames,
            workdir: dir.path(),
            ranks: 1,
            pre: "_E_",
        };
        let results = ctx.assemble_system(false).unwrap();
        assert_eq!(results.models.len(), 1);
        let (model, gb) = &results.models[0];
        assert_eq!(*model, Model::Gb);
        let delta = gb.delta_total().unwrap();
        let com = gb.complex.get("TOTAL").unwrap().avg();
        let rec = gb.receptor.as_ref().unwrap().get("TOTAL").unwrap().avg();
        let lig = gb.ligand.as_ref().unwrap().get("TOTAL").unwrap().avg();
        assert!((delta.avg() - (com - rec - lig)).abs() < 1e-9);
        // the per-term shifts cancel everywhere except VDWAALS
        assert!((rec - com - 1.0).abs() < 1e-9);
        assert!((lig - com - 2.0).abs() < 1e-9);
        // IE rode along on the per-frame gas delta
        assert_eq!(results.ie.len(), 1);
    }

    #[test]
    fn missing_solver_output_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = gb_cfg("");
        let counts = TrajectoryCounts {
            numframes: 2,
            receptor_frames: 2,
            ligand_frames: 2,
            numframes_nmode: 0,
        };
        let frames = FramePlan::reconcile(&cfg, TrajectoryProtocol::Single, counts).unwrap();
        let ctx = AssembleContext {
            cfg: &cfg,
            frames: &frames,
            workdir: dir.path(),
            ranks: 1,
            pre: "_E_",
        };
        assert!(ctx.assemble_system(false).is_err());
    }
}
