//! Builds the ordered list of calculation steps for a run.
//!
//! Steps are grouped by phase (GB, PB, 3D-RISM, normal modes,
//! quasi-harmonic) and emitted first for the normal system, then for the
//! mutant when alanine scanning is enabled. When a mutation does not touch
//! one binding partner, that partner's solver steps are replaced by plain
//! file copies of the normal outputs.

use std::path::{Path, PathBuf};

use serde::Serialize;
use strum_macros::Display;

use crate::exec::progs::Programs;
use crate::input::RunConfig;

/// Placeholder substituted with the rank id in trajectory, deck, and
/// output paths.
pub const RANK_TOKEN: &str = "%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Setup,
    Gb,
    Pb,
    Rism,
    Nmode,
    Qh,
}

impl Phase {
    /// Execution order; the runner closes each phase with a barrier.
    pub const ORDER: [Phase; 6] = [
        Phase::Setup,
        Phase::Gb,
        Phase::Pb,
        Phase::Rism,
        Phase::Nmode,
        Phase::Qh,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Species {
    Complex,
    Receptor,
    Ligand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Energy,
    PbEnergy,
    Sa,
    Nmode,
    Rism,
    QuasiHarmonic,
}

/// An external solver invocation. `args` and `output` may carry the rank
/// placeholder; `deck` is an optional per-rank input script the runner
/// materializes right before the spawn.
#[derive(Debug, Clone)]
pub struct SolverStep {
    pub kind: StepKind,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub output: String,
    /// Redirect the child's stdout into `output` instead of expecting the
    /// program to write it.
    pub stdout_to_output: bool,
    /// Runs only on rank 0, once (not per frame shard).
    pub master_only: bool,
    /// `(path, content)` of a rank-dependent input script.
    pub deck: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub enum CalcStep {
    Solver(SolverStep),
    /// Reuse an unmutated partner's outputs verbatim.
    Copy { source: String, dest: String },
    /// A banner for the progress log; executes nothing.
    Progress,
}

#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub phase: Phase,
    pub message: Option<String>,
    pub step: CalcStep,
}

/// The six topology paths for one system, as returned by the topology
/// builder. Receptor and ligand are absent in a stability run.
#[derive(Debug, Clone)]
pub struct SystemFiles {
    pub complex_prmtop: PathBuf,
    pub receptor_prmtop: Option<PathBuf>,
    pub ligand_prmtop: Option<PathBuf>,
}

impl SystemFiles {
    fn topology(&self, species: Species) -> &PathBuf {
        match species {
            Species::Complex => &self.complex_prmtop,
            Species::Receptor => self
                .receptor_prmtop
                .as_ref()
                .expect("receptor topology requested in a stability run"),
            Species::Ligand => self
                .ligand_prmtop
                .as_ref()
                .expect("ligand topology requested in a stability run"),
        }
    }
}

pub struct PlanContext<'a> {
    pub cfg: &'a RunConfig,
    pub progs: &'a Programs,
    /// Global intermediate-file prefix (also the normal-system prefix).
    pub pre: &'a str,
    pub xvvfile: Option<&'a Path>,
}

/// Build the full ordered plan: normal system (unless `mutant_only`),
/// then the mutant system when alanine scanning is on.
pub fn build_plan(
    ctx: &PlanContext,
    normal: &SystemFiles,
    mutant: Option<&SystemFiles>,
) -> Vec<PlannedStep> {
    let mut steps = Vec::new();
    if !ctx.cfg.ala.mutant_only {
        steps.push(PlannedStep {
            phase: Phase::Setup,
            message: Some("Running calculations on normal system...".to_string()),
            step: CalcStep::Progress,
        });
        load_system_steps(ctx, normal, ctx.pre.to_string(), None, &mut steps);
    }
    if ctx.cfg.alarun {
        let mutant = mutant.expect("alanine scanning requires mutant topologies");
        steps.push(PlannedStep {
            phase: Phase::Setup,
            message: Some("Running calculations on mutant system...".to_string()),
            step: CalcStep::Progress,
        });
        // Partners whose topology the mutation left untouched are copied,
        // not recomputed.
        let copy_receptor = !ctx.cfg.ala.mutant_only
            && normal.receptor_prmtop.is_some()
            && normal.receptor_prmtop == mutant.receptor_prmtop;
        let copy_ligand = !ctx.cfg.ala.mutant_only
            && normal.ligand_prmtop.is_some()
            && normal.ligand_prmtop == mutant.ligand_prmtop;
        load_system_steps(
            ctx,
            mutant,
            format!("{}mutant_", ctx.pre),
            Some((copy_receptor, copy_ligand)),
            &mut steps,
        );
    }
    steps
}

fn load_system_steps(
    ctx: &PlanContext,
    files: &SystemFiles,
    prefix: String,
    copy: Option<(bool, bool)>,
    steps: &mut Vec<PlannedStep>,
) {
    let cfg = ctx.cfg;
    let (copy_receptor, copy_ligand) = copy.unwrap_or((false, false));
    let trj = cfg.trajectory_suffix;
    let pre = ctx.pre;

    let species_list: &[Species] = if cfg.stability {
        &[Species::Complex]
    } else {
        &[Species::Complex, Species::Receptor, Species::Ligand]
    };
    let copied = |species: Species| match species {
        Species::Receptor => copy_receptor,
        Species::Ligand => copy_ligand,
        Species::Complex => false,
    };
    let contribution = |species: Species| match species {
        Species::Complex => "  calculating complex contribution...",
        Species::Receptor => "  calculating receptor contribution...",
        Species::Ligand => "  calculating ligand contribution...",
    };
    let copy_note = |species: Species| {
        format!(
            "  no mutation found in {}; using unmutated files",
            species
        )
    };

    // The energy programs read a PDB when driven through the lightweight
    // energy tool, and a dummy restart otherwise.
    let incrd = |species: Species, use_sander: bool| {
        if use_sander {
            format!("{prefix}dummy{species}.inpcrd")
        } else {
            format!("{prefix}{species}.pdb")
        }
    };

    if cfg.gbrun {
        let gb_uses_sander = cfg.general.use_sander || cfg.decomprun || cfg.gb.ifqnt;
        let mdin = |species: Species| {
            let tag = deck_tag(species);
            if cfg.decomprun {
                format!("{pre}gb_decomp_{tag}.mdin")
            } else if cfg.gb.ifqnt {
                format!("{pre}gb_qmmm_{tag}.mdin")
            } else {
                format!("{pre}gb.mdin")
            }
        };
        steps.push(banner(
            Phase::Gb,
            format!(
                "Beginning GB calculations with {}",
                ctx.progs.gb_energy.display()
            ),
        ));
        for &species in species_list {
            if copied(species) {
                push_copy(steps, Phase::Gb, pre, &prefix, species, "gb.mdout", copy_note(species));
                push_copy(
                    steps,
                    Phase::Gb,
                    pre,
                    &prefix,
                    species,
                    "gb_surf.dat",
                    String::new(),
                );
                continue;
            }
            steps.push(PlannedStep {
                phase: Phase::Gb,
                message: Some(contribution(species).to_string()),
                step: CalcStep::Solver(SolverStep {
                    kind: StepKind::Energy,
                    program: ctx.progs.gb_energy.clone(),
                    args: energy_args(
                        &mdin(species),
                        &format!("{prefix}{species}_gb.mdout.{RANK_TOKEN}"),
                        files.topology(species),
                        &incrd(species, gb_uses_sander),
                        &format!("{prefix}{species}.{trj}.{RANK_TOKEN}"),
                        &format!("{pre}restrt.{RANK_TOKEN}"),
                    ),
                    output: format!("{prefix}{species}_gb.mdout.{RANK_TOKEN}"),
                    stdout_to_output: false,
                    master_only: false,
                    deck: None,
                }),
            });
            steps.push(surface_step(ctx, files, &prefix, species, trj));
        }
    }

    if cfg.pbrun {
        let pb_uses_sander =
            cfg.general.use_sander || cfg.decomprun || cfg.pb.sander_apbs;
        let mdin = |species: Species| {
            let tag = deck_tag(species);
            if cfg.decomprun {
                format!("{pre}pb_decomp_{tag}.mdin")
            } else if species == Species::Ligand {
                // single-residue ligands take a dedicated deck
                format!("{pre}pb.mdin2")
            } else {
                format!("{pre}pb.mdin")
            }
        };
        steps.push(banner(
            Phase::Pb,
            format!(
                "Beginning PB calculations with {}",
                ctx.progs.pb_energy.display()
            ),
        ));
        for &species in species_list {
            if copied(species) {
                push_copy(steps, Phase::Pb, pre, &prefix, species, "pb.mdout", copy_note(species));
                continue;
            }
            steps.push(PlannedStep {
                phase: Phase::Pb,
                message: Some(contribution(species).to_string()),
                step: CalcStep::Solver(SolverStep {
                    kind: StepKind::PbEnergy,
                    program: ctx.progs.pb_energy.clone(),
                    args: energy_args(
                        &mdin(species),
                        &format!("{prefix}{species}_pb.mdout.{RANK_TOKEN}"),
                        files.topology(species),
                        &incrd(species, pb_uses_sander),
                        &format!("{prefix}{species}.{trj}.{RANK_TOKEN}"),
                        &format!("{pre}restrt.{RANK_TOKEN}"),
                    ),
                    output: format!("{prefix}{species}_pb.mdout.{RANK_TOKEN}"),
                    stdout_to_output: false,
                    master_only: false,
                    deck: None,
                }),
            });
        }
    }

    if cfg.rismrun {
        steps.push(banner(
            Phase::Rism,
            format!(
                "Beginning 3D-RISM calculations with {}",
                ctx.progs.rism.display()
            ),
        ));
        for &species in species_list {
            if copied(species) {
                push_copy(
                    steps,
                    Phase::Rism,
                    pre,
                    &prefix,
                    species,
                    "rism.mdout",
                    copy_note(species),
                );
                continue;
            }
            steps.push(PlannedStep {
                phase: Phase::Rism,
                message: Some(contribution(species).to_string()),
                step: CalcStep::Solver(SolverStep {
                    kind: StepKind::Rism,
                    program: ctx.progs.rism.clone(),
                    args: rism_args(ctx, files, &prefix, species, trj),
                    output: format!("{prefix}{species}_rism.mdout.{RANK_TOKEN}"),
                    stdout_to_output: true,
                    master_only: false,
                    deck: None,
                }),
            });
        }
    }

    if cfg.nmoderun {
        steps.push(banner(
            Phase::Nmode,
            format!(
                "Beginning nmode calculations with {}",
                ctx.progs.nmode.display()
            ),
        ));
        for &species in species_list {
            if copied(species) {
                push_copy(steps, Phase::Nmode, pre, &prefix, species, "nm.out", copy_note(species));
                continue;
            }
            steps.push(PlannedStep {
                phase: Phase::Nmode,
                message: Some(contribution(species).to_string()),
                step: CalcStep::Solver(SolverStep {
                    kind: StepKind::Nmode,
                    program: ctx.progs.nmode.clone(),
                    args: vec![
                        files.topology(species).display().to_string(),
                        format!("{prefix}{species}.pdb"),
                        format!("{prefix}{species}_nm.{trj}.{RANK_TOKEN}"),
                        format!("{prefix}{species}_nm.out.{RANK_TOKEN}"),
                        "--maxcyc".to_string(),
                        cfg.nmode.maxcyc.to_string(),
                        "--drms".to_string(),
                        cfg.nmode.drms.to_string(),
                        "--igb".to_string(),
                        cfg.nmode.nmode_igb.to_string(),
                        "--istrng".to_string(),
                        cfg.nmode.nmode_istrng.to_string(),
                    ],
                    output: format!("{prefix}{species}_nm.out.{RANK_TOKEN}"),
                    stdout_to_output: false,
                    master_only: false,
                    deck: None,
                }),
            });
        }
    }

    // Quasi-harmonic runs once on the whole trajectory; it cannot be
    // frame-sharded, so the master owns it.
    if cfg.general.qh_entropy {
        steps.push(banner(
            Phase::Qh,
            format!(
                "Beginning quasi-harmonic calculations with {}",
                ctx.progs.trajectory.display()
            ),
        ));
        steps.push(PlannedStep {
            phase: Phase::Qh,
            message: None,
            step: CalcStep::Solver(SolverStep {
                kind: StepKind::QuasiHarmonic,
                program: ctx.progs.trajectory.clone(),
                args: vec![
                    "-p".to_string(),
                    normal_complex_path(files),
                    "-i".to_string(),
                    format!("{prefix}cpptrajentropy.in"),
                ],
                output: format!("{prefix}cpptraj_entropy.out"),
                stdout_to_output: true,
                master_only: true,
                deck: None,
            }),
        });
    }
}

fn normal_complex_path(files: &SystemFiles) -> String {
    files.complex_prmtop.display().to_string()
}

fn deck_tag(species: Species) -> &'static str {
    match species {
        Species::Complex => "com",
        Species::Receptor => "rec",
        Species::Ligand => "lig",
    }
}

fn banner(phase: Phase, message: String) -> PlannedStep {
    PlannedStep {
        phase,
        message: Some(message),
        step: CalcStep::Progress,
    }
}

fn push_copy(
    steps: &mut Vec<PlannedStep>,
    phase: Phase,
    pre: &str,
    prefix: &str,
    species: Species,
    suffix: &str,
    message: String,
) {
    steps.push(PlannedStep {
        phase,
        message: if message.is_empty() { None } else { Some(message) },
        step: CalcStep::Copy {
            source: format!("{pre}{species}_{suffix}.{RANK_TOKEN}"),
            dest: format!("{prefix}{species}_{suffix}.{RANK_TOKEN}"),
        },
    });
}

/// The conventional minimization-engine argument vector.
fn energy_args(
    mdin: &str,
    mdout: &str,
    topology: &Path,
    incrd: &str,
    traj: &str,
    restart: &str,
) -> Vec<String> {
    vec![
        "-O".to_string(),
        "-i".to_string(),
        mdin.to_string(),
        "-o".to_string(),
        mdout.to_string(),
        "-p".to_string(),
        topology.display().to_string(),
        "-c".to_string(),
        incrd.to_string(),
        "-y".to_string(),
        traj.to_string(),
        "-r".to_string(),
        restart.to_string(),
    ]
}

fn surface_step(
    ctx: &PlanContext,
    files: &SystemFiles,
    prefix: &str,
    species: Species,
    trj: &str,
) -> PlannedStep {
    let cfg = ctx.cfg;
    let out = format!("{prefix}{species}_gb_surf.dat.{RANK_TOKEN}");
    let traj = format!("{prefix}{species}.{trj}.{RANK_TOKEN}");
    let script_path = format!("{prefix}{species}_gb_surf.in.{RANK_TOKEN}");
    let content = if cfg.gb.molsurf {
        format!(
            "trajin {traj}\nmolsurf MSURF out {out} probe {} offset {}\ngo\n",
            cfg.gb.probe, cfg.gb.msoffset
        )
    } else {
        format!("trajin {traj}\nsurf SURF out {out}\ngo\n")
    };
    PlannedStep {
        phase: Phase::Gb,
        message: None,
        step: CalcStep::Solver(SolverStep {
            kind: StepKind::Sa,
            program: ctx.progs.trajectory.clone(),
            args: vec![
                "-p".to_string(),
                files.topology(species).display().to_string(),
                "-i".to_string(),
                script_path.clone(),
            ],
            output: out,
            stdout_to_output: false,
            master_only: false,
            deck: Some((script_path, content)),
        }),
    }
}

fn rism_args(
    ctx: &PlanContext,
    files: &SystemFiles,
    prefix: &str,
    species: Species,
    trj: &str,
) -> Vec<String> {
    let cfg = ctx.cfg;
    let r = &cfg.rism;
    let mut args = vec![
        "--pdb".to_string(),
        format!("{prefix}{species}.pdb"),
        "--prmtop".to_string(),
        files.topology(species).display().to_string(),
        "--traj".to_string(),
        format!("{prefix}{species}.{trj}.{RANK_TOKEN}"),
        "--xvv".to_string(),
        ctx.xvvfile
            .expect("a solvent susceptibility file is required for 3D-RISM")
            .display()
            .to_string(),
        "--closure".to_string(),
        r.closure.clone(),
        "--tolerance".to_string(),
        r.tolerance.to_string(),
        "--grdspc".to_string(),
        format!("{0},{0},{0}", r.grdspc),
        "--solvcut".to_string(),
        r.solvcut.to_string(),
        "--mdiis_del".to_string(),
        r.mdiis_del.to_string(),
        "--mdiis_nvec".to_string(),
        r.mdiis_nvec.to_string(),
        "--maxstep".to_string(),
        r.maxstep.to_string(),
        "--npropagate".to_string(),
        r.npropagate.to_string(),
        "--verbose".to_string(),
        r.rism_verbose.to_string(),
    ];
    if r.buffer < 0.0 {
        args.push("--ng".to_string());
        args.push(r.ng.clone());
        args.push("--solvbox".to_string());
        args.push(r.solvbox.clone());
    } else {
        args.push("--buffer".to_string());
        args.push(r.buffer.to_string());
    }
    if r.polardecomp {
        args.push("--polarDecomp".to_string());
    }
    if r.asymp_corr == 0 {
        args.push("--noasympcorr".to_string());
    }
    if r.closure == "pse" {
        args.push("--closureorder".to_string());
        args.push(r.closureorder.to_string());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ParsedInput, RunConfig};

    fn progs() -> Programs {
        Programs::fixed_for_tests()
    }

    fn config(text: &str, stability: bool) -> RunConfig {
        let parsed = ParsedInput::from_str(text).unwrap();
        RunConfig::build(&parsed, stability).unwrap()
    }

    fn normal_files() -> SystemFiles {
        SystemFiles {
            complex_prmtop: PathBuf::from("com.prmtop"),
            receptor_prmtop: Some(PathBuf::from("rec.prmtop")),
            ligand_prmtop: Some(PathBuf::from("lig.prmtop")),
        }
    }

    fn solver_steps(steps: &[PlannedStep]) -> Vec<&SolverStep> {
        steps
            .iter()
            .filter_map(|s| match &s.step {
                CalcStep::Solver(step) => Some(step),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn gb_plan_has_energy_and_surface_per_species() {
        let cfg = config("&gb\n/\n", false);
        let progs = progs();
        let ctx = PlanContext {
            cfg: &cfg,
            progs: &progs,
            pre: "_ENDSTATE_",
            xvvfile: None,
        };
        let steps = build_plan(&ctx, &normal_files(), None);
        let solvers = solver_steps(&steps);
        // three energies and three surface-area runs
        assert_eq!(solvers.len(), 6);
        assert_eq!(
            solvers
                .iter()
                .filter(|s| s.kind == StepKind::Energy)
                .count(),
            3
        );
        assert_eq!(solvers.iter().filter(|s| s.kind == StepKind::Sa).count(), 3);
        // every per-rank output is rank-templated
        for s in &solvers {
            assert!(s.output.contains(RANK_TOKEN), "{}", s.output);
        }
    }

    #[test]
    fn stability_runs_complex_only() {
        let cfg = config("&gb\n/\n&pb\n/\n", true);
        let progs = progs();
        let ctx = PlanContext {
            cfg: &cfg,
            progs: &progs,
            pre: "_ENDSTATE_",
            xvvfile: None,
        };
        let files = SystemFiles {
            complex_prmtop: PathBuf::from("com.prmtop"),
            receptor_prmtop: None,
            ligand_prmtop: None,
        };
        let steps = build_plan(&ctx, &files, None);
        let solvers = solver_steps(&steps);
        assert!(solvers
            .iter()
            .all(|s| s.output.contains("complex")), "receptor steps leaked in");
    }

    #[test]
    fn unmutated_receptor_becomes_copy_steps() {
        let cfg = config("&gb\n/\n&ala\n mutant_res = \"B/1\"\n/\n", false);
        let progs = progs();
        let ctx = PlanContext {
            cfg: &cfg,
            progs: &progs,
            pre: "_ENDSTATE_",
            xvvfile: None,
        };
        let normal = normal_files();
        let mutant = SystemFiles {
            complex_prmtop: PathBuf::from("mut_com.prmtop"),
            receptor_prmtop: Some(PathBuf::from("rec.prmtop")),
            ligand_prmtop: Some(PathBuf::from("mut_lig.prmtop")),
        };
        let steps = build_plan(&ctx, &normal, Some(&mutant));
        let copies: Vec<_> = steps
            .iter()
            .filter_map(|s| match &s.step {
                CalcStep::Copy { source, dest } => Some((source.clone(), dest.clone())),
                _ => None,
            })
            .collect();
        // mdout and surface data are both copied, ligand is recomputed
        assert_eq!(copies.len(), 2);
        assert!(copies[0].0.starts_with("_ENDSTATE_receptor"));
        assert!(copies[0].1.starts_with("_ENDSTATE_mutant_receptor"));
        let mutant_solvers: Vec<_> = solver_steps(&steps)
            .into_iter()
            .filter(|s| s.output.contains("mutant_"))
            .collect();
        assert!(mutant_solvers.iter().any(|s| s.output.contains("ligand")));
        assert!(!mutant_solvers.iter().any(|s| s.output.contains("receptor")));
    }

    #[test]
    fn mutant_only_skips_the_normal_system() {
        let cfg = config(
            "&gb\n/\n&ala\n mutant_res = \"A/35\", mutant_only = 1\n/\n",
            false,
        );
        let progs = progs();
        let ctx = PlanContext {
            cfg: &cfg,
            progs: &progs,
            pre: "_ENDSTATE_",
            xvvfile: None,
        };
        let normal = normal_files();
        let steps = build_plan(&ctx, &normal, Some(&normal.clone()));
        for s in solver_steps(&steps) {
            assert!(s.output.contains("mutant_"), "{}", s.output);
        }
    }

    #[test]
    fn qh_step_is_master_only_and_unsharded() {
        let cfg = config("&general\n qh_entropy = 1\n/\n&gb\n/\n", false);
        let progs = progs();
        let ctx = PlanContext {
            cfg: &cfg,
            progs: &progs,
            pre: "_ENDSTATE_",
            xvvfile: None,
        };
        let steps = build_plan(&ctx, &normal_files(), None);
        let qh: Vec<_> = solver_steps(&steps)
            .into_iter()
            .filter(|s| s.kind == StepKind::QuasiHarmonic)
            .collect();
        assert_eq!(qh.len(), 1);
        assert!(qh[0].master_only);
        assert!(!qh[0].output.contains(RANK_TOKEN));
    }

    #[test]
    fn phases_appear_in_canonical_order() {
        let cfg = config(
            "&general\n qh_entropy = 1\n/\n&gb\n/\n&pb\n/\n&nmode\n/\n",
            false,
        );
        let progs = progs();
        let ctx = PlanContext {
            cfg: &cfg,
            progs: &progs,
            pre: "_ENDSTATE_",
            xvvfile: None,
        };
        let steps = build_plan(&ctx, &normal_files(), None);
        let mut last = 0usize;
        for s in &steps {
            let idx = Phase::ORDER.iter().position(|p| *p == s.phase).unwrap();
            assert!(idx >= last, "phase {} out of order", s.phase);
            last = idx;
        }
    }
}
