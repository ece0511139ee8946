//! Orchestration of a full run: configuration, trajectory preparation,
//! plan construction, parallel execution, output assembly, and report
//! writing. Mirrors the lifecycle described in the user documentation:
//! nothing external runs until the configuration has validated.

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::commands::RunOpts;
use crate::decks;
use crate::error::EndstateError;
use crate::exec::progs::find_programs;
use crate::exec::runner::run_plan;
use crate::exec::timer::Timers;
use crate::infofile::{write_info, InfoInputs};
use crate::input::{ParsedInput, RunConfig};
use crate::plan::builder::{build_plan, PlanContext, SystemFiles};
use crate::plan::frames::FramePlan;
use crate::report::archive::{write_archive, ArchiveInputs};
use crate::report::decomp_out::write_decomp_report;
use crate::report::energy_csv::write_energy_csv;
use crate::report::text::{write_report, ReportContext, ReportFiles};
use crate::residues::{parse_selection, ResidueMap, Selection};
use crate::results::{
    is_chamber_topology, protocol_from_inputs, AssembleContext, RunResults,
};
use crate::traj::{mutant_strip_mask, TrajPrep};

fn check_files_exist(files: &[&Path]) -> Result<()> {
    let mut all_valid = true;
    for f in files {
        match f.try_exists() {
            Ok(true) => {}
            Ok(false) => {
                error!("required input file at path {} was not found", f.display());
                all_valid = false;
            }
            Err(e) => {
                error!("{:#?}", e);
                all_valid = false;
            }
        }
    }
    if !all_valid {
        bail!("required input files were missing; cannot proceed");
    }
    Ok(())
}

fn config_error(msg: impl Into<String>) -> anyhow::Error {
    EndstateError::Config(msg.into()).into()
}

/// Run the whole pipeline for the parsed command-line options.
pub fn run(opts: RunOpts) -> Result<()> {
    let mut timers = Timers::new();
    timers.add("global", "Total time taken:");
    timers.start("global");
    timers.add("setup", "Total setup time:");
    timers.start("setup");

    let mut required: Vec<&Path> = vec![&opts.input, &opts.complex_prmtop, &opts.residue_map];
    required.extend(opts.complex_trajs.iter().map(|p| p.as_path()));
    if let Some(p) = &opts.receptor_prmtop {
        required.push(p);
    }
    if let Some(p) = &opts.ligand_prmtop {
        required.push(p);
    }
    check_files_exist(&required)?;

    if opts.receptor_prmtop.is_some() != opts.ligand_prmtop.is_some() {
        return Err(config_error(
            "a binding calculation needs both a receptor and a ligand topology",
        ));
    }
    let stability = opts.stability || opts.receptor_prmtop.is_none();

    let parsed = ParsedInput::from_file(&opts.input)
        .map_err(|e| config_error(e.to_string()))?;
    let mut cfg = RunConfig::build(&parsed, stability)?;

    let chamber = is_chamber_topology(&opts.complex_prmtop);
    if chamber {
        cfg.apply_chamber_constraints()?;
        info!("CHAMBER topology found; forcing use of the full solver");
    }
    if cfg.rismrun && opts.xvvfile.is_none() {
        return Err(config_error(
            "3D-RISM calculations need a solvent susceptibility (xvv) file",
        ));
    }
    if cfg.alarun && opts.mutant_complex_prmtop.is_none() {
        return Err(config_error(
            "alanine scanning needs a mutant complex topology",
        ));
    }
    if opts.ranks == 0 {
        return Err(config_error("at least one rank is required"));
    }

    let map = ResidueMap::from_file(&opts.residue_map)?;
    let (mutant_map, mutation_label, mutant_mask) = if cfg.alarun {
        if cfg.ala.mutant_res.is_empty() {
            return Err(config_error(
                "alanine scanning needs mutant_res to name the mutated residue",
            ));
        }
        let res = mutated_residue(&map, &cfg.ala.mutant_res)?;
        let mask = mutant_strip_mask(res, cfg.ala.mutant);
        let original_name = res.name.clone();
        let (mutant_map, label) =
            map.apply_mutation(&cfg.ala.mutant_res, cfg.ala.mutant.residue_name())?;
        if cfg.ala.cas_intdiel {
            let intdiel = intdiel_for_residue_class(&cfg, &original_name);
            info!(
                "cas_intdiel: mutating {} ({} class), setting intdiel = {}",
                original_name,
                residue_class_name(&original_name),
                intdiel
            );
            cfg.gb.intdiel = intdiel as f64;
            // a dielectric other than vacuum needs the full solver
            cfg.general.use_sander = true;
        }
        (Some(mutant_map), Some(label), Some(mask))
    } else {
        (None, None, None)
    };

    let progs = find_programs(&cfg)?;
    decks::create_inputs(&cfg, &map, &opts.prefix, &opts.workdir)?;
    timers.stop("setup");

    timers.add("traj", "Creating trajectories:");
    timers.start("traj");
    info!("preparing trajectories for the calculation...");
    let prep = TrajPrep {
        cfg: &cfg,
        prog: &progs.trajectory,
        pre: &opts.prefix,
        workdir: &opts.workdir,
        ranks: opts.ranks,
        receptor_mask: &map.receptor_mask,
        ligand_mask: &map.ligand_mask,
    };
    let counts = prep.make_trajectories(
        &opts.complex_prmtop,
        &opts.complex_trajs,
        opts.receptor_prmtop
            .as_deref()
            .map(|p| (p, opts.receptor_trajs.as_slice())),
        opts.ligand_prmtop
            .as_deref()
            .map(|p| (p, opts.ligand_trajs.as_slice())),
        opts.mutant_complex_prmtop.as_deref(),
        mutant_mask.as_deref(),
    )?;
    timers.stop("traj");

    let protocol = protocol_from_inputs(
        !opts.receptor_trajs.is_empty(),
        !opts.ligand_trajs.is_empty(),
    );
    let frames = FramePlan::reconcile(&cfg, protocol, counts)?;
    info!(
        "{} frames were processed for use in the calculation",
        frames.energy.count
    );
    if let Some(nm) = &frames.nmode {
        info!("{} frames were processed for nmode calculations", nm.count);
    }

    let normal_files = SystemFiles {
        complex_prmtop: opts.complex_prmtop.clone(),
        receptor_prmtop: opts.receptor_prmtop.clone(),
        ligand_prmtop: opts.ligand_prmtop.clone(),
    };
    let mutant_files = cfg.alarun.then(|| SystemFiles {
        complex_prmtop: opts
            .mutant_complex_prmtop
            .clone()
            .expect("checked during validation"),
        receptor_prmtop: opts
            .mutant_receptor_prmtop
            .clone()
            .or_else(|| opts.receptor_prmtop.clone()),
        ligand_prmtop: opts
            .mutant_ligand_prmtop
            .clone()
            .or_else(|| opts.ligand_prmtop.clone()),
    });
    let plan_ctx = PlanContext {
        cfg: &cfg,
        progs: &progs,
        pre: &opts.prefix,
        xvvfile: opts.xvvfile.as_deref(),
    };
    let steps = build_plan(&plan_ctx, &normal_files, mutant_files.as_ref());
    if steps.is_empty() {
        return Err(EndstateError::Internal(
            "the calculation plan is empty despite enabled phases".to_string(),
        )
        .into());
    }

    timers.add("calc", "Total calculation time:");
    timers.start("calc");
    let calc_timers = run_plan(&steps, opts.ranks, &opts.workdir)?;
    timers.stop("calc");
    timers.merge_max(&calc_timers);

    timers.add("output", "Statistics calculation & output writing:");
    timers.start("output");
    let assemble = AssembleContext {
        cfg: &cfg,
        frames: &frames,
        workdir: &opts.workdir,
        ranks: opts.ranks,
        pre: &opts.prefix,
    };
    let mut results = RunResults {
        mutation_label,
        ..RunResults::default()
    };
    if !cfg.ala.mutant_only {
        results.normal = Some(assemble.assemble_system(false)?);
    }
    if cfg.alarun {
        results.mutant = Some(assemble.assemble_system(true)?);
    }

    let report_ctx = ReportContext {
        cfg: &cfg,
        frames: &frames,
        results: &results,
        input_text: &parsed.text,
        files: ReportFiles {
            complex_prmtop: &opts.complex_prmtop,
            receptor_prmtop: opts.receptor_prmtop.as_deref(),
            ligand_prmtop: opts.ligand_prmtop.as_deref(),
            mutant_complex_prmtop: opts.mutant_complex_prmtop.as_deref(),
            mutant_receptor_prmtop: opts.mutant_receptor_prmtop.as_deref(),
            mutant_ligand_prmtop: opts.mutant_ligand_prmtop.as_deref(),
            complex_trajs: &opts.complex_trajs,
            receptor_trajs: &opts.receptor_trajs,
            ligand_trajs: &opts.ligand_trajs,
        },
        receptor_mask: &map.receptor_mask,
        ligand_mask: &map.ligand_mask,
    };
    write_report(&opts.output_file, &report_ctx)?;
    info!("final results written to {}", opts.output_file.display());

    if let Some(energyout) = &opts.energyout {
        write_energy_csv(energyout, &results)?;
        info!("per-frame energies written to {}", energyout.display());
    }
    if cfg.decomprun {
        write_decomp_report(&opts.decompout, &cfg, &results, &map, mutant_map.as_ref())?;
        info!("decomposition results written to {}", opts.decompout.display());
    }
    timers.stop("output");
    timers.stop("global");

    let files_json = files_summary(&opts);
    let timing = timers.report();
    if cfg.general.save_mode {
        let archive_path = opts.workdir.join("RESULTS_endstate.json");
        write_archive(
            &archive_path,
            &ArchiveInputs {
                cfg: &cfg,
                frames: &frames,
                results: &results,
                input_text: &parsed.text,
                files: files_json.clone(),
                ranks: opts.ranks,
                chamber,
                timings: &timing,
            },
        )?;
        info!("results archive written to {}", archive_path.display());
    }
    write_info(
        &opts.workdir.join(format!("{}info", opts.prefix)),
        &InfoInputs {
            cfg: &cfg,
            frames: &frames,
            receptor_mask: &map.receptor_mask,
            ligand_mask: &map.ligand_mask,
            mutation_label: results.mutation_label.as_deref(),
            ranks: opts.ranks,
            chamber,
            input_text: &parsed.text,
            files: files_json,
            timings: &timing,
        },
    )?;

    info!("Timing:");
    for (desc, duration) in &timing {
        info!("  {:<45}{}", desc, duration);
    }

    cleanup(&opts.workdir, &opts.prefix, cfg.general.keep_files)?;
    Ok(())
}

const POLAR_RESIDUES: &[&str] = &[
    "TYR", "SER", "THR", "CYS", "CYM", "ASN", "GLN", "HIS", "HIE", "HID", "ASH", "GLH", "LYN",
];
const POSITIVE_RESIDUES: &[&str] = &["LYS", "ARG", "HIP"];
const NEGATIVE_RESIDUES: &[&str] = &["ASP", "GLU"];

fn residue_class_name(name: &str) -> &'static str {
    let name = name.to_ascii_uppercase();
    if POSITIVE_RESIDUES.contains(&name.as_str()) {
        "positive"
    } else if NEGATIVE_RESIDUES.contains(&name.as_str()) {
        "negative"
    } else if POLAR_RESIDUES.contains(&name.as_str()) {
        "polar"
    } else {
        "nonpolar"
    }
}

/// The internal dielectric matching the class of the residue being
/// mutated away.
fn intdiel_for_residue_class(cfg: &RunConfig, name: &str) -> i64 {
    match residue_class_name(name) {
        "positive" => cfg.ala.intdiel_positive,
        "negative" => cfg.ala.intdiel_negative,
        "polar" => cfg.ala.intdiel_polar,
        _ => cfg.ala.intdiel_nonpolar,
    }
}

fn mutated_residue<'a>(map: &'a ResidueMap, selection: &str) -> Result<&'a crate::residues::Residue> {
    let entries = match parse_selection(selection)? {
        Selection::Residues(entries) => entries,
        Selection::Within(_) => bail!("a distance selection cannot pick the residue to mutate"),
    };
    let (chain, number, icode) = &entries[0];
    map.complex
        .iter()
        .find(|r| r.matches(chain, *number, icode))
        .with_context(|| format!("mutant_res `{selection}` does not name a complex residue"))
}

fn files_summary(opts: &RunOpts) -> serde_json::Value {
    let path = |p: &PathBuf| p.display().to_string();
    let opt = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());
    let list = |ps: &[PathBuf]| ps.iter().map(|p| p.display().to_string()).collect::<Vec<_>>();
    json!({
        "input_file": path(&opts.input),
        "complex_prmtop": path(&opts.complex_prmtop),
        "receptor_prmtop": opt(&opts.receptor_prmtop),
        "ligand_prmtop": opt(&opts.ligand_prmtop),
        "mutant_complex_prmtop": opt(&opts.mutant_complex_prmtop),
        "mutant_receptor_prmtop": opt(&opts.mutant_receptor_prmtop),
        "mutant_ligand_prmtop": opt(&opts.mutant_ligand_prmtop),
        "residue_map": path(&opts.residue_map),
        "complex_trajs": list(&opts.complex_trajs),
        "receptor_trajs": list(&opts.receptor_trajs),
        "ligand_trajs": list(&opts.ligand_trajs),
        "xvvfile": opt(&opts.xvvfile),
        "output_file": path(&opts.output_file),
        "decompout": path(&opts.decompout),
        "energyout": opt(&opts.energyout),
        "prefix": opts.prefix.as_str(),
    })
}

/// Intermediate-file retention after a successful run. Level 2 keeps
/// everything, level 1 drops scripts and scratch restarts, level 0 drops
/// every prefixed intermediate.
fn cleanup(workdir: &Path, pre: &str, level: i64) -> Result<()> {
    if level >= 2 {
        return Ok(());
    }
    let scratch_only = level == 1;
    for entry in std::fs::read_dir(workdir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(pre) || name == format!("{pre}info") {
            continue;
        }
        if scratch_only {
            let is_scratch = name.ends_with(".in")
                || name.contains(".in.")
                || name.contains("restrt")
                || name.contains("dummy");
            if !is_scratch {
                continue;
            }
        }
        std::fs::remove_file(entry.path())
            .with_context(|| format!("could not remove {}", name))?;
    }
    Ok(())
}
