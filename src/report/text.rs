//! The canonical text report: input echo, file inventory, one section per
//! enabled model with mean/stdev tables, entropy-corrected binding free
//! energies, and the alanine-scanning comparison blocks.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

use crate::compose::binding::{DeltaTerms, ModelResult};
use crate::compose::entropy::{alanine_delta, combine_with_entropy_vector, K_B};
use crate::input::RunConfig;
use crate::parse::energy::{Diff, EnergyVector};
use crate::parse::outputs::{EnergyTerms, Model, QhOutput, QH_COMPONENTS};
use crate::plan::frames::FramePlan;
use crate::results::{CalcResults, RunResults};

const RELIABILITY_NOTE: &str = "\
WARNING: SOME VALUES OF THE INTERACTION ENERGY STANDARD DEVIATION [ sigma(Int. Energy)]
ARE GREATER THAN 3.6 kcal/mol (~15 kJ/mol). THE DERIVED ENTROPY VALUES ARE NOT RELIABLE.
";

/// Paths echoed into the report header.
pub struct ReportFiles<'a> {
    pub complex_prmtop: &'a Path,
    pub receptor_prmtop: Option<&'a Path>,
    pub ligand_prmtop: Option<&'a Path>,
    pub mutant_complex_prmtop: Option<&'a Path>,
    pub mutant_receptor_prmtop: Option<&'a Path>,
    pub mutant_ligand_prmtop: Option<&'a Path>,
    pub complex_trajs: &'a [std::path::PathBuf],
    pub receptor_trajs: &'a [std::path::PathBuf],
    pub ligand_trajs: &'a [std::path::PathBuf],
}

pub struct ReportContext<'a> {
    pub cfg: &'a RunConfig,
    pub frames: &'a FramePlan,
    pub results: &'a RunResults,
    pub input_text: &'a str,
    pub files: ReportFiles<'a>,
    pub receptor_mask: &'a str,
    pub ligand_mask: &'a str,
}

struct Report {
    buf: String,
}

impl Report {
    fn new() -> Report {
        Report { buf: String::new() }
    }

    fn write(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    fn writeline(&mut self, line: &str) {
        self.buf.push_str(line);
        self.buf.push('\n');
    }

    fn comment(&mut self, line: &str) {
        self.writeline(&format!("|{}", line));
    }

    fn separate(&mut self) {
        for _ in 0..2 {
            self.writeline(&"-".repeat(79));
        }
    }

    fn section(&mut self, text: &str) {
        self.write(text);
        self.separate();
    }
}

fn term_row(name: &str, avg: f64, stdev: f64, sem: f64) -> String {
    format!("{:<26}{:>16.4}{:>17.4}{:>19.4}\n", name, avg, stdev, sem)
}

fn terms_table(terms: &EnergyTerms) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Energy Component            Average              Std. Dev.   Std. Err. of Mean"
    );
    let _ = writeln!(out, "{}", "=".repeat(79));
    for (name, v) in terms.iter() {
        if name == "TOTAL" {
            out.push('\n');
        }
        out.push_str(&term_row(name, v.avg(), v.stdev(), v.sem()));
    }
    out
}

fn delta_table(delta: &DeltaTerms, verbose: i64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Differences (Complex - Receptor - Ligand):");
    let _ = writeln!(
        out,
        "Energy Component            Average              Std. Dev.   Std. Err. of Mean"
    );
    let _ = writeln!(out, "{}", "=".repeat(79));
    for (name, d) in delta.iter() {
        // at low verbosity only the composites survive
        if verbose < 2 && !matches!(name, "G gas" | "G solv" | "TOTAL") {
            continue;
        }
        if name == "TOTAL" {
            out.push('\n');
        }
        let sem = match d.per_frame() {
            Some(v) => v.sem(),
            None => 0.0,
        };
        out.push_str(&term_row(&format!("DELTA {}", name), d.avg(), d.stdev(), sem));
    }
    out
}

fn model_header(model: Model) -> &'static str {
    match model {
        Model::Gb => "\nGENERALIZED BORN:\n\n",
        Model::Pb => "\nPOISSON BOLTZMANN:\n\n",
        Model::RismStd => "\n3D-RISM:\n\n",
        Model::RismGf => "\n3D-RISM (Gauss. Fluct.):\n\n",
    }
}

fn qh_summary(qh: &QhOutput) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<14}{:>14}{:>14}{:>14}{:>14}",
        "", "Total", "Translational", "Rotational", "Vibrational"
    );
    for (label, values) in [
        ("Complex:", &qh.complex),
        ("Receptor:", &qh.receptor),
        ("Ligand:", &qh.ligand),
    ] {
        let _ = writeln!(
            out,
            "{:<14}{:>14.4}{:>14.4}{:>14.4}{:>14.4}",
            label, values[0], values[1], values[2], values[3]
        );
    }
    let _ = writeln!(out);
    let _ = write!(out, "{:<14}", "DELTA S:");
    for i in 0..QH_COMPONENTS.len() {
        let _ = write!(out, "{:>14.4}", qh.delta(i));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "\n-T*DELTA S = {:9.4} kcal/mol", qh.minus_t_delta_s());
    out
}

fn ie_summary(results: &CalcResults) -> (String, bool) {
    let mut out = String::new();
    let mut inconsistent = false;
    let _ = writeln!(
        out,
        "{:<12}{:>18}{:>14}{:>14}{:>10}",
        "Model", "sigma(Int. Energy)", "Average", "Std. Dev.", "Frames"
    );
    let _ = writeln!(out, "{}", "=".repeat(68));
    for (model, ie) in &results.ie {
        if !ie.reliable() {
            inconsistent = true;
        }
        let _ = writeln!(
            out,
            "{:<12}{:>18.4}{:>14.4}{:>14.4}{:>10}",
            model.to_string(),
            ie.sigma,
            ie.value,
            ie.stdev,
            ie.frames
        );
    }
    (out, inconsistent)
}

fn c2_summary(results: &CalcResults) -> (String, bool) {
    let mut out = String::new();
    let mut inconsistent = false;
    let _ = writeln!(
        out,
        "{:<12}{:>18}{:>14}{:>14}{:>24}",
        "Model", "sigma(Int. Energy)", "C2 Value", "Std. Dev.", "Conf. Interv. (95%)"
    );
    let _ = writeln!(out, "{}", "=".repeat(82));
    for (model, c2) in &results.c2 {
        if !c2.reliable() {
            inconsistent = true;
        }
        let _ = writeln!(
            out,
            "{:<12}{:>18.4}{:>14.4}{:>14.4}{:>12.4}-{:<11.4}",
            model.to_string(),
            c2.sigma,
            c2.value,
            c2.c2_std,
            c2.ci.0,
            c2.ci.1
        );
    }
    (out, inconsistent)
}

fn find_model<'a>(results: &'a CalcResults, model: Model) -> Option<&'a ModelResult> {
    results
        .models
        .iter()
        .find(|(m, _)| *m == model)
        .map(|(_, r)| r)
}

fn nmode_delta_total(results: &CalcResults) -> Option<Diff> {
    let nm = results.nmode.as_ref()?;
    match (&nm.delta, nm.complex.get("Total")) {
        (Some(delta), _) => delta.get("Total").cloned(),
        (None, Some(total)) => Some(Diff::PerFrame(total.clone())),
        _ => None,
    }
}

/// `-T*dS` vector from a normal-mode `T*S` delta.
fn minus_tds_vector(d: &Diff) -> EnergyVector {
    match d.per_frame() {
        Some(v) => v.scale(-1.0),
        None => EnergyVector::new(),
    }
}

fn header(r: &mut Report, ctx: &ReportContext) {
    let cfg = ctx.cfg;
    r.writeline(&format!(
        "| Run on {}",
        chrono::Local::now().format("%a %b %e %T %Y")
    ));
    r.comment("");
    r.write(ctx.input_text);
    r.writeline("");
    r.comment(&format!(
        "endstate version {}",
        env!("CARGO_PKG_VERSION")
    ));
    r.comment(&format!(
        "Complex topology file:           {}",
        ctx.files.complex_prmtop.display()
    ));
    if let Some(p) = ctx.files.receptor_prmtop {
        r.comment(&format!("Receptor topology file:          {}", p.display()));
    }
    if let Some(p) = ctx.files.ligand_prmtop {
        r.comment(&format!("Ligand topology file:            {}", p.display()));
    }
    if cfg.alarun {
        if let Some(p) = ctx.files.mutant_complex_prmtop {
            r.comment(&format!("Mutant complex topology file:    {}", p.display()));
        }
        if let Some(p) = ctx.files.mutant_receptor_prmtop {
            r.comment(&format!("Mutant receptor topology file:   {}", p.display()));
        }
        if let Some(p) = ctx.files.mutant_ligand_prmtop {
            r.comment(&format!("Mutant ligand topology file:     {}", p.display()));
        }
    }
    for (label, trajs) in [
        ("Initial trajectories:           ", ctx.files.complex_trajs),
        ("Initial receptor trajectories:  ", ctx.files.receptor_trajs),
        ("Initial ligand trajectories:    ", ctx.files.ligand_trajs),
    ] {
        for (i, t) in trajs.iter().enumerate() {
            if i == 0 {
                r.comment(&format!("{} {}", label, t.display()));
            } else {
                r.comment(&format!("{} {}", " ".repeat(label.len()), t.display()));
            }
        }
    }
    r.comment("");
    if !cfg.stability {
        r.comment(&format!("Receptor mask:                  \"{}\"", ctx.receptor_mask));
        r.comment(&format!("Ligand mask:                    \"{}\"", ctx.ligand_mask));
        r.comment("");
    }
    r.comment(&format!(
        "Calculations performed using {} complex frames.",
        ctx.frames.energy.count
    ));
    if let Some(nm) = &ctx.frames.nmode {
        r.comment(&format!(
            "NMODE calculations performed using {} frames.",
            nm.count
        ));
    }
    if cfg.general.interaction_entropy {
        r.comment(&format!(
            "Interaction Entropy calculations performed using last {} frames.",
            ctx.frames.ie_frames
        ));
    }
    if cfg.general.c2_entropy {
        r.comment(&format!(
            "C2 Entropy calculations performed using last {} frames.",
            ctx.frames.c2_frames
        ));
        r.comment(
            "C2 Entropy Std. Dev. and Conf. Interv. (95%) have been obtained by \
             bootstrapping with number_of_resamplings = 2000",
        );
    }
    if cfg.pbrun {
        if cfg.pb.sander_apbs {
            r.comment("Poisson Boltzmann calculations performed using iAPBS interface to sander (sander.APBS)");
        } else if cfg.general.use_sander || cfg.decomprun {
            r.comment("Poisson Boltzmann calculations performed using internal PBSA solver in sander.");
        } else {
            r.comment("Poisson Boltzmann calculations performed using internal PBSA solver in mmpbsa_py_energy");
        }
    }
    if cfg.gbrun {
        if cfg.gb.molsurf {
            r.comment("Generalized Born ESURF calculated using 'molsurf' surface areas");
        } else {
            r.comment("Generalized Born ESURF calculated using 'LCPO' surface areas");
        }
        r.comment("");
    }
    r.comment("All units are reported in kcal/mole.");
    if cfg.nmoderun
        || cfg.general.qh_entropy
        || cfg.general.interaction_entropy
        || cfg.general.c2_entropy
    {
        r.comment(&format!(
            "All entropy results have units kcal/mol (temperature is {:.2} K).",
            cfg.general.temperature
        ));
    }
    if cfg.gb.ifqnt {
        r.comment(&format!(
            "QM/MM: Residues {} are treated with the Quantum Hamiltonian {}",
            cfg.gb.qm_residues, cfg.gb.qm_theory
        ));
    }
    if cfg.general.exp_ki != 0.0 {
        let dg = K_B * cfg.general.temperature * (cfg.general.exp_ki * 1e-9).ln();
        r.comment(&format!(
            "Experimental DELTA G binding from Ki ({} nM) = {:9.4} kcal/mol",
            cfg.general.exp_ki, dg
        ));
    }
    for w in &cfg.warnings {
        r.comment(&format!("WARNING: {}", w));
    }
    r.separate();
}

/// Write the final results file.
pub fn write_report(path: &Path, ctx: &ReportContext) -> Result<()> {
    let cfg = ctx.cfg;
    let mut r = Report::new();
    header(&mut r, ctx);

    let mut_str = ctx.results.mutation_label.as_deref().unwrap_or("MUTANT");
    let normal = ctx.results.normal.as_ref();
    let mutant = ctx.results.mutant.as_ref();

    // Entropies first, the way the solvers hand them over.
    if cfg.general.qh_entropy {
        if let Some(qh) = normal.and_then(|n| n.qh.as_ref()) {
            r.writeline("ENTROPY RESULTS (QUASI-HARMONIC APPROXIMATION):");
            r.section(&qh_summary(qh));
        }
        if let Some(qh) = mutant.and_then(|m| m.qh.as_ref()) {
            r.writeline(&format!("{} MUTANT", mut_str));
            r.writeline("ENTROPY RESULTS (QUASI-HARMONIC APPROXIMATION):");
            r.section(&qh_summary(qh));
        }
        if let (Some(n), Some(m)) = (
            normal.and_then(|n| n.qh.as_ref()),
            mutant.and_then(|m| m.qh.as_ref()),
        ) {
            r.section(&format!(
                "\nRESULT OF ALANINE SCANNING:\n({}) DELTA DELTA S binding = {:9.4}\n",
                mut_str,
                n.delta(0) - m.delta(0)
            ));
        }
    }

    let mut reliability_flag = false;
    if cfg.general.interaction_entropy {
        if let Some(n) = normal {
            let (summary, bad) = ie_summary(n);
            reliability_flag |= bad;
            r.writeline("ENTROPY RESULTS (INTERACTION ENTROPY):");
            r.section(&summary);
        }
        if let Some(m) = mutant {
            let (summary, bad) = ie_summary(m);
            reliability_flag |= bad;
            r.writeline(&format!("{} MUTANT", mut_str));
            r.writeline("ENTROPY RESULTS (INTERACTION ENTROPY):");
            r.section(&summary);
        }
        if let (Some(n), Some(m)) = (normal, mutant) {
            let mut text = format!("\nRESULT OF ALANINE SCANNING ({}):\n", mut_str);
            for (model, mie) in &m.ie {
                if let Some((_, nie)) = n.ie.iter().find(|(mm, _)| mm == model) {
                    let d = Diff::between(&mie.data, &nie.data);
                    let _ = writeln!(
                        text,
                        "DELTA DELTA S binding ({}) = {:9.4} +/- {:9.4}",
                        model.to_string().to_uppercase(),
                        d.avg(),
                        d.stdev()
                    );
                }
            }
            r.section(&text);
        }
    }

    if cfg.general.c2_entropy {
        if let Some(n) = normal {
            let (summary, bad) = c2_summary(n);
            reliability_flag |= bad;
            r.writeline("ENTROPY RESULTS (C2 ENTROPY):");
            r.section(&summary);
        }
        if let Some(m) = mutant {
            let (summary, bad) = c2_summary(m);
            reliability_flag |= bad;
            r.writeline(&format!("{} MUTANT", mut_str));
            r.writeline("ENTROPY RESULTS (C2 ENTROPY):");
            r.section(&summary);
        }
        if let (Some(n), Some(m)) = (normal, mutant) {
            let mut text = format!("\nRESULT OF ALANINE SCANNING ({}):\n", mut_str);
            for (model, mc2) in &m.c2 {
                if let Some((_, nc2)) = n.c2.iter().find(|(mm, _)| mm == model) {
                    let _ = writeln!(
                        text,
                        "DELTA DELTA S binding ({}) = {:9.4}",
                        model.to_string().to_uppercase(),
                        mc2.value - nc2.value
                    );
                }
            }
            r.section(&text);
        }
    }
    if reliability_flag {
        r.writeline(RELIABILITY_NOTE);
    }

    if cfg.nmoderun {
        if let Some(nm) = normal.and_then(|n| n.nmode.as_ref()) {
            r.write("ENTROPY RESULTS (HARMONIC APPROXIMATION) CALCULATED WITH NMODE:\n\n");
            r.section(&nmode_block(nm, cfg.general.verbose));
        }
        if let Some(nm) = mutant.and_then(|m| m.nmode.as_ref()) {
            r.write(&format!(
                "{} MUTANT\nENTROPY RESULTS (HARMONIC APPROXIMATION) CALCULATED WITH NMODE:\n\n",
                mut_str
            ));
            r.section(&nmode_block(nm, cfg.general.verbose));
        }
        if let (Some(n), Some(m)) = (
            normal.and_then(nmode_delta_total),
            mutant.and_then(nmode_delta_total),
        ) {
            let (davg, dstdev) = alanine_delta(&m, &n);
            r.section(&format!(
                "\nRESULT OF ALANINE SCANNING:\n({}) DELTA DELTA S binding = {:9.4} +/- {:9.4}\n",
                mut_str, davg, dstdev
            ));
        }
    }

    for model in [Model::Gb, Model::Pb, Model::RismStd, Model::RismGf] {
        let nr = normal.and_then(|n| find_model(n, model));
        let mr = mutant.and_then(|m| find_model(m, model));
        if nr.is_none() && mr.is_none() {
            continue;
        }
        if let (Some(result), Some(sys)) = (nr, normal) {
            r.write(model_header(model));
            model_block(&mut r, cfg, model, result, sys, None);
        }
        if let (Some(result), Some(sys)) = (mr, mutant) {
            r.write(&format!("{} MUTANT:{}", mut_str, model_header(model)));
            model_block(&mut r, cfg, model, result, sys, Some(mut_str));
        }
        if let (Some(n), Some(m)) = (nr, mr) {
            if let (Some(nd), Some(md)) = (n.delta_total(), m.delta_total()) {
                let (davg, dstdev) = alanine_delta(md, nd);
                r.write(&format!(
                    "\nRESULT OF ALANINE SCANNING ({}):\nDELTA DELTA G binding = {:9.4}  +/- {:9.4}\n",
                    mut_str, davg, dstdev
                ));
                r.separate();
            }
        }
    }

    std::fs::File::create(path)
        .and_then(|mut f| f.write_all(r.buf.as_bytes()))
        .with_context(|| format!("could not write the final report to {}", path.display()))
}

fn nmode_block(nm: &ModelResult, verbose: i64) -> String {
    let mut out = String::new();
    match &nm.delta {
        Some(delta) => {
            if verbose >= 2 {
                out.push_str("Complex:\n");
                out.push_str(&terms_table(&nm.complex));
                if let (Some(rec), Some(lig)) = (&nm.receptor, &nm.ligand) {
                    out.push_str("\nReceptor:\n");
                    out.push_str(&terms_table(rec));
                    out.push_str("\nLigand:\n");
                    out.push_str(&terms_table(lig));
                }
                out.push('\n');
            }
            out.push_str(&delta_table_all(delta));
        }
        None => {
            out.push_str("Complex:\n");
            out.push_str(&terms_table(&nm.complex));
        }
    }
    out
}

fn delta_table_all(delta: &DeltaTerms) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Differences (Complex - Receptor - Ligand):");
    for (name, d) in delta.iter() {
        let _ = writeln!(
            out,
            "{:<26}{:>16.4}{:>17.4}",
            format!("DELTA {}", name),
            d.avg(),
            d.stdev()
        );
    }
    out
}

fn model_block(
    r: &mut Report,
    cfg: &RunConfig,
    model: Model,
    result: &ModelResult,
    sys: &CalcResults,
    _mut_label: Option<&str>,
) {
    if cfg.general.verbose >= 2 || result.delta.is_none() {
        r.section(&format!("Complex:\n{}", terms_table(&result.complex)));
        if let (Some(rec), Some(lig)) = (&result.receptor, &result.ligand) {
            r.section(&format!("Receptor:\n{}", terms_table(rec)));
            r.section(&format!("Ligand:\n{}", terms_table(lig)));
        }
    }
    let Some(delta) = &result.delta else {
        // stability: entropy corrections apply to the complex total
        if let (Some(qh), Some(total)) = (&sys.qh, result.complex.get("TOTAL")) {
            r.section(&format!(
                "Using Quasi-harmonic Entropy Approximation: FREE ENERGY (G) = {:9.4}\n",
                total.avg() - qh.species_ts(&qh.complex)
            ));
        }
        return;
    };
    r.section(&delta_table(delta, cfg.general.verbose));

    let delta_total = delta.get("TOTAL").cloned().unwrap_or(Diff::Independent {
        mean: 0.0,
        stdev: 0.0,
    });

    if let Some(qh) = &sys.qh {
        r.section(&format!(
            "Using Quasi-harmonic Entropy Approximation:\nDELTA G binding = {:9.4}\n",
            delta_total.avg() + qh.minus_t_delta_s()
        ));
    }
    if let Some((_, ie)) = sys.ie.iter().find(|(m, _)| *m == model) {
        r.section(&format!(
            "Using Interaction Entropy Approximation:\nDELTA G binding = {:9.4} +/- {:7.4}\n",
            delta_total.avg() + ie.value,
            (delta_total.stdev().powi(2) + ie.stdev.powi(2)).sqrt()
        ));
    }
    if let Some((_, c2)) = sys.c2.iter().find(|(m, _)| *m == model) {
        r.section(&format!(
            "Using C2 Entropy Approximation:\nDELTA G binding = {:9.4} +/- {:7.4}\n",
            delta_total.avg() + c2.value,
            (delta_total.stdev().powi(2) + c2.c2_std.powi(2)).sqrt()
        ));
    }
    if let Some(nm_delta) = nmode_delta_total(sys) {
        let minus_tds = minus_tds_vector(&nm_delta);
        let (avg, stdev) = if minus_tds.is_empty() {
            (
                delta_total.avg() - nm_delta.avg(),
                (delta_total.stdev().powi(2) + nm_delta.stdev().powi(2)).sqrt(),
            )
        } else {
            combine_with_entropy_vector(&delta_total, &minus_tds)
        };
        r.section(&format!(
            "Using Normal Mode Entropy Approximation:\nDELTA G binding = {:9.4} +/- {:7.4}\n",
            avg, stdev
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::energy::EnergyVector;

    #[test]
    fn term_rows_are_fixed_width() {
        let row = term_row("DELTA TOTAL", -12.3456, 1.2345, 0.1234);
        assert!(row.starts_with("DELTA TOTAL"));
        assert!(row.contains("-12.3456"));
        assert_eq!(row.len(), row.trim_end().len() + 1);
    }

    #[test]
    fn low_verbosity_hides_raw_terms_in_delta_table() {
        let mut terms = EnergyTerms::new();
        terms.insert("BOND", EnergyVector::from_values(vec![1.0, 1.0]));
        terms.insert("TOTAL", EnergyVector::from_values(vec![-10.0, -12.0]));
        let result = crate::compose::binding::compose_binding(
            terms.clone(),
            terms.clone(),
            EnergyTerms::new(),
            crate::plan::frames::TrajectoryProtocol::Single,
        );
        let table = delta_table(result.delta.as_ref().unwrap(), 1);
        assert!(!table.contains("DELTA BOND"));
        assert!(table.contains("DELTA TOTAL"));
        let table = delta_table(result.delta.as_ref().unwrap(), 2);
        assert!(table.contains("DELTA BOND"));
    }
}
