//! Command-line surface of the driver.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

use crate::input::schema;

#[derive(Debug, Parser)]
#[command(
    name = "endstate",
    version,
    about = "end-state binding free energy calculations driven through external MM solvers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// run a binding (or stability) free energy calculation
    #[command(arg_required_else_help = true)]
    Run(RunOpts),
    /// print the input-file variable inventory
    PrintInput {
        /// restrict the listing to one namelist
        namespace: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct RunOpts {
    /// calculation input file (Fortran-namelist format)
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// complex topology file
    #[arg(long = "cp")]
    pub complex_prmtop: PathBuf,

    /// receptor topology file (omit for a stability calculation)
    #[arg(long = "rp")]
    pub receptor_prmtop: Option<PathBuf>,

    /// ligand topology file (omit for a stability calculation)
    #[arg(long = "lp")]
    pub ligand_prmtop: Option<PathBuf>,

    /// mutant complex topology file (alanine scanning)
    #[arg(long = "mc")]
    pub mutant_complex_prmtop: Option<PathBuf>,

    /// mutant receptor topology file (defaults to the receptor topology)
    #[arg(long = "mr")]
    pub mutant_receptor_prmtop: Option<PathBuf>,

    /// mutant ligand topology file (defaults to the ligand topology)
    #[arg(long = "ml")]
    pub mutant_ligand_prmtop: Option<PathBuf>,

    /// residue map emitted by the topology builder
    #[arg(long)]
    pub residue_map: PathBuf,

    /// complex trajectory file(s)
    #[arg(short = 'y', long = "ctraj", num_args = 1.., required = true)]
    pub complex_trajs: Vec<PathBuf>,

    /// receptor trajectory file(s); enables the multiple-trajectory protocol
    #[arg(long = "rtraj", num_args = 1..)]
    pub receptor_trajs: Vec<PathBuf>,

    /// ligand trajectory file(s); enables the multiple-trajectory protocol
    #[arg(long = "ltraj", num_args = 1..)]
    pub ligand_trajs: Vec<PathBuf>,

    /// solvent susceptibility file for 3D-RISM
    #[arg(long)]
    pub xvvfile: Option<PathBuf>,

    /// final results file
    #[arg(short = 'o', long, default_value = "FINAL_RESULTS.dat")]
    pub output_file: PathBuf,

    /// decomposition results file
    #[arg(long, default_value = "FINAL_DECOMP.dat")]
    pub decompout: PathBuf,

    /// per-frame energy CSV dump
    #[arg(long = "eo")]
    pub energyout: Option<PathBuf>,

    /// prefix of the intermediate files
    #[arg(long, default_value = "_ENDSTATE_")]
    pub prefix: String,

    /// stability calculation: complex energies only, no binding delta
    #[arg(long)]
    pub stability: bool,

    /// number of ranks the trajectory frames are sharded across
    #[arg(long, default_value_t = 1)]
    pub ranks: usize,

    /// working directory for intermediate files
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,
}

#[derive(Tabled)]
struct VariableRow {
    namelist: &'static str,
    variable: &'static str,
    #[tabled(rename = "type")]
    kind: &'static str,
    default: String,
    description: &'static str,
}

/// List the recognized namelist variables with their defaults.
pub fn print_input(namespace: Option<String>) -> anyhow::Result<()> {
    let spec = schema::input_spec();
    let mut rows = Vec::new();
    for ns in &spec.namespaces {
        if let Some(wanted) = &namespace {
            if spec.resolve_namespace(wanted).map(|n| n.key) != Some(ns.key) {
                continue;
            }
        }
        for var in &ns.vars {
            rows.push(VariableRow {
                namelist: ns.full_name,
                variable: var.name,
                kind: var.kind.label(),
                default: var.default.to_string(),
                description: var.description,
            });
        }
    }
    if rows.is_empty() {
        anyhow::bail!(
            "unrecognized namelist {}",
            namespace.unwrap_or_default()
        );
    }
    println!("{}", Table::new(rows).with(Style::sharp()));
    Ok(())
}
