//! Discovery of the external solver programs a run needs.
//!
//! Programs are resolved on PATH up front so a missing binary fails the
//! run before any work starts, with a message naming the calculation that
//! asked for it.

use anyhow::{anyhow, Result};
use cmd_lib::run_fun;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use which::which;

use crate::input::RunConfig;

/// Resolved paths of every external program the plan will invoke.
#[derive(Debug, Clone)]
pub struct Programs {
    pub gb_energy: PathBuf,
    pub pb_energy: PathBuf,
    /// The trajectory processor; also runs surface-area and
    /// quasi-harmonic analyses.
    pub trajectory: PathBuf,
    pub rism: PathBuf,
    pub nmode: PathBuf,
}

impl Programs {
    /// Fixed paths for plan-construction tests; nothing is resolved.
    pub fn fixed_for_tests() -> Programs {
        Programs {
            gb_energy: PathBuf::from("mmpbsa_py_energy"),
            pb_energy: PathBuf::from("mmpbsa_py_energy"),
            trajectory: PathBuf::from("cpptraj"),
            rism: PathBuf::from("rism3d.snglpnt"),
            nmode: PathBuf::from("mmpbsa_py_nabnmode"),
        }
    }
}

fn resolve(prog_name: &str, needed_for: &str) -> Result<PathBuf> {
    match which(prog_name) {
        Ok(p) => {
            info!("found `{}` in the PATH at {}", prog_name, p.display());
            log_version(&p);
            Ok(p)
        }
        Err(e) => Err(anyhow!(
            "could not find `{}` (required for {}) in your PATH: {}",
            prog_name,
            needed_for,
            e
        )),
    }
}

/// Best-effort version probe, logged for the record. Solver version
/// strings are free-form, so nothing is enforced here.
fn log_version(path: &Path) {
    let p = path.display().to_string();
    match run_fun!($p --version) {
        Ok(v) => {
            if let Some(line) = v.lines().next() {
                info!("  version: {}", line.trim());
            }
        }
        Err(_) => warn!("  could not query {} for a version string", path.display()),
    }
}

/// Resolve every program the configuration calls for. The trajectory
/// processor is always required; the rest depend on the enabled phases.
pub fn find_programs(cfg: &RunConfig) -> Result<Programs> {
    let trajectory = resolve("cpptraj", "trajectory processing")?;

    let full_solver = cfg.general.use_sander || cfg.decomprun || cfg.gb.ifqnt;
    let gb_energy = if cfg.gbrun {
        if full_solver {
            resolve("sander", "GB calculations")?
        } else {
            resolve("mmpbsa_py_energy", "GB calculations")?
        }
    } else {
        PathBuf::new()
    };

    let pb_energy = if cfg.pbrun {
        if cfg.pb.sander_apbs {
            resolve("sander.APBS", "PB calculations")?
        } else if cfg.general.use_sander || cfg.decomprun {
            resolve("sander", "PB calculations")?
        } else {
            resolve("mmpbsa_py_energy", "PB calculations")?
        }
    } else {
        PathBuf::new()
    };

    let rism = if cfg.rismrun {
        resolve("rism3d.snglpnt", "3D-RISM calculations")?
    } else {
        PathBuf::new()
    };

    let nmode = if cfg.nmoderun {
        resolve("mmpbsa_py_nabnmode", "normal mode calculations")?
    } else {
        PathBuf::new()
    };

    Ok(Programs {
        gb_energy,
        pb_energy,
        trajectory,
        rism,
        nmode,
    })
}
