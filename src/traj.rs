//! Intermediate-trajectory preparation through the external trajectory
//! processor: slice the requested frame window out of the input
//! trajectories, derive the receptor/ligand (and mutant) trajectories,
//! and split every species into per-rank shards.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::input::RunConfig;
use crate::input::config::Mutation;
use crate::plan::frames::{rank_shard, TrajectoryCounts};
use crate::residues::Residue;

static FRAMES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) frames").expect("the frame-count pattern is valid"));

/// Atoms kept in the mutated residue: the backbone plus the beta carbon
/// for alanine, backbone only for glycine.
pub fn mutant_strip_mask(residue: &Residue, mutation: Mutation) -> String {
    let kept = match mutation {
        Mutation::Alanine => "@N,H,CA,HA,CB,HB1,HB2,HB3,C,O",
        Mutation::Glycine => "@N,H,CA,HA1,HA2,HA3,C,O",
    };
    format!(":{}&!{}", residue.index, kept)
}

pub struct TrajPrep<'a> {
    pub cfg: &'a RunConfig,
    pub prog: &'a Path,
    pub pre: &'a str,
    pub workdir: &'a Path,
    pub ranks: usize,
    pub receptor_mask: &'a str,
    pub ligand_mask: &'a str,
}

impl TrajPrep<'_> {
    fn run_script(&self, name: &str, script: &str) -> Result<String> {
        let path = self.workdir.join(name);
        std::fs::write(&path, script)
            .with_context(|| format!("could not write {}", path.display()))?;
        debug!("trajectory script {}:\n{}", name, script);
        let output = Command::new(self.prog)
            .current_dir(self.workdir)
            .arg("-i")
            .arg(&path)
            .output()
            .with_context(|| format!("failed to launch {}", self.prog.display()))?;
        if !output.status.success() {
            bail!(
                "{} failed on {} with {}: {}",
                self.prog.display(),
                name,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Slice the source trajectories into one intermediate plus a PDB of
    /// the first frame, and report how many frames survived.
    fn prepare_species(
        &self,
        species: &str,
        topology: &Path,
        sources: &[PathBuf],
        window: Option<(i64, i64, i64)>,
        strip: Option<&str>,
    ) -> Result<usize> {
        let sfx = self.cfg.trajectory_suffix;
        let pre = self.pre;
        let mut script = format!("parm {}\n", topology.display());
        for src in sources {
            match window {
                Some((start, end, interval)) => {
                    let end = if end >= 9_999_999 {
                        "last".to_string()
                    } else {
                        end.to_string()
                    };
                    script.push_str(&format!(
                        "trajin {} {} {} {}\n",
                        src.display(),
                        start,
                        end,
                        interval
                    ));
                }
                None => script.push_str(&format!("trajin {}\n", src.display())),
            }
        }
        if self.cfg.general.solvated_trajectory && strip.is_none() && window.is_some() {
            script.push_str(&format!("strip {}\n", self.cfg.general.strip_mask));
        }
        if let Some(mask) = strip {
            script.push_str(&format!("strip {}\n", mask));
        }
        script.push_str(&format!("trajout {pre}{species}.{sfx}\n"));
        script.push_str(&format!("trajout {pre}{species}.pdb pdb onlyframes 1\n"));
        script.push_str(&format!(
            "trajout {pre}dummy{species}.inpcrd restart onlyframes 1\n"
        ));
        script.push_str("go\n");
        let stdout = self.run_script(&format!("{pre}{species}_traj.in"), &script)?;
        let count = FRAMES_RE
            .captures_iter(&stdout)
            .last()
            .and_then(|c| c[1].parse::<usize>().ok())
            .with_context(|| {
                format!("the trajectory tool did not report a frame count for {species}")
            })?;
        info!("{} frames were processed for the {} trajectory", count, species);
        Ok(count)
    }

    /// Split one species' intermediate into contiguous per-rank shards.
    fn shard_species(&self, species: &str, topology: &Path, frames: usize) -> Result<()> {
        let sfx = self.cfg.trajectory_suffix;
        let pre = self.pre;
        for rank in 0..self.ranks {
            let shard = rank_shard(frames, self.ranks, rank);
            if shard.is_empty() {
                // an empty shard still needs a file so the solver output
                // exists; give it the first frame
                let script = format!(
                    "parm {}\ntrajin {pre}{species}.{sfx} 1 1 1\ntrajout {pre}{species}.{sfx}.{rank}\ngo\n",
                    topology.display()
                );
                self.run_script(&format!("{pre}{species}_shard{rank}.in"), &script)?;
                continue;
            }
            let script = format!(
                "parm {}\ntrajin {pre}{species}.{sfx} {} {} 1\ntrajout {pre}{species}.{sfx}.{rank}\ngo\n",
                topology.display(),
                shard.start + 1,
                shard.end
            );
            self.run_script(&format!("{pre}{species}_shard{rank}.in"), &script)?;
        }
        Ok(())
    }

    /// Build every intermediate trajectory the plan will consume and
    /// report the frame counts back for reconciliation.
    #[allow(clippy::too_many_arguments)]
    pub fn make_trajectories(
        &self,
        complex_prmtop: &Path,
        complex_trajs: &[PathBuf],
        receptor: Option<(&Path, &[PathBuf])>,
        ligand: Option<(&Path, &[PathBuf])>,
        mutant_complex_prmtop: Option<&Path>,
        mutant_mask: Option<&str>,
    ) -> Result<TrajectoryCounts> {
        let cfg = self.cfg;
        let g = &cfg.general;
        let window = Some((g.startframe, g.endframe, g.interval));
        let pre = self.pre;
        let sfx = cfg.trajectory_suffix;

        let numframes =
            self.prepare_species("complex", complex_prmtop, complex_trajs, window, None)?;
        self.shard_species("complex", complex_prmtop, numframes)?;

        let full_complex = [self.workdir.join(format!("{pre}complex.{sfx}"))];
        let (receptor_frames, ligand_frames) = if cfg.stability {
            (0, 0)
        } else {
            let (rec_top, rec_trajs) =
                receptor.expect("binding runs carry a receptor topology");
            let (lig_top, lig_trajs) = ligand.expect("binding runs carry a ligand topology");
            let rec_frames = if rec_trajs.is_empty() {
                // single-trajectory protocol: slice the receptor out of
                // the processed complex
                self.prepare_species(
                    "receptor",
                    rec_top,
                    &full_complex,
                    None,
                    Some(self.ligand_mask),
                )?
            } else {
                self.prepare_species("receptor", rec_top, rec_trajs, window, None)?
            };
            self.shard_species("receptor", rec_top, rec_frames)?;
            let lig_frames = if lig_trajs.is_empty() {
                self.prepare_species(
                    "ligand",
                    lig_top,
                    &full_complex,
                    None,
                    Some(self.receptor_mask),
                )?
            } else {
                self.prepare_species("ligand", lig_top, lig_trajs, window, None)?
            };
            self.shard_species("ligand", lig_top, lig_frames)?;
            (rec_frames, lig_frames)
        };

        let numframes_nmode = if let Some(nm_window) = cfg.nmoderun.then(|| {
            (
                cfg.nmode.nmstartframe,
                cfg.nmode.nmendframe,
                cfg.nmode.nminterval,
            )
        }) {
            let nm = self.prepare_species(
                "complex_nm",
                complex_prmtop,
                &full_complex,
                Some(nm_window),
                None,
            )?;
            self.shard_species("complex_nm", complex_prmtop, nm)?;
            if !cfg.stability {
                let (rec_top, _) = receptor.expect("checked above");
                let (lig_top, _) = ligand.expect("checked above");
                let full_nm = [self.workdir.join(format!("{pre}complex_nm.{sfx}"))];
                self.prepare_species("receptor_nm", rec_top, &full_nm, None, Some(self.ligand_mask))?;
                self.shard_species("receptor_nm", rec_top, nm)?;
                self.prepare_species("ligand_nm", lig_top, &full_nm, None, Some(self.receptor_mask))?;
                self.shard_species("ligand_nm", lig_top, nm)?;
            }
            nm
        } else {
            0
        };

        if let (Some(mut_top), Some(mask)) = (mutant_complex_prmtop, mutant_mask) {
            self.prepare_species("mutant_complex", mut_top, &full_complex, None, Some(mask))?;
            self.shard_species("mutant_complex", mut_top, numframes)?;
            if !cfg.stability {
                let (rec_top, _) = receptor.expect("checked above");
                let (lig_top, _) = ligand.expect("checked above");
                let full_mut = [self.workdir.join(format!("{pre}mutant_complex.{sfx}"))];
                self.prepare_species(
                    "mutant_receptor",
                    rec_top,
                    &full_mut,
                    None,
                    Some(self.ligand_mask),
                )?;
                self.shard_species("mutant_receptor", rec_top, numframes)?;
                self.prepare_species(
                    "mutant_ligand",
                    lig_top,
                    &full_mut,
                    None,
                    Some(self.receptor_mask),
                )?;
                self.shard_species("mutant_ligand", lig_top, numframes)?;
            }
            if cfg.nmoderun {
                let full_nm = [self.workdir.join(format!("{pre}complex_nm.{sfx}"))];
                self.prepare_species("mutant_complex_nm", mut_top, &full_nm, None, Some(mask))?;
                self.shard_species("mutant_complex_nm", mut_top, numframes_nmode)?;
                if !cfg.stability {
                    let (rec_top, _) = receptor.expect("checked above");
                    let (lig_top, _) = ligand.expect("checked above");
                    let full_mut_nm =
                        [self.workdir.join(format!("{pre}mutant_complex_nm.{sfx}"))];
                    self.prepare_species(
                        "mutant_receptor_nm",
                        rec_top,
                        &full_mut_nm,
                        None,
                        Some(self.ligand_mask),
                    )?;
                    self.shard_species("mutant_receptor_nm", rec_top, numframes_nmode)?;
                    self.prepare_species(
                        "mutant_ligand_nm",
                        lig_top,
                        &full_mut_nm,
                        None,
                        Some(self.receptor_mask),
                    )?;
                    self.shard_species("mutant_ligand_nm", lig_top, numframes_nmode)?;
                }
            }
        }

        Ok(TrajectoryCounts {
            numframes,
            receptor_frames,
            ligand_frames,
            numframes_nmode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_regex_takes_the_last_report() {
        let stdout = "Read 500 frames from disk.\nprocessed 100 frames\n";
        let count = FRAMES_RE
            .captures_iter(stdout)
            .last()
            .and_then(|c| c[1].parse::<usize>().ok())
            .unwrap();
        assert_eq!(count, 100);
    }

    #[test]
    fn mutant_masks_keep_the_backbone() {
        let res = Residue {
            index: 35,
            chain: "A".to_string(),
            number: 35,
            icode: String::new(),
            name: "ARG".to_string(),
            owner: "REC".to_string(),
        };
        let mask = mutant_strip_mask(&res, Mutation::Alanine);
        assert_eq!(mask, ":35&!@N,H,CA,HA,CB,HB1,HB2,HB3,C,O");
        let mask = mutant_strip_mask(&res, Mutation::Glycine);
        assert!(mask.contains("HA1"));
        assert!(!mask.contains("CB"));
    }
}
