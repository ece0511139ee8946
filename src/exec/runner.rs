//! The parallel executor: a pool of ranks walking the calculation plan.
//!
//! Every rank executes every frame-sharded step against its own shard
//! (the rank id is substituted into the trajectory and output templates),
//! master-only steps run on rank 0, and a barrier closes each phase.
//! Within a rank, execution is strictly sequential: one external process
//! at a time, synchronous wait. Any nonzero child exit raises the group
//! abort; all intermediate files are retained for post-mortem debugging.

use anyhow::Result;
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use tracing::{error, info};

use crate::error::EndstateError;
use crate::exec::comm::{Comm, CommShared, SingleRank};
use crate::exec::timer::Timers;
use crate::plan::builder::{CalcStep, Phase, PlannedStep, SolverStep, RANK_TOKEN};

fn phase_timer_label(phase: Phase) -> Option<(&'static str, &'static str)> {
    match phase {
        Phase::Setup => None,
        Phase::Gb => Some(("gb", "Total GB calculation time:")),
        Phase::Pb => Some(("pb", "Total PB calculation time:")),
        Phase::Rism => Some(("rism", "Total 3D-RISM calculation time:")),
        Phase::Nmode => Some(("nmode", "Total normal mode calculation time:")),
        Phase::Qh => Some(("qh", "Total quasi-harmonic calculation time:")),
    }
}

fn sub_rank(template: &str, rank: usize) -> String {
    template.replace(RANK_TOKEN, &rank.to_string())
}

/// Run the whole plan across `ranks` ranks inside `workdir`. Returns the
/// master's phase timers on success.
pub fn run_plan(steps: &[PlannedStep], ranks: usize, workdir: &Path) -> Result<Timers> {
    if ranks <= 1 {
        let comm = SingleRank::new();
        let timers = run_rank(steps, &comm, workdir);
        return finish(&comm, timers);
    }

    let shared = CommShared::new(ranks);
    let mut master_timers = Timers::new();
    thread::scope(|scope| {
        let mut workers = Vec::new();
        for rank in 1..ranks {
            let comm = shared.for_rank(rank);
            workers.push(scope.spawn(move || run_rank(steps, &comm, workdir)));
        }
        let comm = shared.for_rank(0);
        master_timers = run_rank(steps, &comm, workdir);
        for worker in workers {
            match worker.join() {
                Ok(worker_timers) => master_timers.merge_max(&worker_timers),
                Err(_) => comm.abort("a rank thread panicked".to_string()),
            }
        }
    });
    finish(&shared.for_rank(0), master_timers)
}

fn finish<C: Comm>(comm: &C, timers: Timers) -> Result<Timers> {
    match comm.abort_reason() {
        Some(reason) => {
            error!("exiting; all intermediate files have been retained");
            Err(EndstateError::SolverFailure {
                prog: "calculation".to_string(),
                status: "aborted".to_string(),
                output: reason,
            }
            .into())
        }
        None => Ok(timers),
    }
}

/// One rank's walk over the plan. Failures flip the shared abort flag;
/// the rank keeps reaching the phase barriers so nobody deadlocks.
fn run_rank<C: Comm>(steps: &[PlannedStep], comm: &C, workdir: &Path) -> Timers {
    let rank = comm.rank();
    let master = rank == 0;
    let mut timers = Timers::new();

    for phase in Phase::ORDER {
        let phase_steps: Vec<&PlannedStep> =
            steps.iter().filter(|s| s.phase == phase).collect();
        if phase_steps.is_empty() {
            continue;
        }
        let timer_key = phase_timer_label(phase);
        if master {
            if let Some((key, desc)) = timer_key {
                timers.add(key, desc);
                timers.start(key);
            }
        }

        for planned in phase_steps {
            if comm.aborted() {
                break;
            }
            if master {
                if let Some(msg) = &planned.message {
                    info!("{}", msg);
                }
            }
            let outcome = match &planned.step {
                CalcStep::Progress => Ok(()),
                CalcStep::Copy { source, dest } => copy_step(source, dest, rank, workdir),
                CalcStep::Solver(step) => {
                    if step.master_only && !master {
                        Ok(())
                    } else {
                        solver_step(step, rank, workdir)
                    }
                }
            };
            if let Err(e) = outcome {
                if comm.size() > 1 {
                    error!("error occurred on rank {}: {:#}", rank, e);
                } else {
                    error!("{:#}", e);
                }
                comm.abort(format!("{:#}", e));
            }
        }

        comm.barrier();
        if master {
            if let Some((key, _)) = timer_key {
                timers.stop(key);
            }
        }
    }
    timers
}

fn copy_step(source: &str, dest: &str, rank: usize, workdir: &Path) -> Result<()> {
    let source = workdir.join(sub_rank(source, rank));
    let dest = workdir.join(sub_rank(dest, rank));
    std::fs::copy(&source, &dest).map_err(|e| {
        anyhow::anyhow!(
            "could not copy {} to {}: {}",
            source.display(),
            dest.display(),
            e
        )
    })?;
    Ok(())
}

fn solver_step(step: &SolverStep, rank: usize, workdir: &Path) -> Result<()> {
    if let Some((deck_path, content)) = &step.deck {
        let path = workdir.join(sub_rank(deck_path, rank));
        std::fs::write(&path, sub_rank(content, rank))
            .map_err(|e| anyhow::anyhow!("could not write {}: {}", path.display(), e))?;
    }

    let mut cmd = Command::new(&step.program);
    cmd.current_dir(workdir);
    for arg in &step.args {
        cmd.arg(sub_rank(arg, rank));
    }

    let output_path = workdir.join(sub_rank(&step.output, rank));
    if step.stdout_to_output {
        let out_file = File::create(&output_path).map_err(|e| {
            anyhow::anyhow!("could not create {}: {}", output_path.display(), e)
        })?;
        cmd.stdout(Stdio::from(out_file));
    } else {
        cmd.stdout(Stdio::null());
    }

    let prog = step.program.display().to_string();
    let child = cmd
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| anyhow::anyhow!("failed to launch {}: {}", prog, e))?;
    if !child.status.success() {
        let stderr_tail: String = String::from_utf8_lossy(&child.stderr)
            .lines()
            .rev()
            .take(5)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");
        return Err(EndstateError::SolverFailure {
            prog,
            status: child.status.to_string(),
            output: if stderr_tail.is_empty() {
                output_path.display().to_string()
            } else {
                stderr_tail
            },
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::builder::StepKind;
    use std::path::PathBuf;

    fn progress(phase: Phase, msg: &str) -> PlannedStep {
        PlannedStep {
            phase,
            message: Some(msg.to_string()),
            step: CalcStep::Progress,
        }
    }

    fn copy(phase: Phase, source: &str, dest: &str) -> PlannedStep {
        PlannedStep {
            phase,
            message: None,
            step: CalcStep::Copy {
                source: source.to_string(),
                dest: dest.to_string(),
            },
        }
    }

    #[test]
    fn copy_steps_duplicate_every_rank_shard() {
        let dir = tempfile::tempdir().unwrap();
        for rank in 0..2 {
            std::fs::write(dir.path().join(format!("receptor_gb.mdout.{rank}")), "x").unwrap();
        }
        let steps = vec![
            progress(Phase::Setup, "Running calculations on normal system..."),
            copy(
                Phase::Gb,
                "receptor_gb.mdout.%d",
                "mutant_receptor_gb.mdout.%d",
            ),
        ];
        run_plan(&steps, 2, dir.path()).unwrap();
        for rank in 0..2 {
            assert!(dir
                .path()
                .join(format!("mutant_receptor_gb.mdout.{rank}"))
                .exists());
        }
    }

    #[test]
    fn missing_copy_source_aborts_the_group() {
        let dir = tempfile::tempdir().unwrap();
        let steps = vec![copy(Phase::Gb, "not_there.%d", "dest.%d")];
        let err = run_plan(&steps, 1, dir.path()).unwrap_err();
        assert!(err.to_string().contains("aborted"), "{err}");
    }

    #[test]
    fn failing_solver_aborts_with_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let steps = vec![PlannedStep {
            phase: Phase::Gb,
            message: None,
            step: CalcStep::Solver(SolverStep {
                kind: StepKind::Energy,
                program: PathBuf::from("false"),
                args: vec![],
                output: "out.%d".to_string(),
                stdout_to_output: false,
                master_only: false,
                deck: None,
            }),
        }];
        assert!(run_plan(&steps, 1, dir.path()).is_err());
    }

    #[test]
    fn stdout_redirection_captures_solver_output() {
        let dir = tempfile::tempdir().unwrap();
        let steps = vec![PlannedStep {
            phase: Phase::Rism,
            message: None,
            step: CalcStep::Solver(SolverStep {
                kind: StepKind::Rism,
                program: PathBuf::from("echo"),
                args: vec!["rism record rank %d".to_string()],
                output: "rism.mdout.%d".to_string(),
                stdout_to_output: true,
                master_only: false,
                deck: None,
            }),
        }];
        run_plan(&steps, 1, dir.path()).unwrap();
        let text = std::fs::read_to_string(dir.path().join("rism.mdout.0")).unwrap();
        assert_eq!(text.trim(), "rism record rank 0");
    }

    #[test]
    fn per_rank_decks_are_materialized() {
        let dir = tempfile::tempdir().unwrap();
        let steps = vec![PlannedStep {
            phase: Phase::Gb,
            message: None,
            step: CalcStep::Solver(SolverStep {
                kind: StepKind::Sa,
                program: PathBuf::from("true"),
                args: vec!["-i".to_string(), "surf.in.%d".to_string()],
                output: "surf.dat.%d".to_string(),
                stdout_to_output: false,
                master_only: false,
                deck: Some((
                    "surf.in.%d".to_string(),
                    "trajin complex.mdcrd.%d\ngo\n".to_string(),
                )),
            }),
        }];
        run_plan(&steps, 2, dir.path()).unwrap();
        let script = std::fs::read_to_string(dir.path().join("surf.in.1")).unwrap();
        assert!(script.contains("complex.mdcrd.1"));
    }
}
