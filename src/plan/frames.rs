//! Frame bookkeeping: which frames are analyzed, how they are sliced
//! across ranks, and how the entropy windows are derived.

use anyhow::Result;
use serde::Serialize;
use std::ops::Range;
use tracing::info;

use crate::error::EndstateError;
use crate::input::RunConfig;

/// An inclusive, strided frame range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameSet {
    pub start: i64,
    pub end: i64,
    pub interval: i64,
    pub count: usize,
}

impl FrameSet {
    pub fn new(start: i64, end: i64, interval: i64) -> FrameSet {
        debug_assert!(start >= 1 && end >= start && interval >= 1);
        FrameSet {
            start,
            end,
            interval,
            count: ((end - start) / interval + 1) as usize,
        }
    }

    /// Shrink (or stretch) to the number of frames the trajectory tool
    /// actually produced, keeping start and stride.
    fn resized(self, count: usize) -> FrameSet {
        FrameSet {
            start: self.start,
            end: self.start + (count as i64 - 1) * self.interval,
            interval: self.interval,
            count,
        }
    }
}

/// How the receptor and ligand frames relate to the complex frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrajectoryProtocol {
    /// Receptor/ligand frames are sliced out of the complex trajectory;
    /// per-frame subtraction is meaningful.
    Single,
    /// Every species has its own trajectory; only mean/stdev comparisons
    /// are meaningful.
    Multiple,
}

/// Frame counts reported back by the trajectory tool after slicing.
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryCounts {
    pub numframes: usize,
    pub receptor_frames: usize,
    pub ligand_frames: usize,
    pub numframes_nmode: usize,
}

/// The reconciled frame plan for one run.
#[derive(Debug, Clone, Serialize)]
pub struct FramePlan {
    pub energy: FrameSet,
    pub nmode: Option<FrameSet>,
    pub protocol: TrajectoryProtocol,
    /// Window sizes (in frames, counted from the end) for the entropy
    /// estimators.
    pub ie_frames: usize,
    pub c2_frames: usize,
}

impl FramePlan {
    /// Reconcile the requested ranges with what the trajectory tool
    /// reports. Diverging partner counts are fatal; a different complex
    /// count than requested is an advisory and the plan adopts it.
    pub fn reconcile(
        cfg: &RunConfig,
        protocol: TrajectoryProtocol,
        counts: TrajectoryCounts,
    ) -> Result<FramePlan> {
        if !cfg.stability
            && (counts.receptor_frames != counts.numframes
                || counts.ligand_frames != counts.numframes)
        {
            return Err(EndstateError::TrajectoryMismatch(format!(
                "the complex, receptor, and ligand trajectories must be the same \
                 length (complex {}, receptor {}, ligand {})",
                counts.numframes, counts.receptor_frames, counts.ligand_frames
            ))
            .into());
        }

        let mut energy = FrameSet::new(
            cfg.general.startframe,
            cfg.general.endframe,
            cfg.general.interval,
        );
        if counts.numframes != energy.count {
            info!(
                "requested {} frames but the trajectory tool produced {}; \
                 adopting the reported count",
                energy.count, counts.numframes
            );
            energy = energy.resized(counts.numframes);
        }

        let nmode = if cfg.nmoderun {
            let mut nm = FrameSet::new(
                cfg.nmode.nmstartframe,
                cfg.nmode.nmendframe,
                cfg.nmode.nminterval,
            );
            if counts.numframes_nmode != nm.count {
                info!(
                    "requested {} nmode frames but the trajectory tool produced {}; \
                     adopting the reported count",
                    nm.count, counts.numframes_nmode
                );
                nm = nm.resized(counts.numframes_nmode);
            }
            Some(nm)
        } else {
            None
        };

        Ok(FramePlan {
            energy,
            nmode,
            protocol,
            ie_frames: segment_frames(counts.numframes, cfg.general.ie_segment),
            c2_frames: segment_frames(counts.numframes, cfg.general.c2_segment),
        })
    }
}

/// `ceil(count * percent / 100)`, the tail window used by IE and C2.
pub fn segment_frames(count: usize, percent: i64) -> usize {
    (count * percent as usize).div_ceil(100)
}

/// The contiguous block of frame indices owned by `rank` out of `ranks`.
/// Every rank computes the same mapping, so the shards tile `0..frames`.
pub fn rank_shard(frames: usize, ranks: usize, rank: usize) -> Range<usize> {
    debug_assert!(rank < ranks);
    (rank * frames / ranks)..((rank + 1) * frames / ranks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ParsedInput, RunConfig};

    fn gb_config(extra: &str) -> RunConfig {
        let text = format!("&general\n{}\n/\n&gb\n/\n", extra);
        let parsed = ParsedInput::from_str(&text).unwrap();
        RunConfig::build(&parsed, false).unwrap()
    }

    #[test]
    fn frame_count_formula() {
        assert_eq!(FrameSet::new(1, 10, 1).count, 10);
        assert_eq!(FrameSet::new(1, 10, 3).count, 4);
        // startframe == endframe with interval 1 yields exactly one frame
        assert_eq!(FrameSet::new(5, 5, 1).count, 1);
    }

    #[test]
    fn segment_window_sizes() {
        assert_eq!(segment_frames(100, 25), 25);
        assert_eq!(segment_frames(100, 100), 100);
        assert_eq!(segment_frames(10, 25), 3);
        assert_eq!(segment_frames(1, 25), 1);
    }

    #[test]
    fn shards_tile_the_frame_range() {
        for frames in [1usize, 7, 16, 100] {
            for ranks in [1usize, 2, 3, 8] {
                let mut covered = 0;
                for rank in 0..ranks {
                    let shard = rank_shard(frames, ranks, rank);
                    assert_eq!(shard.start, covered);
                    covered = shard.end;
                }
                assert_eq!(covered, frames);
            }
        }
    }

    #[test]
    fn partner_count_divergence_is_fatal() {
        let cfg = gb_config("startframe = 1, endframe = 10");
        let counts = TrajectoryCounts {
            numframes: 10,
            receptor_frames: 9,
            ligand_frames: 10,
            numframes_nmode: 0,
        };
        let err = FramePlan::reconcile(&cfg, TrajectoryProtocol::Single, counts).unwrap_err();
        assert!(err.to_string().contains("same length"), "{err}");
    }

    #[test]
    fn reported_count_overrides_request() {
        let cfg = gb_config("startframe = 1, endframe = 9999999");
        let counts = TrajectoryCounts {
            numframes: 42,
            receptor_frames: 42,
            ligand_frames: 42,
            numframes_nmode: 0,
        };
        let plan = FramePlan::reconcile(&cfg, TrajectoryProtocol::Single, counts).unwrap();
        assert_eq!(plan.energy.count, 42);
        assert_eq!(plan.energy.end, 42);
        assert_eq!(plan.ie_frames, 11); // ceil(42 * 25 / 100)
    }

    #[test]
    fn stability_skips_partner_checks() {
        let parsed = ParsedInput::from_str("&gb\n/\n").unwrap();
        let cfg = RunConfig::build(&parsed, true).unwrap();
        let counts = TrajectoryCounts {
            numframes: 5,
            receptor_frames: 0,
            ligand_frames: 0,
            numframes_nmode: 0,
        };
        assert!(FramePlan::reconcile(&cfg, TrajectoryProtocol::Single, counts).is_ok());
    }
}
