//! The small communicator the executor runs on.
//!
//! Ranks share a barrier and an abort flag. A rank that hits a failure
//! raises the abort; every rank keeps participating in barriers (so
//! nobody deadlocks) but stops launching work, and the driver reports the
//! recorded reason once the pool drains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};

pub trait Comm: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    fn abort(&self, reason: String);
    fn aborted(&self) -> bool;
    fn abort_reason(&self) -> Option<String>;
}

/// The degenerate single-rank communicator used by `--ranks 1` and tests.
#[derive(Default)]
pub struct SingleRank {
    aborted: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl SingleRank {
    pub fn new() -> SingleRank {
        SingleRank::default()
    }
}

impl Comm for SingleRank {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
    fn abort(&self, reason: String) {
        let mut slot = self.reason.lock().expect("abort reason lock");
        if slot.is_none() {
            *slot = Some(reason);
        }
        self.aborted.store(true, Ordering::SeqCst);
    }
    fn aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
    fn abort_reason(&self) -> Option<String> {
        self.reason.lock().expect("abort reason lock").clone()
    }
}

#[derive(Debug)]
pub struct CommShared {
    size: usize,
    barrier: Barrier,
    aborted: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl CommShared {
    pub fn new(size: usize) -> Arc<CommShared> {
        Arc::new(CommShared {
            size,
            barrier: Barrier::new(size),
            aborted: AtomicBool::new(false),
            reason: Mutex::new(None),
        })
    }

    pub fn for_rank(self: &Arc<Self>, rank: usize) -> RankComm {
        debug_assert!(rank < self.size);
        RankComm {
            rank,
            shared: Arc::clone(self),
        }
    }
}

/// One rank's handle on the shared pool state.
pub struct RankComm {
    rank: usize,
    shared: Arc<CommShared>,
}

impl Comm for RankComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn abort(&self, reason: String) {
        // first writer wins; later failures are consequences
        let mut slot = self.shared.reason.lock().expect("abort reason lock");
        if slot.is_none() {
            *slot = Some(reason);
        }
        self.shared.aborted.store(true, Ordering::SeqCst);
    }

    fn aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }

    fn abort_reason(&self) -> Option<String> {
        self.shared.reason.lock().expect("abort reason lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn abort_is_visible_to_every_rank() {
        let shared = CommShared::new(3);
        let comms: Vec<RankComm> = (0..3).map(|r| shared.for_rank(r)).collect();
        comms[1].abort("rank 1 lost its solver".to_string());
        comms[1].abort("a later echo".to_string());
        for c in &comms {
            assert!(c.aborted());
            assert_eq!(
                c.abort_reason().as_deref(),
                Some("rank 1 lost its solver")
            );
        }
    }

    #[test]
    fn barrier_synchronizes_ranks() {
        let shared = CommShared::new(4);
        thread::scope(|scope| {
            for rank in 0..4 {
                let comm = shared.for_rank(rank);
                scope.spawn(move || {
                    for _ in 0..3 {
                        comm.barrier();
                    }
                });
            }
        });
    }
}
