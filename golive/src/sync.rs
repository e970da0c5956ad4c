/*!
    Burst and synchronization state shared by the writer tasks.
*/

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::info;

/**
    Whether the writers pace packets in real time and whether video waits for
    audio.

    With an initial burst, both start off: packets go out as fast as the
    transport takes them until the video position reaches the burst
    duration. That transition happens once per session.
*/
#[derive(Debug)]
pub struct SyncState {
    paced: AtomicBool,
    synced: AtomicBool,
    burst: Option<Duration>,
    transitions: AtomicUsize,
}

impl SyncState {
    pub fn new(burst: Option<Duration>) -> Self {
        let burst = burst.filter(|b| !b.is_zero());
        let steady = burst.is_none();
        Self {
            paced: AtomicBool::new(steady),
            synced: AtomicBool::new(steady),
            burst,
            transitions: AtomicUsize::new(0),
        }
    }

    pub fn is_paced(&self) -> bool {
        self.paced.load(Ordering::Acquire)
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Number of times the burst ended. Zero or one.
    pub fn transitions(&self) -> usize {
        self.transitions.load(Ordering::Acquire)
    }

    /**
        Feed the video position. Returns `true` for the call that ended the
        burst.
    */
    pub fn observe(&self, pts: Duration) -> bool {
        let Some(burst) = self.burst else {
            return false;
        };
        if pts < burst {
            return false;
        }
        if self
            .paced
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.synced.store(true, Ordering::Release);
        self.transitions.fetch_add(1, Ordering::AcqRel);
        info!(burst_ms = burst.as_millis() as u64, "initial burst done, pacing enabled");
        true
    }
}
