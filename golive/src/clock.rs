/*!
    Stream positions and real-time pacing for the writer tasks.
*/

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

const UNSET: u64 = u64::MAX;

/**
    Presentation position of one writer, readable by the other.
*/
#[derive(Debug)]
pub(crate) struct StreamClock {
    position_us: AtomicU64,
    finished: AtomicBool,
}

impl Default for StreamClock {
    fn default() -> Self {
        Self {
            position_us: AtomicU64::new(UNSET),
            finished: AtomicBool::new(false),
        }
    }
}

impl StreamClock {
    /// Timestamp of the last packet sent, or zero before the first one.
    pub(crate) fn position(&self) -> Duration {
        match self.position_us.load(Ordering::Acquire) {
            UNSET => Duration::ZERO,
            us => Duration::from_micros(us),
        }
    }

    pub(crate) fn advance(&self, pts: Duration) {
        let us = u64::try_from(pts.as_micros()).unwrap_or(UNSET - 1);
        self.position_us.store(us, Ordering::Release);
    }

    pub(crate) fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/**
    Keeps a writer at real-time pace.

    The reference point is the first packet sent while pacing is on.
*/
#[derive(Debug, Default)]
pub(crate) struct Pacer {
    start: Option<(Instant, Duration)>,
}

impl Pacer {
    /**
        How long to wait after sending the packet at `pts` lasting
        `frame_time`, measured at `now`.
    */
    pub(crate) fn delay(&mut self, pts: Duration, frame_time: Duration, now: Instant) -> Duration {
        let (start, start_pts) = *self.start.get_or_insert((now, pts));
        let target = pts.saturating_sub(start_pts) + frame_time;
        target.saturating_sub(now.duration_since(start))
    }

    pub(crate) fn reset(&mut self) {
        self.start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn clock_tracks_the_last_position() {
        let clock = StreamClock::default();
        assert_eq!(clock.position(), Duration::ZERO);
        clock.advance(120 * MS);
        assert_eq!(clock.position(), 120 * MS);
        assert!(!clock.is_finished());
        clock.finish();
        assert!(clock.is_finished());
    }

    #[test]
    fn pacer_targets_real_time() {
        let mut pacer = Pacer::default();
        let t0 = Instant::now();
        // First packet starts the timeline at pts 1s.
        assert_eq!(pacer.delay(1000 * MS, 40 * MS, t0), 40 * MS);
        // Second packet sent 30ms later.
        assert_eq!(pacer.delay(1040 * MS, 40 * MS, t0 + 30 * MS), 50 * MS);
        // Far behind schedule.
        assert_eq!(pacer.delay(1080 * MS, 40 * MS, t0 + 500 * MS), Duration::ZERO);
    }

    #[test]
    fn reset_restarts_the_timeline() {
        let mut pacer = Pacer::default();
        let t0 = Instant::now();
        pacer.delay(0 * MS, 20 * MS, t0);
        pacer.reset();
        assert_eq!(pacer.delay(5000 * MS, 20 * MS, t0 + 10 * MS), 20 * MS);
    }
}
