/*!
    Writer tasks that forward packets to the transport in real time.
*/

use std::sync::Arc;
use std::time::Duration;

use media_demux::{PacketReceiver, StreamEnd};
use media_types::{MediaKind, Packet};
use tokio::time::{Instant, sleep};
use tracing::{debug, trace, warn};

use crate::clock::{Pacer, StreamClock};
use crate::preview::PreviewTap;
use crate::sync::SyncState;
use crate::transport::MediaChannel;

/// Frame time of audio packets without a duration.
pub(crate) const AUDIO_FRAME: Duration = Duration::from_millis(20);

const SYNC_POLL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
pub(crate) struct WriterReport {
    pub(crate) sent: usize,
    pub(crate) failed: usize,
    pub(crate) end: Option<StreamEnd>,
}

pub(crate) struct PacedWriter {
    kind: MediaKind,
    packets: PacketReceiver,
    channel: Arc<dyn MediaChannel>,
    frame_period: Duration,
    clock: Arc<StreamClock>,
    sync: Arc<SyncState>,
    master: Option<Arc<StreamClock>>,
    tolerance: Duration,
    tap: Option<PreviewTap>,
}

impl PacedWriter {
    pub(crate) fn new(
        kind: MediaKind,
        packets: PacketReceiver,
        channel: Arc<dyn MediaChannel>,
        frame_period: Duration,
        sync: Arc<SyncState>,
    ) -> Self {
        Self {
            kind,
            packets,
            channel,
            frame_period,
            clock: Arc::new(StreamClock::default()),
            sync,
            master: None,
            tolerance: Duration::ZERO,
            tap: None,
        }
    }

    /**
        Keep this writer within `tolerance` of `master` while synchronized.
    */
    pub(crate) fn sync_to(mut self, master: Arc<StreamClock>, tolerance: Duration) -> Self {
        self.master = Some(master);
        self.tolerance = tolerance;
        self
    }

    pub(crate) fn with_preview(mut self, tap: Option<PreviewTap>) -> Self {
        self.tap = tap;
        self
    }

    pub(crate) fn clock(&self) -> Arc<StreamClock> {
        Arc::clone(&self.clock)
    }

    pub(crate) async fn run(mut self) -> WriterReport {
        let mut pacer = Pacer::default();
        let mut report = WriterReport::default();
        let mut next_pts = Duration::ZERO;

        while let Some(packet) = self.packets.recv().await {
            let pts = packet.presentation_time().unwrap_or(next_pts);
            let frame_time = packet.duration_time().unwrap_or(self.frame_period);
            next_pts = pts + frame_time;

            if self.kind == MediaKind::Video {
                self.sync.observe(pts);
                if let Some(tap) = &self.tap {
                    tap.offer(&packet);
                }
                self.wait_for_master(pts).await;
            }

            let started = Instant::now();
            match self.send(&packet).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(kind = %self.kind, error = %e, "failed to send packet");
                }
            }
            let send_time = started.elapsed();
            if send_time > frame_time {
                debug!(
                    kind = %self.kind,
                    send_ms = send_time.as_millis() as u64,
                    frame_ms = frame_time.as_millis() as u64,
                    "sending took longer than a frame"
                );
            }
            self.clock.advance(pts);
            trace!(kind = %self.kind, pts_ms = pts.as_millis() as u64, size = packet.len(), "sent packet");

            if self.sync.is_paced() {
                let delay = pacer.delay(pts, frame_time, Instant::now());
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            } else {
                pacer.reset();
            }
        }

        self.clock.finish();
        report.end = self.packets.end();
        debug!(kind = %self.kind, sent = report.sent, failed = report.failed, end = ?report.end, "writer finished");
        report
    }

    async fn send(&self, packet: &Packet) -> Result<(), crate::TransportError> {
        match self.kind {
            MediaKind::Video => self.channel.send_video(packet).await,
            MediaKind::Audio => self.channel.send_audio(packet).await,
        }
    }

    async fn wait_for_master(&self, pts: Duration) {
        let Some(master) = &self.master else {
            return;
        };
        while self.sync.is_synced()
            && !master.is_finished()
            && pts.saturating_sub(master.position()) > self.tolerance
        {
            sleep(SYNC_POLL).await;
        }
    }
}
