/*!
    Keyframe previews pushed to the transport next to the live stream.

    The video writer drops keyframes into a single-slot watch channel. The
    preview task renders whatever is in the slot, so keyframes arriving
    during a render collapse into one more run with the newest of them.
*/

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use media_preview::{PreviewError, PreviewRenderer};
use media_types::Packet;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::transport::Transport;

/**
    Turns a keyframe into a still image.
*/
#[async_trait]
pub trait FrameRenderer: Send + Sync {
    async fn render(&self, packet: &Packet) -> Result<Option<Bytes>, PreviewError>;

    async fn close(&self);
}

#[async_trait]
impl FrameRenderer for PreviewRenderer {
    async fn render(&self, packet: &Packet) -> Result<Option<Bytes>, PreviewError> {
        PreviewRenderer::render(self, packet).await
    }

    async fn close(&self) {
        if let Err(e) = PreviewRenderer::close(self).await {
            warn!(error = %e, "failed to release preview decoder");
        }
    }
}

/**
    Writer side of the preview pipeline.
*/
#[derive(Clone)]
pub(crate) struct PreviewTap {
    slot: Arc<watch::Sender<Option<Packet>>>,
}

impl PreviewTap {
    pub(crate) fn offer(&self, packet: &Packet) {
        if packet.is_keyframe && self.slot.receiver_count() > 0 {
            self.slot.send_replace(Some(packet.clone()));
        }
    }
}

/**
    Spawn the preview task. It runs until the tap is dropped or the task is
    aborted.
*/
pub(crate) fn spawn_preview(
    renderer: Arc<dyn FrameRenderer>,
    transport: Arc<dyn Transport>,
) -> (PreviewTap, JoinHandle<()>) {
    let (slot, mut rx) = watch::channel(None::<Packet>);
    let task = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let Some(packet) = rx.borrow_and_update().clone() else {
                continue;
            };
            match renderer.render(&packet).await {
                Ok(Some(jpeg)) => {
                    trace!(bytes = jpeg.len(), pts = ?packet.pts, "preview rendered");
                    if let Err(e) = transport.set_stream_preview(jpeg).await {
                        warn!(error = %e, "failed to update stream preview");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "failed to render stream preview"),
            }
        }
        debug!("preview task finished");
    });
    (
        PreviewTap {
            slot: Arc::new(slot),
        },
        task,
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use media_types::Rational;
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use super::*;
    use crate::testing::FakeTransport;

    /// Blocks every render until released, recording the pts it saw.
    #[derive(Default)]
    struct GatedRenderer {
        seen: Mutex<Vec<i64>>,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl FrameRenderer for GatedRenderer {
        async fn render(&self, packet: &Packet) -> Result<Option<Bytes>, PreviewError> {
            self.seen.lock().push(packet.pts.unwrap_or(-1));
            self.started.notify_one();
            self.release.notified().await;
            if packet.pts == Some(99) {
                return Err(PreviewError::Decode("bad frame".into()));
            }
            Ok(Some(Bytes::from_static(b"jpeg")))
        }

        async fn close(&self) {}
    }

    fn keyframe(pts: i64, keyframe: bool) -> Packet {
        Packet::new(vec![0u8; 8], Rational::new(1, 1000))
            .with_pts(pts)
            .with_keyframe(keyframe)
    }

    #[tokio::test]
    async fn coalesces_keyframes_during_a_render() {
        let renderer = Arc::new(GatedRenderer::default());
        let transport = Arc::new(FakeTransport::new());
        let (tap, task) = spawn_preview(renderer.clone(), transport.clone());

        tap.offer(&keyframe(0, true));
        renderer.started.notified().await;

        // Arrive while the first render is in flight.
        for pts in 1..=5 {
            tap.offer(&keyframe(pts * 40, true));
            tap.offer(&keyframe(pts * 40 + 20, false));
        }
        renderer.release.notify_one();
        renderer.started.notified().await;
        renderer.release.notify_one();

        drop(tap);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(*renderer.seen.lock(), [0, 200]);
        assert_eq!(transport.previews(), 2);
    }

    #[tokio::test]
    async fn render_failures_are_skipped() {
        let renderer = Arc::new(GatedRenderer::default());
        let transport = Arc::new(FakeTransport::new());
        let (tap, task) = spawn_preview(renderer.clone(), transport.clone());

        tap.offer(&keyframe(99, true));
        renderer.started.notified().await;
        renderer.release.notify_one();
        tokio::task::yield_now().await;

        tap.offer(&keyframe(120, true));
        renderer.started.notified().await;
        renderer.release.notify_one();

        drop(tap);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*renderer.seen.lock(), [99, 120]);
        assert_eq!(transport.previews(), 1);
    }
}
