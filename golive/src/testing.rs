/*!
    In-memory transport for tests.
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use media_types::{MediaKind, Packet};
use parking_lot::Mutex;

use crate::transport::{MediaChannel, Transport, TransportError, VideoAttributes, VideoPacketizer};

type EventLog = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
pub(crate) struct FakeChannel {
    events: EventLog,
    packetizer: Mutex<Option<VideoPacketizer>>,
    sent: Mutex<Vec<(MediaKind, Packet)>>,
    attributes: Mutex<Option<VideoAttributes>>,
    fail_speaking: AtomicBool,
}

impl FakeChannel {
    pub(crate) fn packetizer(&self) -> Option<VideoPacketizer> {
        *self.packetizer.lock()
    }

    pub(crate) fn attributes(&self) -> Option<VideoAttributes> {
        *self.attributes.lock()
    }

    pub(crate) fn sent(&self) -> Vec<(MediaKind, Packet)> {
        self.sent.lock().clone()
    }

    pub(crate) fn sent_count(&self, kind: MediaKind) -> usize {
        self.sent.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    pub(crate) fn fail_speaking(&self) {
        self.fail_speaking.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl MediaChannel for FakeChannel {
    fn set_packetizer(&self, packetizer: VideoPacketizer) {
        *self.packetizer.lock() = Some(packetizer);
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError> {
        if speaking && self.fail_speaking.load(Ordering::Relaxed) {
            return Err(TransportError::new("speaking rejected"));
        }
        self.events.lock().push(format!("speaking({speaking})"));
        Ok(())
    }

    async fn set_video_attributes(&self, attributes: Option<VideoAttributes>) -> Result<(), TransportError> {
        let event = match attributes {
            Some(a) => format!("attributes({}x{}@{})", a.width, a.height, a.fps),
            None => "attributes(off)".to_owned(),
        };
        self.events.lock().push(event);
        *self.attributes.lock() = attributes;
        Ok(())
    }

    async fn send_video(&self, packet: &Packet) -> Result<(), TransportError> {
        self.sent.lock().push((MediaKind::Video, packet.clone()));
        Ok(())
    }

    async fn send_audio(&self, packet: &Packet) -> Result<(), TransportError> {
        self.sent.lock().push((MediaKind::Audio, packet.clone()));
        Ok(())
    }
}

pub(crate) struct FakeTransport {
    connected: AtomicBool,
    events: EventLog,
    channel: Arc<FakeChannel>,
    previews: Mutex<Vec<Bytes>>,
    setup_delay: Option<Duration>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        let events = EventLog::default();
        Self {
            connected: AtomicBool::new(true),
            channel: Arc::new(FakeChannel {
                events: Arc::clone(&events),
                ..FakeChannel::default()
            }),
            events,
            previews: Mutex::default(),
            setup_delay: None,
        }
    }

    /**
        Make `create_stream` and `signal_video` take `delay` after recording
        the call.
    */
    pub(crate) fn with_setup_delay(mut self, delay: Duration) -> Self {
        self.setup_delay = Some(delay);
        self
    }

    async fn setup_pause(&self) {
        if let Some(delay) = self.setup_delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub(crate) fn disconnected() -> Self {
        let transport = Self::new();
        transport.connected.store(false, Ordering::Relaxed);
        transport
    }

    pub(crate) fn channel(&self) -> &Arc<FakeChannel> {
        &self.channel
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub(crate) fn previews(&self) -> usize {
        self.previews.lock().len()
    }

    /// JPEG images passed to `set_stream_preview`, oldest first.
    pub(crate) fn preview_images(&self) -> Vec<Bytes> {
        self.previews.lock().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn has_active_connection(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn media_channel(&self) -> Option<Arc<dyn MediaChannel>> {
        Some(self.channel.clone())
    }

    async fn create_stream(&self) -> Result<Arc<dyn MediaChannel>, TransportError> {
        self.events.lock().push("create_stream".to_owned());
        self.setup_pause().await;
        Ok(self.channel.clone())
    }

    async fn stop_stream(&self) {
        self.events.lock().push("stop_stream".to_owned());
    }

    async fn signal_video(&self, enabled: bool) {
        self.events.lock().push(format!("signal_video({enabled})"));
        if enabled {
            self.setup_pause().await;
        }
    }

    async fn set_stream_preview(&self, jpeg: Bytes) -> Result<(), TransportError> {
        self.previews.lock().push(jpeg);
        Ok(())
    }
}
