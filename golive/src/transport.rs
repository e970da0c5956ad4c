/*!
    The capability interface of the live transport.

    Connection handling, wire packetization and encryption live on the other
    side of these traits.
*/

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use media_types::{CodecId, Packet};
use thiserror::Error;

/**
    Opaque error reported by a transport implementation.
*/
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/**
    RTP packetizer used by the transport for the outgoing video.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VideoPacketizer {
    H264,
    H265,
    Vp8,
    Vp9,
    Av1,
}

impl VideoPacketizer {
    pub fn for_codec(codec: CodecId) -> Option<Self> {
        match codec {
            CodecId::H264 => Some(Self::H264),
            CodecId::H265 => Some(Self::H265),
            CodecId::Vp8 => Some(Self::Vp8),
            CodecId::Vp9 => Some(Self::Vp9),
            CodecId::Av1 => Some(Self::Av1),
            CodecId::Opus => None,
        }
    }
}

/**
    Announced properties of the outgoing video.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoAttributes {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/**
    A media connection carrying one video and one audio track.
*/
#[async_trait]
pub trait MediaChannel: Send + Sync {
    fn set_packetizer(&self, packetizer: VideoPacketizer);

    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError>;

    /// `None` marks video as inactive.
    async fn set_video_attributes(&self, attributes: Option<VideoAttributes>) -> Result<(), TransportError>;

    async fn send_video(&self, packet: &Packet) -> Result<(), TransportError>;

    async fn send_audio(&self, packet: &Packet) -> Result<(), TransportError>;
}

/**
    The live transport session.
*/
#[async_trait]
pub trait Transport: Send + Sync {
    fn has_active_connection(&self) -> bool;

    /// The primary media channel of the active connection.
    fn media_channel(&self) -> Option<Arc<dyn MediaChannel>>;

    /// Open a dedicated stream channel for go-live mode.
    async fn create_stream(&self) -> Result<Arc<dyn MediaChannel>, TransportError>;

    async fn stop_stream(&self);

    /// Toggle video on the primary channel for camera mode.
    async fn signal_video(&self, enabled: bool);

    async fn set_stream_preview(&self, jpeg: Bytes) -> Result<(), TransportError>;
}
