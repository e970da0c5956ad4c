/*!
    Live delivery of a media byte stream.

    [`play`] demuxes a container, hands the video and audio packet sequences
    to paced writer tasks, keeps video aligned to audio, and optionally feeds
    JPEG previews of keyframes to the transport. Everything acquired on the
    transport is released through a [`ResourceGuard`] exactly once, whether
    the stream completes, fails or is cancelled.
*/

mod cancel;
mod clock;
mod error;
mod guard;
mod options;
mod play;
mod preview;
mod sync;
mod transport;
mod writer;

#[cfg(test)]
mod testing;

pub use cancel::CancelSignal;
pub use error::PlayError;
pub use guard::ResourceGuard;
pub use options::{DeriveFn, Dimension, PlayOptions, PlaySettings, StreamMode};
pub use play::{play, play_demuxed};
pub use preview::FrameRenderer;
pub use sync::SyncState;
pub use transport::{MediaChannel, Transport, TransportError, VideoAttributes, VideoPacketizer};

pub use media_demux::{ContainerFormat, DemuxConfig, DemuxError, Demuxed};
pub use media_preview::PreviewConfig;
