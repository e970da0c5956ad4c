/*!
    Container demuxing for live delivery.

    [`demux`] binds an async byte stream to the native container parser, checks
    the codecs of the first video and audio streams against the allow-list,
    reframes video to Annex-B and hands out two bounded packet channels. All
    native work is serialized through the process-wide [`Engine`].
*/

mod bsf;
mod channel;
mod codec_config;
mod container;
mod convert;
mod demux;
mod engine;
mod error;
mod input;
mod pump;

pub mod opus;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use channel::{Offer, PacketReceiver, PacketSender, StreamEnd, packet_channel};
pub use codec_config::CodecConfig;
pub use demux::{AudioTrack, ContainerFormat, DemuxConfig, Demuxed, VideoTrack, demux};
pub use engine::{Engine, EngineCell, LiveResource, engine, live_native_resources};
pub use error::{DemuxError, EngineError};
