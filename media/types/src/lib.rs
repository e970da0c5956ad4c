/*!
    Shared types for the golive media crates.

    This crate defines the vocabulary that crosses crate boundaries: timestamps,
    codec identifiers, packets and stream descriptors. It also carries the pure
    Annex-B bitstream helpers. It has no dependency on FFmpeg, so transport
    implementations can depend on it without pulling in native bindings.
*/

mod codec;
mod packet;
mod stream;
mod time;

pub mod nal;

pub use codec::{CodecId, MediaKind};
pub use packet::Packet;
pub use stream::{AudioStreamInfo, VideoStreamInfo};
pub use time::Rational;
