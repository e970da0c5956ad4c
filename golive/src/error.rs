/*!
    Playback error types.
*/

use media_demux::DemuxError;
use thiserror::Error;

use crate::transport::TransportError;

/**
    Errors from [`crate::play`].

    Setup errors are returned before any writer task starts, and everything
    acquired up to that point has been released.
*/
#[derive(Debug, Error)]
pub enum PlayError {
    #[error("transport has no active connection")]
    NoActiveTransport,
    #[error("no video stream in media")]
    NoVideoStream,
    #[error(transparent)]
    Demux(#[from] DemuxError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("playback cancelled: {reason}")]
    Cancelled { reason: String },
    #[error("video stream failed: {0}")]
    StreamFailed(String),
}
