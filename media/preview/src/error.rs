/*!
    Preview error types.
*/

use media_demux::EngineError;
use thiserror::Error;

/**
    Errors from building or running a preview renderer.

    Everything except [`PreviewError::Decoder`] concerns a single preview
    image and is not fatal to the stream.
*/
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to create preview decoder: {0}")]
    Decoder(String),
    #[error("failed to decode keyframe: {0}")]
    Decode(String),
    #[error("failed to scale frame: {0}")]
    Scale(String),
    #[error("failed to encode preview: {0}")]
    Encode(#[from] image::ImageError),
    #[error("preview encoder task failed: {0}")]
    Task(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
