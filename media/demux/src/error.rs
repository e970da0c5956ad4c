/*!
    Demuxer error types.
*/

use media_types::MediaKind;
use thiserror::Error;

/**
    Errors from the native engine actor.
*/
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("media engine is not running")]
    Stopped,
    #[error("media engine job panicked: {0}")]
    Panicked(String),
}

/**
    Errors raised while setting up a demuxer.

    Every variant is returned only after the resources acquired so far have
    been released.
*/
#[derive(Debug, Error)]
pub enum DemuxError {
    #[error("{kind} codec {codec} is not allowed")]
    UnsupportedCodec { kind: MediaKind, codec: String },
    #[error("failed to construct bitstream filter chain {filter}: {reason}")]
    FilterConstruction { filter: String, reason: String },
    #[error("failed to open container: {0}")]
    Open(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
