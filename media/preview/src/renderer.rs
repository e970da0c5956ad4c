/*!
    Async front for keyframe previews.
*/

use bytes::Bytes;
use media_demux::{CodecConfig, EngineCell, engine};
use media_types::Packet;
use tracing::{debug, warn};

use crate::config::PreviewConfig;
use crate::decoder::KeyframeDecoder;
use crate::encode::encode_jpeg;
use crate::error::PreviewError;

/**
    Turns video keyframes into JPEG previews.

    Decoding happens on the media engine thread, JPEG compression on the
    blocking pool. Previews are independent of each other, so a failed one
    does not affect the next.
*/
pub struct PreviewRenderer {
    decoder: EngineCell<KeyframeDecoder>,
    config: PreviewConfig,
}

impl PreviewRenderer {
    pub async fn new(codec_config: &CodecConfig, config: PreviewConfig) -> Result<Self, PreviewError> {
        let codec_config = codec_config.clone();
        let decoder = engine()
            .submit(move || KeyframeDecoder::new(&codec_config, config))
            .await??;
        debug!(
            width = config.max_width,
            height = config.max_height,
            quality = config.quality,
            "created preview renderer"
        );
        Ok(Self {
            decoder: EngineCell::new(decoder),
            config,
        })
    }

    pub fn config(&self) -> PreviewConfig {
        self.config
    }

    /**
        Render a preview for `packet`.

        Non-keyframes, closed renderers and keyframes the decoder could not
        turn into a picture all yield `Ok(None)`.
    */
    pub async fn render(&self, packet: &Packet) -> Result<Option<Bytes>, PreviewError> {
        if !packet.is_keyframe {
            return Ok(None);
        }

        let packet = packet.clone();
        let image = match self.decoder.with(move |d| d.decode(&packet)).await? {
            Some(result) => result?,
            None => return Ok(None),
        };
        let Some(image) = image else {
            warn!("keyframe produced no picture");
            return Ok(None);
        };

        let quality = self.config.quality;
        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&image, quality))
            .await
            .map_err(|e| PreviewError::Task(e.to_string()))??;
        Ok(Some(jpeg))
    }

    /**
        Release the native decoder. Later renders yield `Ok(None)`.
    */
    pub async fn close(&self) -> Result<(), PreviewError> {
        self.decoder.release().await?;
        Ok(())
    }
}
