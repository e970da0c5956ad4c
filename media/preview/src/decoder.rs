/*!
    Native keyframe decoder.

    Lives on the media engine thread. Each keyframe is decoded on its own: the
    decoder is drained and reset after every packet, so no state carries over
    between previews.
*/

use ffmpeg_next::{
    codec::{self, decoder::Video as VideoDecoderFFmpeg},
    ffi,
    format::Pixel,
    software::scaling::{context::Context as ScalerContext, flag::Flags as ScalerFlags},
    util::frame::video::Video as VideoFrameFFmpeg,
};
use image::RgbImage;
use media_demux::{CodecConfig, LiveResource};
use media_types::Packet;
use tracing::trace;

use crate::config::PreviewConfig;
use crate::error::PreviewError;

struct ScalerState {
    context: ScalerContext,
    src_width: u32,
    src_height: u32,
    src_format: Pixel,
}

pub(crate) struct KeyframeDecoder {
    decoder: VideoDecoderFFmpeg,
    config: PreviewConfig,
    scaler: Option<ScalerState>,
    _live: LiveResource,
}

// Only used from the engine thread.
unsafe impl Send for KeyframeDecoder {}

impl KeyframeDecoder {
    pub(crate) fn new(codec_config: &CodecConfig, config: PreviewConfig) -> Result<Self, PreviewError> {
        let context = codec::context::Context::from_parameters(codec_config.parameters())
            .map_err(|e| PreviewError::Decoder(e.to_string()))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| PreviewError::Decoder(e.to_string()))?;
        Ok(Self {
            decoder,
            config,
            scaler: None,
            _live: LiveResource::acquire(),
        })
    }

    /**
        Decode one keyframe into a downscaled RGB image.

        Returns `Ok(None)` if the decoder produced no picture for it.
    */
    pub(crate) fn decode(&mut self, packet: &Packet) -> Result<Option<RgbImage>, PreviewError> {
        let mut ffmpeg_pkt = ffmpeg_next::Packet::copy(&packet.data);
        ffmpeg_pkt.set_pts(packet.pts);
        ffmpeg_pkt.set_dts(packet.dts);

        let result = self.decode_packet(&ffmpeg_pkt);
        // Ready for the next independent keyframe.
        self.decoder.flush();

        match result? {
            Some(frame) => self.to_rgb(&frame).map(Some),
            None => Ok(None),
        }
    }

    fn decode_packet(&mut self, packet: &ffmpeg_next::Packet) -> Result<Option<VideoFrameFFmpeg>, PreviewError> {
        self.decoder
            .send_packet(packet)
            .map_err(|e| PreviewError::Decode(e.to_string()))?;
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
            Err(e) => return Err(PreviewError::Decode(e.to_string())),
        }

        let mut last = None;
        loop {
            let mut frame = VideoFrameFFmpeg::empty();
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => last = Some(frame),
                Err(ffmpeg_next::Error::Eof) => break,
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => break,
                Err(e) => return Err(PreviewError::Decode(e.to_string())),
            }
        }
        Ok(last)
    }

    /**
        Scale `frame` straight into RGB24 at the box-fit size.
    */
    fn to_rgb(&mut self, frame: &VideoFrameFFmpeg) -> Result<RgbImage, PreviewError> {
        let (src_width, src_height, src_format) = (frame.width(), frame.height(), frame.format());
        if src_width == 0 || src_height == 0 {
            return Err(PreviewError::Scale("frame has zero dimensions".into()));
        }
        let (width, height) = self.config.fit(src_width, src_height);

        let needs_init = match &self.scaler {
            None => true,
            Some(state) => {
                state.src_width != src_width
                    || state.src_height != src_height
                    || state.src_format != src_format
            }
        };
        if needs_init {
            let context = ScalerContext::get(
                src_format,
                src_width,
                src_height,
                Pixel::RGB24,
                width,
                height,
                ScalerFlags::BILINEAR,
            )
            .map_err(|e| PreviewError::Scale(e.to_string()))?;
            self.scaler = Some(ScalerState {
                context,
                src_width,
                src_height,
                src_format,
            });
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Err(PreviewError::Scale("scaler unavailable".into()));
        };

        let mut rgb = VideoFrameFFmpeg::empty();
        scaler
            .context
            .run(frame, &mut rgb)
            .map_err(|e| PreviewError::Scale(e.to_string()))?;
        trace!(src_width, src_height, width, height, "scaled preview frame");

        // Copy row by row, the scaler's stride may include padding.
        let row = width as usize * 3;
        let stride = rgb.stride(0);
        let data = rgb.data(0);
        let mut pixels = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            pixels.extend_from_slice(&data[y * stride..y * stride + row]);
        }
        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| PreviewError::Scale("pixel buffer size mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use media_demux::testing::{VP8_KEYFRAME, VP8_KEYFRAME_SIZE, native_test_lock};
    use media_types::{CodecId, Rational};

    use super::*;
    use crate::config::box_fit;

    fn vp8_decoder(config: PreviewConfig) -> KeyframeDecoder {
        ffmpeg_next::init().unwrap();
        KeyframeDecoder::new(&CodecConfig::for_codec(CodecId::Vp8, 320, 240), config).unwrap()
    }

    #[test]
    fn scales_into_the_viewport() {
        let _lock = native_test_lock();
        let mut decoder = vp8_decoder(PreviewConfig {
            max_width: 320,
            max_height: 180,
            quality: 80,
        });
        let mut frame = VideoFrameFFmpeg::new(Pixel::YUV420P, 640, 360);
        for plane in 0..3 {
            frame.data_mut(plane).fill(128);
        }

        let image = decoder.to_rgb(&frame).unwrap();
        assert_eq!(image.dimensions(), (320, 180));
        // Neutral chroma at mid luma comes out grey.
        let pixel = image.get_pixel(10, 10);
        assert!(pixel.0.iter().all(|c| (110..=150).contains(c)), "{pixel:?}");
    }

    #[test]
    fn small_frames_keep_their_size() {
        let _lock = native_test_lock();
        let mut decoder = vp8_decoder(PreviewConfig::default());
        let frame = VideoFrameFFmpeg::new(Pixel::YUV420P, 160, 90);
        assert_eq!(decoder.to_rgb(&frame).unwrap().dimensions(), (160, 90));
    }

    #[test]
    fn garbage_keyframe_yields_no_image() {
        let _lock = native_test_lock();
        let mut decoder = vp8_decoder(PreviewConfig::default());
        let packet = Packet::new(vec![0xFF; 32], Rational::new(1, 1000))
            .with_pts(0)
            .with_keyframe(true);
        assert!(!matches!(decoder.decode(&packet), Ok(Some(_))));
        // The decoder stays usable afterwards.
        assert!(!matches!(decoder.decode(&packet), Ok(Some(_))));
    }

    #[test]
    fn decodes_a_real_keyframe_into_the_viewport() {
        let _lock = native_test_lock();
        let config = PreviewConfig {
            max_width: 40,
            max_height: 40,
            quality: 80,
        };
        let mut decoder = vp8_decoder(config);
        let packet = Packet::new(VP8_KEYFRAME.to_vec(), Rational::new(1, 1000))
            .with_pts(0)
            .with_keyframe(true);

        let (width, height) = VP8_KEYFRAME_SIZE;
        let expected = box_fit(width, height, 40, 40);
        assert_eq!(expected, (40, 27));
        for _ in 0..2 {
            let image = decoder.decode(&packet).unwrap().expect("no picture");
            assert_eq!(image.dimensions(), expected);
        }
    }
}
