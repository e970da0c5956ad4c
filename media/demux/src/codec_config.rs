/*!
    Opaque codec configuration for passing to decoders.
*/

use std::fmt;

use ffmpeg_next::{codec, ffi};
use media_types::CodecId;

use crate::convert::codec_id_to_ffmpeg;
use crate::engine::LiveResource;

/**
    Codec parameters of the filtered video stream.

    The demuxer copies them from the bitstream filter's output, so a decoder
    built from this configuration expects the Annex-B packets the video channel
    delivers. Pass it to the preview renderer.
*/
pub struct CodecConfig {
    parameters: codec::Parameters,
    _live: LiveResource,
}

// Owned parameter copy, not shared with any FFmpeg context.
unsafe impl Send for CodecConfig {}
unsafe impl Sync for CodecConfig {}

impl CodecConfig {
    /**
        Copy the parameters behind `ptr` into a new configuration.

        # Safety

        `ptr` must point to valid codec parameters.
    */
    pub(crate) unsafe fn copy_from(ptr: *const ffi::AVCodecParameters) -> Option<Self> {
        let mut parameters = codec::Parameters::new();
        let ret = unsafe { ffi::avcodec_parameters_copy(parameters.as_mut_ptr(), ptr) };
        (ret >= 0).then(|| Self {
            parameters,
            _live: LiveResource::acquire(),
        })
    }

    /**
        A configuration carrying only a codec and frame size, without
        extradata. Decoders that find their parameter sets in-band (as in the
        demuxer's filtered output) accept it.
    */
    pub fn for_codec(codec_id: CodecId, width: u32, height: u32) -> Self {
        let mut parameters = codec::Parameters::new();
        unsafe {
            let ptr = parameters.as_mut_ptr();
            (*ptr).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
            (*ptr).codec_id = codec_id_to_ffmpeg(codec_id).into();
            (*ptr).width = width as i32;
            (*ptr).height = height as i32;
        }
        Self {
            parameters,
            _live: LiveResource::acquire(),
        }
    }

    pub fn width(&self) -> u32 {
        unsafe { (*self.parameters.as_ptr()).width.max(0) as u32 }
    }

    pub fn height(&self) -> u32 {
        unsafe { (*self.parameters.as_ptr()).height.max(0) as u32 }
    }

    /**
        Get a copy of the internal parameters, for building a decoder.
    */
    pub fn parameters(&self) -> codec::Parameters {
        self.parameters.clone()
    }
}

impl Clone for CodecConfig {
    fn clone(&self) -> Self {
        Self {
            parameters: self.parameters.clone(),
            _live: LiveResource::acquire(),
        }
    }
}

impl fmt::Debug for CodecConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecConfig")
            .field("codec_id", &self.parameters.id())
            .field("width", &self.width())
            .field("height", &self.height())
            .finish_non_exhaustive()
    }
}
