/*!
    Video bitstream filter chain.

    H.264 and H.265 arrive length-prefixed from most containers. The chain
    rewrites them to start-code framing and repeats the parameter sets in front
    of every keyframe, so each access unit the transport receives can be
    decoded on its own. Other codecs go through FFmpeg's `null` filter.
*/

use std::ffi::CString;
use std::ptr;

use ffmpeg_next::{codec, ffi};
use media_types::{CodecId, Packet, Rational};

use crate::codec_config::CodecConfig;
use crate::convert::{packet_from_ffmpeg, rational_from_ffmpeg};
use crate::engine::LiveResource;
use crate::error::DemuxError;

/**
    Filter description for a video codec.
*/
pub(crate) fn filter_for(codec: CodecId) -> &'static str {
    match codec {
        CodecId::H264 => "h264_mp4toannexb,dump_extra",
        CodecId::H265 => "hevc_mp4toannexb,dump_extra",
        _ => "null",
    }
}

/**
    An initialized `AVBSFContext`, bound to one stream's parameters.
*/
pub(crate) struct FilterChain {
    ctx: *mut ffi::AVBSFContext,
    time_base: Rational,
    _live: LiveResource,
}

unsafe impl Send for FilterChain {}

impl FilterChain {
    /**
        Parse `filter`, bind it to `parameters` and initialize it.
    */
    pub(crate) fn new(
        filter: &str,
        parameters: &codec::Parameters,
        time_base: ffmpeg_next::Rational,
    ) -> Result<Self, DemuxError> {
        let failed = |reason: String| DemuxError::FilterConstruction {
            filter: filter.to_string(),
            reason,
        };
        let description = CString::new(filter).map_err(|e| failed(e.to_string()))?;

        let mut ctx: *mut ffi::AVBSFContext = ptr::null_mut();
        let ret = unsafe { ffi::av_bsf_list_parse_str(description.as_ptr(), &mut ctx) };
        if ret < 0 || ctx.is_null() {
            return Err(failed(ffmpeg_next::Error::from(ret).to_string()));
        }
        // Owns ctx from here on, so every early return frees it.
        let mut chain = Self {
            ctx,
            time_base: rational_from_ffmpeg(time_base),
            _live: LiveResource::acquire(),
        };

        unsafe {
            let ret = ffi::avcodec_parameters_copy((*ctx).par_in, parameters.as_ptr());
            if ret < 0 {
                return Err(failed(ffmpeg_next::Error::from(ret).to_string()));
            }
            (*ctx).time_base_in = time_base.into();

            let ret = ffi::av_bsf_init(ctx);
            if ret < 0 {
                return Err(failed(ffmpeg_next::Error::from(ret).to_string()));
            }
        }

        chain.time_base = unsafe { rational_from_ffmpeg((*ctx).time_base_out.into()) };
        Ok(chain)
    }

    /**
        Copy of the output parameters.
    */
    pub(crate) fn output_config(&self) -> Option<CodecConfig> {
        unsafe { CodecConfig::copy_from((*self.ctx).par_out) }
    }

    /**
        Output frame size.
    */
    pub(crate) fn output_size(&self) -> (u32, u32) {
        unsafe {
            let par = (*self.ctx).par_out;
            ((*par).width.max(0) as u32, (*par).height.max(0) as u32)
        }
    }

    /**
        Send one packet through the chain, appending whatever comes out.
    */
    pub(crate) fn filter(
        &mut self,
        mut packet: ffmpeg_next::Packet,
        out: &mut Vec<Packet>,
    ) -> Result<(), ffmpeg_next::Error> {
        let ret = unsafe { ffi::av_bsf_send_packet(self.ctx, packet.as_mut_ptr()) };
        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret));
        }
        self.drain(out)
    }

    /**
        Signal end of stream and collect the remaining output.
    */
    pub(crate) fn finish(&mut self, out: &mut Vec<Packet>) -> Result<(), ffmpeg_next::Error> {
        let ret = unsafe { ffi::av_bsf_send_packet(self.ctx, ptr::null_mut()) };
        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret));
        }
        self.drain(out)
    }

    fn drain(&mut self, out: &mut Vec<Packet>) -> Result<(), ffmpeg_next::Error> {
        loop {
            let mut filtered = ffmpeg_next::Packet::empty();
            let ret = unsafe { ffi::av_bsf_receive_packet(self.ctx, filtered.as_mut_ptr()) };
            if ret == ffi::AVERROR(ffi::EAGAIN) || ret == ffi::AVERROR_EOF {
                return Ok(());
            }
            if ret < 0 {
                return Err(ffmpeg_next::Error::from(ret));
            }
            out.push(packet_from_ffmpeg(&filtered, self.time_base));
        }
    }
}

impl Drop for FilterChain {
    fn drop(&mut self) {
        unsafe { ffi::av_bsf_free(&mut self.ctx) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_strings() {
        assert_eq!(filter_for(CodecId::H264), "h264_mp4toannexb,dump_extra");
        assert_eq!(filter_for(CodecId::H265), "hevc_mp4toannexb,dump_extra");
        assert_eq!(filter_for(CodecId::Vp9), "null");
        assert_eq!(filter_for(CodecId::Av1), "null");
    }

    #[test]
    fn unknown_filter_fails_construction() {
        let _lock = crate::testing::native_test_lock();
        ffmpeg_next::init().unwrap();
        let parameters = codec::Parameters::new();
        let err = FilterChain::new("no_such_filter", &parameters, ffmpeg_next::Rational::new(1, 1000))
            .err()
            .unwrap();
        assert!(matches!(err, DemuxError::FilterConstruction { ref filter, .. } if filter == "no_such_filter"));
    }

    #[test]
    fn null_filter_passes_packets_through() {
        let _lock = crate::testing::native_test_lock();
        ffmpeg_next::init().unwrap();
        let config = CodecConfig::for_codec(CodecId::Vp8, 320, 240);
        let mut chain =
            FilterChain::new("null", &config.parameters(), ffmpeg_next::Rational::new(1, 1000)).unwrap();
        assert_eq!(chain.output_size(), (320, 240));

        let mut raw = ffmpeg_next::Packet::copy(&[0x50, 0x01, 0x00, 0x9D, 0x01, 0x2A]);
        raw.set_pts(Some(33));
        let mut out = Vec::new();
        chain.filter(raw, &mut out).unwrap();
        chain.finish(&mut out).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pts, Some(33));
        assert_eq!(out[0].time_base, Rational::new(1, 1000));
        assert_eq!(&out[0].data[..], &[0x50, 0x01, 0x00, 0x9D, 0x01, 0x2A]);
    }
}
