/*!
    Container input over a custom byte reader.

    The container is opened with an `AVIOContext` whose read callback pulls
    from the session's [`InputBuffer`]. Opening, stream selection and every
    later read run on the engine thread.
*/

use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr;
use std::slice;
use std::sync::Arc;

use ffmpeg_next::{ffi, format, media};
use media_types::{AudioStreamInfo, CodecId, MediaKind, Packet, Rational, VideoStreamInfo};
use tracing::{info, warn};

use crate::bsf::{FilterChain, filter_for};
use crate::codec_config::CodecConfig;
use crate::convert::{codec_id_from_ffmpeg, packet_from_ffmpeg, rational_from_ffmpeg};
use crate::demux::ContainerFormat;
use crate::engine::LiveResource;
use crate::error::DemuxError;
use crate::input::InputBuffer;
use crate::pump::{PacketSource, Read, Tracks};

const IO_BUFFER_SIZE: usize = 32 * 1024;

unsafe extern "C" fn read_input(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    if buf_size <= 0 {
        return 0;
    }
    let buffer = unsafe { &*(opaque as *const Arc<InputBuffer>) };
    let out = unsafe { slice::from_raw_parts_mut(buf, buf_size as usize) };
    buffer.read_blocking(out)
}

/**
    An open `AVFormatContext` reading through a custom I/O context.
*/
pub(crate) struct ContainerInput {
    input: Option<format::context::Input>,
    avio: *mut ffi::AVIOContext,
    opaque: *mut Arc<InputBuffer>,
    _live: LiveResource,
}

// Only used from the engine thread.
unsafe impl Send for ContainerInput {}

impl ContainerInput {
    pub(crate) fn open(buffer: Arc<InputBuffer>, format: ContainerFormat) -> Result<Self, DemuxError> {
        let demuxer = unsafe { ffi::av_find_input_format(format.demuxer_name().as_ptr()) };
        if demuxer.is_null() {
            return Err(DemuxError::Open(format!("demuxer {format} is not available")));
        }

        let io_buffer = unsafe { ffi::av_malloc(IO_BUFFER_SIZE) } as *mut u8;
        if io_buffer.is_null() {
            return Err(DemuxError::Open("failed to allocate the I/O buffer".into()));
        }
        let opaque = Box::into_raw(Box::new(buffer));
        let avio = unsafe {
            ffi::avio_alloc_context(
                io_buffer,
                IO_BUFFER_SIZE as c_int,
                0,
                opaque.cast(),
                Some(read_input),
                None,
                None,
            )
        };
        if avio.is_null() {
            unsafe {
                ffi::av_free(io_buffer.cast());
                drop(Box::from_raw(opaque));
            }
            return Err(DemuxError::Open("failed to allocate the I/O context".into()));
        }
        // From here on Drop releases everything acquired so far.
        let mut this = Self {
            input: None,
            avio,
            opaque,
            _live: LiveResource::acquire(),
        };

        let mut ctx = unsafe { ffi::avformat_alloc_context() };
        if ctx.is_null() {
            return Err(DemuxError::Open("failed to allocate the format context".into()));
        }
        unsafe {
            (*ctx).pb = avio;
            (*ctx).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as c_int;

            // Frees ctx on failure, leaving the custom I/O context to us.
            let ret = ffi::avformat_open_input(&mut ctx, ptr::null(), demuxer, ptr::null_mut());
            if ret < 0 {
                return Err(DemuxError::Open(ffmpeg_next::Error::from(ret).to_string()));
            }
            this.input = Some(format::context::Input::wrap(ctx));

            let ret = ffi::avformat_find_stream_info(ctx, ptr::null_mut());
            if ret < 0 {
                warn!("could not read stream info: {}", ffmpeg_next::Error::from(ret));
            }
        }
        Ok(this)
    }

    fn input(&self) -> Result<&format::context::Input, DemuxError> {
        self.input
            .as_ref()
            .ok_or_else(|| DemuxError::Open("container is closed".into()))
    }
}

impl Drop for ContainerInput {
    fn drop(&mut self) {
        // Closing the format context leaves a custom I/O context alone.
        drop(self.input.take());
        unsafe {
            if !self.avio.is_null() {
                ffi::av_freep(ptr::addr_of_mut!((*self.avio).buffer).cast());
                ffi::avio_context_free(&mut self.avio);
            }
            drop(Box::from_raw(self.opaque));
        }
    }
}

/**
    The tracked streams of an opened container, ready for the pump.
*/
pub(crate) struct OpenedContainer {
    pub source: ContainerSource,
    pub tracks: Tracks,
    pub video: Option<(VideoStreamInfo, CodecConfig)>,
    pub audio: Option<AudioStreamInfo>,
}

/**
    Open the container, validate the first video and audio streams and build
    the video filter chain. Runs on the engine thread.

    On error every native resource acquired so far is dropped before
    returning.
*/
pub(crate) fn open_container(
    buffer: Arc<InputBuffer>,
    format: ContainerFormat,
) -> Result<OpenedContainer, DemuxError> {
    let container = ContainerInput::open(Arc::clone(&buffer), format)?;
    let input = container.input()?;

    let mut tracks = Tracks::default();
    let mut filter = None;
    let mut video = None;
    if let Some(stream) = input
        .streams()
        .find(|s| s.parameters().medium() == media::Type::Video)
    {
        let parameters = stream.parameters();
        let codec_id = allowed(parameters.id(), MediaKind::Video)?;
        let chain = FilterChain::new(filter_for(codec_id), &parameters, stream.time_base())?;
        let codec_config = chain.output_config().ok_or_else(|| DemuxError::FilterConstruction {
            filter: filter_for(codec_id).to_string(),
            reason: "failed to copy output parameters".into(),
        })?;
        let (width, height) = chain.output_size();

        let info = VideoStreamInfo {
            index: stream.index(),
            codec_id,
            width,
            height,
            frame_rate: frame_rate(&stream),
            time_base: rational_from_ffmpeg(stream.time_base()),
        };
        info!(
            index = info.index,
            codec = %codec_id,
            width,
            height,
            fps = ?info.fps(),
            "found video stream"
        );
        tracks.video = Some(info.index);
        filter = Some(chain);
        video = Some((info, codec_config));
    }

    let mut audio = None;
    if let Some(stream) = input
        .streams()
        .find(|s| s.parameters().medium() == media::Type::Audio)
    {
        let parameters = stream.parameters();
        let codec_id = allowed(parameters.id(), MediaKind::Audio)?;
        let (sample_rate, channels) = unsafe {
            let ptr = parameters.as_ptr();
            ((*ptr).sample_rate.max(0) as u32, (*ptr).ch_layout.nb_channels.max(0) as u16)
        };

        let info = AudioStreamInfo {
            index: stream.index(),
            codec_id,
            sample_rate,
            channels,
            time_base: rational_from_ffmpeg(stream.time_base()),
        };
        info!(
            index = info.index,
            codec = %codec_id,
            sample_rate,
            channels,
            "found audio stream"
        );
        tracks.audio = Some(info.index);
        audio = Some(info);
    }

    let audio_time_base = audio.as_ref().map_or(Rational::new(1, 48_000), |a| a.time_base);
    Ok(OpenedContainer {
        source: ContainerSource {
            container,
            buffer,
            filter,
            audio_time_base,
        },
        tracks,
        video,
        audio,
    })
}

fn allowed(id: ffmpeg_next::codec::Id, kind: MediaKind) -> Result<CodecId, DemuxError> {
    codec_id_from_ffmpeg(id)
        .filter(|codec| codec.kind() == kind)
        .ok_or_else(|| DemuxError::UnsupportedCodec {
            kind,
            codec: id.name().to_string(),
        })
}

fn frame_rate(stream: &format::stream::Stream) -> Option<Rational> {
    [stream.avg_frame_rate(), stream.rate()]
        .into_iter()
        .map(rational_from_ffmpeg)
        .find(|r| r.is_valid())
}

/**
    Packet source over an opened container.
*/
pub(crate) struct ContainerSource {
    container: ContainerInput,
    buffer: Arc<InputBuffer>,
    filter: Option<FilterChain>,
    audio_time_base: Rational,
}

impl PacketSource for ContainerSource {
    type Raw = ffmpeg_next::Packet;

    fn read_packet(&mut self) -> Read<ffmpeg_next::Packet> {
        let Some(input) = self.container.input.as_mut() else {
            return Read::Failed("container is closed".into());
        };
        let mut packet = ffmpeg_next::Packet::empty();
        match packet.read(input) {
            Ok(()) => Read::Packet(packet),
            Err(ffmpeg_next::Error::Eof) => Read::End,
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => Read::Again,
            Err(e) => Read::Failed(self.buffer.error().unwrap_or_else(|| e.to_string())),
        }
    }

    fn stream_index(&self, raw: &ffmpeg_next::Packet) -> usize {
        raw.stream()
    }

    fn filter_video(&mut self, raw: ffmpeg_next::Packet, out: &mut Vec<Packet>) -> Result<(), String> {
        match self.filter.as_mut() {
            Some(filter) => filter.filter(raw, out).map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }

    fn copy_audio(&mut self, raw: ffmpeg_next::Packet) -> Packet {
        packet_from_ffmpeg(&raw, self.audio_time_base)
    }

    fn finish_video(&mut self, out: &mut Vec<Packet>) -> Result<(), String> {
        match self.filter.as_mut() {
            Some(filter) => filter.finish(out).map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }
}
