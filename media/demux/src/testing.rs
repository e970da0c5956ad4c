/*!
    Test helpers: a minimal Matroska writer.

    Produces real container byte streams for end-to-end tests through the
    native demuxer. Only the elements the FFmpeg Matroska demuxer needs are
    written, every element size uses the 8-byte form.
*/

use parking_lot::{Mutex, MutexGuard};

/**
    Serializes tests that create native resources, so leak checks through
    [`crate::live_native_resources`] do not see other tests' resources.
*/
pub fn native_test_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = parking_lot::const_mutex(());
    LOCK.lock()
}

/**
    Track codecs the builder can describe.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackCodec {
    H264,
    H265,
    Vp8,
    Vp9,
    Av1,
    /// MPEG-4 part 2, outside the allow-list.
    Mpeg4Part2,
    Opus,
    /// 16-bit PCM, outside the allow-list.
    Pcm,
}

impl TrackCodec {
    fn codec_id(self) -> &'static str {
        match self {
            Self::H264 => "V_MPEG4/ISO/AVC",
            Self::H265 => "V_MPEGH/ISO/HEVC",
            Self::Vp8 => "V_VP8",
            Self::Vp9 => "V_VP9",
            Self::Av1 => "V_AV1",
            Self::Mpeg4Part2 => "V_MPEG4/ISO/ASP",
            Self::Opus => "A_OPUS",
            Self::Pcm => "A_PCM/INT/LIT",
        }
    }

    fn is_video(self) -> bool {
        matches!(
            self,
            Self::H264 | Self::H265 | Self::Vp8 | Self::Vp9 | Self::Av1 | Self::Mpeg4Part2
        )
    }
}

struct Track {
    number: u8,
    codec: TrackCodec,
    width: u32,
    height: u32,
    sample_rate: u32,
    channels: u8,
}

struct Block {
    track: u8,
    timestamp_ms: i16,
    keyframe: bool,
    data: Vec<u8>,
}

/**
    Builds a single-cluster Matroska file with a millisecond timecode scale.
*/
#[derive(Default)]
pub struct MatroskaBuilder {
    tracks: Vec<Track>,
    blocks: Vec<Block>,
}

/// Video tracks are written at 25 fps.
pub const FRAME_DURATION_MS: i16 = 40;

impl MatroskaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Add a video track. Its track number is its position, starting at 1.
    */
    pub fn video(mut self, codec: TrackCodec, width: u32, height: u32) -> Self {
        self.push_track(codec, width, height, 0, 0);
        self
    }

    pub fn audio(mut self, codec: TrackCodec, sample_rate: u32, channels: u8) -> Self {
        self.push_track(codec, 0, 0, sample_rate, channels);
        self
    }

    fn push_track(&mut self, codec: TrackCodec, width: u32, height: u32, sample_rate: u32, channels: u8) {
        let number = self.tracks.len() as u8 + 1;
        self.tracks.push(Track {
            number,
            codec,
            width,
            height,
            sample_rate,
            channels,
        });
    }

    /**
        Append a frame to `track`. Frames must be added in timestamp order.
    */
    pub fn frame(mut self, track: u8, timestamp_ms: i16, keyframe: bool, data: impl Into<Vec<u8>>) -> Self {
        self.blocks.push(Block {
            track,
            timestamp_ms,
            keyframe,
            data: data.into(),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = element(
            &[0x1A, 0x45, 0xDF, 0xA3],
            &[
                uint(&[0x42, 0x86], 1),
                uint(&[0x42, 0xF7], 1),
                uint(&[0x42, 0xF2], 4),
                uint(&[0x42, 0xF3], 8),
                string(&[0x42, 0x82], "matroska"),
                uint(&[0x42, 0x87], 4),
                uint(&[0x42, 0x85], 2),
            ]
            .concat(),
        );

        let info = element(
            &[0x15, 0x49, 0xA9, 0x66],
            &[
                uint(&[0x2A, 0xD7, 0xB1], 1_000_000),
                string(&[0x4D, 0x80], "media-demux tests"),
                string(&[0x57, 0x41], "media-demux tests"),
            ]
            .concat(),
        );
        let tracks = element(
            &[0x16, 0x54, 0xAE, 0x6B],
            &self.tracks.iter().map(track_entry).collect::<Vec<_>>().concat(),
        );
        let mut cluster = uint(&[0xE7], 0);
        for block in &self.blocks {
            let mut body = vec![0x80 | block.track];
            body.extend_from_slice(&block.timestamp_ms.to_be_bytes());
            body.push(if block.keyframe { 0x80 } else { 0x00 });
            body.extend_from_slice(&block.data);
            cluster.extend(element(&[0xA3], &body));
        }
        let cluster = element(&[0x1F, 0x43, 0xB6, 0x75], &cluster);

        out.extend(element(
            &[0x18, 0x53, 0x80, 0x67],
            &[info, tracks, cluster].concat(),
        ));
        out
    }
}

fn track_entry(track: &Track) -> Vec<u8> {
    let mut body = [
        uint(&[0xD7], track.number as u64),
        uint(&[0x73, 0xC5], track.number as u64),
        uint(&[0x83], if track.codec.is_video() { 1 } else { 2 }),
        string(&[0x86], track.codec.codec_id()),
    ]
    .concat();

    if track.codec.is_video() {
        body.extend(uint(&[0x23, 0xE3, 0x83], FRAME_DURATION_MS as u64 * 1_000_000));
        body.extend(element(
            &[0xE0],
            &[
                uint(&[0xB0], track.width as u64),
                uint(&[0xBA], track.height as u64),
            ]
            .concat(),
        ));
    } else {
        let mut audio = [
            element(&[0xB5], &(track.sample_rate as f64).to_be_bytes()),
            uint(&[0x9F], track.channels as u64),
        ]
        .concat();
        if track.codec == TrackCodec::Pcm {
            audio.extend(uint(&[0x62, 0x64], 16));
        }
        body.extend(element(&[0xE1], &audio));
    }

    let private = match track.codec {
        TrackCodec::H264 => Some(avc_decoder_config()),
        TrackCodec::H265 => Some(hevc_decoder_config()),
        TrackCodec::Av1 => Some(av1_decoder_config()),
        TrackCodec::Opus => Some(opus_head(track.channels)),
        _ => None,
    };
    if let Some(private) = private {
        body.extend(element(&[0x63, 0xA2], &private));
    }
    element(&[0xAE], &body)
}

fn element(id: &[u8], body: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.push(0x01);
    out.extend_from_slice(&(body.len() as u64).to_be_bytes()[1..]);
    out.extend_from_slice(body);
    out
}

fn uint(id: &[u8], value: u64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

fn string(id: &[u8], value: &str) -> Vec<u8> {
    element(id, value.as_bytes())
}

/// Parameter sets written into the `avcC` record.
pub const H264_SPS: [u8; 8] = [0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02, 0x80, 0xF6];
pub const H264_PPS: [u8; 4] = [0x68, 0xCE, 0x3C, 0x80];

fn avc_decoder_config() -> Vec<u8> {
    let mut out = vec![1, H264_SPS[1], H264_SPS[2], H264_SPS[3], 0xFF, 0xE1];
    out.extend_from_slice(&(H264_SPS.len() as u16).to_be_bytes());
    out.extend_from_slice(&H264_SPS);
    out.push(1);
    out.extend_from_slice(&(H264_PPS.len() as u16).to_be_bytes());
    out.extend_from_slice(&H264_PPS);
    out
}

/// Parameter sets written into the `hvcC` record.
pub const H265_VPS: [u8; 6] = [0x40, 0x01, 0x0C, 0x01, 0xFF, 0xFF];
pub const H265_SPS: [u8; 7] = [0x42, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00];
pub const H265_PPS: [u8; 5] = [0x44, 0x01, 0xC1, 0x72, 0xB4];

fn hevc_decoder_config() -> Vec<u8> {
    let mut out = vec![
        1, 0x01, 0x60, 0, 0, 0, 0x90, 0, 0, 0, 0, 0, 0x5A, 0xF0, 0x00, 0xFC, 0xFD, 0xF8, 0xF8,
        0, 0,
        // one temporal layer, nested, 4-byte lengths
        0x0F,
        3,
    ];
    for nal in [&H265_VPS[..], &H265_SPS[..], &H265_PPS[..]] {
        out.push(0x80 | ((nal[0] >> 1) & 0x3F));
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&(nal.len() as u16).to_be_bytes());
        out.extend_from_slice(nal);
    }
    out
}

/// Sequence header OBU for 8-bit 4:2:0 profile 0 at 320x240.
pub const AV1_SEQUENCE_HEADER: [u8; 12] =
    [0x0A, 0x0A, 0x00, 0x00, 0x00, 0x04, 0x3C, 0xFF, 0xBC, 0x00, 0x00, 0x08];

fn av1_decoder_config() -> Vec<u8> {
    let mut out = vec![0x81, 0x00, 0x0C, 0x00];
    out.extend_from_slice(&AV1_SEQUENCE_HEADER);
    out
}

fn opus_head(channels: u8) -> Vec<u8> {
    let mut out = b"OpusHead".to_vec();
    out.push(1);
    out.push(channels);
    out.extend_from_slice(&312u16.to_le_bytes());
    out.extend_from_slice(&48_000u32.to_le_bytes());
    out.extend_from_slice(&0i16.to_le_bytes());
    out.push(0);
    out
}

/**
    One length-prefixed H.264 slice NAL unit, IDR when `keyframe`.
*/
pub fn h264_access_unit(keyframe: bool) -> Vec<u8> {
    let nal: &[u8] = if keyframe {
        &[0x65, 0x88, 0x84, 0x00, 0x33, 0xFF]
    } else {
        &[0x41, 0x9A, 0x02, 0x04, 0x17]
    };
    let mut out = (nal.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(nal);
    out
}

/**
    One length-prefixed H.265 slice NAL unit, IDR when `keyframe`.
*/
pub fn h265_access_unit(keyframe: bool) -> Vec<u8> {
    let nal: &[u8] = if keyframe {
        &[0x26, 0x01, 0xAF, 0x06, 0xB8, 0x3F]
    } else {
        &[0x02, 0x01, 0xD0, 0x09, 0x7E]
    };
    let mut out = (nal.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(nal);
    out
}

/**
    An AV1 temporal unit. Keyframes repeat the sequence header, the tile
    data is a padding OBU.
*/
pub fn av1_temporal_unit(keyframe: bool) -> Vec<u8> {
    let mut out = vec![0x12, 0x00];
    if keyframe {
        out.extend_from_slice(&AV1_SEQUENCE_HEADER);
    }
    out.extend_from_slice(&[0x7A, 0x04, 0xDE, 0xAD, 0xBE, 0xEF]);
    out
}

/**
    A complete VP8 keyframe the native decoder turns into a picture: a
    96x64 gradient under a checkerboard, from the lossy chunk of a WebP
    image.
*/
pub const VP8_KEYFRAME: [u8; 238] = [
    0xD0, 0x07, 0x00, 0x9D, 0x01, 0x2A, 0x60, 0x00, 0x40, 0x00, 0x3E, 0xF9,
    0x68, 0xA9, 0x50, 0x3F, 0xA6, 0x3E, 0x2A, 0x31, 0x4E, 0x8B, 0xF0, 0x1F,
    0x09, 0x6A, 0x06, 0x70, 0x52, 0x05, 0x58, 0x0A, 0x06, 0x72, 0x7E, 0x1E,
    0xDA, 0xD3, 0x54, 0xB7, 0x51, 0xBD, 0x26, 0xAA, 0x9F, 0xE4, 0xFE, 0x89,
    0xF3, 0x68, 0x3F, 0xFC, 0x0F, 0xEF, 0xBD, 0x10, 0x3C, 0xCA, 0x1F, 0xBD,
    0x04, 0x5A, 0x08, 0xB0, 0xFA, 0x13, 0x6F, 0x6F, 0x41, 0x7A, 0x08, 0x00,
    0xFE, 0xF3, 0xF4, 0x85, 0xC9, 0x24, 0x09, 0x6A, 0x26, 0x8F, 0x2B, 0x33,
    0x3C, 0x6A, 0x7B, 0x0F, 0x3A, 0x85, 0xF6, 0x29, 0x4C, 0x29, 0xD7, 0xD5,
    0x3D, 0x4D, 0x08, 0xDA, 0x2F, 0xFA, 0x4C, 0x61, 0xA2, 0x89, 0x00, 0x18,
    0x69, 0x83, 0x77, 0x73, 0x56, 0xFE, 0xA1, 0x5E, 0x0C, 0x19, 0x44, 0xC7,
    0x9B, 0xA7, 0x60, 0xBE, 0x71, 0x24, 0x24, 0xB5, 0xF4, 0x53, 0xA0, 0xB7,
    0x43, 0x6D, 0x65, 0x5B, 0x01, 0xEC, 0xCA, 0xD3, 0xDA, 0x60, 0x82, 0x04,
    0x05, 0x1C, 0xD1, 0x9E, 0xAB, 0x85, 0xC0, 0xE0, 0x57, 0x16, 0x8C, 0x45,
    0xEB, 0x34, 0x1D, 0x26, 0xD0, 0x48, 0x7D, 0x71, 0xB8, 0x6B, 0x27, 0xE8,
    0xA7, 0x60, 0x7F, 0xD3, 0x6B, 0x0C, 0x91, 0xE7, 0x57, 0x27, 0xDE, 0x66,
    0xEB, 0xE8, 0x7A, 0xC7, 0x9B, 0xC4, 0xE5, 0x05, 0x39, 0x3F, 0xC4, 0x24,
    0x55, 0x82, 0x24, 0x68, 0x6A, 0x28, 0x38, 0x6F, 0xA5, 0xAF, 0x03, 0xB3,
    0xF3, 0xA1, 0xB6, 0x69, 0x7A, 0xDD, 0xB8, 0x11, 0x63, 0xC8, 0x17, 0x81,
    0x60, 0x40, 0x3F, 0xD3, 0x5F, 0x8C, 0x1D, 0x9E, 0xD5, 0xB8, 0xA2, 0x85,
    0x51, 0xB2, 0x90, 0xE5, 0xFB, 0xB0, 0xF2, 0x18, 0x00, 0x00,
];

/// Frame size of [`VP8_KEYFRAME`].
pub const VP8_KEYFRAME_SIZE: (u32, u32) = (96, 64);

/**
    A VP8 frame header. Keyframes carry the frame size.
*/
pub fn vp8_frame(keyframe: bool, width: u16, height: u16) -> Vec<u8> {
    // show_frame set, first partition size 10
    let tag: u32 = (10 << 5) | (1 << 4) | u32::from(!keyframe);
    let mut out = tag.to_le_bytes()[..3].to_vec();
    if keyframe {
        out.extend_from_slice(&[0x9D, 0x01, 0x2A]);
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
    }
    out.extend_from_slice(&[0; 10]);
    out
}

/**
    An Opus packet holding one 20 ms CELT frame.
*/
pub fn opus_packet() -> Vec<u8> {
    vec![0xFC, 0xFF, 0xFE]
}

/**
    A Matroska stream with one H.264 video track and `frames` access units,
    the first a keyframe.
*/
pub fn h264_stream(frames: usize) -> Vec<u8> {
    (0..frames)
        .fold(
            MatroskaBuilder::new().video(TrackCodec::H264, 320, 240),
            |builder, i| {
                builder.frame(
                    1,
                    i as i16 * FRAME_DURATION_MS,
                    i == 0,
                    h264_access_unit(i == 0),
                )
            },
        )
        .build()
}
