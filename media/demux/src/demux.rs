/*!
    The demuxer entry point.
*/

use std::ffi::CStr;
use std::fmt;

use media_types::{AudioStreamInfo, VideoStreamInfo};
use tokio::io::AsyncRead;
use tracing::debug;

use crate::channel::{PacketReceiver, packet_channel};
use crate::codec_config::CodecConfig;
use crate::container::open_container;
use crate::engine::{EngineCell, engine};
use crate::error::DemuxError;
use crate::input::InputFeed;
use crate::pump;

/**
    Supported container formats.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ContainerFormat {
    Matroska,
    #[default]
    Nut,
}

impl ContainerFormat {
    /**
        Name of the FFmpeg demuxer.
    */
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Matroska => "matroska",
            Self::Nut => "nut",
        }
    }

    pub(crate) fn demuxer_name(self) -> &'static CStr {
        match self {
            Self::Matroska => c"matroska",
            Self::Nut => c"nut",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/**
    Demuxer configuration.
*/
#[derive(Clone, Debug)]
pub struct DemuxConfig {
    /// Container format of the input.
    pub format: ContainerFormat,
    /// Packets each output channel holds before input is paused.
    pub channel_capacity: usize,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            format: ContainerFormat::default(),
            channel_capacity: 128,
        }
    }
}

impl DemuxConfig {
    pub fn with_format(mut self, format: ContainerFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

/**
    The tracked video stream.
*/
#[derive(Debug)]
pub struct VideoTrack {
    pub info: VideoStreamInfo,
    /// Decoder configuration for the filtered packets.
    pub codec_config: CodecConfig,
    pub packets: PacketReceiver,
}

/**
    The tracked audio stream.
*/
#[derive(Debug)]
pub struct AudioTrack {
    pub info: AudioStreamInfo,
    pub packets: PacketReceiver,
}

/**
    Demuxer output: the first video and first audio stream of the container.
*/
#[derive(Debug, Default)]
pub struct Demuxed {
    pub video: Option<VideoTrack>,
    pub audio: Option<AudioTrack>,
}

/**
    Demux `input` into separate video and audio packet sequences.

    Resolves once the container header has been parsed and the streams were
    validated. Packets are then pumped in a background task until the end of
    the input, or until every receiver has been dropped.

    # Errors

    [`DemuxError::UnsupportedCodec`] if the first video or audio stream uses
    a codec outside the allow-list, [`DemuxError::FilterConstruction`] if the
    video filter chain cannot be built. No native resource outlives a failed
    call.
*/
pub async fn demux<R>(input: R, config: DemuxConfig) -> Result<Demuxed, DemuxError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let feed = InputFeed::spawn(input);
    let buffer = feed.buffer();
    let format = config.format;
    debug!(%format, "opening container");

    // On failure `feed` is dropped here, which stops the feeder task.
    let opened = engine()
        .submit(move || open_container(buffer, format))
        .await??;

    let mut demuxed = Demuxed::default();
    let video_tx = opened.video.map(|(info, codec_config)| {
        let (tx, packets) = packet_channel(config.channel_capacity);
        demuxed.video = Some(VideoTrack {
            info,
            codec_config,
            packets,
        });
        tx
    });
    let audio_tx = opened.audio.map(|info| {
        let (tx, packets) = packet_channel(config.channel_capacity);
        demuxed.audio = Some(AudioTrack { info, packets });
        tx
    });

    tokio::spawn(pump::run(
        EngineCell::new(opened.source),
        opened.tracks,
        feed,
        video_tx,
        audio_tx,
    ));
    Ok(demuxed)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use media_types::nal::{AnnexB, H264, H265, h264, h265, split_nalu};
    use media_types::{CodecId, MediaKind, Packet};

    use super::*;
    use crate::channel::StreamEnd;
    use crate::engine::live_native_resources;
    use crate::testing::{
        FRAME_DURATION_MS, MatroskaBuilder, TrackCodec, av1_temporal_unit, h264_stream,
        h265_access_unit, native_test_lock, opus_packet, vp8_frame,
    };

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn matroska() -> DemuxConfig {
        DemuxConfig::default().with_format(ContainerFormat::Matroska)
    }

    async fn drain(rx: &mut PacketReceiver) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Some(packet) = rx.recv().await {
            packets.push(packet);
        }
        packets
    }

    async fn wait_for_release() {
        tokio::time::timeout(Duration::from_secs(5), async {
            while live_native_resources() != 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("native resources still alive");
    }

    fn vp_stream(codec: TrackCodec, frames: usize) -> Vec<u8> {
        (0..frames)
            .fold(MatroskaBuilder::new().video(codec, 320, 240), |b, i| {
                b.frame(1, i as i16 * FRAME_DURATION_MS, i == 0, vp8_frame(i == 0, 320, 240))
            })
            .build()
    }

    #[tokio::test]
    async fn h264_is_reframed_to_annexb() {
        init_tracing();
        let _lock = native_test_lock();
        let demuxed = demux(Cursor::new(h264_stream(3)), matroska()).await.unwrap();
        assert!(demuxed.audio.is_none());

        let mut video = demuxed.video.unwrap();
        assert_eq!(video.info.codec_id, CodecId::H264);
        let packets = drain(&mut video.packets).await;
        assert_eq!(video.packets.end(), Some(StreamEnd::Finished));

        assert_eq!(packets.len(), 3);
        let pts: Vec<_> = packets.iter().map(|p| p.pts).collect();
        assert_eq!(pts, vec![Some(0), Some(40), Some(80)]);
        assert!(packets[0].is_keyframe);

        let types: Vec<_> = split_nalu(&packets[0].data)
            .filter_map(|nal| H264.unit_type(nal))
            .collect();
        assert!(types.contains(&h264::SPS));
        assert!(types.contains(&h264::PPS));
        assert_eq!(types.last(), Some(&h264::CODED_SLICE_IDR));
        assert_eq!(&packets[1].data[..4], &[0, 0, 0, 1]);
    }

    #[tokio::test]
    async fn h265_is_reframed_to_annexb() {
        let _lock = native_test_lock();
        let file = (0..3)
            .fold(MatroskaBuilder::new().video(TrackCodec::H265, 320, 240), |b, i| {
                b.frame(1, i as i16 * FRAME_DURATION_MS, i == 0, h265_access_unit(i == 0))
            })
            .build();
        let demuxed = demux(Cursor::new(file), matroska()).await.unwrap();
        let mut video = demuxed.video.unwrap();
        assert_eq!(video.info.codec_id, CodecId::H265);

        let packets = drain(&mut video.packets).await;
        assert_eq!(video.packets.end(), Some(StreamEnd::Finished));
        let keyframes: Vec<_> = packets.iter().map(|p| p.is_keyframe).collect();
        assert_eq!(keyframes, vec![true, false, false]);

        let types: Vec<_> = split_nalu(&packets[0].data)
            .filter_map(|nal| H265.unit_type(nal))
            .collect();
        assert!(types.contains(&h265::VPS));
        assert!(types.contains(&h265::SPS));
        assert!(types.contains(&h265::PPS));
        assert_eq!(types.last(), Some(&h265::IDR_W_RADL));

        assert_eq!(&packets[1].data[..4], &[0, 0, 0, 1]);
        let types: Vec<_> = split_nalu(&packets[1].data)
            .filter_map(|nal| H265.unit_type(nal))
            .collect();
        assert_eq!(types, vec![h265::TRAIL_R]);
    }

    #[tokio::test]
    async fn av1_passes_through_unchanged() {
        let _lock = native_test_lock();
        let file = MatroskaBuilder::new()
            .video(TrackCodec::Av1, 320, 240)
            .frame(1, 0, true, av1_temporal_unit(true))
            .frame(1, FRAME_DURATION_MS, false, av1_temporal_unit(false))
            .frame(1, 2 * FRAME_DURATION_MS, false, av1_temporal_unit(false))
            .build();
        let demuxed = demux(Cursor::new(file), matroska()).await.unwrap();
        let mut video = demuxed.video.unwrap();
        assert_eq!(video.info.codec_id, CodecId::Av1);
        assert_eq!((video.info.width, video.info.height), (320, 240));

        let packets = drain(&mut video.packets).await;
        let keyframes: Vec<_> = packets.iter().map(|p| p.is_keyframe).collect();
        assert_eq!(keyframes, vec![true, false, false]);
        assert_eq!(&packets[0].data[..], &av1_temporal_unit(true)[..]);
        assert_eq!(&packets[2].data[..], &av1_temporal_unit(false)[..]);
    }

    #[tokio::test]
    async fn detects_vp8_and_vp9() {
        let _lock = native_test_lock();
        for (track, codec) in [(TrackCodec::Vp8, CodecId::Vp8), (TrackCodec::Vp9, CodecId::Vp9)] {
            let demuxed = demux(Cursor::new(vp_stream(track, 3)), matroska())
                .await
                .unwrap();
            let mut video = demuxed.video.unwrap();
            assert_eq!(video.info.codec_id, codec);
            assert_eq!(video.info.time_base, media_types::Rational::new(1, 1000));
            let fps = video.info.fps().unwrap();
            assert!((fps - 25.0).abs() < 0.01, "fps {fps}");
            assert_eq!(drain(&mut video.packets).await.len(), 3);
        }
        let demuxed = demux(Cursor::new(vp_stream(TrackCodec::Vp8, 1)), matroska())
            .await
            .unwrap();
        let video = demuxed.video.unwrap();
        assert_eq!((video.info.width, video.info.height), (320, 240));
        assert_eq!((video.codec_config.width(), video.codec_config.height()), (320, 240));
    }

    #[tokio::test]
    async fn opus_durations_are_filled_in() {
        let _lock = native_test_lock();
        let file = MatroskaBuilder::new()
            .video(TrackCodec::Vp8, 320, 240)
            .audio(TrackCodec::Opus, 48_000, 2)
            .frame(1, 0, true, vp8_frame(true, 320, 240))
            .frame(2, 0, true, opus_packet())
            .frame(2, 20, true, opus_packet())
            .frame(1, 40, false, vp8_frame(false, 320, 240))
            .frame(2, 40, true, opus_packet())
            .build();
        let demuxed = demux(Cursor::new(file), matroska()).await.unwrap();

        let mut audio = demuxed.audio.unwrap();
        assert_eq!(audio.info.codec_id, CodecId::Opus);
        assert_eq!(audio.info.sample_rate, 48_000);
        assert_eq!(audio.info.channels, 2);

        let mut video = demuxed.video.unwrap();
        let (video_packets, audio_packets) =
            tokio::join!(drain(&mut video.packets), drain(&mut audio.packets));
        assert_eq!(video_packets.len(), 2);
        assert_eq!(audio_packets.len(), 3);
        assert!(audio_packets.iter().all(|p| p.duration == Some(20)));
    }

    #[tokio::test]
    async fn unsupported_video_codec_leaves_nothing_allocated() {
        let _lock = native_test_lock();
        let file = MatroskaBuilder::new()
            .video(TrackCodec::Mpeg4Part2, 320, 240)
            .frame(1, 0, true, vec![0, 0, 1, 0xB6, 0x10])
            .build();

        match demux(Cursor::new(file), matroska()).await {
            Err(DemuxError::UnsupportedCodec { kind, codec }) => {
                assert_eq!(kind, MediaKind::Video);
                assert_eq!(codec, "mpeg4");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(live_native_resources(), 0);
    }

    #[tokio::test]
    async fn unsupported_audio_codec_rolls_back_the_video_filter() {
        let _lock = native_test_lock();
        let file = MatroskaBuilder::new()
            .video(TrackCodec::H264, 320, 240)
            .audio(TrackCodec::Pcm, 48_000, 2)
            .frame(1, 0, true, crate::testing::h264_access_unit(true))
            .frame(2, 0, true, vec![0; 64])
            .build();

        match demux(Cursor::new(file), matroska()).await {
            Err(DemuxError::UnsupportedCodec { kind, .. }) => assert_eq!(kind, MediaKind::Audio),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(live_native_resources(), 0);
    }

    #[tokio::test]
    async fn resources_are_released_after_the_stream() {
        let _lock = native_test_lock();
        let demuxed = demux(Cursor::new(h264_stream(2)), matroska()).await.unwrap();
        let mut video = demuxed.video.unwrap();
        drain(&mut video.packets).await;
        drop(video);
        wait_for_release().await;
    }

    #[tokio::test]
    async fn dropping_receivers_stops_the_pump() {
        let _lock = native_test_lock();
        let demuxed = demux(Cursor::new(h264_stream(64)), matroska().with_channel_capacity(2))
            .await
            .unwrap();
        drop(demuxed);
        wait_for_release().await;
    }

    #[tokio::test]
    async fn reads_input_arriving_in_small_pieces() {
        init_tracing();
        let _lock = native_test_lock();
        let file = h264_stream(3);
        let (mut writer, reader) = tokio::io::duplex(256);
        let writer_task = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            for chunk in file.chunks(100) {
                writer.write_all(chunk).await.unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        });

        let demuxed = demux(reader, matroska()).await.unwrap();
        let mut video = demuxed.video.unwrap();
        assert_eq!(drain(&mut video.packets).await.len(), 3);
        writer_task.await.unwrap();
    }

    #[tokio::test]
    async fn garbage_input_fails_to_open() {
        let _lock = native_test_lock();
        let result = demux(Cursor::new(vec![0x42; 4096]), matroska()).await;
        assert!(matches!(result, Err(DemuxError::Open(_))));
        assert_eq!(live_native_resources(), 0);
    }

    #[test]
    fn default_config() {
        let config = DemuxConfig::default();
        assert_eq!(config.format, ContainerFormat::Nut);
        assert_eq!(config.channel_capacity, 128);
        assert_eq!(ContainerFormat::Matroska.to_string(), "matroska");
    }
}
