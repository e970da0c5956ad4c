/*!
    Conversion utilities between ffmpeg-next types and media-types.
*/

use bytes::Bytes;
use ffmpeg_next::codec::Id;
use media_types::{CodecId, Packet, Rational};

/**
    Convert ffmpeg_next::Rational to our Rational.
*/
pub(crate) fn rational_from_ffmpeg(r: ffmpeg_next::Rational) -> Rational {
    Rational::new(r.numerator(), r.denominator())
}

/**
    Map an FFmpeg codec ID onto the allow-list.
*/
pub(crate) fn codec_id_from_ffmpeg(id: Id) -> Option<CodecId> {
    match id {
        Id::H264 => Some(CodecId::H264),
        Id::HEVC => Some(CodecId::H265),
        Id::VP8 => Some(CodecId::Vp8),
        Id::VP9 => Some(CodecId::Vp9),
        Id::AV1 => Some(CodecId::Av1),
        Id::OPUS => Some(CodecId::Opus),
        _ => None,
    }
}

pub(crate) fn codec_id_to_ffmpeg(id: CodecId) -> Id {
    match id {
        CodecId::H264 => Id::H264,
        CodecId::H265 => Id::HEVC,
        CodecId::Vp8 => Id::VP8,
        CodecId::Vp9 => Id::VP9,
        CodecId::Av1 => Id::AV1,
        CodecId::Opus => Id::OPUS,
    }
}

/**
    Copy an FFmpeg packet into an owned packet.
*/
pub(crate) fn packet_from_ffmpeg(packet: &ffmpeg_next::Packet, time_base: Rational) -> Packet {
    Packet {
        data: packet.data().map(Bytes::copy_from_slice).unwrap_or_default(),
        pts: packet.pts(),
        dts: packet.dts(),
        duration: Some(packet.duration()).filter(|d| *d > 0),
        time_base,
        is_keyframe: packet.is_key(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_mapping() {
        for codec in CodecId::VIDEO.into_iter().chain(CodecId::AUDIO) {
            assert_eq!(codec_id_from_ffmpeg(codec_id_to_ffmpeg(codec)), Some(codec));
        }
        assert_eq!(codec_id_from_ffmpeg(Id::MPEG4), None);
        assert_eq!(codec_id_from_ffmpeg(Id::AAC), None);
        assert_eq!(codec_id_from_ffmpeg(Id::PCM_S16LE), None);
    }

    #[test]
    fn copies_packet_fields() {
        let mut raw = ffmpeg_next::Packet::copy(&[0, 0, 1, 0x65]);
        raw.set_pts(Some(90));
        raw.set_dts(Some(80));
        raw.set_duration(0);
        raw.set_flags(ffmpeg_next::packet::Flags::KEY);

        let packet = packet_from_ffmpeg(&raw, Rational::new(1, 1000));
        assert_eq!(&packet.data[..], &[0, 0, 1, 0x65]);
        assert_eq!(packet.pts, Some(90));
        assert_eq!(packet.dts, Some(80));
        assert_eq!(packet.duration, None);
        assert!(packet.is_keyframe);
    }
}
