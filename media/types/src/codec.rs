/*!
    Codec identifiers accepted by the demuxer.
*/

use std::fmt;

use crate::nal::{AnnexB, H264, H265};

/**
    Kind of an elementary stream.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Video => "video",
            Self::Audio => "audio",
        })
    }
}

/**
    A codec from the fixed allow-list.

    Streams using any other codec are rejected during demuxer setup, so a
    `CodecId` value always names something the transport can packetize.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodecId {
    H264,
    H265,
    Vp8,
    Vp9,
    Av1,
    Opus,
}

impl CodecId {
    /**
        All accepted video codecs.
    */
    pub const VIDEO: [CodecId; 5] = [
        CodecId::H264,
        CodecId::H265,
        CodecId::Vp8,
        CodecId::Vp9,
        CodecId::Av1,
    ];

    /**
        All accepted audio codecs.
    */
    pub const AUDIO: [CodecId; 1] = [CodecId::Opus];

    pub const fn kind(self) -> MediaKind {
        match self {
            Self::Opus => MediaKind::Audio,
            _ => MediaKind::Video,
        }
    }

    /**
        Short lowercase name, matching the FFmpeg decoder name.
    */
    pub const fn name(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::Opus => "opus",
        }
    }

    /**
        Returns the NAL header convention for codecs carried as Annex-B.
    */
    pub fn annexb(self) -> Option<&'static dyn AnnexB> {
        match self {
            Self::H264 => Some(&H264),
            Self::H265 => Some(&H265),
            _ => None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert!(CodecId::VIDEO.iter().all(|c| c.kind() == MediaKind::Video));
        assert_eq!(CodecId::Opus.kind(), MediaKind::Audio);
    }

    #[test]
    fn annexb_only_for_nal_codecs() {
        assert!(CodecId::H264.annexb().is_some());
        assert!(CodecId::H265.annexb().is_some());
        assert!(CodecId::Vp8.annexb().is_none());
        assert!(CodecId::Av1.annexb().is_none());
    }
}
