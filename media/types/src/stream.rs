/*!
    Stream descriptors emitted once during demuxer setup.
*/

use crate::{CodecId, Rational};

/**
    Information about the tracked video stream.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct VideoStreamInfo {
    /// Index of the stream inside the container.
    pub index: usize,
    /// Codec used.
    pub codec_id: CodecId,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame rate (unavailable for some variable rate streams).
    pub frame_rate: Option<Rational>,
    /// Time base for packet timestamps.
    pub time_base: Rational,
}

impl VideoStreamInfo {
    /**
        Returns the frame rate as fps, if available.
    */
    pub fn fps(&self) -> Option<f64> {
        self.frame_rate.map(|r| r.to_f64())
    }

    /**
        Duration of one frame in `time_base` units, if the frame rate is known.
    */
    pub fn frame_duration(&self) -> Option<i64> {
        let rate = self.frame_rate?;
        let ticks = Rational::new(rate.den, rate.num).rescale(1, self.time_base);
        (ticks > 0).then_some(ticks)
    }
}

/**
    Information about the tracked audio stream.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct AudioStreamInfo {
    /// Index of the stream inside the container.
    pub index: usize,
    /// Codec used.
    pub codec_id: CodecId,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u16,
    /// Time base for packet timestamps.
    pub time_base: Rational,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(frame_rate: Option<Rational>) -> VideoStreamInfo {
        VideoStreamInfo {
            index: 0,
            codec_id: CodecId::H264,
            width: 1280,
            height: 720,
            frame_rate,
            time_base: Rational::new(1, 1000),
        }
    }

    #[test]
    fn fps() {
        assert_eq!(video(Some(Rational::new(30, 1))).fps(), Some(30.0));
        assert_eq!(video(None).fps(), None);
    }

    #[test]
    fn frame_duration_in_time_base() {
        assert_eq!(video(Some(Rational::new(25, 1))).frame_duration(), Some(40));
        assert_eq!(video(Some(Rational::new(30000, 1001))).frame_duration(), Some(33));
        assert_eq!(video(None).frame_duration(), None);
    }
}
