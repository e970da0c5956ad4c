/*!
    Encoded packets handed from the demuxer to consumers.
*/

use std::time::Duration;

use bytes::Bytes;

use crate::Rational;

/**
    A timestamped unit of encoded data.

    The payload is reference counted, so cloning a packet (for example to hand
    a keyframe to the preview renderer) does not copy the data.
*/
#[derive(Clone, Debug)]
pub struct Packet {
    /// Encoded payload. Video payloads are Annex-B framed for H.264/H.265.
    pub data: Bytes,
    /// Presentation timestamp in `time_base` units.
    pub pts: Option<i64>,
    /// Decode timestamp in `time_base` units.
    pub dts: Option<i64>,
    /// Duration in `time_base` units, if known.
    pub duration: Option<i64>,
    /// Time base of the timestamps.
    pub time_base: Rational,
    /// Random access point.
    pub is_keyframe: bool,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>, time_base: Rational) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            duration: None,
            time_base,
            is_keyframe: false,
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_keyframe(mut self, is_keyframe: bool) -> Self {
        self.is_keyframe = is_keyframe;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /**
        Presentation time, falling back to the decode timestamp.
    */
    pub fn presentation_time(&self) -> Option<Duration> {
        self.pts
            .or(self.dts)
            .and_then(|ts| self.time_base.to_duration(ts))
    }

    /**
        Duration as wall-clock time. Zero and missing durations yield `None`.
    */
    pub fn duration_time(&self) -> Option<Duration> {
        self.duration
            .filter(|d| *d > 0)
            .and_then(|d| self.time_base.to_duration(d))
    }
}
