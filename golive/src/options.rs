/*!
    Playback options.
*/

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use media_demux::{ContainerFormat, DemuxConfig};
use media_preview::PreviewConfig;
use media_types::VideoStreamInfo;
use serde::Deserialize;

/// Frame rate announced when the stream does not carry one.
const FALLBACK_FPS: f64 = 30.0;

/**
    How the stream is presented on the transport.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamMode {
    /// Dedicated stream channel, screen-share style.
    #[default]
    GoLive,
    /// Video on the primary media channel.
    Camera,
}

/// Computes a dimension from the probed video stream.
pub type DeriveFn = Arc<dyn Fn(&VideoStreamInfo) -> f64 + Send + Sync>;

/**
    An announced video dimension: a literal, or computed from the stream.
*/
#[derive(Clone)]
pub enum Dimension {
    Fixed(f64),
    Derived(DeriveFn),
}

impl Dimension {
    /**
        A dimension computed by `f`, which may capture state.
    */
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(&VideoStreamInfo) -> f64 + Send + Sync + 'static,
    {
        Self::Derived(Arc::new(f))
    }

    /**
        Evaluate against `info`, rounded to the nearest integer.
    */
    pub fn resolve(&self, info: &VideoStreamInfo) -> u32 {
        let value = match self {
            Self::Fixed(v) => *v,
            Self::Derived(f) => f(info),
        };
        if value.is_finite() && value > 0.0 {
            value.round().min(u32::MAX as f64) as u32
        } else {
            0
        }
    }

    fn is_usable(&self) -> bool {
        match self {
            Self::Fixed(v) => v.is_finite() && *v > 0.0,
            Self::Derived(_) => true,
        }
    }
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(v) => f.debug_tuple("Fixed").field(v).finish(),
            Self::Derived(_) => f.write_str("Derived"),
        }
    }
}

fn stream_width(info: &VideoStreamInfo) -> f64 {
    info.width as f64
}

fn stream_height(info: &VideoStreamInfo) -> f64 {
    info.height as f64
}

fn stream_fps(info: &VideoStreamInfo) -> f64 {
    info.fps().filter(|f| f.is_finite() && *f > 0.0).unwrap_or(FALLBACK_FPS)
}

/**
    Options for [`crate::play`].
*/
#[derive(Clone, Debug)]
pub struct PlayOptions {
    pub mode: StreamMode,
    pub demux: DemuxConfig,
    pub width: Dimension,
    pub height: Dimension,
    pub frame_rate: Dimension,
    /// Unpaced start until the video reaches this position.
    pub initial_burst: Option<Duration>,
    /// Push keyframe previews to the transport. Go-live mode only.
    pub preview: bool,
    pub preview_config: PreviewConfig,
    /// How far video may run ahead of audio.
    pub sync_tolerance: Duration,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            mode: StreamMode::default(),
            demux: DemuxConfig::default(),
            width: Dimension::derived(stream_width),
            height: Dimension::derived(stream_height),
            frame_rate: Dimension::derived(stream_fps),
            initial_burst: None,
            preview: false,
            preview_config: PreviewConfig::default(),
            sync_tolerance: Duration::from_millis(20),
        }
    }
}

impl PlayOptions {
    pub fn with_mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_format(mut self, format: ContainerFormat) -> Self {
        self.demux.format = format;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.demux.channel_capacity = capacity;
        self
    }

    pub fn with_width(mut self, width: Dimension) -> Self {
        self.width = width;
        self
    }

    pub fn with_height(mut self, height: Dimension) -> Self {
        self.height = height;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: Dimension) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_initial_burst(mut self, burst: Duration) -> Self {
        self.initial_burst = Some(burst);
        self
    }

    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_sync_tolerance(mut self, tolerance: Duration) -> Self {
        self.sync_tolerance = tolerance;
        self
    }

    /**
        Replace unusable values with defaults.

        Literal dimensions that are not finite and positive fall back to the
        stream's own values, and a zero burst means no burst.
    */
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if !self.width.is_usable() {
            self.width = defaults.width;
        }
        if !self.height.is_usable() {
            self.height = defaults.height;
        }
        if !self.frame_rate.is_usable() {
            self.frame_rate = defaults.frame_rate;
        }
        self.initial_burst = self.initial_burst.filter(|b| !b.is_zero());
        self
    }
}

/**
    Serializable subset of [`PlayOptions`], for configuration files.
*/
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaySettings {
    pub mode: StreamMode,
    pub format: ContainerFormat,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub frame_rate: Option<f64>,
    pub initial_burst_ms: Option<u64>,
    pub preview: bool,
    pub channel_capacity: Option<usize>,
    pub sync_tolerance_ms: Option<u64>,
}

impl From<PlaySettings> for PlayOptions {
    fn from(settings: PlaySettings) -> Self {
        let mut options = PlayOptions::default()
            .with_mode(settings.mode)
            .with_format(settings.format)
            .with_preview(settings.preview);
        if let Some(width) = settings.width {
            options.width = Dimension::Fixed(width);
        }
        if let Some(height) = settings.height {
            options.height = Dimension::Fixed(height);
        }
        if let Some(fps) = settings.frame_rate {
            options.frame_rate = Dimension::Fixed(fps);
        }
        if let Some(ms) = settings.initial_burst_ms {
            options.initial_burst = Some(Duration::from_millis(ms));
        }
        if let Some(capacity) = settings.channel_capacity {
            options.demux.channel_capacity = capacity;
        }
        if let Some(ms) = settings.sync_tolerance_ms {
            options.sync_tolerance = Duration::from_millis(ms);
        }
        options.normalized()
    }
}
