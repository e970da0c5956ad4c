/*!
    Preview configuration.
*/

/**
    Viewport and quality of preview images.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreviewConfig {
    /// Maximum image width in pixels.
    pub max_width: u32,
    /// Maximum image height in pixels.
    pub max_height: u32,
    /// JPEG quality, 1 to 100.
    pub quality: u8,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_width: 1024,
            max_height: 576,
            quality: 80,
        }
    }
}

impl PreviewConfig {
    /**
        Output size for a `width` x `height` source.
    */
    pub fn fit(&self, width: u32, height: u32) -> (u32, u32) {
        box_fit(width, height, self.max_width, self.max_height)
    }
}

/**
    Scale `width` x `height` down to fit inside `max_width` x `max_height`,
    keeping the aspect ratio. Sizes that already fit are returned unchanged.
    Neither side is ever rounded down to zero.
*/
pub fn box_fit(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let fit = |side: u32, max: u32| ((side as f64 * scale).round() as u32).clamp(1, max.max(1));
    (fit(width, max_width), fit(height, max_height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downscales_keeping_aspect() {
        assert_eq!(box_fit(1920, 1080, 1024, 576), (1024, 576));
        assert_eq!(box_fit(1080, 1920, 1024, 576), (324, 576));
        assert_eq!(box_fit(2048, 576, 1024, 576), (1024, 288));
    }

    #[test]
    fn never_upscales() {
        assert_eq!(box_fit(640, 360, 1024, 576), (640, 360));
        assert_eq!(box_fit(1024, 576, 1024, 576), (1024, 576));
    }

    #[test]
    fn extreme_aspect_keeps_one_pixel() {
        assert_eq!(box_fit(10_000, 1, 1024, 576), (1024, 1));
    }

    #[test]
    fn default_viewport() {
        let config = PreviewConfig::default();
        assert_eq!(config.fit(3840, 2160), (1024, 576));
        assert_eq!(config.quality, 80);
    }
}
