/*!
    JPEG compression of preview images.
*/

use bytes::Bytes;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use crate::error::PreviewError;

pub(crate) fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes, PreviewError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(image)?;
    Ok(Bytes::from(out))
}
