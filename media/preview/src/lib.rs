/*!
    Still-image previews of a live video stream.

    A [`PreviewRenderer`] decodes keyframes through a native decoder on the
    media engine thread, scales the picture into a bounded viewport and
    compresses it to JPEG off the async runtime.
*/

mod config;
mod decoder;
mod encode;
mod error;
mod renderer;

pub use config::{PreviewConfig, box_fit};
pub use error::PreviewError;
pub use renderer::PreviewRenderer;
