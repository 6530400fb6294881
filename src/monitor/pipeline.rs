//! Locate, capture, preprocess and recognize: the shared front half of a tick.

use image::{DynamicImage, RgbaImage};
use tracing::debug;

use crate::capture::{Desktop, FrameCapture, Resolution, WindowHandle, WindowLocator};
use crate::config::MonitorConfig;
use crate::ocr::{preprocess, OcrEngine};

/// One captured frame and its recognized text.
pub struct Frame {
    pub original: RgbaImage,
    pub processed: DynamicImage,
    pub text: String,
}

/// Chooses the capture source for this tick.
pub fn resolve_source(desktop: &dyn Desktop, config: &MonitorConfig) -> Resolution {
    WindowLocator::new(desktop).resolve(config)
}

/// Captures `window` (or the full screen) and runs OCR on it.
/// Returns `None` when no image could be captured.
pub fn read_frame(
    desktop: &dyn Desktop,
    ocr: &dyn OcrEngine,
    window: Option<&WindowHandle>,
    config: &MonitorConfig,
) -> Option<Frame> {
    let original = FrameCapture::new(desktop).capture(window)?;
    let processed = preprocess(&original, config.preprocess.open_kernel);
    let text = ocr.recognize(&processed, &config.ocr.page_segmentation_mode);
    debug!("OCR text: {:?}", text.trim());

    Some(Frame {
        original,
        processed,
        text,
    })
}
