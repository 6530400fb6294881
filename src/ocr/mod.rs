//! Text recognition for captured frames.
//!
//! This module provides:
//! - Frame binarization for OCR (`preprocess`)
//! - The recognition service and its Tesseract adapter (`OcrEngine`)
//! - Queue status extraction from recognized text (`TextAnalyzer`)

pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod setup;

pub use engine::{OcrEngine, TesseractEngine};
pub use extract::{validate_pattern, QueueStatus, TextAnalyzer, TextSignal};
pub use preprocess::preprocess;
