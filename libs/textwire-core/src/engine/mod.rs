mod postprocess;
mod preprocess;
mod tesseract;
mod types;

pub use preprocess::clean_image;
pub use tesseract::TesseractEngine;
pub use types::EngineConfig;

use crate::error::OcrError;

/// Common interface of the recognition backends.
///
/// An engine instance is not reentrant: the worker pool pins one engine to
/// one worker and serializes calls on it.
pub trait OcrEngine: Send {
    fn name(&self) -> &'static str;

    /// Decode the encoded image bytes, run recognition, and return the
    /// cleaned-up text. An empty string is a valid outcome.
    fn recognize(&mut self, data: &[u8]) -> Result<String, OcrError>;
}
