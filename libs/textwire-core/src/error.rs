use thiserror::Error;

/// Failures of the recognition path. The `Display` strings double as the
/// `error_message` prefixes on the wire, so they are part of the contract.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("engine init failed: {0}")]
    Init(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("ocr engine error: {0}")]
    Engine(String),
}
