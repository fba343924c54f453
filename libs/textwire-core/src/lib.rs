pub mod common;
pub mod engine;
pub mod error;
pub mod governor;
pub mod pool;
pub mod service;
pub mod session;

pub use common::{init_logger, Settings};
pub use error::OcrError;

pub mod proto {
    tonic::include_proto!("ocr");

    impl OcrResult {
        pub fn ok(image_id: impl Into<String>, extracted_text: String) -> Self {
            Self {
                image_id: image_id.into(),
                extracted_text,
                success: true,
                error_message: String::new(),
            }
        }

        pub fn failure(image_id: impl Into<String>, error_message: impl Into<String>) -> Self {
            Self {
                image_id: image_id.into(),
                extracted_text: String::new(),
                success: false,
                error_message: error_message.into(),
            }
        }
    }
}
