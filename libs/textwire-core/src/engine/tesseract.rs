use std::collections::HashMap;

use image::DynamicImage;
use rusty_tesseract::{Args, Image};

use super::postprocess::clean_text;
use super::preprocess::clean_image;
use super::{EngineConfig, OcrEngine};
use crate::error::OcrError;

/// Tesseract-backed engine. Construction probes the recognizer and freezes
/// the recognition profile; a failed probe is fatal for this instance.
/// Recognition runs the tesseract binary per call, isolating recognizer
/// crashes from the server process.
pub struct TesseractEngine {
    args: Args,
}

impl TesseractEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, OcrError> {
        let version = rusty_tesseract::get_tesseract_version()
            .map_err(|e| OcrError::Init(format!("tesseract unavailable: {}", e)))?;
        log::debug!("tesseract version: {}", version.trim());

        // Dictionary-assisted recognition stays off; it bloats resident
        // memory per engine.
        let mut config_variables = HashMap::from([
            ("load_system_dawg".into(), "0".into()),
            ("load_freq_dawg".into(), "0".into()),
            ("load_unambig_dawg".into(), "0".into()),
            ("load_punc_dawg".into(), "0".into()),
            ("load_number_dawg".into(), "0".into()),
            ("load_bigram_dawg".into(), "0".into()),
        ]);
        if let Some(whitelist) = &config.char_whitelist {
            config_variables.insert("tessedit_char_whitelist".into(), whitelist.clone());
        }

        let args = Args {
            lang: config.language.clone(),
            config_variables,
            dpi: config.dpi.map(|v| v as i32),
            psm: config.psm.map(|v| v as i32),
            oem: config.oem.map(|v| v as i32),
        };

        Ok(Self { args })
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&mut self, data: &[u8]) -> Result<String, OcrError> {
        let decoded =
            image::load_from_memory(data).map_err(|e| OcrError::Decode(e.to_string()))?;

        let cleaned = clean_image(&decoded);

        let ocr_image = Image::from_dynamic_image(&DynamicImage::ImageLuma8(cleaned))
            .map_err(|e| OcrError::Engine(e.to_string()))?;
        let raw = rusty_tesseract::image_to_string(&ocr_image, &self.args)
            .map_err(|e| OcrError::Engine(e.to_string()))?;

        Ok(clean_text(&raw))
    }
}
