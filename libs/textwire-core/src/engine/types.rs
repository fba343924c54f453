use serde::{Deserialize, Serialize};

/// Recognition profile of an engine instance. Fixed at construction; every
/// worker in a pool shares the same profile.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub language: String,
    pub psm: Option<u32>, // page segmentation mode
    pub oem: Option<u32>, // engine mode
    pub dpi: Option<u32>,
    /// Restrict recognition to these characters, if set.
    pub char_whitelist: Option<String>,
}

impl EngineConfig {
    pub fn new(
        language: impl Into<String>,
        psm: Option<u32>,
        oem: Option<u32>,
        dpi: Option<u32>,
        char_whitelist: Option<String>,
    ) -> Self {
        Self {
            language: language.into(),
            psm,
            oem,
            dpi,
            char_whitelist,
        }
    }

    pub fn get_default_language() -> String {
        "eng".to_string()
    }

    // Single uniform block of text.
    pub fn get_default_psm() -> u32 {
        6
    }

    pub fn get_default_oem() -> u32 {
        1
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language: Self::get_default_language(),
            psm: Some(Self::get_default_psm()),
            oem: Some(Self::get_default_oem()),
            dpi: None,
            char_whitelist: None,
        }
    }
}
