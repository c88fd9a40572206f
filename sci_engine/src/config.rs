use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sci_formats::{Endian, SciVersion};
use serde::{Deserialize, Serialize};

use crate::object::ObjectFormat;
use crate::selector::SelectorTable;

/// Interpreter settings fixed for the lifetime of a heap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub version: SciVersion,
    pub endian: Endian,
    /// Use the 24..=43 view-visible selector range instead of 26..=44.
    pub alternate_selectors: bool,
    /// Whether `ScriptLock::Lock` pins script segments against eviction.
    pub pin_segments: bool,
    /// JSON list of selector names, used when no vocabulary resource is found.
    pub selector_vocab: Option<PathBuf>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            version: SciVersion::Sci0Late,
            endian: Endian::Little,
            alternate_selectors: false,
            pin_segments: true,
            selector_vocab: None,
        }
    }
}

impl VmConfig {
    /// Loads the configuration, falling back to defaults when no file is
    /// given or the file does not exist.
    pub fn from_json_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(VmConfig::default());
        };
        if !path.exists() {
            log::warn!("config {} not found, using defaults", path.display());
            return Ok(VmConfig::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config json: {}", path.display()))
    }

    pub fn object_format(&self, selectors: &SelectorTable) -> ObjectFormat {
        ObjectFormat {
            version: self.version,
            endian: self.endian,
            selector_count: selectors.count_registered(),
            name_selector: selectors.selector_by_name("name"),
            alternate_selectors: self.alternate_selectors,
        }
    }
}
