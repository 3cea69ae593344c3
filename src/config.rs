use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::nes::cartridge::TvSystem;

/// Runtime settings for an emulator instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Directory for `.prgram` save files. `None` keeps them next to the ROM.
    pub save_dir: Option<PathBuf>,
    /// Append-only failure log. `None` disables it.
    pub error_log: Option<PathBuf>,
    /// Forces the timing instead of trusting the ROM header.
    pub tv_system: Option<TvSystem>,
    pub debug_event_capacity: usize,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            save_dir: None,
            error_log: Some(PathBuf::from(crate::nes::sink::FileErrorLog::DEFAULT_PATH)),
            tv_system: None,
            debug_event_capacity: 512,
        }
    }
}

impl EmulatorConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid emulator config JSON")
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in {}", path.display()))
    }
}
