//! Configuration loading from dexmember.toml.
//!
//! ```toml
//! mapping = "build/outputs/mapping/release/mapping.txt"
//!
//! [desugaring]
//! min_api_level = 21
//! library_archives = ["android.jar"]
//!
//! [output]
//! format = "json"
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::desugar::{DesugarConfig, DEFAULT_MIN_API_LEVEL};
use crate::error::DexMemberError;

pub const CONFIG_FILE_NAME: &str = "dexmember.toml";

/// Main configuration structure for dexmember.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DexMemberConfig {
    /// ProGuard/R8 mapping file applied to every member.
    pub mapping: Option<PathBuf>,
    /// Desugaring settings for class-file inputs.
    pub desugaring: Option<DesugaringSection>,
    /// Output configuration.
    pub output: Option<OutputConfig>,
}

/// `[desugaring]` table.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DesugaringSection {
    pub min_api_level: Option<u32>,
    #[serde(default)]
    pub library_archives: Vec<PathBuf>,
}

/// Output format configuration.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Output format: "plain" or "json".
    pub format: Option<String>,
}

impl DexMemberConfig {
    /// Desugaring settings, with defaults for anything left out.
    pub fn desugar_config(&self) -> DesugarConfig {
        match &self.desugaring {
            Some(section) => DesugarConfig::new(
                section.min_api_level.unwrap_or(DEFAULT_MIN_API_LEVEL),
                section.library_archives.clone(),
            ),
            None => DesugarConfig::default(),
        }
    }

    /// Whether the configured output format is JSON.
    pub fn wants_json(&self) -> bool {
        self.output
            .as_ref()
            .and_then(|o| o.format.as_deref())
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(mapping) = self.mapping.as_mut() {
            resolve(mapping);
        }
        if let Some(section) = self.desugaring.as_mut() {
            section.library_archives.iter_mut().for_each(resolve);
        }
    }
}

/// Loads configuration from dexmember.toml in `root` if it exists.
pub fn load_config(root: &Path) -> Result<Option<DexMemberConfig>> {
    let path = root.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }
    load_config_file(&path).map(Some)
}

/// Loads configuration from an explicit file.
pub fn load_config_file(path: &Path) -> Result<DexMemberConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut cfg: DexMemberConfig =
        toml::from_str(&content).map_err(|e| DexMemberError::config(path, e.to_string()))?;
    if let Some(base) = path.parent() {
        cfg.resolve_paths(base);
    }
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(cfg)
}
