//! Configuration management
//!
//! Settings live in `settings.json` inside the tally directory:
//! ```json
//! {
//!   "import": { "previewLimit": 10, "sampleRows": 5, "errorDetailLimit": 20 }
//! }
//! ```
//! Keys this crate does not manage are preserved on save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};

pub const SETTINGS_FILE: &str = "settings.json";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    import: ImportSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

fn default_preview_limit() -> usize {
    10
}

fn default_sample_rows() -> usize {
    5
}

fn default_error_detail_limit() -> usize {
    20
}

/// Tunables for the import pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSettings {
    /// Transactions shown in an import preview
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
    /// Raw rows shown when inspecting a file
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    /// Row errors listed in full before summarizing
    #[serde(default = "default_error_detail_limit")]
    pub error_detail_limit: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            preview_limit: default_preview_limit(),
            sample_rows: default_sample_rows(),
            error_detail_limit: default_error_detail_limit(),
        }
    }
}

/// Tally configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub import: ImportSettings,
}

impl Config {
    /// Load config from the tally directory
    ///
    /// A missing file yields defaults. `TALLY_PREVIEW_LIMIT` overrides
    /// `import.previewLimit`.
    pub fn load(tally_dir: &Path) -> Result<Self> {
        let raw = read_settings(tally_dir)?;
        let mut import = raw.import;

        if let Ok(value) = std::env::var("TALLY_PREVIEW_LIMIT") {
            import.preview_limit = value.trim().parse().map_err(|_| {
                Error::Config(format!("TALLY_PREVIEW_LIMIT must be a number, got '{}'", value))
            })?;
        }

        Ok(Self { import })
    }

    /// Save config to the tally directory, keeping unmanaged keys
    pub fn save(&self, tally_dir: &Path) -> Result<()> {
        let mut settings = read_settings(tally_dir)?;
        settings.import = self.import.clone();

        std::fs::create_dir_all(tally_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(tally_dir.join(SETTINGS_FILE), content)?;
        Ok(())
    }
}

fn read_settings(tally_dir: &Path) -> Result<SettingsFile> {
    let path = tally_dir.join(SETTINGS_FILE);
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Resolve the tally directory: `TALLY_DIR`, else `<home>/.tally`
pub fn default_tally_dir(home: Option<PathBuf>) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TALLY_DIR") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    home.map(|h| h.join(".tally"))
        .ok_or_else(|| Error::Config("cannot determine home directory; set TALLY_DIR".into()))
}
