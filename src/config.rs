//! Settings loaded from `.gtags-nav.yml`.
//!
//! Format:
//! ```yaml
//! extra_tag_paths:
//!   - /usr/include
//!   - ~/src/vendor
//! cache_search_results: true
//! show_relative_paths: true
//! show_panel_for_single_match: false
//! update_on_save: true
//! watch_debounce_ms: 500
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GtagsError, Result};

/// Name of the settings file looked up in a tag root.
pub const SETTINGS_FILENAME: &str = ".gtags-nav.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Extra directories searched for definitions outside the root (GTAGSLIBPATH).
    pub extra_tag_paths: Vec<PathBuf>,

    /// Reuse the last full symbol listing per root.
    pub cache_search_results: bool,

    /// Show match paths relative to the root.
    pub show_relative_paths: bool,

    /// Offer a choice even when there is exactly one match.
    pub show_panel_for_single_match: bool,

    /// Incrementally update tags when a file is saved.
    pub update_on_save: bool,

    /// Debounce window for watch mode.
    pub watch_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extra_tag_paths: Vec::new(),
            cache_search_results: false,
            show_relative_paths: false,
            show_panel_for_single_match: false,
            update_on_save: true,
            watch_debounce_ms: 500,
        }
    }
}

impl Settings {
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| GtagsError::Config(format!("Invalid settings: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GtagsError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Load `explicit` if given, else `<root>/.gtags-nav.yml` if present, else defaults.
    pub fn discover(explicit: Option<&Path>, root: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Some(root) = root {
            let candidate = root.join(SETTINGS_FILENAME);
            if candidate.is_file() {
                tracing::debug!("Loading settings from {}", candidate.display());
                return Self::load(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Append extra tag paths given on the command line.
    pub fn with_extra_paths(mut self, extra: impl IntoIterator<Item = PathBuf>) -> Self {
        self.extra_tag_paths.extend(extra);
        self
    }
}

/// Settings lookup for front-ends that serve many roots: an explicit file if
/// given, else the `.gtags-nav.yml` of whichever root a request falls in, plus
/// extra paths from the command line.
#[derive(Debug, Clone, Default)]
pub struct SettingsSource {
    pub config: Option<PathBuf>,
    pub extra_paths: Vec<PathBuf>,
}

impl SettingsSource {
    /// Settings for the tag root containing `start`; defaults outside any root.
    pub fn resolve(&self, start: &Path) -> Result<Settings> {
        let root = crate::store::find_root(start);
        let settings = Settings::discover(self.config.as_deref(), root.as_deref())?;
        Ok(settings.with_extra_paths(self.extra_paths.iter().cloned()))
    }
}
