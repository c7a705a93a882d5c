//! Editor-level navigation commands on top of [`TagStore`].
//!
//! This is what an editor front-end binds to keys: list every symbol, go to a
//! definition, find references, jump back, and refresh tags on save. Results
//! are plain data; rendering quick panels or status messages is left to the
//! front-end.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Settings;
use crate::error::{GtagsError, Result};
use crate::parser::SymbolRecord;
use crate::process::{CommandRunner, CommandStatus, RunOptions};
use crate::session::{Location, SessionRegistry};
use crate::store::{find_root, require_root, TagStore, UpdateOutcome};
use crate::version::{self, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Definition,
    Reference,
}

impl SearchKind {
    fn is_reference(self) -> bool {
        self == SearchKind::Reference
    }

    pub fn not_found_message(self, symbol: &str) -> String {
        match self {
            SearchKind::Definition => format!("The symbol \"{}\" was not found", symbol),
            SearchKind::Reference => format!("References to \"{}\" were not found", symbol),
        }
    }
}

/// One entry of a match list: display label, display location and target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub label: String,
    pub location: String,
    pub target: Location,
}

/// What the front-end should do after a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Navigation {
    /// Open this location. The origin has already been pushed onto history.
    Jump { target: Location },
    /// Let the user pick, then call [`Navigator::select`].
    Choose { choices: Vec<Choice> },
    NotFound { message: String },
}

/// Result of the save hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// `update_on_save` is off.
    Disabled,
    /// The file is not under any tag root.
    NoRoot,
    Unsupported {
        installed: Option<Version>,
        required: String,
    },
    Updated { root: PathBuf },
    Failed { root: PathBuf, stderr: String },
}

/// Navigation commands sharing one settings object and one session registry.
#[derive(Debug, Clone)]
pub struct Navigator {
    settings: Settings,
    registry: SessionRegistry,
}

impl Navigator {
    pub fn new(settings: Settings, registry: SessionRegistry) -> Self {
        Self { settings, registry }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Open the store for the root containing `file`.
    pub fn open(&self, file: &Path) -> Result<TagStore> {
        let root = require_root(file)?;
        self.open_root(root)
    }

    pub fn open_root(&self, root: impl Into<PathBuf>) -> Result<TagStore> {
        TagStore::new(root, self.settings.extra_tag_paths.clone())
    }

    /// Every symbol in the root, from cache when `cache_search_results` is on.
    pub fn show_symbols<R: CommandRunner>(&self, store: &TagStore<R>) -> Result<Vec<String>> {
        let root = store.root().to_string_lossy();
        let caching = self.settings.cache_search_results;

        if caching {
            if let Some(symbols) = self.registry.load_symbols(&root) {
                tracing::debug!("Using cached symbols for {}", root);
                return Ok(symbols);
            }
        }

        let symbols = store.by_prefix("")?;
        if caching {
            self.registry.store_symbols(&root, symbols.clone());
        }
        Ok(symbols)
    }

    /// Look up `symbol` and decide whether to jump directly or offer a choice.
    pub fn search<R: CommandRunner>(
        &self,
        store: &TagStore<R>,
        symbol: &str,
        kind: SearchKind,
        origin: Option<&Location>,
    ) -> Result<Navigation> {
        let matches = store.match_pattern(symbol, kind.is_reference())?;
        Ok(self.navigation_for(store.root(), matches, symbol, kind, origin))
    }

    fn navigation_for(
        &self,
        root: &Path,
        matches: Vec<SymbolRecord>,
        symbol: &str,
        kind: SearchKind,
        origin: Option<&Location>,
    ) -> Navigation {
        if matches.is_empty() {
            return Navigation::NotFound {
                message: kind.not_found_message(symbol),
            };
        }

        let mut choices: Vec<Choice> = matches
            .iter()
            .map(|record| self.choice_for(root, record))
            .collect();

        if choices.len() == 1 && !self.settings.show_panel_for_single_match {
            let choice = choices.remove(0);
            return Navigation::Jump {
                target: self.select(root, origin, &choice),
            };
        }

        Navigation::Choose { choices }
    }

    fn choice_for(&self, root: &Path, record: &SymbolRecord) -> Choice {
        let path = Path::new(&record.path);
        let shown = if self.settings.show_relative_paths {
            path.strip_prefix(root).unwrap_or(path)
        } else {
            path
        };

        Choice {
            label: record.context.trim().to_string(),
            location: format!("{}:{}", shown.display(), record.line_number),
            target: Location::new(record.path.clone(), record.line_number, 1),
        }
    }

    /// Record `origin` in the root's history and return the chosen target.
    pub fn select(&self, root: &Path, origin: Option<&Location>, choice: &Choice) -> Location {
        if let Some(origin) = origin {
            self.registry
                .push_jump(&root.to_string_lossy(), origin.encode());
        }
        choice.target.clone()
    }

    /// Pop the last origin recorded for the root containing `file`.
    pub fn jump_back(&self, file: &Path) -> Result<Location> {
        let root = require_root(file)?;
        let encoded = self.registry.pop_jump(&root.to_string_lossy())?;
        encoded.parse()
    }

    /// Save hook: single-file update of `file` in its root.
    pub fn on_save(&self, file: &Path) -> Result<SaveOutcome> {
        if !self.settings.update_on_save {
            return Ok(SaveOutcome::Disabled);
        }
        let Some(root) = find_root(file) else {
            return Ok(SaveOutcome::NoRoot);
        };
        let store = self.open_root(root)?;
        self.update_in(&store, file)
    }

    /// Update `file` through an already opened store and drop the root's
    /// cached symbol listing.
    pub fn update_in<R: CommandRunner>(
        &self,
        store: &TagStore<R>,
        file: &Path,
    ) -> Result<SaveOutcome> {
        let root = store.root().to_path_buf();
        let outcome = match store.update_file(file)? {
            UpdateOutcome::Unsupported { installed } => {
                let err = GtagsError::Unsupported {
                    operation: "Incremental single file update",
                    installed: installed.clone(),
                    required: Version::parse(version::SINGLE_UPDATE_ARRIVAL)?,
                };
                tracing::warn!("{}", err);
                return Ok(SaveOutcome::Unsupported {
                    installed,
                    required: version::SINGLE_UPDATE_ARRIVAL.to_string(),
                });
            }
            UpdateOutcome::Updated => {
                tracing::info!("Tags updated successfully for {}", file.display());
                SaveOutcome::Updated { root: root.clone() }
            }
            UpdateOutcome::Failed { stderr } => SaveOutcome::Failed {
                root: root.clone(),
                stderr,
            },
        };

        self.registry.clear_symbols(&root.to_string_lossy());
        Ok(outcome)
    }

    /// Full rebuild of a root, dropping its cached symbol listing.
    pub fn rebuild<R: CommandRunner>(
        &self,
        store: &TagStore<R>,
        options: RunOptions,
    ) -> Result<CommandStatus> {
        let status = store.rebuild_with(options)?;
        self.registry.clear_symbols(&store.root().to_string_lossy());
        Ok(status)
    }
}
