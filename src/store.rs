//! Tag database façade: root discovery and the GNU GLOBAL command set.
//!
//! Every indexer command line lives in this module. All operations block
//! until the child exits; run `rebuild` and large `match_pattern` calls off
//! the UI thread (see [`crate::tasks`]).

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::error::{GtagsError, Result};
use crate::parser::{self, OutputGrammar, ResultParser, SymbolRecord};
use crate::paths::{self, PathStyle};
use crate::process::{quote_arg, CommandRunner, CommandStatus, RunOptions, SubprocessRunner};
use crate::version::{self, Version};

/// File whose presence marks a directory as a tag root.
pub const MARKER_FILE: &str = "GTAGS";

/// Find the closest directory at or above `start` that contains [`MARKER_FILE`].
///
/// If `start` is not a directory the search begins at its parent. Stops at
/// the filesystem root.
pub fn find_root(start: impl AsRef<Path>) -> Option<PathBuf> {
    let start = start.as_ref();
    let absolute = if start.is_absolute() {
        paths::lexical_clean(start)
    } else {
        paths::lexical_clean(&std::env::current_dir().ok()?.join(start))
    };

    let mut current = if absolute.is_dir() {
        Some(absolute.as_path())
    } else {
        absolute.parent()
    };

    while let Some(dir) = current {
        if dir.join(MARKER_FILE).is_file() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// [`find_root`], turning a miss into [`GtagsError::RootNotFound`].
pub fn require_root(start: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start.as_ref();
    find_root(start).ok_or_else(|| GtagsError::RootNotFound(start.to_path_buf()))
}

/// Result of a single-file incremental update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Updated,
    Failed { stderr: String },
    /// The installed tool predates `gtags --single-update`; nothing was run.
    Unsupported { installed: Option<Version> },
}

impl UpdateOutcome {
    pub fn success(&self) -> bool {
        matches!(self, UpdateOutcome::Updated)
    }

    /// Convert `Unsupported` into a [`GtagsError::Unsupported`] for callers
    /// that prefer to propagate it.
    pub fn into_result(self) -> Result<Self> {
        match self {
            UpdateOutcome::Unsupported { installed } => Err(GtagsError::Unsupported {
                operation: "Incremental single file update",
                installed,
                required: Version::parse(version::SINGLE_UPDATE_ARRIVAL)?,
            }),
            other => Ok(other),
        }
    }
}

/// Client for the tag database rooted at one directory.
pub struct TagStore<R: CommandRunner = SubprocessRunner> {
    root: PathBuf,
    extra_paths: Vec<PathBuf>,
    runner: R,
    style: PathStyle,
    version: OnceCell<Option<Version>>,
}

impl TagStore<SubprocessRunner> {
    pub fn new(root: impl Into<PathBuf>, extra_paths: Vec<PathBuf>) -> Result<Self> {
        let root = root.into();
        let runner = SubprocessRunner::new(&root, &extra_paths)?;
        Ok(Self::with_runner(root, extra_paths, runner))
    }
}

impl<R: CommandRunner> TagStore<R> {
    pub fn with_runner(root: impl Into<PathBuf>, extra_paths: Vec<PathBuf>, runner: R) -> Self {
        Self {
            root: root.into(),
            extra_paths,
            runner,
            style: PathStyle::current(),
            version: OnceCell::new(),
        }
    }

    /// Skip the version query by declaring the installed version up front.
    pub fn with_known_version(self, version: Option<Version>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(version);
        Self {
            version: cell,
            ..self
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extra_paths(&self) -> &[PathBuf] {
        &self.extra_paths
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Installed GNU GLOBAL version, or `None` if the banner is unrecognized.
    ///
    /// Queried once per store.
    pub fn version(&self) -> Result<Option<Version>> {
        self.version
            .get_or_try_init(|| {
                let stdout = self
                    .runner
                    .stdout("global --version", &RunOptions::default().silent())?;
                let text = String::from_utf8_lossy(&stdout);
                let first = text.lines().next().unwrap_or_default();
                let version = Version::from_banner(first);
                if version.is_none() {
                    tracing::warn!("Unrecognized `global --version` banner: {:?}", first);
                }
                Ok(version)
            })
            .cloned()
    }

    /// Output grammar for the installed tool.
    pub fn grammar(&self) -> Result<OutputGrammar> {
        Ok(OutputGrammar::for_version(self.version()?.as_ref()))
    }

    /// Symbol names starting with `prefix`. An empty prefix lists every symbol.
    pub fn by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let command = if prefix.is_empty() {
            "global -c".to_string()
        } else {
            format!("global -c {}", quote_arg(prefix)?)
        };
        let stdout = self.runner.stdout(&command, &RunOptions::default().silent())?;
        Ok(parser::parse_lines(&stdout))
    }

    /// Definitions of `pattern`, or references to it when `reference` is set.
    ///
    /// No matches is an empty vector.
    pub fn match_pattern(&self, pattern: &str, reference: bool) -> Result<Vec<SymbolRecord>> {
        self.match_pattern_with(pattern, reference, &RunOptions::default())
    }

    pub fn match_pattern_with(
        &self,
        pattern: &str,
        reference: bool,
        options: &RunOptions,
    ) -> Result<Vec<SymbolRecord>> {
        let grammar = self.grammar()?;
        let command = format!(
            "global {} -a{} {}",
            grammar.format_flags(),
            if reference { "r" } else { "" },
            quote_arg(pattern)?
        );
        let options = RunOptions {
            silent: true,
            ..options.clone()
        };
        let output = self.runner.run(&command, &options)?;
        if !output.success() {
            tracing::debug!(
                "`{}` exited with {:?}: {}",
                command,
                output.exit,
                output.stderr_text().trim_end()
            );
        }

        Ok(ResultParser::new(grammar, self.style).parse(&output.stdout))
    }

    pub fn definitions(&self, symbol: &str) -> Result<Vec<SymbolRecord>> {
        self.match_pattern(symbol, false)
    }

    pub fn references(&self, symbol: &str) -> Result<Vec<SymbolRecord>> {
        self.match_pattern(symbol, true)
    }

    /// Full index build in the root. May take a long time on large trees.
    pub fn rebuild(&self) -> Result<CommandStatus> {
        self.rebuild_with(RunOptions::default())
    }

    pub fn rebuild_with(&self, options: RunOptions) -> Result<CommandStatus> {
        tracing::info!("Rebuilding tags in {}", self.root.display());
        let options = RunOptions {
            cwd: Some(self.root.clone()),
            ..options
        };
        self.runner.status("gtags -v", &options)
    }

    pub fn is_single_update_supported(&self) -> Result<bool> {
        Ok(self
            .version()?
            .map(|v| v.at_least(version::SINGLE_UPDATE_ARRIVAL))
            .unwrap_or(false))
    }

    /// Incrementally re-index one file.
    ///
    /// Returns [`UpdateOutcome::Unsupported`] without running `gtags` when the
    /// installed tool cannot do single-file updates.
    pub fn update_file(&self, path: impl AsRef<Path>) -> Result<UpdateOutcome> {
        self.update_file_with(path, RunOptions::default())
    }

    pub fn update_file_with(
        &self,
        path: impl AsRef<Path>,
        options: RunOptions,
    ) -> Result<UpdateOutcome> {
        if !self.is_single_update_supported()? {
            return Ok(UpdateOutcome::Unsupported {
                installed: self.version()?,
            });
        }

        let mut path = path.as_ref().to_string_lossy().into_owned();
        if self.style.long_path_expansion {
            path = paths::use_forward_slashes(&path);
        }

        let command = format!("gtags --single-update {}", quote_arg(&path)?);
        let options = RunOptions {
            cwd: Some(self.root.clone()),
            ..options
        };
        let status = self.runner.status(&command, &options)?;

        Ok(if status.success {
            UpdateOutcome::Updated
        } else {
            UpdateOutcome::Failed {
                stderr: status.stderr,
            }
        })
    }

    /// Database files `gtags` is expected to produce in the root.
    pub fn expected_index_files(&self) -> Result<Vec<&'static str>> {
        let mut files = vec!["GPATH", "GRTAGS", "GTAGS"];
        let keeps_gsyms = self
            .version()?
            .map(|v| !v.at_least(version::GSYMS_REMOVAL))
            .unwrap_or(false);
        if keeps_gsyms {
            files.push("GSYMS");
        }
        files.sort_unstable();
        Ok(files)
    }
}
