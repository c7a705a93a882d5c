//! Parsing of `global` output into [`SymbolRecord`]s.
//!
//! Two grammars are understood:
//!
//! - `Grep` (`global --result grep`): `path:line:context`, the canonical form.
//! - `CtagsX` (`global -x`, used for tools predating `--result`):
//!   `symbol  line  path  signature`, whitespace separated.
//!
//! Lines that match neither grammar are skipped, never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::paths::{self, PathStyle};
use crate::version::{self, Version};

static GREP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?P<path>(?:[A-Za-z]:)?[^:\r\n]+):(?P<line>\d+):(?P<context>[^\r\n]*)\r?$")
        .unwrap()
});

static CTAGS_X_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?P<symbol>\S+)[ \t]+(?P<line>\d+)[ \t]+(?P<path>\S+)(?:[ \t](?P<context>[^\r\n]*))?\r?$")
        .unwrap()
});

/// One occurrence reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub path: String,
    /// 1-based.
    pub line_number: u32,
    pub context: String,
}

impl SymbolRecord {
    /// The context with insignificant trailing whitespace removed.
    pub fn signature(&self) -> &str {
        self.context.trim_end()
    }
}

/// Output format requested from (and expected back from) `global`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputGrammar {
    Grep,
    CtagsX,
}

impl OutputGrammar {
    /// Pick the grammar for an installed tool. Unknown tools get `Grep`.
    pub fn for_version(version: Option<&Version>) -> Self {
        match version {
            Some(v) if !v.at_least(version::RESULT_OPTION_ARRIVAL) => OutputGrammar::CtagsX,
            _ => OutputGrammar::Grep,
        }
    }

    /// `global` flags selecting this output format.
    pub fn format_flags(&self) -> &'static str {
        match self {
            OutputGrammar::Grep => "--result grep",
            OutputGrammar::CtagsX => "-x",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResultParser {
    grammar: OutputGrammar,
    style: PathStyle,
}

impl ResultParser {
    pub fn new(grammar: OutputGrammar, style: PathStyle) -> Self {
        Self { grammar, style }
    }

    pub fn grammar(&self) -> OutputGrammar {
        self.grammar
    }

    /// Parse match/reference output in emission order.
    pub fn parse(&self, output: &[u8]) -> Vec<SymbolRecord> {
        let text = if self.style.long_path_expansion {
            paths::decode_native(output)
        } else {
            String::from_utf8_lossy(output).into_owned()
        };
        let re: &Regex = match self.grammar {
            OutputGrammar::Grep => &GREP_RE,
            OutputGrammar::CtagsX => &CTAGS_X_RE,
        };

        let mut records = Vec::new();
        let mut last_end = 0;
        for caps in re.captures_iter(&text) {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
            log_skipped(&text[last_end..whole.0]);
            last_end = whole.1;

            let line_number = match caps["line"].parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    tracing::trace!("Dropping result with bad line number: {}", &caps[0]);
                    continue;
                }
            };

            records.push(SymbolRecord {
                path: self.restore_path(&caps["path"]),
                line_number,
                context: caps
                    .name("context")
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            });
        }
        log_skipped(&text[last_end..]);

        records
    }

    fn restore_path(&self, path: &str) -> String {
        if self.style.long_path_expansion {
            paths::to_long_path(path)
        } else {
            path.to_string()
        }
    }
}

fn log_skipped(gap: &str) {
    for line in gap.lines().filter(|l| !l.trim().is_empty()) {
        tracing::trace!("Skipping unrecognized output line: {}", line);
    }
}

/// Completion output: one symbol name per non-empty line.
pub fn parse_lines(output: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(output)
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
