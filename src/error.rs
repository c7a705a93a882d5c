use std::path::PathBuf;

use thiserror::Error;

use crate::version::Version;

#[derive(Error, Debug)]
pub enum GtagsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The indexer could not be started at all (missing binary, permissions).
    #[error("Failed to run {program}: {source}")]
    ToolInvocation {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "{operation} is not supported until GNU GLOBAL v{required}. You have GNU GLOBAL v{}",
        display_installed(.installed)
    )]
    Unsupported {
        operation: &'static str,
        installed: Option<Version>,
        required: Version,
    },

    #[error("GTAGS not found above {0}. Build tags by 'gtags'")]
    RootNotFound(PathBuf),

    #[error("Jump history is empty")]
    EmptyHistory,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("MCP error: {0}")]
    Mcp(String),
}

fn display_installed(installed: &Option<Version>) -> String {
    installed
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub type Result<T> = std::result::Result<T, GtagsError>;
