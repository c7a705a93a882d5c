use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use gtags_nav::store::find_root;
use gtags_nav::{
    paths, require_root, BackgroundTask, GtagsError, Navigator, RunOptions, SaveOutcome,
    SearchKind, SessionRegistry, Settings, SettingsSource, SymbolRecord, TagStore, TagWatcher,
    TaskOutcome,
};

#[derive(Parser)]
#[command(name = "gtags-nav")]
#[command(about = "Symbol navigation on top of GNU GLOBAL tag databases")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Build tags for the current directory
    gtags-nav rebuild

    # Where is the tag root for this file?
    gtags-nav root src/main.c

    # Find a definition and its references
    gtags-nav definition LSQ_HandleT
    gtags-nav references LSQ_IteratorT

    # List symbols starting with a prefix, as JSON
    gtags-nav --format json symbols LSQ

    # Search /usr/include as well
    gtags-nav --extra-path /usr/include definition printf

    # Re-index one file, or every file as it is saved
    gtags-nav update src/list.c
    gtags-nav watch

    # Start MCP server
    gtags-nav serve
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (default: .gtags-nav.yml in the tag root)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Extra directory searched for definitions (repeatable)
    #[arg(long = "extra-path", global = true)]
    pub extra_paths: Vec<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the tag root containing a path
    Root {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Print the installed GNU GLOBAL version
    Version,

    /// List symbols, optionally by prefix
    Symbols {
        /// Symbol prefix (default: all symbols)
        prefix: Option<String>,
    },

    /// Find symbol definitions
    Definition {
        /// Symbol name or pattern
        name: String,
    },

    /// Find symbol references
    References {
        /// Symbol name or pattern
        name: String,
    },

    /// Rebuild the tag database (creates one if none exists)
    Rebuild {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Re-index a single file
    Update {
        file: PathBuf,
    },

    /// Re-index files as they are saved
    Watch {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Start MCP server on stdio
    Serve,
}

/// Global options shared by every command.
pub struct Context {
    pub source: SettingsSource,
    pub format: OutputFormat,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            source: SettingsSource {
                config: cli.config.clone(),
                extra_paths: cli.extra_paths.clone(),
            },
            format: cli.format,
        }
    }

    fn settings(&self, start: &Path) -> anyhow::Result<Settings> {
        Ok(self.source.resolve(start)?)
    }

    fn navigator(&self, start: &Path) -> anyhow::Result<Navigator> {
        Ok(Navigator::new(self.settings(start)?, SessionRegistry::new()))
    }

    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(value),
        }
        Ok(())
    }
}

fn current_dir() -> anyhow::Result<PathBuf> {
    std::env::current_dir().context("Cannot determine current directory")
}

pub fn show_root(ctx: &Context, path: &Path) -> anyhow::Result<()> {
    let root = require_root(path)?;
    ctx.print(&root, |root| println!("{}", root.display()))
}

pub fn show_version(ctx: &Context) -> anyhow::Result<()> {
    let cwd = current_dir()?;
    let settings = ctx.settings(&cwd)?;
    let root = find_root(&cwd).unwrap_or(cwd);
    let store = TagStore::new(root, settings.extra_tag_paths)?;
    let version = store.version()?;

    ctx.print(&version, |version| match version {
        Some(v) => println!("GNU GLOBAL {}", v),
        None => println!("GNU GLOBAL not found"),
    })
}

pub fn symbols(ctx: &Context, prefix: Option<&str>) -> anyhow::Result<()> {
    let cwd = current_dir()?;
    let navigator = ctx.navigator(&cwd)?;
    let store = navigator.open(&cwd)?;

    let symbols = match prefix {
        Some(prefix) => store.by_prefix(prefix)?,
        None => navigator.show_symbols(&store)?,
    };

    if symbols.is_empty() && ctx.format == OutputFormat::Text {
        eprintln!("No symbols found");
        return Ok(());
    }

    ctx.print(&symbols, |symbols| {
        for symbol in symbols {
            println!("{}", symbol);
        }
    })
}

pub fn find_symbol(ctx: &Context, name: &str, kind: SearchKind) -> anyhow::Result<()> {
    let cwd = current_dir()?;
    let navigator = ctx.navigator(&cwd)?;
    let store = navigator.open(&cwd)?;

    let records = match kind {
        SearchKind::Definition => store.definitions(name)?,
        SearchKind::Reference => store.references(name)?,
    };

    if records.is_empty() && ctx.format == OutputFormat::Text {
        eprintln!("{}", kind.not_found_message(name));
        return Ok(());
    }

    let root = store.root().to_path_buf();
    let relative = navigator.settings().show_relative_paths;
    ctx.print(&records, |records| {
        for record in records {
            println!("{}", format_record(&root, record, relative));
        }
    })
}

fn format_record(root: &Path, record: &SymbolRecord, relative: bool) -> String {
    let path = Path::new(&record.path);
    let shown = if relative {
        path.strip_prefix(root).unwrap_or(path)
    } else {
        path
    };
    format!(
        "{}:{}: {}",
        shown.display(),
        record.line_number,
        record.signature()
    )
}

pub async fn rebuild(ctx: &Context, dir: &Path) -> anyhow::Result<()> {
    let dir = paths::absolutize(&dir.to_string_lossy(), &current_dir()?)?;
    let navigator = ctx.navigator(&dir)?;
    let root = find_root(&dir).unwrap_or(dir);
    let store = navigator.open_root(root.clone())?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Building tags in {}", root.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let task = BackgroundTask::spawn("rebuild", move |token| {
        navigator.rebuild(&store, RunOptions::default().with_cancel(token))
    });
    let token = task.token();
    let wait = task.wait();
    tokio::pin!(wait);

    let outcome = tokio::select! {
        outcome = &mut wait => outcome,
        _ = tokio::signal::ctrl_c() => {
            spinner.set_message("Cancelling...");
            token.cancel();
            wait.await
        }
    };
    spinner.finish_and_clear();

    match outcome {
        TaskOutcome::Completed(status) if status.success => {
            ctx.print(&status, |_| println!("Tags rebuilt in {}", root.display()))
        }
        TaskOutcome::Completed(status) => {
            bail!("gtags failed in {}: {}", root.display(), status.stderr.trim_end())
        }
        TaskOutcome::Cancelled => bail!("Rebuild cancelled"),
        TaskOutcome::Failed(message) => bail!(message),
    }
}

pub fn update_file(ctx: &Context, file: &Path) -> anyhow::Result<()> {
    let navigator = ctx.navigator(file)?;
    let store = navigator.open(file)?;
    let outcome = navigator.update_in(&store, file)?;

    match &outcome {
        SaveOutcome::Unsupported {
            installed,
            required,
        } => Err(GtagsError::Unsupported {
            operation: "Incremental single file update",
            installed: installed.clone(),
            required: required.parse()?,
        }
        .into()),
        SaveOutcome::Failed { stderr, .. } => {
            bail!("Error while tags updating for {}: {}", file.display(), stderr.trim_end())
        }
        _ => ctx.print(&outcome, |_| println!("Tags updated for {}", file.display())),
    }
}

pub async fn watch(ctx: &Context, dir: &Path) -> anyhow::Result<()> {
    let root = require_root(dir)?;
    let navigator = ctx.navigator(&root)?;
    let debounce = Duration::from_millis(navigator.settings().watch_debounce_ms);

    tracing::info!("Watching {} (Ctrl-C to stop)", root.display());
    let task = BackgroundTask::spawn("watch", move |token| {
        let watcher = TagWatcher::new(&root, debounce)?;
        watcher.run(&navigator, &token)
    });
    let token = task.token();
    let wait = task.wait();
    tokio::pin!(wait);

    let outcome = tokio::select! {
        outcome = &mut wait => outcome,
        _ = tokio::signal::ctrl_c() => {
            token.cancel();
            wait.await
        }
    };

    match outcome {
        TaskOutcome::Completed(updated) => {
            tracing::info!("Watch finished after {} updates", updated);
            Ok(())
        }
        TaskOutcome::Cancelled => {
            tracing::info!("Stopped watching");
            Ok(())
        }
        TaskOutcome::Failed(message) => bail!(message),
    }
}

pub async fn run_mcp_server(ctx: &Context) -> anyhow::Result<()> {
    use crate::mcp::McpServer;
    use rmcp::ServiceExt;

    let server = McpServer::new(ctx.source.clone());

    let transport = (tokio::io::stdin(), tokio::io::stdout());
    let service = server
        .serve(transport)
        .await
        .map_err(|e| GtagsError::Mcp(e.to_string()))?;
    service
        .waiting()
        .await
        .map_err(|e| GtagsError::Mcp(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_command() {
        let cli = Cli::try_parse_from([
            "gtags-nav",
            "definition",
            "LSQ_HandleT",
            "--format",
            "json",
            "--extra-path",
            "/usr/include",
            "--extra-path",
            "/opt/include",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.extra_paths.len(), 2);
        assert!(matches!(cli.command, Commands::Definition { ref name } if name == "LSQ_HandleT"));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["gtags-nav", "rebuild"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(cli.config.is_none());
        assert!(matches!(cli.command, Commands::Rebuild { ref dir } if dir == Path::new(".")));
    }

    #[test]
    fn test_format_record_relative() {
        let record = SymbolRecord {
            path: "/proj/src/list.c".to_string(),
            line_number: 42,
            context: "LSQ_HandleT LSQ_CreateSequence(void)   ".to_string(),
        };
        let root = Path::new("/proj");

        assert_eq!(
            format_record(root, &record, false),
            "/proj/src/list.c:42: LSQ_HandleT LSQ_CreateSequence(void)"
        );
        assert_eq!(
            format_record(root, &record, true),
            format!("{}:42: LSQ_HandleT LSQ_CreateSequence(void)", Path::new("src/list.c").display())
        );
    }
}
