pub mod config;
pub mod error;
pub mod navigator;
pub mod parser;
pub mod paths;
pub mod process;
pub mod session;
pub mod store;
pub mod tasks;
pub mod version;
pub mod watcher;

pub use config::{Settings, SettingsSource};
pub use error::{GtagsError, Result};
pub use navigator::{Choice, Navigation, Navigator, SaveOutcome, SearchKind};
pub use parser::{OutputGrammar, ResultParser, SymbolRecord};
pub use paths::{normalize, paths_equal, PathStyle};
pub use process::{
    CommandOutput, CommandRunner, CommandStatus, ExitKind, RunOptions, SubprocessRunner,
};
pub use session::{JumpHistory, Location, SessionRegistry};
pub use store::{find_root, require_root, TagStore, UpdateOutcome, MARKER_FILE};
pub use tasks::{BackgroundTask, RootLocks, TaskOutcome};
pub use version::Version;
pub use watcher::TagWatcher;
