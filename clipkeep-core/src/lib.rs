use std::{
    path::PathBuf,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

pub mod control;
pub mod history;
pub mod present;
pub mod record;

pub use control::{ControlCommand, UnknownCommand};
pub use history::{ChangeListener, History};
pub use present::{Presenter, Visibility, friendly_label, preview_line};
pub use record::{
    RecordError, decode_history, decode_history_bytes, decode_record, encode_history, encode_record,
};

pub const DEFAULT_CONTROL_PORT: u16 = 51515;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);
pub const DEFAULT_MAX_HISTORY: usize = 1000;
pub const DEFAULT_MAX_VISIBLE: usize = 20;
pub const APP_DIR_NAME: &str = "Clipkeep";
pub const HISTORY_FILE_NAME: &str = "history.txt";

/// One captured clipboard value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub timestamp_unix_ms: u64,
    pub text: String,
}

impl Entry {
    pub fn new(timestamp_unix_ms: u64, text: impl Into<String>) -> Self {
        Self {
            timestamp_unix_ms,
            text: text.into(),
        }
    }
}

/// Runtime settings handed to every component constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub poll_interval: Duration,
    pub max_history: usize,
    pub max_visible: usize,
    /// Overrides the per-user application data directory.
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_CONTROL_PORT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_history: DEFAULT_MAX_HISTORY,
            max_visible: DEFAULT_MAX_VISIBLE,
            data_dir: None,
        }
    }
}

pub fn now_unix_ms() -> u64 {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    duration.as_millis() as u64
}
