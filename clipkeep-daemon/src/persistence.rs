use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use clipkeep_core::{
    APP_DIR_NAME, ChangeListener, Config, Entry, HISTORY_FILE_NAME, History,
    decode_history_bytes, encode_history,
};
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// Replaces the per-user data directory when set.
pub const DATA_DIR_ENV: &str = "CLIPKEEP_DATA_DIR";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("history path {0} has no parent directory")]
    NoParent(PathBuf),
    #[error("create dir failed: {0}")]
    CreateDir(#[source] io::Error),
    #[error("tmp write failed: {0}")]
    WriteTmp(#[source] io::Error),
    #[error("replace failed: {0}")]
    Replace(#[source] io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub entries: Vec<Entry>,
    pub rejected_lines: usize,
}

/// Per-user data directory: roaming app-data on Windows, Application Support
/// on macOS, `$XDG_DATA_HOME` elsewhere. `CLIPKEEP_DATA_DIR` overrides it.
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(override_dir);
    }

    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn resolve_storage_location() -> PathBuf {
    data_dir().join(HISTORY_FILE_NAME)
}

/// Storage path for `config`, honouring its explicit data directory.
pub fn history_path(config: &Config) -> PathBuf {
    match &config.data_dir {
        Some(dir) => dir.join(HISTORY_FILE_NAME),
        None => resolve_storage_location(),
    }
}

/// Sole owner of the history file. Saves through one `Persistence` never
/// overlap, whichever thread issues them.
#[derive(Debug)]
pub struct Persistence {
    path: PathBuf,
    max_entries: usize,
    save_lock: Mutex<()>,
}

impl Persistence {
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries,
            save_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(history_path(config), config.max_history)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the file. A missing file is an empty, successful load.
    pub fn load_once(&self) -> Result<LoadReport, LoadError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(LoadReport::default()),
            Err(err) => return Err(LoadError::Read(err)),
        };

        let (entries, rejected_lines) = decode_history_bytes(&contents, self.max_entries);
        Ok(LoadReport {
            entries,
            rejected_lines,
        })
    }

    /// Hydrates `history` from disk. Failures leave the history as it was.
    /// Returns the number of entries loaded.
    pub fn load(&self, history: &History) -> usize {
        match self.load_once() {
            Ok(report) => {
                if report.rejected_lines > 0 {
                    warn!(
                        path = %self.path.display(),
                        rejected = report.rejected_lines,
                        "skipped malformed history lines"
                    );
                }
                if report.entries.is_empty() {
                    return 0;
                }
                let count = report.entries.len();
                history.bulk_load(report.entries, true);
                info!(path = %self.path.display(), count, "history loaded");
                count
            }
            Err(err) => {
                warn!(path = %self.path.display(), "history load failed: {}", err);
                0
            }
        }
    }

    /// Writes the current snapshot to a sibling tmp file and renames it over
    /// the target. If the rename is refused, the target is overwritten in
    /// place instead. Returns the number of entries written.
    pub fn save_once(&self, history: &History) -> Result<usize, PersistError> {
        let _guard = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let dir = self
            .path
            .parent()
            .ok_or_else(|| PersistError::NoParent(self.path.clone()))?;
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(PersistError::CreateDir)?;
        }

        let snapshot = history.snapshot();
        let count = snapshot.len().min(self.max_entries);
        let payload = encode_history(&snapshot, self.max_entries);

        let tmp = self.tmp_path();
        fs::write(&tmp, payload.as_bytes()).map_err(PersistError::WriteTmp)?;

        if let Err(err) = fs::rename(&tmp, &self.path) {
            debug!("atomic replace failed, overwriting in place: {}", err);
            let written = fs::write(&self.path, payload.as_bytes());
            let _ = fs::remove_file(&tmp);
            written.map_err(PersistError::Replace)?;
        }

        Ok(count)
    }

    /// Best-effort save; errors are logged and dropped.
    pub fn save(&self, history: &History) {
        match self.save_once(history) {
            Ok(count) => debug!(path = %self.path.display(), count, "history saved"),
            Err(err) => warn!(path = %self.path.display(), "history save failed: {}", err),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Outcome counters published by the save worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveStatus {
    pub completed: u64,
    pub failed: u64,
    pub last_error: Option<String>,
}

#[derive(Debug)]
enum SaveRequest {
    Save,
    Flush(oneshot::Sender<()>),
}

/// Handle for enqueueing write-behind saves. Cloneable; every clone feeds the
/// same single worker, so saves run one at a time in submission order.
#[derive(Debug, Clone)]
pub struct SaveQueue {
    tx: mpsc::UnboundedSender<SaveRequest>,
    status: watch::Receiver<SaveStatus>,
}

/// Receiving half of a [`SaveQueue`]; spawn it once the history exists.
#[derive(Debug)]
pub struct SaveWorker {
    rx: mpsc::UnboundedReceiver<SaveRequest>,
    status: watch::Sender<SaveStatus>,
}

impl SaveQueue {
    pub fn channel() -> (SaveQueue, SaveWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SaveStatus::default());
        (
            SaveQueue {
                tx,
                status: status_rx,
            },
            SaveWorker {
                rx,
                status: status_tx,
            },
        )
    }

    /// Enqueues a save and returns immediately. The worker reads the
    /// snapshot when the task runs, so bursts collapse onto the latest state.
    pub fn save_async(&self) {
        if self.tx.send(SaveRequest::Save).is_err() {
            debug!("save worker gone; dropping save request");
        }
    }

    /// Resolves once every save enqueued before this call has finished.
    /// Returns `false` if the worker is no longer running.
    pub async fn flush(&self) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(SaveRequest::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.await.is_ok()
    }

    pub fn status(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }
}

impl ChangeListener for SaveQueue {
    fn history_changed(&self) {
        self.save_async();
    }
}

impl SaveWorker {
    pub fn spawn(self, persistence: Arc<Persistence>, history: Arc<History>) -> JoinHandle<()> {
        tokio::spawn(self.run(persistence, history))
    }

    async fn run(mut self, persistence: Arc<Persistence>, history: Arc<History>) {
        while let Some(request) = self.rx.recv().await {
            match request {
                SaveRequest::Save => {
                    let persistence = Arc::clone(&persistence);
                    let history = Arc::clone(&history);
                    let outcome =
                        tokio::task::spawn_blocking(move || persistence.save_once(&history)).await;
                    self.record(outcome.map_err(|err| err.to_string()).and_then(|saved| {
                        saved.map_err(|err| err.to_string())
                    }));
                }
                SaveRequest::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        debug!("save worker stopped");
    }

    fn record(&self, outcome: Result<usize, String>) {
        match outcome {
            Ok(count) => {
                debug!(count, "history saved");
                self.status.send_modify(|status| status.completed += 1);
            }
            Err(err) => {
                warn!("history save failed: {}", err);
                self.status.send_modify(|status| {
                    status.failed += 1;
                    status.last_error = Some(err);
                });
            }
        }
    }
}
