use std::{
    io,
    sync::{
        Arc,
        mpsc::{self, RecvTimeoutError},
    },
    thread,
    time::{Duration, Instant},
};

use arboard::Clipboard;
use clipkeep_core::History;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("clipboard unavailable: {0}")]
    Open(#[source] arboard::Error),
    #[error("clipboard read failed: {0}")]
    Read(#[source] arboard::Error),
    #[error("clipboard write failed: {0}")]
    Write(#[source] arboard::Error),
    #[error("clipboard source failed: {0}")]
    Source(String),
}

/// Something that can report the current clipboard text.
pub trait ClipboardSource {
    /// `Ok(None)` when the clipboard is empty or holds no text.
    fn read_text(&mut self) -> Result<Option<String>, ObserverError>;
}

/// Something that can replace the clipboard text.
pub trait ClipboardSink {
    fn write_text(&mut self, text: &str) -> Result<(), ObserverError>;
}

/// System clipboard via `arboard`. The handle is opened lazily and reopened
/// after a failed read.
#[derive(Default)]
pub struct ArboardSource {
    clipboard: Option<Clipboard>,
}

impl ClipboardSource for ArboardSource {
    fn read_text(&mut self) -> Result<Option<String>, ObserverError> {
        if self.clipboard.is_none() {
            self.clipboard = Some(Clipboard::new().map_err(ObserverError::Open)?);
        }
        let Some(clipboard) = self.clipboard.as_mut() else {
            return Ok(None);
        };

        match clipboard.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(err) => {
                self.clipboard = None;
                Err(ObserverError::Read(err))
            }
        }
    }
}

/// Clipboard writer via `arboard`. Opens a fresh handle per write, so it can
/// move freely between threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArboardSink;

impl ClipboardSink for ArboardSink {
    fn write_text(&mut self, text: &str) -> Result<(), ObserverError> {
        let mut clipboard = Clipboard::new().map_err(ObserverError::Open)?;
        clipboard
            .set_text(text.to_owned())
            .map_err(ObserverError::Write)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Captured,
    Unchanged,
    NoText,
}

/// Polls a clipboard source and appends each new text value to the history.
///
/// Only a value equal to the one seen on the previous capture is suppressed;
/// returning to an older value is recorded again.
pub struct Observer {
    history: Arc<History>,
    interval: Duration,
    last_seen: Option<String>,
}

impl Observer {
    pub fn new(history: Arc<History>, interval: Duration) -> Self {
        Self {
            history,
            interval,
            last_seen: None,
        }
    }

    pub fn poll_once(
        &mut self,
        source: &mut dyn ClipboardSource,
    ) -> Result<PollOutcome, ObserverError> {
        let Some(text) = source.read_text()? else {
            return Ok(PollOutcome::NoText);
        };
        if self.last_seen.as_deref() == Some(text.as_str()) {
            return Ok(PollOutcome::Unchanged);
        }

        self.history.append(text.clone());
        self.last_seen = Some(text);
        Ok(PollOutcome::Captured)
    }

    /// Starts polling on a dedicated thread, first poll immediately and then
    /// at a fixed rate. The source is built on that thread, so it need not be
    /// `Send`.
    pub fn start<F, S>(mut self, make_source: F) -> io::Result<ObserverHandle>
    where
        F: FnOnce() -> S + Send + 'static,
        S: ClipboardSource + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let interval = self.interval;

        let thread = thread::Builder::new()
            .name("clipboard-observer".to_owned())
            .spawn(move || {
                let mut source = make_source();
                info!(interval_ms = interval.as_millis() as u64, "clipboard observer started");

                let mut next_tick = Instant::now();
                loop {
                    match self.poll_once(&mut source) {
                        Ok(PollOutcome::Captured) => debug!("clipboard change captured"),
                        Ok(_) => {}
                        Err(err) => debug!("clipboard poll skipped: {}", err),
                    }

                    next_tick += interval;
                    let now = Instant::now();
                    if next_tick < now {
                        next_tick = now;
                    }
                    match stop_rx.recv_timeout(next_tick - now) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                info!("clipboard observer stopped");
            })?;

        Ok(ObserverHandle {
            stop_tx,
            thread: Some(thread),
        })
    }
}

/// Running observer. Dropping the handle also stops the thread, without
/// waiting for it.
pub struct ObserverHandle {
    stop_tx: mpsc::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ObserverHandle {
    /// Signals the thread and waits for the current poll to finish.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("clipboard observer thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use super::*;

    /// Replays a fixed script of clipboard states, then reports no text.
    struct ScriptedSource(VecDeque<Result<Option<String>, ObserverError>>);

    impl ScriptedSource {
        fn new(script: Vec<Result<Option<&str>, &str>>) -> Self {
            Self(
                script
                    .into_iter()
                    .map(|step| match step {
                        Ok(text) => Ok(text.map(str::to_owned)),
                        Err(msg) => Err(ObserverError::Source(msg.to_owned())),
                    })
                    .collect(),
            )
        }
    }

    impl ClipboardSource for ScriptedSource {
        fn read_text(&mut self) -> Result<Option<String>, ObserverError> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    fn texts(history: &History) -> Vec<String> {
        history.snapshot().into_iter().map(|e| e.text).collect()
    }

    #[test]
    fn unchanged_value_is_captured_once() {
        let history = Arc::new(History::new(100));
        let mut observer = Observer::new(Arc::clone(&history), Duration::from_millis(10));
        let mut source = ScriptedSource::new(vec![Ok(Some("same")); 5]);

        let outcomes: Vec<_> = (0..5)
            .map(|_| observer.poll_once(&mut source).unwrap())
            .collect();

        assert_eq!(outcomes[0], PollOutcome::Captured);
        assert!(outcomes[1..].iter().all(|o| *o == PollOutcome::Unchanged));
        assert_eq!(texts(&history), vec!["same"]);
    }

    #[test]
    fn reverting_to_previous_value_is_captured_again() {
        let history = Arc::new(History::new(100));
        let mut observer = Observer::new(Arc::clone(&history), Duration::from_millis(10));
        let mut source = ScriptedSource::new(vec![Ok(Some("a")), Ok(Some("b")), Ok(Some("a"))]);

        for _ in 0..3 {
            observer.poll_once(&mut source).unwrap();
        }
        assert_eq!(texts(&history), vec!["a", "b", "a"]);
    }

    #[test]
    fn empty_and_failing_reads_change_nothing() {
        let history = Arc::new(History::new(100));
        let mut observer = Observer::new(Arc::clone(&history), Duration::from_millis(10));
        let mut source = ScriptedSource::new(vec![
            Ok(Some("x")),
            Ok(None),
            Err("locked by another process"),
            Ok(Some("x")),
        ]);

        assert_eq!(observer.poll_once(&mut source).unwrap(), PollOutcome::Captured);
        assert_eq!(observer.poll_once(&mut source).unwrap(), PollOutcome::NoText);
        assert!(observer.poll_once(&mut source).is_err());
        assert_eq!(observer.poll_once(&mut source).unwrap(), PollOutcome::Unchanged);
        assert_eq!(texts(&history), vec!["x"]);
    }

    #[test]
    fn started_observer_polls_immediately_and_stops() {
        struct SharedSource(Arc<Mutex<Option<String>>>);

        impl ClipboardSource for SharedSource {
            fn read_text(&mut self) -> Result<Option<String>, ObserverError> {
                Ok(self.0.lock().unwrap().clone())
            }
        }

        let clipboard = Arc::new(Mutex::new(Some("first".to_owned())));
        let history = Arc::new(History::new(100));
        let observer = Observer::new(Arc::clone(&history), Duration::from_millis(5));

        let source_state = Arc::clone(&clipboard);
        let handle = observer
            .start(move || SharedSource(source_state))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while history.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        *clipboard.lock().unwrap() = Some("second".to_owned());
        while history.len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        handle.stop();

        assert_eq!(texts(&history), vec!["second", "first"]);
    }

    #[test]
    fn sustained_changes_stay_bounded() {
        let history = Arc::new(History::new(25));
        let mut observer = Observer::new(Arc::clone(&history), Duration::from_millis(1));
        let script = (0..1000).map(|i| Ok(Some(format!("v{i}")))).collect();
        let mut source = ScriptedSource(script);

        for _ in 0..1000 {
            observer.poll_once(&mut source).unwrap();
        }
        assert_eq!(history.len(), 25);
        assert_eq!(history.snapshot()[0].text, "v999");
    }
}
