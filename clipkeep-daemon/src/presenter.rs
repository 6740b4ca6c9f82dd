use std::{str::FromStr, sync::Arc};

use chrono::Local;
use clipkeep_core::{
    ControlCommand, Entry, History, Presenter, Visibility, friendly_label, preview_line,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::observer::{ClipboardSink, ObserverError};

const PREVIEW_CHARS: usize = 200;

/// Presentation stand-in for running without a window: tracks visibility
/// and logs the newest entries whenever it is shown.
pub struct HeadlessPresenter {
    history: Arc<History>,
    max_visible: usize,
    visibility: Visibility,
}

impl HeadlessPresenter {
    pub fn new(history: Arc<History>, max_visible: usize) -> Self {
        Self {
            history,
            max_visible,
            visibility: Visibility::Hidden,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    fn render(&self) {
        let now = Local::now();
        let entries = self.history.search("", self.max_visible);
        info!(count = entries.len(), "history shown");
        for (index, entry) in entries.iter().enumerate() {
            info!(
                index,
                when = %friendly_label(entry.timestamp_unix_ms, &now),
                "{}",
                preview_line(&entry.text, PREVIEW_CHARS)
            );
        }
    }
}

impl Presenter for HeadlessPresenter {
    fn toggle(&mut self) {
        self.visibility.toggle();
        if self.visibility.is_visible() {
            self.render();
        } else {
            info!("history hidden");
        }
    }

    fn show(&mut self) {
        self.visibility.show();
        self.render();
    }

    fn hide(&mut self) {
        self.visibility.hide();
        info!("history hidden");
    }
}

/// User action on the shown list: copy the entry at a listed index back to
/// the clipboard, or clear the whole history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    Copy(usize),
    Clear,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown action {0:?}; expected `copy <index>` or `clear`")]
pub struct UnknownAction(pub String);

impl FromStr for UiAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let mut words = line.split_whitespace();
        let action = match (words.next(), words.next(), words.next()) {
            (Some(verb), None, None) if verb.eq_ignore_ascii_case("clear") => Some(Self::Clear),
            (Some(verb), Some(index), None) if verb.eq_ignore_ascii_case("copy") => {
                index.parse().ok().map(Self::Copy)
            }
            _ => None,
        };
        action.ok_or_else(|| UnknownAction(line.to_owned()))
    }
}

/// Mutations the presentation layer may drive on the history.
pub struct HistoryActions {
    history: Arc<History>,
    max_visible: usize,
    sink: Box<dyn ClipboardSink + Send>,
}

impl HistoryActions {
    pub fn new(
        history: Arc<History>,
        max_visible: usize,
        sink: Box<dyn ClipboardSink + Send>,
    ) -> Self {
        Self {
            history,
            max_visible,
            sink,
        }
    }

    /// Writes the original text of the `index`th listed entry to the
    /// clipboard. The observer then records it as a fresh capture. Returns
    /// `Ok(None)` if no entry is listed at `index`.
    pub fn copy_entry(&mut self, index: usize) -> Result<Option<Entry>, ObserverError> {
        let Some(entry) = self
            .history
            .search("", self.max_visible)
            .into_iter()
            .nth(index)
        else {
            return Ok(None);
        };
        self.sink.write_text(&entry.text)?;
        Ok(Some(entry))
    }

    pub fn clear_history(&self) {
        self.history.clear();
        info!("history cleared");
    }

    /// Applies one action. A successful copy hides the list.
    pub fn apply(&mut self, action: UiAction, commands: &mpsc::UnboundedSender<ControlCommand>) {
        match action {
            UiAction::Copy(index) => match self.copy_entry(index) {
                Ok(Some(entry)) => {
                    debug!(index, chars = entry.text.chars().count(), "entry copied");
                    let _ = commands.send(ControlCommand::Hide);
                }
                Ok(None) => warn!(index, "no entry listed at index"),
                Err(err) => warn!("copy failed: {}", err),
            },
            UiAction::Clear => self.clear_history(),
        }
    }
}

/// Applies one action per received line until every sender is dropped.
/// Unparseable lines are logged and skipped.
pub async fn run_actions(
    mut lines: mpsc::UnboundedReceiver<String>,
    mut actions: HistoryActions,
    commands: mpsc::UnboundedSender<ControlCommand>,
) {
    while let Some(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<UiAction>() {
            Ok(action) => actions.apply(action, &commands),
            Err(err) => warn!("{}", err),
        }
    }
}

/// Applies commands to `presenter` on the calling task until every sender is
/// dropped, then hands the presenter back.
pub async fn run_presenter<P: Presenter>(
    mut commands: mpsc::UnboundedReceiver<ControlCommand>,
    mut presenter: P,
) -> P {
    while let Some(command) = commands.recv().await {
        command.apply(&mut presenter);
    }
    presenter
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    impl ClipboardSink for RecordingSink {
        fn write_text(&mut self, text: &str) -> Result<(), ObserverError> {
            self.0.lock().unwrap().push(text.to_owned());
            Ok(())
        }
    }

    #[test]
    fn actions_parse_from_lines() {
        assert_eq!("copy 3".parse::<UiAction>(), Ok(UiAction::Copy(3)));
        assert_eq!("  COPY 0 \r".parse::<UiAction>(), Ok(UiAction::Copy(0)));
        assert_eq!("Clear".parse::<UiAction>(), Ok(UiAction::Clear));
        assert!("copy".parse::<UiAction>().is_err());
        assert!("copy -1".parse::<UiAction>().is_err());
        assert!("clear now".parse::<UiAction>().is_err());
        assert!("paste 1".parse::<UiAction>().is_err());
    }

    #[test]
    fn copy_writes_original_text_of_listed_entry() {
        let history = Arc::new(History::new(10));
        history.append("older\twith tab");
        history.append("newer\nwith line");
        let sink = RecordingSink::default();
        let mut actions = HistoryActions::new(Arc::clone(&history), 5, Box::new(sink.clone()));

        let copied = actions.copy_entry(1).unwrap().map(|entry| entry.text);
        assert_eq!(copied.as_deref(), Some("older\twith tab"));
        assert_eq!(actions.copy_entry(2).unwrap(), None);
        assert_eq!(*sink.0.lock().unwrap(), vec!["older\twith tab"]);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn action_lines_drive_copy_clear_and_hide() {
        let history = Arc::new(History::new(10));
        history.append("keep me");
        let sink = RecordingSink::default();
        let actions = HistoryActions::new(Arc::clone(&history), 5, Box::new(sink.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        for line in ["copy 0", "bogus", "copy 9", "", "clear"] {
            line_tx.send(line.to_owned()).unwrap();
        }
        drop(line_tx);

        run_actions(line_rx, actions, tx).await;

        assert_eq!(*sink.0.lock().unwrap(), vec!["keep me"]);
        assert_eq!(rx.recv().await, Some(ControlCommand::Hide));
        assert_eq!(rx.recv().await, None);
        assert!(history.is_empty());
    }

    #[test]
    fn headless_presenter_tracks_visibility() {
        let history = Arc::new(History::new(10));
        history.append("something");
        let mut presenter = HeadlessPresenter::new(history, 5);

        ControlCommand::Toggle.apply(&mut presenter);
        assert_eq!(presenter.visibility(), Visibility::Visible);
        ControlCommand::Toggle.apply(&mut presenter);
        assert_eq!(presenter.visibility(), Visibility::Hidden);

        ControlCommand::Show.apply(&mut presenter);
        ControlCommand::Show.apply(&mut presenter);
        assert_eq!(presenter.visibility(), Visibility::Visible);
        ControlCommand::Hide.apply(&mut presenter);
        assert_eq!(presenter.visibility(), Visibility::Hidden);
    }
}
