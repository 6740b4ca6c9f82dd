pub mod control;
pub mod daemon;
pub mod logging;
pub mod observer;
pub mod persistence;
pub mod presenter;
pub mod singleton;

pub use control::{send_command, serve, try_bind};
pub use daemon::Daemon;
pub use observer::{
    ArboardSink, ArboardSource, ClipboardSink, ClipboardSource, Observer, ObserverError,
    PollOutcome,
};
pub use persistence::{LoadError, PersistError, Persistence, SaveQueue, SaveStatus};
pub use presenter::{
    HeadlessPresenter, HistoryActions, UiAction, UnknownAction, run_actions, run_presenter,
};
pub use singleton::{LaunchRequest, Role, coordinate};
