use std::{io, sync::Arc, time::Duration};

use clipkeep_core::{Config, ControlCommand, History};
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle, time::timeout};
use tracing::{info, warn};

use crate::{
    control::serve,
    observer::{ClipboardSource, Observer, ObserverHandle},
    persistence::{Persistence, SaveQueue},
};

const FINAL_FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Services owned by the primary instance, and the handles needed to stop
/// them.
pub struct Daemon {
    history: Arc<History>,
    persistence: Arc<Persistence>,
    save_queue: SaveQueue,
    observer: Option<ObserverHandle>,
    server_task: JoinHandle<()>,
    save_task: JoinHandle<()>,
}

impl Daemon {
    /// Builds the history, hydrates it from disk, then starts the save
    /// worker, the clipboard observer and the control server. Must be called
    /// from within a tokio runtime.
    pub fn start<F, S>(
        config: &Config,
        listener: TcpListener,
        commands: mpsc::UnboundedSender<ControlCommand>,
        make_source: F,
    ) -> io::Result<Self>
    where
        F: FnOnce() -> S + Send + 'static,
        S: ClipboardSource + 'static,
    {
        let persistence = Arc::new(Persistence::from_config(config));
        let (save_queue, save_worker) = SaveQueue::channel();
        let history = Arc::new(History::with_listener(
            config.max_history,
            Box::new(save_queue.clone()),
        ));

        persistence.load(&history);
        let save_task = save_worker.spawn(Arc::clone(&persistence), Arc::clone(&history));

        let observer = match Observer::new(Arc::clone(&history), config.poll_interval)
            .start(make_source)
        {
            Ok(observer) => observer,
            Err(err) => {
                save_task.abort();
                return Err(err);
            }
        };
        let server_task = tokio::spawn(serve(listener, commands));

        info!(
            path = %persistence.path().display(),
            entries = history.len(),
            "daemon started"
        );

        Ok(Self {
            history,
            persistence,
            save_queue,
            observer: Some(observer),
            server_task,
            save_task,
        })
    }

    pub fn history(&self) -> &Arc<History> {
        &self.history
    }

    pub fn save_queue(&self) -> &SaveQueue {
        &self.save_queue
    }

    /// Stops the observer and server, then makes a bounded, best-effort final
    /// save.
    pub async fn shutdown(mut self) {
        self.server_task.abort();
        if let Some(observer) = self.observer.take() {
            let _ = tokio::task::spawn_blocking(move || observer.stop()).await;
        }

        self.save_queue.save_async();
        let flushed = matches!(
            timeout(FINAL_FLUSH_TIMEOUT, self.save_queue.flush()).await,
            Ok(true)
        );
        self.save_task.abort();

        // Aborting does not stop a save already inside `spawn_blocking`; the
        // direct save below waits on the persistence lock behind it.
        if !flushed {
            warn!("save worker did not drain; saving directly");
            let persistence = Arc::clone(&self.persistence);
            let history = Arc::clone(&self.history);
            let _ = timeout(
                FINAL_FLUSH_TIMEOUT,
                tokio::task::spawn_blocking(move || persistence.save(&history)),
            )
            .await;
        }

        info!("daemon stopped");
    }
}
