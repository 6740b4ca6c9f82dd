use std::{io::BufRead, path::PathBuf, process::ExitCode, sync::Arc, thread, time::Duration};

use chrono::Local;
use clap::{Parser, Subcommand};
use clipkeep_core::{
    Config, ControlCommand, DEFAULT_CONTROL_PORT, DEFAULT_MAX_HISTORY, DEFAULT_MAX_VISIBLE,
    DEFAULT_POLL_INTERVAL, History, friendly_label,
};
use clipkeep_daemon::{
    ArboardSink, ArboardSource, Daemon, HeadlessPresenter, HistoryActions, LaunchRequest,
    Persistence, Role, coordinate, logging::init_logging, persistence, run_actions,
    run_presenter,
};
use serde::Serialize;
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "clipkeep", about = "Resident clipboard history")]
struct Args {
    /// Toggle the running instance, or start one and show it.
    #[arg(long, default_value_t = false)]
    toggle: bool,
    /// Same as --toggle.
    #[arg(long, default_value_t = false)]
    show: bool,
    #[arg(long, default_value_t = DEFAULT_CONTROL_PORT)]
    port: u16,
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    poll_ms: u64,
    #[arg(long, default_value_t = DEFAULT_MAX_HISTORY)]
    max_history: usize,
    #[arg(long, default_value_t = DEFAULT_MAX_VISIBLE)]
    max_visible: usize,
    /// Directory for history.txt and logs (default: per-user data directory).
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print stored entries matching QUERY as JSON lines, newest first.
    List {
        query: Option<String>,
        #[arg(long, default_value_t = DEFAULT_MAX_VISIBLE)]
        limit: usize,
    },
}

impl Args {
    fn config(&self) -> Config {
        Config {
            port: self.port,
            poll_interval: Duration::from_millis(self.poll_ms.max(1)),
            max_history: self.max_history,
            max_visible: self.max_visible,
            data_dir: self.data_dir.clone(),
        }
    }

    fn launch_request(&self) -> LaunchRequest {
        if self.toggle || self.show {
            LaunchRequest::Toggle
        } else {
            LaunchRequest::Resident
        }
    }
}

#[derive(Serialize)]
struct ListedEntry<'a> {
    timestamp_unix_ms: u64,
    when: String,
    text: &'a str,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = args.config();
    let data_dir = config
        .data_dir
        .clone()
        .unwrap_or_else(persistence::data_dir);
    init_logging(&data_dir);

    if let Some(Command::List { query, limit }) = &args.command {
        return list(&config, query.as_deref().unwrap_or(""), *limit);
    }

    let request = args.launch_request();
    match coordinate(config.port, request).await {
        Role::Secondary { .. } => ExitCode::SUCCESS,
        Role::Primary(listener) => run_primary(&config, listener, request).await,
    }
}

async fn run_primary(config: &Config, listener: TcpListener, request: LaunchRequest) -> ExitCode {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let daemon = match Daemon::start(config, listener, command_tx.clone(), ArboardSource::default)
    {
        Ok(daemon) => daemon,
        Err(err) => {
            error!("failed to start clipboard observer: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let presenter = HeadlessPresenter::new(Arc::clone(daemon.history()), config.max_visible);
    if request == LaunchRequest::Toggle {
        let _ = command_tx.send(ControlCommand::Toggle);
    }
    let presenter_task = tokio::spawn(run_presenter(command_rx, presenter));

    let actions = HistoryActions::new(
        Arc::clone(daemon.history()),
        config.max_visible,
        Box::new(ArboardSink),
    );
    let actions_task = tokio::spawn(run_actions(stdin_lines(), actions, command_tx));

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to wait for shutdown signal: {}", err);
    }
    info!("shutdown requested");

    actions_task.abort();
    daemon.shutdown().await;
    presenter_task.abort();
    ExitCode::SUCCESS
}

/// Forwards stdin lines (`copy <index>`, `clear`) from a detached reader
/// thread. The channel closes when stdin does.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = thread::Builder::new()
        .name("action-input".to_owned())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(err) = spawned {
        warn!("stdin actions unavailable: {}", err);
    }
    rx
}

fn list(config: &Config, query: &str, limit: usize) -> ExitCode {
    let persistence = Persistence::from_config(config);
    let report = match persistence.load_once() {
        Ok(report) => report,
        Err(err) => {
            eprintln!("cannot read {}: {err}", persistence.path().display());
            return ExitCode::FAILURE;
        }
    };

    let history = History::new(config.max_history);
    history.bulk_load(report.entries, true);

    let now = Local::now();
    for entry in history.search(query, limit) {
        let listed = ListedEntry {
            timestamp_unix_ms: entry.timestamp_unix_ms,
            when: friendly_label(entry.timestamp_unix_ms, &now),
            text: &entry.text,
        };
        match serde_json::to_string(&listed) {
            Ok(line) => println!("{line}"),
            Err(err) => error!("failed to serialize entry: {}", err),
        }
    }
    ExitCode::SUCCESS
}
