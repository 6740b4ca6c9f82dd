//! Loopback control channel.
//!
//! One command per connection: the client writes a token and `\n`, then
//! closes. Nothing is ever written back.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use clipkeep_core::{ControlCommand, control::MAX_COMMAND_LINE_BYTES};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::timeout,
};
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Binds the control listener on 127.0.0.1. `None` means the port is taken,
/// which normally means a primary instance already owns it.
pub async fn try_bind(port: u16) -> Option<TcpListener> {
    match TcpListener::bind(loopback(port)).await {
        Ok(listener) => Some(listener),
        Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
            debug!(port, "control port already bound");
            None
        }
        Err(err) => {
            warn!(port, "control port unavailable: {}", err);
            None
        }
    }
}

/// Delivers one command to whoever listens on `port`. Returns `false` when
/// nothing is listening or the write fails.
pub async fn send_command(port: u16, command: ControlCommand) -> bool {
    match deliver(port, command).await {
        Ok(()) => {
            debug!(port, %command, "control command sent");
            true
        }
        Err(err) => {
            debug!(port, %command, "control command not delivered: {}", err);
            false
        }
    }
}

async fn deliver(port: u16, command: ControlCommand) -> io::Result<()> {
    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(loopback(port)))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
    stream.write_all(command.wire_line().as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

/// Accept loop. Each connection is read on its own task; recognised commands
/// are forwarded to `commands`, whose receiver runs on the presentation
/// layer's side. Per-connection failures never end the loop.
pub async fn serve(listener: TcpListener, commands: mpsc::UnboundedSender<ControlCommand>) {
    info!(
        "control server listening on {}",
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_owned())
    );

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("control accept failed: {}", err);
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
        };

        let commands = commands.clone();
        tokio::spawn(async move {
            match read_command(stream).await {
                Ok(Some(command)) => {
                    debug!(%peer, %command, "control command received");
                    if commands.send(command).is_err() {
                        warn!("presenter gone; dropping {}", command);
                    }
                }
                Ok(None) => debug!(%peer, "ignored unrecognised control line"),
                Err(err) => debug!(%peer, "control connection failed: {}", err),
            }
        });
    }
}

/// Reads exactly one line and parses it.
pub async fn read_command(stream: TcpStream) -> io::Result<Option<ControlCommand>> {
    let mut reader = BufReader::new(stream.take(MAX_COMMAND_LINE_BYTES));
    let mut line = Vec::new();
    timeout(READ_TIMEOUT, reader.read_until(b'\n', &mut line))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))??;

    Ok(ControlCommand::parse_line(&String::from_utf8_lossy(&line)))
}
