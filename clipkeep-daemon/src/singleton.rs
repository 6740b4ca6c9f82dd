use clipkeep_core::ControlCommand;
use tokio::net::TcpListener;
use tracing::info;

use crate::control::{send_command, try_bind};

/// What the launcher asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchRequest {
    /// Plain start: become the resident primary if none is running.
    #[default]
    Resident,
    /// `--toggle` / `--show`: flip the running primary, or start one and
    /// show it.
    Toggle,
}

#[derive(Debug)]
pub enum Role {
    /// This process owns the control port and runs the services.
    Primary(TcpListener),
    /// Another process owns the port; `delivered` reports whether it got
    /// the TOGGLE.
    Secondary { delivered: bool },
}

/// Decides the role of this process.
///
/// With a toggle request an existing primary is signalled first. Otherwise,
/// or if nobody answered, the control port is bound; losing that race makes
/// this process a secondary that sends TOGGLE to the winner.
pub async fn coordinate(port: u16, request: LaunchRequest) -> Role {
    if request == LaunchRequest::Toggle && send_command(port, ControlCommand::Toggle).await {
        info!(port, "toggled running instance");
        return Role::Secondary { delivered: true };
    }

    match try_bind(port).await {
        Some(listener) => {
            info!(port, "running as primary instance");
            Role::Primary(listener)
        }
        None => {
            let delivered = send_command(port, ControlCommand::Toggle).await;
            info!(port, delivered, "another instance owns the control port");
            Role::Secondary { delivered }
        }
    }
}
