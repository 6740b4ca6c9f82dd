use std::time::Duration;

use clipkeep_core::{ControlCommand, Visibility};
use clipkeep_daemon::{
    LaunchRequest, Role, control::loopback, coordinate, run_presenter, send_command, serve,
    try_bind,
};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};

async fn start_server() -> (u16, mpsc::UnboundedReceiver<ControlCommand>, JoinHandle<()>) {
    let listener = try_bind(0).await.expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(serve(listener, tx));
    (port, rx, task)
}

async fn recv_command(
    rx: &mut mpsc::UnboundedReceiver<ControlCommand>,
    wait: Duration,
) -> Option<ControlCommand> {
    timeout(wait, rx.recv()).await.ok().flatten()
}

async fn write_raw(port: u16, bytes: &[u8]) {
    let mut stream = TcpStream::connect(loopback(port))
        .await
        .expect("connect to control port");
    // The server stops reading after one bounded line, so late writes may fail.
    let _ = stream.write_all(bytes).await;
    let _ = stream.shutdown().await;
}

#[tokio::test]
async fn sent_commands_reach_the_presenter_channel() {
    let (port, mut rx, server) = start_server().await;

    for command in ControlCommand::ALL {
        assert!(send_command(port, command).await);
        assert_eq!(
            recv_command(&mut rx, Duration::from_secs(2)).await,
            Some(command)
        );
    }

    server.abort();
}

#[tokio::test]
async fn raw_lines_are_trimmed_and_case_insensitive() {
    let (port, mut rx, server) = start_server().await;

    write_raw(port, b"  toggle \r\n").await;
    assert_eq!(
        recv_command(&mut rx, Duration::from_secs(2)).await,
        Some(ControlCommand::Toggle)
    );

    write_raw(port, b"Hide\n").await;
    assert_eq!(
        recv_command(&mut rx, Duration::from_secs(2)).await,
        Some(ControlCommand::Hide)
    );

    server.abort();
}

#[tokio::test]
async fn unknown_and_broken_connections_do_not_stop_the_server() {
    let (port, mut rx, server) = start_server().await;

    write_raw(port, b"REBOOT\n").await;
    write_raw(port, b"").await;
    write_raw(port, &[0xff, 0xfe, b'\n']).await;
    write_raw(port, &vec![b'A'; 4096]).await;
    assert_eq!(recv_command(&mut rx, Duration::from_millis(300)).await, None);

    assert!(send_command(port, ControlCommand::Show).await);
    assert_eq!(
        recv_command(&mut rx, Duration::from_secs(2)).await,
        Some(ControlCommand::Show)
    );

    server.abort();
}

#[tokio::test]
async fn only_the_first_line_of_a_connection_counts() {
    let (port, mut rx, server) = start_server().await;

    write_raw(port, b"SHOW\nHIDE\n").await;
    assert_eq!(
        recv_command(&mut rx, Duration::from_secs(2)).await,
        Some(ControlCommand::Show)
    );
    assert_eq!(recv_command(&mut rx, Duration::from_millis(300)).await, None);

    server.abort();
}

#[tokio::test]
async fn send_without_listener_returns_false() {
    let listener = try_bind(0).await.expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    assert!(!send_command(port, ControlCommand::Toggle).await);
}

#[tokio::test]
async fn toggle_twice_restores_presenter_visibility() {
    let (port, rx, server) = start_server().await;
    let presenter = tokio::spawn(run_presenter(rx, Visibility::Hidden));

    assert!(send_command(port, ControlCommand::Toggle).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(send_command(port, ControlCommand::Toggle).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Aborting the server drops the last sender, which ends the presenter loop.
    server.abort();
    let visibility = timeout(Duration::from_secs(2), presenter)
        .await
        .expect("presenter finishes")
        .expect("presenter task");
    assert_eq!(visibility, Visibility::Hidden);
}

#[tokio::test]
async fn second_instance_signals_the_primary() {
    let listener = try_bind(0).await.expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = tokio::spawn(serve(listener, tx));

    assert!(try_bind(port).await.is_none(), "port must stay exclusive");

    match coordinate(port, LaunchRequest::Resident).await {
        Role::Secondary { delivered } => assert!(delivered),
        Role::Primary(_) => panic!("second instance must not become primary"),
    }
    assert_eq!(
        recv_command(&mut rx, Duration::from_secs(2)).await,
        Some(ControlCommand::Toggle)
    );

    match coordinate(port, LaunchRequest::Toggle).await {
        Role::Secondary { delivered } => assert!(delivered),
        Role::Primary(_) => panic!("toggle launch must not become primary"),
    }
    assert_eq!(
        recv_command(&mut rx, Duration::from_secs(2)).await,
        Some(ControlCommand::Toggle)
    );
    assert_eq!(recv_command(&mut rx, Duration::from_millis(300)).await, None);

    server.abort();
}

#[tokio::test]
async fn free_port_makes_a_primary() {
    let probe = try_bind(0).await.expect("bind ephemeral port");
    let port = probe.local_addr().expect("local addr").port();
    drop(probe);

    match coordinate(port, LaunchRequest::Toggle).await {
        Role::Primary(listener) => {
            assert_eq!(listener.local_addr().expect("local addr").port(), port);
            assert!(listener.local_addr().expect("local addr").ip().is_loopback());
        }
        Role::Secondary { .. } => panic!("nothing was listening on {port}"),
    }
}
