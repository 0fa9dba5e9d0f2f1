//! Integration tests for the control channel server.
//!
//! Validates:
//! - `STOP` (any case, CR/LF terminated or not) sets the flag and ends the server
//! - unrecognized, empty, and padded commands are ignored and the server
//!   keeps accepting clients
//! - a command left unterminated on an open connection is evaluated after
//!   the read timeout
//! - cancellation ends the server without touching the flag

use std::time::Duration;

use interprocess::local_socket::tokio::prelude::*;
use netwatch::ipc::server::{spawn_control_server, ServerExit};
use netwatch::StopFlag;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{connect, fast_timing, send_raw, unique_ipc_name};

const FINISH_TIMEOUT: Duration = Duration::from_secs(3);

/// Give the server a moment to process a connection that produced no effect.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

fn start(label: &str) -> (String, StopFlag, CancellationToken, tokio::task::JoinHandle<ServerExit>) {
    let name = unique_ipc_name(label);
    let stop = StopFlag::new();
    let ct = CancellationToken::new();
    let handle = spawn_control_server(&name, &fast_timing(), stop.clone(), ct.clone())
        .expect("server spawns");
    (name, stop, ct, handle)
}

async fn finish(handle: tokio::task::JoinHandle<ServerExit>) -> ServerExit {
    tokio::time::timeout(FINISH_TIMEOUT, handle)
        .await
        .expect("server finishes in time")
        .expect("server task does not panic")
}

#[tokio::test]
async fn stop_sets_flag_and_ends_server() {
    let (name, stop, _ct, handle) = start("stop");

    send_raw(&name, b"STOP\r\n").await.expect("send");

    assert_eq!(finish(handle).await, ServerExit::StopReceived);
    assert!(stop.is_requested());
}

#[tokio::test]
async fn lowercase_stop_without_terminator_is_accepted() {
    let (name, stop, _ct, handle) = start("lower");

    send_raw(&name, b"stop").await.expect("send");

    assert_eq!(finish(handle).await, ServerExit::StopReceived);
    assert!(stop.is_requested());
}

#[tokio::test]
async fn unrecognized_command_keeps_serving() {
    let (name, stop, _ct, handle) = start("start");

    send_raw(&name, b"START\r\n").await.expect("send");
    settle().await;

    assert!(!stop.is_requested(), "START must not set the flag");
    assert!(!handle.is_finished(), "server keeps listening");

    send_raw(&name, b"STOP\n").await.expect("send");
    assert_eq!(finish(handle).await, ServerExit::StopReceived);
    assert!(stop.is_requested());
}

#[tokio::test]
async fn padded_and_compound_commands_are_ignored() {
    let (name, stop, _ct, handle) = start("padded");

    send_raw(&name, b"  STOP\n").await.expect("send");
    send_raw(&name, b"STOP NOW\n").await.expect("send");
    settle().await;

    assert!(!stop.is_requested());
    assert!(!handle.is_finished());

    send_raw(&name, b"StOp\r\n").await.expect("send");
    assert_eq!(finish(handle).await, ServerExit::StopReceived);
}

#[tokio::test]
async fn connection_without_data_is_ignored() {
    let (name, stop, _ct, handle) = start("empty");

    drop(connect(&name).await);
    send_raw(&name, b"\r\n").await.expect("send");
    settle().await;

    assert!(!stop.is_requested());
    assert!(!handle.is_finished());

    send_raw(&name, b"STOP").await.expect("send");
    assert_eq!(finish(handle).await, ServerExit::StopReceived);
}

#[tokio::test]
async fn oversized_command_is_ignored() {
    let (name, stop, _ct, handle) = start("oversized");

    let payload = vec![b'A'; 600];
    // The server may close before draining the tail, so a write error is fine.
    let _ = send_raw(&name, &payload).await;
    settle().await;

    assert!(!stop.is_requested());
    assert!(!handle.is_finished());

    send_raw(&name, b"STOP\n").await.expect("send");
    assert_eq!(finish(handle).await, ServerExit::StopReceived);
}

#[tokio::test]
async fn unterminated_command_on_open_connection_is_read_after_timeout() {
    let (name, stop, _ct, handle) = start("open");

    let stream = connect(&name).await;
    let (_reader, mut writer) = stream.split();
    writer.write_all(b"STOP").await.expect("write");
    writer.flush().await.expect("flush");

    // Connection stays open; the 500 ms read bound ends the read.
    assert_eq!(finish(handle).await, ServerExit::StopReceived);
    assert!(stop.is_requested());
}

#[tokio::test]
async fn cancellation_ends_server_without_stop() {
    let (_name, stop, ct, handle) = start("cancel");

    settle().await;
    ct.cancel();

    assert_eq!(finish(handle).await, ServerExit::Cancelled);
    assert!(!stop.is_requested());
}

#[tokio::test]
async fn stop_transitions_flag_exactly_once() {
    let (name, stop, _ct, handle) = start("once");

    send_raw(&name, b"STOP\n").await.expect("send");
    assert_eq!(finish(handle).await, ServerExit::StopReceived);

    assert!(!stop.request(), "flag was already set by the server");
    assert!(stop.is_requested());
}
