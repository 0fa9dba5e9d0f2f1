//! Control channel server.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Clients are served one at a time; each
//! connection carries a single command and gets no reply.
//!
//! ## Protocol
//!
//! ```text
//! STOP\r\n
//! ```
//!
//! Up to 512 bytes of ASCII, optionally terminated by CR and/or LF. Only a
//! case-insensitive `STOP` has an effect: it sets the shared [`StopFlag`]
//! and the server stops listening for good. Anything else closes the
//! connection and the server waits for the next client.

use std::time::Duration;

use interprocess::local_socket::tokio::{Listener, Stream};
use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::TimingConfig;
use crate::ipc::command::{parse_command, ControlCommand, MAX_COMMAND_BYTES};
use crate::{AppError, Result, StopFlag};

/// Why the control server task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerExit {
    /// A `STOP` command was read and the stop flag was set.
    StopReceived,
    /// The cancellation token fired before any `STOP` arrived.
    Cancelled,
}

/// Spawn the control channel server task.
///
/// The task keeps serving until a `STOP` command arrives or `ct` is
/// cancelled. Endpoint creation and accept failures are retried after
/// `timing.listener_retry_ms`; they never end the task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if `ipc_name` is not a valid local socket name.
pub fn spawn_control_server(
    ipc_name: &str,
    timing: &TimingConfig,
    stop: StopFlag,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<ServerExit>> {
    ipc_name
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{ipc_name}': {err}")))?;

    warn!(
        ipc_name,
        "control channel is unauthenticated; any local process can request shutdown"
    );

    let server = ControlServer {
        name: ipc_name.to_owned(),
        listener_retry: timing.listener_retry(),
        read_timeout: timing.read_timeout(),
        stop,
    };

    let span = info_span!("control_server", ipc_name = %ipc_name);
    Ok(tokio::spawn(server.serve(ct).instrument(span)))
}

struct ControlServer {
    name: String,
    listener_retry: Duration,
    read_timeout: Duration,
    stop: StopFlag,
}

impl ControlServer {
    async fn serve(self, ct: CancellationToken) -> ServerExit {
        loop {
            match self.bind() {
                Ok(listener) => {
                    info!("control channel listening");
                    if let Some(exit) = self.accept_until_stop(&listener, &ct).await {
                        info!(?exit, "control channel closed");
                        return exit;
                    }
                }
                Err(err) => {
                    warn!(%err, "failed to create control endpoint");
                }
            }

            tokio::select! {
                () = ct.cancelled() => {
                    info!("control channel cancelled while re-arming");
                    return ServerExit::Cancelled;
                }
                () = tokio::time::sleep(self.listener_retry) => {}
            }
        }
    }

    fn bind(&self) -> std::io::Result<Listener> {
        let name = self.name.as_str().to_ns_name::<GenericNamespaced>()?;
        ListenerOptions::new().name(name).create_tokio()
    }

    /// Serve clients sequentially. `None` means the endpoint must be re-armed.
    async fn accept_until_stop(
        &self,
        listener: &Listener,
        ct: &CancellationToken,
    ) -> Option<ServerExit> {
        loop {
            let stream = tokio::select! {
                () = ct.cancelled() => return Some(ServerExit::Cancelled),
                accept_result = listener.accept() => match accept_result {
                    Ok(stream) => stream,
                    Err(err) => {
                        warn!(%err, "control accept failed, re-arming endpoint");
                        return None;
                    }
                },
            };

            if self.handle_connection(stream).await {
                return Some(ServerExit::StopReceived);
            }
        }
    }

    /// Read and act on one command. Returns `true` when `STOP` was accepted.
    async fn handle_connection(&self, stream: Stream) -> bool {
        let span = info_span!("control_conn");
        async move {
            let (mut reader, _writer) = stream.split();
            let mut buf = [0_u8; MAX_COMMAND_BYTES];
            let mut filled = 0;

            let read = tokio::time::timeout(
                self.read_timeout,
                read_command(&mut reader, &mut buf, &mut filled),
            )
            .await;

            match read {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(%err, "control read error");
                    return false;
                }
                Err(_) => {
                    debug!(filled, "control read timed out, evaluating partial command");
                }
            }

            match parse_command(&buf[..filled]) {
                ControlCommand::Stop => {
                    if self.stop.request() {
                        info!("stop command accepted");
                    } else {
                        debug!("stop already requested");
                    }
                    true
                }
                ControlCommand::Empty => {
                    debug!("empty control message ignored");
                    false
                }
                ControlCommand::Unrecognized(text) => {
                    info!(command = %text, "unrecognized control command ignored");
                    false
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Fill `buf` until end-of-stream, a line terminator, or a full buffer.
///
/// `filled` is updated after every read so a caller that times out still
/// sees what arrived.
async fn read_command<R>(reader: &mut R, buf: &mut [u8], filled: &mut usize) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    while *filled < buf.len() {
        let n = reader.read(&mut buf[*filled..]).await?;
        if n == 0 {
            break;
        }
        let start = *filled;
        *filled += n;
        if buf[start..*filled]
            .iter()
            .any(|b| matches!(b, b'\r' | b'\n'))
        {
            break;
        }
    }
    Ok(())
}
