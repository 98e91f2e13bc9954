//! JSON-lines transport between a client byte stream and the coordinator.
//!
//! Each inbound line is one [`Request`]; each outbound line is one [`Event`].
//! Lines that do not parse are answered with an error response, routed
//! through the coordinator so they still queue behind the handshake.
//!
//! Transport errors:
//! - Unparseable lines get an error response and the connection stays open
//! - Codec and IO errors close the connection

use futures::{SinkExt, StreamExt};
use ipc::{Event, Request, Response, codes};
use tokio::{
  io::{AsyncRead, AsyncWrite},
  sync::mpsc,
  task::JoinError,
};
use tokio_util::{
  codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError},
  sync::CancellationToken,
};
use tracing::{debug, info, trace, warn};

use crate::{
  actor::{
    coordinator::{Coordinator, CoordinatorError, ExitReason},
    handle::CoordinatorHandle,
    watcher::FsWatcher,
  },
  config::Config,
  logging,
  services::Services,
};

const CLIENT_BUFFER: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
  #[error("Codec error: {0}")]
  Codec(#[from] LinesCodecError),

  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
  #[error(transparent)]
  Coordinator(#[from] CoordinatorError),

  #[error(transparent)]
  Transport(#[from] TransportError),

  #[error("Coordinator task failed: {0}")]
  Join(#[from] JoinError),
}

/// Pump requests from `reader` into the coordinator and events from
/// `events` out to `writer`.
///
/// Reading stops at EOF, which drops the coordinator handle. Writing
/// continues until every event sender is gone, so replies produced during
/// shutdown still reach the client. Cancellation stops both sides at once.
pub async fn serve<R, W>(
  reader: R,
  writer: W,
  handle: CoordinatorHandle,
  mut events: mpsc::Receiver<Event>,
  cancel: CancellationToken,
) -> Result<(), TransportError>
where
  R: AsyncRead + Unpin,
  W: AsyncWrite + Unpin,
{
  let mut lines = FramedRead::new(reader, LinesCodec::new());
  let mut sink = FramedWrite::new(writer, LinesCodec::new());
  let mut handle = Some(handle);
  let mut request_count = 0u64;

  loop {
    tokio::select! {
      biased;

      _ = cancel.cancelled() => {
        debug!("Transport cancelled");
        break;
      }

      event = events.recv() => match event {
        Some(event) => {
          let json = serde_json::to_string(&event)?;
          sink.send(json).await?;
        }
        None => {
          debug!("Event stream closed");
          break;
        }
      },

      line = lines.next(), if handle.is_some() => match line {
        Some(Ok(line)) => {
          let Some(coordinator) = handle.as_ref() else {
            continue;
          };
          request_count += 1;
          if !forward_line(coordinator, &line).await {
            info!("Coordinator gone, no longer reading");
            handle = None;
          }
        }
        Some(Err(e)) => {
          warn!(error = %e, "Error reading from client");
          handle = None;
        }
        None => {
          debug!(requests = request_count, "Client closed input");
          handle = None;
        }
      },
    }
  }

  Ok(())
}

/// Returns false once the coordinator can no longer be reached
async fn forward_line(coordinator: &CoordinatorHandle, line: &str) -> bool {
  let trimmed = line.trim();
  if trimmed.is_empty() {
    return true;
  }

  let delivered = match serde_json::from_str::<Request>(trimmed) {
    Ok(request) => {
      trace!(id = %request.id, method = request.method_name(), "Request received");
      coordinator.send(request).await
    }
    Err(e) => {
      warn!(error = %e, "Invalid request");
      coordinator.reject(reject_line(trimmed, &e)).await
    }
  };
  delivered.is_ok()
}

/// Build the error reply for a line that is not a valid request. Lines that
/// are valid JSON with a string id keep their id.
fn reject_line(line: &str, error: &serde_json::Error) -> Response {
  let id = serde_json::from_str::<serde_json::Value>(line)
    .ok()
    .and_then(|value| value.get("id").and_then(|id| id.as_str()).map(str::to_string));

  match id {
    Some(id) => Response::error(id, codes::INVALID_PARAMS, format!("Invalid params: {error}")),
    None => Response::error("unknown", codes::PARSE_ERROR, format!("Parse error: {error}")),
  }
}

/// Run a full session over `reader`/`writer`: spawn the coordinator, attach
/// the file watcher, and serve until the coordinator exits.
pub async fn run<R, W>(
  config: Config,
  services: Services,
  reader: R,
  writer: W,
  cancel: CancellationToken,
) -> Result<ExitReason, ServerError>
where
  R: AsyncRead + Unpin,
  W: AsyncWrite + Unpin,
{
  let (client_tx, client_rx) = mpsc::channel(CLIENT_BUFFER);
  let watch = config.watcher.enabled.then(|| config.project.root.clone());
  let (handle, coordinator) = Coordinator::spawn(config, services, client_tx, cancel.clone())?;

  if let Some(root) = watch {
    match FsWatcher::spawn(&root, &handle, cancel.child_token()) {
      Ok(watcher) => {
        if handle.register_watcher(Box::new(watcher)).await.is_err() {
          warn!("Coordinator exited before the watcher was registered");
        }
      }
      Err(e) => warn!(error = %e, "File watcher unavailable, recompiles will not be triggered"),
    }
  }

  let served = serve(reader, writer, handle, client_rx, cancel.clone()).await;
  if let Err(e) = &served {
    warn!(error = %e, "Transport failed, cancelling session");
    cancel.cancel();
  }

  let reason = coordinator.await??;
  served?;
  Ok(reason)
}

/// Serve a session on stdin/stdout, cancelling on Ctrl-C.
///
/// Installs logging from `config.log` first; stdout carries the protocol, so
/// logs go to stderr or the configured directory.
pub async fn run_stdio(config: Config, services: Services) -> Result<ExitReason, ServerError> {
  let _log_guard = logging::init(&config.log);
  let cancel = CancellationToken::new();

  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      info!("Received Ctrl-C, shutting down");
      ctrl_c.cancel();
    }
  });

  run(config, services, tokio::io::stdin(), tokio::io::stdout(), cancel).await
}
