//! Coordinator - the session's single entry and exit point
//!
//! The coordinator owns the connection state. Until the client's handshake
//! arrives, every request except shutdown is parked in a FIFO queue and the
//! outbound gate holds back everything workers emit. The handshake is
//! answered directly on the client channel, the parked requests are routed
//! in arrival order, and only then is the gate opened. The handshake
//! response is therefore always the first thing the client sees.
//!
//! # Lifecycle
//!
//! 1. Startup (gate, index refresh, workers) runs inside the spawned task
//! 2. The loop serves the mailbox and the recompile debounce until shutdown,
//!    cancellation, or every handle is dropped
//! 3. Teardown always runs, then the workers' token is cancelled

use std::{collections::VecDeque, future::pending};

use ipc::{Event, HandshakeParams, Request, RequestData, Response, SessionDescriptor, ShutdownParams, codes};
use serde_json::{Value, json};
use tokio::{
  sync::mpsc,
  task::JoinHandle,
  time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{
  debounce::Debouncer,
  handle::{CoordinatorHandle, WeakCoordinatorHandle},
  lifecycle::{Session, startup, teardown},
  message::{ChangeEvent, CoordinatorMessage},
  router::{Routed, partial_batch_notification},
};
use crate::{
  config::{Config, ConfigError},
  services::{ChangeWatcher, RefreshStats, ServiceError, Services},
};

const MAILBOX_SIZE: usize = 256;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
  AwaitingHandshake,
  Active,
}

/// Why the coordinator stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
  /// The client asked for shutdown
  Requested { reason: String, error: bool },
  /// The startup index refresh finished with `exit_after_index` set
  IndexComplete,
  /// The cancellation token fired
  Cancelled,
  /// Every coordinator handle was dropped
  Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
  #[error("Index refresh failed: {0}")]
  IndexRefresh(#[source] ServiceError),
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
  #[error("Invalid configuration: {0}")]
  Config(#[from] ConfigError),

  #[error("Startup failed: {0}")]
  Startup(#[from] StartupError),

  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

enum Flow {
  Continue,
  Exit(ExitReason),
  Fatal(StartupError),
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct Coordinator {
  config: Config,
  services: Services,
  rx: mpsc::Receiver<CoordinatorMessage>,
  client: mpsc::Sender<Event>,
  cancel: CancellationToken,
  workers_cancel: CancellationToken,
  state: ConnectionState,
  pending: VecDeque<Request>,
  descriptor: Value,
  debouncer: Debouncer,
  watchers: Vec<Box<dyn ChangeWatcher>>,
}

impl Coordinator {
  /// Validate the config and spawn the coordinator task.
  ///
  /// Events for the client are written to `client`. The task resolves to
  /// the exit reason once teardown has finished.
  #[allow(clippy::type_complexity)]
  pub fn spawn(
    config: Config,
    services: Services,
    client: mpsc::Sender<Event>,
    cancel: CancellationToken,
  ) -> Result<(CoordinatorHandle, JoinHandle<Result<ExitReason, CoordinatorError>>), CoordinatorError> {
    config.validate()?;
    let debouncer = Debouncer::from_config(&config.watcher)?;
    let descriptor = serde_json::to_value(SessionDescriptor::new(&config.server.name, &config.server.version))?;

    let (tx, rx) = mpsc::channel(MAILBOX_SIZE);
    let handle = CoordinatorHandle::new(tx);
    let weak = handle.downgrade();

    let coordinator = Self {
      config,
      services,
      rx,
      client,
      workers_cancel: cancel.child_token(),
      cancel,
      state: ConnectionState::AwaitingHandshake,
      pending: VecDeque::new(),
      descriptor,
      debouncer,
      watchers: Vec::new(),
    };

    Ok((handle, tokio::spawn(coordinator.run(weak))))
  }

  async fn run(mut self, weak: WeakCoordinatorHandle) -> Result<ExitReason, CoordinatorError> {
    info!(server = %self.config.server.name, "Coordinator starting");

    let session = startup::start(
      &self.config,
      &self.services,
      weak,
      self.client.clone(),
      &self.workers_cancel,
    )
    .await;

    let outcome = self.event_loop(&session).await;

    let report = teardown(
      &mut self.watchers,
      self.services.search.as_ref(),
      self.services.vfs.as_ref(),
      self.config.shutdown.search_grace(),
    )
    .await;
    if !report.is_clean() {
      warn!(failures = report.failures.len(), "Teardown finished with failures");
    }
    self.workers_cancel.cancel();

    match outcome {
      Ok(reason) => {
        info!(?reason, "Coordinator stopped");
        Ok(reason)
      }
      Err(e) => {
        error!(error = %e, "Coordinator stopped on fatal startup error");
        Err(e.into())
      }
    }
  }

  async fn event_loop(&mut self, session: &Session) -> Result<ExitReason, StartupError> {
    loop {
      // Checked every turn so a busy mailbox cannot hold back a due recompile
      self.fire_debounce(session);
      let deadline = self.debouncer.deadline();

      let flow = tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          info!("Coordinator cancelled");
          Flow::Exit(ExitReason::Cancelled)
        }

        _ = wait_until(deadline) => Flow::Continue,

        msg = self.rx.recv() => match msg {
          Some(msg) => self.handle_message(msg, session).await,
          None => {
            info!("All coordinator handles dropped");
            Flow::Exit(ExitReason::Disconnected)
          }
        },
      };

      match flow {
        Flow::Continue => {}
        Flow::Exit(reason) => return Ok(reason),
        Flow::Fatal(e) => return Err(e),
      }
    }
  }

  fn fire_debounce(&mut self, session: &Session) {
    if self.debouncer.poll(Instant::now()) {
      debug!("Sources settled, requesting recompile");
      session.router.recompile_all();
    }
  }

  async fn handle_message(&mut self, msg: CoordinatorMessage, session: &Session) -> Flow {
    match msg {
      CoordinatorMessage::Client(request) => self.handle_client(request, session).await,
      CoordinatorMessage::Reject(response) => {
        debug!(id = %response.id, code = ?response.error_code(), "Rejecting request");
        emit(session, response.into()).await;
        Flow::Continue
      }
      CoordinatorMessage::Change(change) => {
        self.on_change(change);
        Flow::Continue
      }
      CoordinatorMessage::RegisterWatcher(watcher) => {
        debug!(watcher = watcher.name(), "Watcher registered");
        self.watchers.push(watcher);
        Flow::Continue
      }
      CoordinatorMessage::IndexRefreshed(result) => self.on_index_refreshed(result, session).await,
    }
  }

  // --------------------------------------------------------------------------
  // Connection state
  // --------------------------------------------------------------------------

  async fn handle_client(&mut self, request: Request, session: &Session) -> Flow {
    match self.state {
      ConnectionState::AwaitingHandshake => match request.data {
        RequestData::Shutdown(params) => {
          info!(reason = %params.reason, "Shutdown requested before handshake");
          Flow::Exit(requested(params))
        }
        RequestData::Handshake(params) => self.accept_handshake(&request.id, &params, session).await,
        data => {
          self.park(Request::new(request.id, data), session).await;
          Flow::Continue
        }
      },
      ConnectionState::Active => match request.data {
        RequestData::Handshake(_) => {
          debug!(id = %request.id, "Repeated handshake");
          emit(session, Response::success(request.id, self.descriptor.clone()).into()).await;
          Flow::Continue
        }
        data => self.route(Request::new(request.id, data), session).await,
      },
    }
  }

  async fn accept_handshake(&mut self, id: &str, params: &HandshakeParams, session: &Session) -> Flow {
    info!(
      client = params.client_name.as_deref().unwrap_or("unknown"),
      pending = self.pending.len(),
      "Handshake received"
    );

    let reply = Event::Response(Response::success(id, self.descriptor.clone()));
    if self.client.send(reply).await.is_err() {
      warn!("Client channel closed before handshake reply");
    }
    self.state = ConnectionState::Active;

    while let Some(request) = self.pending.pop_front() {
      if let Flow::Exit(reason) = self.route(request, session).await {
        return Flow::Exit(reason);
      }
    }

    if session.gate.activate().await.is_err() {
      warn!("Outbound gate gone at activation");
    }
    Flow::Continue
  }

  async fn park(&mut self, request: Request, session: &Session) {
    if self.pending.len() >= self.config.session.max_pending {
      warn!(
        id = %request.id,
        max_pending = self.config.session.max_pending,
        "Pending queue full, rejecting request"
      );
      let response = Response::error(
        request.id,
        codes::NOT_INITIALIZED,
        "session not initialized: pending queue full",
      );
      emit(session, response.into()).await;
      return;
    }

    trace!(id = %request.id, method = request.method_name(), "Parking request until handshake");
    self.pending.push_back(request);
  }

  // --------------------------------------------------------------------------
  // Routing
  // --------------------------------------------------------------------------

  async fn route(&mut self, request: Request, session: &Session) -> Flow {
    let id = request.id.clone();
    match session.router.dispatch(request) {
      Ok(Routed::Forwarded) => Flow::Continue,
      Ok(Routed::Partial(parts)) => {
        warn!(id = %id, undelivered = parts.len(), "Batch only partially delivered");
        emit(session, partial_batch_notification(&id, &parts)).await;
        Flow::Continue
      }
      Ok(Routed::Shutdown(params)) => {
        info!(reason = %params.reason, error = params.error, "Shutdown requested");
        emit(session, Response::success(id, json!({ "reason": params.reason })).into()).await;
        Flow::Exit(requested(params))
      }
      Err(e) => {
        warn!(id = %id, error = %e, "Dispatch failed");
        emit(session, e.to_response(id).into()).await;
        Flow::Continue
      }
    }
  }

  // --------------------------------------------------------------------------
  // Asynchronous outcomes
  // --------------------------------------------------------------------------

  fn on_change(&mut self, change: ChangeEvent) {
    trace!(path = %change.path().display(), change = ?change, "Source change");
    self.debouncer.notify(Instant::now());
  }

  async fn on_index_refreshed(&mut self, result: Result<RefreshStats, ServiceError>, session: &Session) -> Flow {
    match result {
      Ok(stats) => {
        info!(deleted = stats.deleted, inserted = stats.inserted, "Index refresh complete");
        emit(
          session,
          Event::IndexReady {
            deleted: stats.deleted,
            inserted: stats.inserted,
          },
        )
        .await;

        if self.config.index.exit_after_index {
          info!("Exiting after index");
          return Flow::Exit(ExitReason::IndexComplete);
        }
        Flow::Continue
      }
      Err(e) => {
        error!(error = %e, "Index refresh failed");
        Flow::Fatal(StartupError::IndexRefresh(e))
      }
    }
  }
}

fn requested(params: ShutdownParams) -> ExitReason {
  ExitReason::Requested {
    reason: params.reason,
    error: params.error,
  }
}

async fn emit(session: &Session, event: Event) {
  if session.gate.send(event).await.is_err() {
    debug!("Outbound gate gone, dropping event");
  }
}

async fn wait_until(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => sleep_until(deadline).await,
    None => pending().await,
  }
}
