//! Actor handles
//!
//! Handles are cheap to clone and wrap the sending half of an actor's
//! mailbox.

use ipc::{Event, Request, Response, WorkerKind};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::message::{ChangeEvent, CoordinatorMessage, GateMessage, WorkerMessage};
use crate::services::{ChangeWatcher, RefreshStats, ServiceError};

// ============================================================================
// Coordinator Handle
// ============================================================================

/// Handle to the session coordinator, the single entry point for client
/// traffic and change notifications.
#[derive(Clone, Debug)]
pub struct CoordinatorHandle {
  tx: mpsc::Sender<CoordinatorMessage>,
}

impl CoordinatorHandle {
  pub(crate) fn new(tx: mpsc::Sender<CoordinatorMessage>) -> Self {
    Self { tx }
  }

  /// Submit a client request
  pub async fn send(&self, request: Request) -> Result<(), SendError> {
    self.deliver(CoordinatorMessage::Client(request)).await
  }

  /// Queue an error reply for the client behind the handshake
  pub async fn reject(&self, response: Response) -> Result<(), SendError> {
    self.deliver(CoordinatorMessage::Reject(response)).await
  }

  pub async fn file_changed(&self, change: ChangeEvent) -> Result<(), SendError> {
    self.deliver(CoordinatorMessage::Change(change)).await
  }

  /// Hand a watcher to the coordinator; it is stopped during teardown
  pub async fn register_watcher(&self, watcher: Box<dyn ChangeWatcher>) -> Result<(), SendError> {
    self.deliver(CoordinatorMessage::RegisterWatcher(watcher)).await
  }

  /// A reference that does not keep the mailbox open
  pub(crate) fn downgrade(&self) -> WeakCoordinatorHandle {
    WeakCoordinatorHandle {
      tx: self.tx.downgrade(),
    }
  }

  /// True once the coordinator has stopped reading its mailbox
  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  async fn deliver(&self, msg: CoordinatorMessage) -> Result<(), SendError> {
    self.tx.send(msg).await.map_err(|_| SendError::ActorGone)
  }
}

/// Held by background tasks that report back to the coordinator. Once every
/// client-facing handle is gone the coordinator sees its mailbox close, even
/// while such a task is still running.
#[derive(Clone, Debug)]
pub(crate) struct WeakCoordinatorHandle {
  tx: mpsc::WeakSender<CoordinatorMessage>,
}

impl WeakCoordinatorHandle {
  async fn deliver(&self, msg: CoordinatorMessage) -> Result<(), SendError> {
    let tx = self.tx.upgrade().ok_or(SendError::ActorGone)?;
    tx.send(msg).await.map_err(|_| SendError::ActorGone)
  }

  pub(crate) async fn file_changed(&self, change: ChangeEvent) -> Result<(), SendError> {
    self.deliver(CoordinatorMessage::Change(change)).await
  }

  pub(crate) async fn index_refreshed(&self, result: Result<RefreshStats, ServiceError>) -> Result<(), SendError> {
    self.deliver(CoordinatorMessage::IndexRefreshed(result)).await
  }
}

// ============================================================================
// Worker Handle
// ============================================================================

/// Handle to a spawned worker. Requests are fire-and-forget; the worker
/// answers through its event channel.
///
/// Sends never wait. A worker that has stopped draining its mailbox gets
/// [`SendError::MailboxFull`] instead of stalling the caller.
#[derive(Clone, Debug)]
pub struct WorkerHandle {
  pub kind: WorkerKind,
  pub tx: mpsc::Sender<WorkerMessage>,
}

impl WorkerHandle {
  pub fn new(kind: WorkerKind, tx: mpsc::Sender<WorkerMessage>) -> Self {
    Self { kind, tx }
  }

  pub fn send(&self, msg: WorkerMessage) -> Result<(), SendError> {
    self.tx.try_send(msg).map_err(|e| match e {
      TrySendError::Full(_) => SendError::MailboxFull,
      TrySendError::Closed(_) => SendError::ActorGone,
    })
  }

  pub fn recompile(&self) -> Result<(), SendError> {
    self.send(WorkerMessage::Recompile)
  }
}

// ============================================================================
// Gate Handle
// ============================================================================

#[derive(Clone, Debug)]
pub struct GateHandle {
  tx: mpsc::Sender<GateMessage>,
}

impl GateHandle {
  pub(crate) fn new(tx: mpsc::Sender<GateMessage>) -> Self {
    Self { tx }
  }

  pub async fn send(&self, event: Event) -> Result<(), SendError> {
    self.tx.send(GateMessage::Event(event)).await.map_err(|_| SendError::ActorGone)
  }

  pub async fn activate(&self) -> Result<(), SendError> {
    self.tx.send(GateMessage::Activate).await.map_err(|_| SendError::ActorGone)
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Error when sending to an actor
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
  #[error("Actor has shut down")]
  ActorGone,

  #[error("Actor mailbox is full")]
  MailboxFull,
}
