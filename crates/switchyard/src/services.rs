//! External collaborators the coordinator drives but does not implement.
//!
//! The analysis engines, search index, debugger and docs lookup live behind
//! these traits. The coordinator only starts, feeds and stops them.

use std::sync::Arc;

use async_trait::async_trait;
use ipc::{Event, WorkerKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actor::handle::WorkerHandle;

/// Counts reported by a full index refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
  pub deleted: usize,
  pub inserted: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
  #[error("{0}")]
  Failed(String),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
  /// Rebuild the index from scratch
  async fn refresh(&self) -> Result<RefreshStats, ServiceError>;

  /// Finish outstanding work and close. May take a while.
  async fn shutdown(&self) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait VirtualFileSystem: Send + Sync {
  async fn close(&self) -> Result<(), ServiceError>;
}

/// Source of file change notifications, registered with the coordinator so
/// teardown can stop it.
#[async_trait]
pub trait ChangeWatcher: Send + Sync + std::fmt::Debug {
  fn name(&self) -> &str;

  async fn stop(&mut self) -> Result<(), ServiceError>;
}

/// What a worker is given when it starts
#[derive(Debug, Clone)]
pub struct WorkerContext {
  pub kind: WorkerKind,
  /// Responses, notifications and readiness go here
  pub events: mpsc::Sender<Event>,
  /// Cancelled once the session has torn down
  pub cancel: CancellationToken,
}

#[async_trait]
pub trait WorkerFactory: Send + Sync {
  async fn spawn(&self, ctx: WorkerContext) -> Result<WorkerHandle, ServiceError>;
}

/// Everything the coordinator needs from the outside world
#[derive(Clone)]
pub struct Services {
  pub search: Arc<dyn SearchEngine>,
  pub vfs: Arc<dyn VirtualFileSystem>,
  pub workers: Arc<dyn WorkerFactory>,
}
