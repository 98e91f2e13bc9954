//! Actor message types
//!
//! Every actor owns a single mailbox. Requests from the client and
//! asynchronous outcomes (index refresh, file changes) arrive on the same
//! coordinator mailbox so they are handled in one sequential loop.

use std::path::PathBuf;

use ipc::{Event, Request, Response};

use crate::services::{ChangeWatcher, RefreshStats, ServiceError};

// ============================================================================
// Coordinator Messages
// ============================================================================

#[derive(Debug)]
pub enum CoordinatorMessage {
  /// A parsed request from the client
  Client(Request),
  /// An error reply produced outside the coordinator (e.g. a line that did
  /// not parse). Delivered through the outbound gate like any other event.
  Reject(Response),
  /// File change notification, feeds the recompile debounce
  Change(ChangeEvent),
  /// Register a watcher so it is stopped on teardown
  RegisterWatcher(Box<dyn ChangeWatcher>),
  /// Outcome of the startup index refresh
  IndexRefreshed(Result<RefreshStats, ServiceError>),
}

/// A change reported by a watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
  Added(PathBuf),
  Changed(PathBuf),
  Removed(PathBuf),
  /// The watched root itself was deleted or replaced
  BaseRecreated(PathBuf),
}

impl ChangeEvent {
  pub fn path(&self) -> &PathBuf {
    match self {
      ChangeEvent::Added(p) | ChangeEvent::Changed(p) | ChangeEvent::Removed(p) | ChangeEvent::BaseRecreated(p) => p,
    }
  }
}

// ============================================================================
// Worker Messages
// ============================================================================

/// What a worker receives on its queue
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
  /// A client request (or the worker's share of a batch)
  Request(Request),
  /// Sources changed on disk; recompile
  Recompile,
}

// ============================================================================
// Gate Messages
// ============================================================================

#[derive(Debug)]
pub enum GateMessage {
  Event(Event),
  /// Flush the buffered events and switch to pass-through
  Activate,
}
