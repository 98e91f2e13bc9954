//! Router - classifies client requests and forwards them to workers
//!
//! Dispatch is split in two: [`plan`] decides, purely from the request and
//! the analysis layout, which worker(s) get what; [`Router::dispatch`] then
//! delivers to the handles in the [`Topology`]. The router keeps no
//! per-request state. Workers answer through their own event channels.

use ipc::{
  AnalyzeBatchParams, Event, Method, Request, RequestData, Response, ShutdownParams, SourceFile, WorkerKind, codes,
};
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use super::{
  handle::{SendError, WorkerHandle},
  message::WorkerMessage,
};
use crate::project::AnalysisLayout;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
  #[error("Method not found: {0}")]
  UnknownMethod(String),

  #[error("No {0} worker is running")]
  WorkerUnavailable(WorkerKind),

  #[error("The {0} worker has stopped")]
  WorkerGone(WorkerKind),

  #[error("The {0} worker is busy, try again later")]
  WorkerBusy(WorkerKind),

  #[error("{0} is handled by the session, not routed")]
  NotRoutable(Method),
}

impl DispatchError {
  pub fn code(&self) -> i32 {
    match self {
      DispatchError::UnknownMethod(_) => codes::METHOD_NOT_FOUND,
      _ => codes::SERVER_ERROR,
    }
  }

  pub fn to_response(&self, id: impl Into<String>) -> Response {
    Response::error(id, self.code(), self.to_string())
  }
}

// ============================================================================
// Topology
// ============================================================================

/// Worker handles, fixed at startup. A `None` slot is a worker that failed
/// to spawn.
#[derive(Debug, Clone)]
pub struct Topology {
  pub layout: AnalysisLayout,
  pub primary: Option<WorkerHandle>,
  pub java: Option<WorkerHandle>,
  pub debugger: Option<WorkerHandle>,
  pub indexer: Option<WorkerHandle>,
  pub docs: Option<WorkerHandle>,
}

impl Topology {
  pub fn empty(layout: AnalysisLayout) -> Self {
    Self {
      layout,
      primary: None,
      java: None,
      debugger: None,
      indexer: None,
      docs: None,
    }
  }

  pub fn worker(&self, kind: WorkerKind) -> Option<&WorkerHandle> {
    match kind {
      WorkerKind::Primary => self.primary.as_ref(),
      WorkerKind::Java => self.java.as_ref(),
      WorkerKind::Debugger => self.debugger.as_ref(),
      WorkerKind::Indexer => self.indexer.as_ref(),
      WorkerKind::Docs => self.docs.as_ref(),
    }
  }

  pub fn analysis_workers(&self) -> impl Iterator<Item = &WorkerHandle> {
    self.primary.iter().chain(self.java.iter())
  }
}

// ============================================================================
// Planning
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
  /// Handled by the session supervisor, never forwarded
  Shutdown(ShutdownParams),
  /// One or more (worker, request) deliveries
  Forward(Vec<(WorkerKind, Request)>),
}

/// Worker that owns non-Java analysis. Without a primary-language worker the
/// Java worker is the only analysis worker and takes everything.
fn primary_target(layout: AnalysisLayout) -> WorkerKind {
  match layout {
    AnalysisLayout::Mixed => WorkerKind::Primary,
    AnalysisLayout::JavaOnly => WorkerKind::Java,
  }
}

/// Decide where a request goes. First matching rule wins.
pub fn plan(layout: AnalysisLayout, request: Request) -> Result<Dispatch, DispatchError> {
  let primary = primary_target(layout);
  let target = match &request.data {
    RequestData::Shutdown(params) => return Ok(Dispatch::Shutdown(params.clone())),
    RequestData::Handshake(_) => return Err(DispatchError::NotRoutable(Method::Handshake)),
    RequestData::CompilerRestart(_) => primary,
    RequestData::Analyze(params) if params.file.is_java() => WorkerKind::Java,
    RequestData::AnalyzeBatch(params) => return Ok(Dispatch::Forward(partition_batch(primary, &request.id, params))),
    RequestData::Analyze(_) => primary,
    RequestData::Debug(_) => WorkerKind::Debugger,
    RequestData::Search(_) => WorkerKind::Indexer,
    RequestData::Docs(_) => WorkerKind::Docs,
    RequestData::Unknown { method, .. } => return Err(DispatchError::UnknownMethod(method.clone())),
  };
  Ok(Dispatch::Forward(vec![(target, request)]))
}

/// Split a batch into its Java files and everything else.
///
/// Each non-empty half becomes its own request under the original id. When
/// one half is empty, or both halves would land on the same worker, the batch
/// goes out whole.
fn partition_batch(primary: WorkerKind, id: &str, params: &AnalyzeBatchParams) -> Vec<(WorkerKind, Request)> {
  let (java, rest): (Vec<SourceFile>, Vec<SourceFile>) = params.files.iter().cloned().partition(SourceFile::is_java);

  let part = |files: Vec<SourceFile>| {
    Request::new(
      id,
      RequestData::AnalyzeBatch(AnalyzeBatchParams {
        kind: params.kind,
        files,
      }),
    )
  };

  if java.is_empty() {
    return vec![(primary, part(rest))];
  }
  if rest.is_empty() || primary == WorkerKind::Java {
    let mut all = java;
    all.extend(rest);
    return vec![(WorkerKind::Java, part(all))];
  }

  trace!(java = java.len(), other = rest.len(), "Partitioned batch");
  vec![(WorkerKind::Java, part(java)), (primary, part(rest))]
}

// ============================================================================
// Router
// ============================================================================

/// Notification sent when only part of a split batch could be delivered
pub const PARTIAL_BATCH_METHOD: &str = "analyze_batch/partial";

/// Outcome of a successful dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
  Forwarded,
  Shutdown(ShutdownParams),
  /// Some parts of a split batch reached their worker and will be answered
  /// under the request id; these did not
  Partial(Vec<UndeliveredPart>),
}

/// The share of a split batch that could not be handed to its worker
#[derive(Debug, Clone, PartialEq)]
pub struct UndeliveredPart {
  pub worker: WorkerKind,
  pub error: DispatchError,
  pub files: Vec<SourceFile>,
}

/// Build the client notification for a partially delivered batch
pub fn partial_batch_notification(id: &str, parts: &[UndeliveredPart]) -> Event {
  let failed: Vec<Value> = parts
    .iter()
    .map(|part| {
      json!({
        "worker": part.worker,
        "code": part.error.code(),
        "message": part.error.to_string(),
        "files": part.files,
      })
    })
    .collect();

  Event::Notification {
    method: PARTIAL_BATCH_METHOD.to_string(),
    params: json!({ "id": id, "failed": failed }),
  }
}

#[derive(Debug)]
pub struct Router {
  topology: Topology,
}

impl Router {
  pub fn new(topology: Topology) -> Self {
    Self { topology }
  }

  /// Hand a request to its worker(s). Never waits on a worker mailbox.
  ///
  /// A request is only reported as failed when nothing was delivered. When
  /// a split batch lands in part, the rest comes back as [`Routed::Partial`]
  /// since the delivered part is still answered under the same id.
  pub fn dispatch(&self, request: Request) -> Result<Routed, DispatchError> {
    let deliveries = match plan(self.topology.layout, request)? {
      Dispatch::Shutdown(params) => return Ok(Routed::Shutdown(params)),
      Dispatch::Forward(deliveries) => deliveries,
    };

    let mut delivered = 0usize;
    let mut undelivered = Vec::new();
    for (worker, request) in deliveries {
      let files = batch_files(&request);
      match self.deliver(worker, request) {
        Ok(()) => delivered += 1,
        Err(error) => undelivered.push(UndeliveredPart { worker, error, files }),
      }
    }

    if undelivered.is_empty() {
      return Ok(Routed::Forwarded);
    }
    if delivered == 0 {
      return Err(undelivered.swap_remove(0).error);
    }
    Ok(Routed::Partial(undelivered))
  }

  fn deliver(&self, kind: WorkerKind, request: Request) -> Result<(), DispatchError> {
    let worker = self.topology.worker(kind).ok_or(DispatchError::WorkerUnavailable(kind))?;
    debug!(id = %request.id, method = request.method_name(), worker = %kind, "Forwarding request");
    worker.send(WorkerMessage::Request(request)).map_err(|e| match e {
      SendError::MailboxFull => DispatchError::WorkerBusy(kind),
      SendError::ActorGone => DispatchError::WorkerGone(kind),
    })
  }

  /// Ask every analysis worker to recompile. A worker with a full mailbox
  /// already has work queued and is skipped.
  pub fn recompile_all(&self) {
    for worker in self.topology.analysis_workers() {
      match worker.recompile() {
        Ok(()) => {}
        Err(SendError::MailboxFull) => debug!(worker = %worker.kind, "Analysis worker busy, recompile skipped"),
        Err(SendError::ActorGone) => warn!(worker = %worker.kind, "Analysis worker gone, recompile not delivered"),
      }
    }
  }
}

fn batch_files(request: &Request) -> Vec<SourceFile> {
  match &request.data {
    RequestData::AnalyzeBatch(params) => params.files.clone(),
    _ => Vec::new(),
  }
}
