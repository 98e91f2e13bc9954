//! Session startup: gate, index refresh, and worker topology.
//!
//! Steps run in order and are not transactional. A worker that fails to
//! spawn is logged and left out of the topology; requests for it are then
//! answered with an error. Only the index refresh is fatal, and it reports
//! back through the coordinator mailbox.

use ipc::{Event, WorkerKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  actor::{
    gate::OutboundGate,
    handle::{GateHandle, WeakCoordinatorHandle, WorkerHandle},
    merger::{EventRelay, ReadinessRegistry},
    router::{Router, Topology},
  },
  config::Config,
  project::{self, AnalysisLayout},
  services::{Services, WorkerContext},
};

/// What startup hands back to the coordinator loop
pub struct Session {
  pub gate: GateHandle,
  pub router: Router,
}

pub(crate) async fn start(
  config: &Config,
  services: &Services,
  coordinator: WeakCoordinatorHandle,
  client: mpsc::Sender<Event>,
  workers_cancel: &CancellationToken,
) -> Session {
  // (1) Outbound gate, inactive until the handshake
  let (gate, _gate_task) = OutboundGate::spawn(client, config.session.max_buffered_events);

  // (2) Full index refresh in the background
  spawn_index_refresh(services, coordinator);

  // (3) Indexer. Non-analysis workers share a pass-through relay.
  let (support_events, _support_relay) = EventRelay::spawn(gate.clone(), None);
  let mut topology = Topology::empty(AnalysisLayout::JavaOnly);
  topology.indexer = spawn_worker(services, WorkerKind::Indexer, &support_events, workers_cancel).await;

  // (4) Analysis topology
  let layout = project::detect_layout(&config.project).await;
  topology.layout = layout;
  match layout {
    AnalysisLayout::Mixed => {
      let (analysis_events, analysis_rx) = EventRelay::channel();
      topology.primary = spawn_worker(services, WorkerKind::Primary, &analysis_events, workers_cancel).await;
      topology.java = spawn_worker(services, WorkerKind::Java, &analysis_events, workers_cancel).await;

      // Merge only what can actually report; a lone survivor's readiness passes through
      let live = topology.analysis_workers().count();
      if live < layout.expected_analysis_workers() {
        warn!(live, expected = layout.expected_analysis_workers(), "Analysis worker missing, readiness not merged");
      }
      let registry = (live > 1).then(|| ReadinessRegistry::new(live));
      let _analysis_relay = EventRelay::start(analysis_rx, gate.clone(), registry);
    }
    AnalysisLayout::JavaOnly => {
      info!("No non-Java sources, starting the Java analysis worker only");
      topology.java = spawn_worker(services, WorkerKind::Java, &support_events, workers_cancel).await;
    }
  }

  // (5) Debugger, (6) Docs
  topology.debugger = spawn_worker(services, WorkerKind::Debugger, &support_events, workers_cancel).await;
  topology.docs = spawn_worker(services, WorkerKind::Docs, &support_events, workers_cancel).await;

  info!(
    ?layout,
    primary = topology.primary.is_some(),
    java = topology.java.is_some(),
    debugger = topology.debugger.is_some(),
    indexer = topology.indexer.is_some(),
    docs = topology.docs.is_some(),
    "Session started"
  );

  Session {
    gate,
    router: Router::new(topology),
  }
}

fn spawn_index_refresh(services: &Services, coordinator: WeakCoordinatorHandle) {
  let search = services.search.clone();
  tokio::spawn(async move {
    debug!("Starting full index refresh");
    let result = search.refresh().await;
    if coordinator.index_refreshed(result).await.is_err() {
      debug!("Coordinator gone before index refresh finished");
    }
  });
}

async fn spawn_worker(
  services: &Services,
  kind: WorkerKind,
  events: &mpsc::Sender<Event>,
  workers_cancel: &CancellationToken,
) -> Option<WorkerHandle> {
  let ctx = WorkerContext {
    kind,
    events: events.clone(),
    cancel: workers_cancel.child_token(),
  };

  match services.workers.spawn(ctx).await {
    Ok(handle) => {
      debug!(worker = %kind, "Worker spawned");
      Some(handle)
    }
    Err(e) => {
      warn!(worker = %kind, error = %e, "Failed to spawn worker");
      None
    }
  }
}
