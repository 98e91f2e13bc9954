//! Readiness merging between the analysis workers and the outbound gate.
//!
//! In a mixed project both analysis workers report `Ready` on their own. The
//! client should see a single `AnalysisReady` once both have, and never a
//! second one. Everything else a worker emits is relayed untouched.

use std::collections::BTreeSet;

use ipc::{Event, WorkerKind};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, trace};

use super::handle::GateHandle;

const RELAY_BUFFER: usize = 256;

// ============================================================================
// ReadinessRegistry
// ============================================================================

/// Single-shot join over a fixed number of distinct workers
#[derive(Debug)]
pub struct ReadinessRegistry {
  seen: BTreeSet<WorkerKind>,
  target: usize,
  fired: bool,
}

impl ReadinessRegistry {
  pub fn new(target: usize) -> Self {
    Self {
      seen: BTreeSet::new(),
      target,
      fired: false,
    }
  }

  /// Record a readiness signal. Returns the merged event exactly once, on
  /// the signal that completes the set.
  pub fn observe(&mut self, worker: WorkerKind) -> Option<Event> {
    if self.fired {
      trace!(%worker, "Readiness already merged, discarding");
      return None;
    }
    if !self.seen.insert(worker) {
      trace!(%worker, "Duplicate readiness signal, discarding");
      return None;
    }

    debug!(%worker, seen = self.seen.len(), target = self.target, "Worker ready");
    if self.seen.len() < self.target {
      return None;
    }

    self.fired = true;
    Some(Event::AnalysisReady {
      workers: self.seen.iter().copied().collect(),
    })
  }
}

// ============================================================================
// EventRelay
// ============================================================================

/// Task that forwards worker events into the gate, merging analysis
/// readiness when given a registry.
pub struct EventRelay {
  rx: mpsc::Receiver<Event>,
  gate: GateHandle,
  registry: Option<ReadinessRegistry>,
}

impl EventRelay {
  /// Spawn a relay and return the sender workers should emit into.
  ///
  /// Without a registry the relay is a plain pass-through.
  pub fn spawn(gate: GateHandle, registry: Option<ReadinessRegistry>) -> (mpsc::Sender<Event>, JoinHandle<()>) {
    let (tx, rx) = Self::channel();
    (tx, Self::start(rx, gate, registry))
  }

  /// The relay's input channel, for when the relay can only be configured
  /// after its senders have been handed out. Events buffer until
  /// [`EventRelay::start`].
  pub fn channel() -> (mpsc::Sender<Event>, mpsc::Receiver<Event>) {
    mpsc::channel(RELAY_BUFFER)
  }

  pub fn start(rx: mpsc::Receiver<Event>, gate: GateHandle, registry: Option<ReadinessRegistry>) -> JoinHandle<()> {
    let relay = Self { rx, gate, registry };
    tokio::spawn(relay.run())
  }

  async fn run(mut self) {
    while let Some(event) = self.rx.recv().await {
      let Some(event) = self.merge(event) else {
        continue;
      };
      if self.gate.send(event).await.is_err() {
        debug!("Gate gone, relay stopping");
        return;
      }
    }
    trace!("Relay senders dropped, relay stopping");
  }

  fn merge(&mut self, event: Event) -> Option<Event> {
    let Some(registry) = self.registry.as_mut() else {
      return Some(event);
    };

    match event {
      Event::Ready { worker } if worker.is_analysis() => {
        let merged = registry.observe(worker);
        if let Some(Event::AnalysisReady { workers }) = &merged {
          info!(?workers, "All analysis workers ready");
        }
        merged
      }
      other => Some(other),
    }
  }
}
