//! OutboundGate - holds client-bound events until the session is active
//!
//! Before activation every event is queued. Activation flushes the queue once,
//! in enqueue order, and from then on events pass straight through. Since the
//! gate is a single task reading a single mailbox, nothing enqueued before
//! activation can reach the client after something enqueued after it.
//!
//! The pre-activation queue is bounded. Once full, further events are
//! dropped (and counted) until activation.

use std::collections::VecDeque;

use ipc::Event;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, trace, warn};

use super::{handle::GateHandle, message::GateMessage};

const GATE_MAILBOX: usize = 1024;

pub struct OutboundGate {
  rx: mpsc::Receiver<GateMessage>,
  client: mpsc::Sender<Event>,
  queued: VecDeque<Event>,
  capacity: usize,
  dropped: usize,
  active: bool,
}

impl OutboundGate {
  /// Spawn an inactive gate writing to `client`.
  ///
  /// The task ends once every `GateHandle` is dropped or the client side
  /// goes away.
  pub fn spawn(client: mpsc::Sender<Event>, capacity: usize) -> (GateHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(GATE_MAILBOX);
    let gate = Self {
      rx,
      client,
      queued: VecDeque::new(),
      capacity,
      dropped: 0,
      active: false,
    };
    (GateHandle::new(tx), tokio::spawn(gate.run()))
  }

  async fn run(mut self) {
    while let Some(msg) = self.rx.recv().await {
      let delivered = match msg {
        GateMessage::Event(event) if self.active => self.forward(event).await,
        GateMessage::Event(event) => {
          self.enqueue(event);
          true
        }
        GateMessage::Activate if self.active => {
          debug!("Gate already active, ignoring activation");
          true
        }
        GateMessage::Activate => self.activate().await,
      };

      if !delivered {
        info!("Client channel closed, gate stopping");
        return;
      }
    }

    if !self.active && !self.queued.is_empty() {
      debug!(dropped = self.queued.len(), "Gate closed before activation");
    }
    debug!("Gate stopped");
  }

  fn enqueue(&mut self, event: Event) {
    if self.queued.len() >= self.capacity {
      if self.dropped == 0 {
        warn!(capacity = self.capacity, "Gate queue full before activation, dropping events");
      }
      self.dropped += 1;
      return;
    }
    trace!(queued = self.queued.len() + 1, "Gate inactive, queueing event");
    self.queued.push_back(event);
  }

  async fn activate(&mut self) -> bool {
    self.active = true;
    debug!(flushing = self.queued.len(), dropped = self.dropped, "Gate activated");
    while let Some(event) = self.queued.pop_front() {
      if !self.forward(event).await {
        return false;
      }
    }
    true
  }

  async fn forward(&self, event: Event) -> bool {
    self.client.send(event).await.is_ok()
  }
}
