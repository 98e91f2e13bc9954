//! Actor-based session coordination
//!
//! Every stateful component runs as its own task behind an ordered `mpsc`
//! mailbox. State is owned, not shared.
//!
//! # Actors
//!
//! - [`Coordinator`]: owns the connection state and drives everything else
//! - [`OutboundGate`]: holds client-bound events until the handshake is done
//! - [`EventRelay`]: forwards worker events to the gate, merging analysis readiness
//! - [`FsWatcher`]: turns file system events into change notifications
//!
//! ```text
//! client ─▶ Coordinator ─▶ Router ─▶ workers ─▶ EventRelay ─▶ OutboundGate ─▶ client
//!              ▲
//!          FsWatcher
//! ```

pub mod coordinator;
pub mod debounce;
pub mod gate;
pub mod handle;
pub mod lifecycle;
pub mod merger;
pub mod message;
pub mod router;
pub mod watcher;


pub use coordinator::{Coordinator, CoordinatorError, ExitReason, StartupError};
pub use gate::OutboundGate;
pub use merger::{EventRelay, ReadinessRegistry};
pub use watcher::FsWatcher;
