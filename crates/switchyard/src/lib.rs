//! Front-door session coordinator for a code-intelligence server.
//!
//! A client talks to one [`Coordinator`] over newline-delimited JSON. The
//! coordinator holds everything back until the handshake, routes requests to
//! the analysis, debugger, search and docs workers, and relays what they emit
//! back to the client in order.

pub mod actor;
pub mod config;
pub mod logging;
pub mod project;
pub mod server;
pub mod services;

pub use actor::{
  Coordinator, CoordinatorError, ExitReason,
  handle::{CoordinatorHandle, SendError, WorkerHandle},
  message::{ChangeEvent, WorkerMessage},
};
pub use config::{Config, ConfigError};
pub use server::{ServerError, TransportError, run, run_stdio, serve};
pub use services::{
  ChangeWatcher, RefreshStats, SearchEngine, ServiceError, Services, VirtualFileSystem, WorkerContext, WorkerFactory,
};
