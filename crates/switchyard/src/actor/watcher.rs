//! FsWatcher - notify-backed change source for the coordinator
//!
//! Bridges notify's sync callback into the async world: the callback
//! `blocking_send`s raw events into a channel, and a task translates them
//! into [`ChangeEvent`]s for the coordinator. No debouncing happens here;
//! the coordinator owns the recompile debounce.
//!
//! Gitignored paths are skipped. Creating or removing the watched root itself
//! is reported as [`ChangeEvent::BaseRecreated`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::{
  Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
  event::{ModifyKind, RenameMode},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
  handle::{CoordinatorHandle, WeakCoordinatorHandle},
  message::ChangeEvent,
};
use crate::services::{ChangeWatcher, ServiceError};

const EVENT_BUFFER: usize = 256;

/// Always ignored, on top of the project's .gitignore
const DEFAULT_IGNORES: &[&str] = &[".git/", "target/", "build/", "out/", ".gradle/", ".idea/", ".bsp/", ".metals/"];

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
  #[error("Failed to initialize watcher: {0}")]
  Init(#[source] notify::Error),

  #[error("Failed to watch path: {0}")]
  Watch(#[source] notify::Error),

  #[error("Failed to build gitignore: {0}")]
  Gitignore(#[source] ignore::Error),
}

// ============================================================================
// FsWatcher
// ============================================================================

#[derive(Debug)]
pub struct FsWatcher {
  root: PathBuf,
  cancel: CancellationToken,
  task: Option<JoinHandle<()>>,
}

impl FsWatcher {
  /// Start watching `root` recursively, reporting to `coordinator`.
  ///
  /// The watcher does not keep the coordinator alive; it stops on its own
  /// once the coordinator is gone.
  pub fn spawn(root: &Path, coordinator: &CoordinatorHandle, cancel: CancellationToken) -> Result<Self, WatcherError> {
    let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    info!(root = %root.display(), "Initializing file watcher");

    let gitignore = build_gitignore(&root)?;
    let (event_tx, event_rx) = mpsc::channel::<Result<Event, notify::Error>>(EVENT_BUFFER);

    let mut watcher = RecommendedWatcher::new(
      move |res| {
        // Runs on notify's thread. Dropped if the task is gone.
        let _ = event_tx.blocking_send(res);
      },
      notify::Config::default(),
    )
    .map_err(WatcherError::Init)?;

    watcher
      .watch(&root, RecursiveMode::Recursive)
      .map_err(WatcherError::Watch)?;

    let task = WatchTask {
      root: root.clone(),
      coordinator: coordinator.downgrade(),
      cancel: cancel.clone(),
      _watcher: watcher,
      event_rx,
      gitignore,
    };

    Ok(Self {
      root,
      cancel,
      task: Some(tokio::spawn(task.run())),
    })
  }
}

#[async_trait]
impl ChangeWatcher for FsWatcher {
  fn name(&self) -> &str {
    "fs"
  }

  async fn stop(&mut self) -> Result<(), ServiceError> {
    debug!(root = %self.root.display(), "Stopping file watcher");
    self.cancel.cancel();
    if let Some(task) = self.task.take() {
      task.await.map_err(|e| ServiceError::Failed(format!("watcher task failed: {e}")))?;
    }
    Ok(())
  }
}

// ============================================================================
// Task
// ============================================================================

struct WatchTask {
  root: PathBuf,
  coordinator: WeakCoordinatorHandle,
  cancel: CancellationToken,
  // Must be held to keep the OS watch alive
  _watcher: RecommendedWatcher,
  event_rx: mpsc::Receiver<Result<Event, notify::Error>>,
  gitignore: Gitignore,
}

impl WatchTask {
  async fn run(mut self) {
    info!(root = %self.root.display(), "File watcher started");

    loop {
      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          info!("File watcher shutting down (cancelled)");
          break;
        }

        event = self.event_rx.recv() => match event {
          Some(Ok(event)) => {
            for change in translate(&event, &self.root, &self.gitignore) {
              if self.coordinator.file_changed(change).await.is_err() {
                info!("Coordinator gone, file watcher stopping");
                return;
              }
            }
          }
          Some(Err(e)) => warn!(error = %e, "Watcher error"),
          None => {
            info!("File watcher shutting down (channel closed)");
            break;
          }
        }
      }
    }

    debug!(root = %self.root.display(), "File watcher stopped");
  }
}

// ============================================================================
// Translation
// ============================================================================

/// Map a raw notify event onto zero or more change notifications
pub fn translate(event: &Event, root: &Path, gitignore: &Gitignore) -> Vec<ChangeEvent> {
  let mut changes = Vec::new();

  for path in &event.paths {
    if path == root {
      if matches!(event.kind, EventKind::Create(_) | EventKind::Remove(_)) {
        debug!(root = %root.display(), "Watched root recreated");
        changes.push(ChangeEvent::BaseRecreated(path.clone()));
      }
      continue;
    }

    if is_ignored(gitignore, root, path) {
      trace!(path = %path.display(), "Skipping ignored path");
      continue;
    }

    let change = match event.kind {
      EventKind::Create(_) => ChangeEvent::Added(path.clone()),
      EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeEvent::Removed(path.clone()),
      EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeEvent::Added(path.clone()),
      EventKind::Modify(_) => ChangeEvent::Changed(path.clone()),
      EventKind::Remove(_) => ChangeEvent::Removed(path.clone()),
      EventKind::Access(_) | EventKind::Any | EventKind::Other => {
        trace!(path = %path.display(), kind = ?event.kind, "Ignoring event");
        continue;
      }
    };
    changes.push(change);
  }

  changes
}

fn is_ignored(gitignore: &Gitignore, root: &Path, path: &Path) -> bool {
  // The matcher only accepts paths under its root
  path.starts_with(root) && gitignore.matched_path_or_any_parents(path, false).is_ignore()
}

/// Build a matcher from the root's .gitignore plus the default ignores
pub fn build_gitignore(root: &Path) -> Result<Gitignore, WatcherError> {
  let mut builder = GitignoreBuilder::new(root);

  let gitignore_path = root.join(".gitignore");
  if gitignore_path.exists()
    && let Some(err) = builder.add(&gitignore_path)
  {
    warn!(error = %err, "Error parsing .gitignore, continuing with partial rules");
  }

  for pattern in DEFAULT_IGNORES {
    let _ = builder.add_line(None, pattern);
  }

  builder.build().map_err(WatcherError::Gitignore)
}
