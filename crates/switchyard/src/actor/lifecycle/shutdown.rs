//! Best-effort teardown.
//!
//! Steps run in a fixed order (watchers, search engine, virtual file system)
//! and each one runs regardless of how the previous ones went. Failures are
//! logged and collected into the report.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
  actor::debounce::saturating_millis,
  services::{ChangeWatcher, SearchEngine, ServiceError, VirtualFileSystem},
};

#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
  #[error("Failed to stop watcher {name}: {source}")]
  Watcher {
    name: String,
    #[source]
    source: ServiceError,
  },

  #[error("Search engine shutdown failed: {0}")]
  Search(#[source] ServiceError),

  #[error("Search engine did not close within {0:?}")]
  Timeout(Duration),

  #[error("Failed to close virtual file system: {0}")]
  Vfs(#[source] ServiceError),
}

#[derive(Debug, Default)]
pub struct TeardownReport {
  pub failures: Vec<TeardownError>,
}

impl TeardownReport {
  pub fn is_clean(&self) -> bool {
    self.failures.is_empty()
  }
}

pub async fn teardown(
  watchers: &mut Vec<Box<dyn ChangeWatcher>>,
  search: &dyn SearchEngine,
  vfs: &dyn VirtualFileSystem,
  search_grace: Duration,
) -> TeardownReport {
  let mut report = TeardownReport::default();

  for mut watcher in watchers.drain(..) {
    let name = watcher.name().to_string();
    match watcher.stop().await {
      Ok(()) => debug!(watcher = %name, "Watcher stopped"),
      Err(source) => {
        warn!(watcher = %name, error = %source, "Failed to stop watcher");
        report.failures.push(TeardownError::Watcher { name, source });
      }
    }
  }

  match tokio::time::timeout(search_grace, search.shutdown()).await {
    Ok(Ok(())) => debug!("Search engine closed"),
    Ok(Err(e)) => {
      warn!(error = %e, "Search engine shutdown failed");
      report.failures.push(TeardownError::Search(e));
    }
    Err(_) => {
      warn!(grace_ms = saturating_millis(search_grace), "Search engine close timed out");
      report.failures.push(TeardownError::Timeout(search_grace));
    }
  }

  match vfs.close().await {
    Ok(()) => debug!("Virtual file system closed"),
    Err(e) => {
      warn!(error = %e, "Failed to close virtual file system");
      report.failures.push(TeardownError::Vfs(e));
    }
  }

  info!(failures = report.failures.len(), "Teardown complete");
  report
}
