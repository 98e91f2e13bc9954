//! Project composition probe.
//!
//! Decides once, at startup, whether the project needs a primary-language
//! analysis worker next to the Java one.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use ipc::Language;
use tracing::{debug, info, warn};

use crate::config::{Composition, ProjectConfig};

/// Which analysis workers a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisLayout {
  /// Non-Java sources present: primary-language worker plus Java worker
  Mixed,
  /// Only the Java worker
  JavaOnly,
}

impl AnalysisLayout {
  pub fn expected_analysis_workers(self) -> usize {
    match self {
      AnalysisLayout::Mixed => 2,
      AnalysisLayout::JavaOnly => 1,
    }
  }
}

/// Resolve the layout from config, scanning the source roots when it is `auto`.
///
/// The scan runs on the blocking pool. If it cannot complete the project is
/// treated as mixed, which over-provisions rather than dropping requests.
pub async fn detect_layout(project: &ProjectConfig) -> AnalysisLayout {
  match project.composition {
    Composition::Mixed => AnalysisLayout::Mixed,
    Composition::JavaOnly => AnalysisLayout::JavaOnly,
    Composition::Auto => {
      let roots = project.resolved_source_roots();
      match tokio::task::spawn_blocking(move || scan_roots(&roots)).await {
        Ok(layout) => layout,
        Err(e) => {
          warn!(error = %e, "Composition scan failed, assuming mixed project");
          AnalysisLayout::Mixed
        }
      }
    }
  }
}

/// Walk the roots and stop at the first non-Java source file.
pub fn scan_roots(roots: &[PathBuf]) -> AnalysisLayout {
  for root in roots {
    if let Some(found) = find_non_java_source(root) {
      info!(root = %root.display(), file = %found.display(), "Found non-Java source, using mixed layout");
      return AnalysisLayout::Mixed;
    }
  }
  debug!(roots = roots.len(), "No non-Java sources found");
  AnalysisLayout::JavaOnly
}

fn find_non_java_source(root: &Path) -> Option<PathBuf> {
  if !root.exists() {
    debug!(root = %root.display(), "Source root does not exist, skipping");
    return None;
  }

  let walker = WalkBuilder::new(root)
    .hidden(true)
    .git_ignore(true)
    .git_global(true)
    .git_exclude(true)
    .build();

  walker
    .flatten()
    .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
    .map(|entry| entry.into_path())
    .find(|path| Language::from_path(path).is_non_java_source())
}
