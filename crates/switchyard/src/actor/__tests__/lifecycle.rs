//! Startup and teardown tests.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use ipc::Event;
  use pretty_assertions::assert_eq;

  use crate::{
    actor::{
      __tests__::helpers::{
        FakeOptions, FakeSearch, FakeVfs, FakeWatcher, Harness, Journal, RefreshBehavior, ShutdownBehavior, handshake,
        shutdown, test_config,
      },
      coordinator::{CoordinatorError, ExitReason, StartupError},
      lifecycle::{TeardownError, teardown},
    },
    config::Composition,
    services::{ChangeWatcher, RefreshStats},
  };

  fn watchers(journal: &Journal, failing: bool) -> Vec<Box<dyn ChangeWatcher>> {
    vec![
      Box::new(FakeWatcher {
        name: "src".to_string(),
        journal: journal.clone(),
        fail: failing,
      }),
      Box::new(FakeWatcher {
        name: "build".to_string(),
        journal: journal.clone(),
        fail: false,
      }),
    ]
  }

  // ==========================================================================
  // Teardown
  // ==========================================================================

  #[tokio::test]
  async fn test_search_failure_does_not_skip_other_steps() {
    let journal = Journal::default();
    let mut watchers = watchers(&journal, false);
    let search = FakeSearch {
      journal: journal.clone(),
      refresh: RefreshBehavior::Pending,
      shutdown: ShutdownBehavior::Fail,
    };
    let vfs = FakeVfs {
      journal: journal.clone(),
    };

    let report = teardown(&mut watchers, &search, &vfs, Duration::from_secs(1)).await;

    assert_eq!(
      journal.entries(),
      vec!["watcher:src", "watcher:build", "search:shutdown", "vfs:close"]
    );
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0], TeardownError::Search(_)));
    assert!(watchers.is_empty());
  }

  #[tokio::test]
  async fn test_watcher_failure_is_isolated() {
    let journal = Journal::default();
    let mut watchers = watchers(&journal, true);
    let search = FakeSearch {
      journal: journal.clone(),
      refresh: RefreshBehavior::Pending,
      shutdown: ShutdownBehavior::Ok,
    };
    let vfs = FakeVfs {
      journal: journal.clone(),
    };

    let report = teardown(&mut watchers, &search, &vfs, Duration::from_secs(1)).await;

    assert!(journal.contains("watcher:build"));
    assert!(journal.contains("vfs:close"));
    assert!(matches!(&report.failures[..], [TeardownError::Watcher { name, .. }] if name == "src"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_search_close_bounded_by_grace_period() {
    let journal = Journal::default();
    let search = FakeSearch {
      journal: journal.clone(),
      refresh: RefreshBehavior::Pending,
      shutdown: ShutdownBehavior::Hang,
    };
    let vfs = FakeVfs {
      journal: journal.clone(),
    };

    let report = teardown(&mut Vec::new(), &search, &vfs, Duration::from_millis(250)).await;

    assert!(matches!(&report.failures[..], [TeardownError::Timeout(grace)] if *grace == Duration::from_millis(250)));
    assert!(journal.contains("vfs:close"));
  }

  // ==========================================================================
  // Coordinator lifecycle
  // ==========================================================================

  #[tokio::test]
  async fn test_registered_watchers_stopped_before_workers_cancelled() {
    let mut h = Harness::start(test_config(Composition::Mixed), FakeOptions::default());
    h.handle
      .register_watcher(Box::new(FakeWatcher {
        name: "fs".to_string(),
        journal: h.journal.clone(),
        fail: false,
      }))
      .await
      .unwrap();

    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");
    h.send(shutdown("bye", "done")).await;

    let journal = h.journal.clone();
    assert!(matches!(h.finish().await, Ok(ExitReason::Requested { .. })));

    let vfs = journal.position("vfs:close").expect("vfs closed");
    assert!(journal.position("watcher:fs").expect("watcher stopped") < vfs);
    assert!(journal.position("search:shutdown").expect("search closed") < vfs);

    // Workers observe cancellation on their own tasks; give them a moment
    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancelled = journal.position("cancel:java").expect("java worker cancelled");
    assert!(vfs < cancelled);
  }

  #[tokio::test]
  async fn test_cancellation_stops_coordinator() {
    let h = Harness::start(test_config(Composition::JavaOnly), FakeOptions::default());
    h.cancel.cancel();

    let journal = h.journal.clone();
    assert_eq!(h.finish().await.unwrap(), ExitReason::Cancelled);
    assert!(journal.contains("vfs:close"));
  }

  #[tokio::test]
  async fn test_dropping_every_handle_disconnects() {
    let h = Harness::start(test_config(Composition::JavaOnly), FakeOptions::default());
    let Harness { handle, join, .. } = h;
    drop(handle);

    let reason = tokio::time::timeout(Duration::from_secs(2), join).await.unwrap().unwrap();
    assert_eq!(reason.unwrap(), ExitReason::Disconnected);
  }

  #[tokio::test]
  async fn test_index_refresh_failure_is_fatal() {
    let options = FakeOptions {
      refresh: RefreshBehavior::Fail,
      ..Default::default()
    };
    let h = Harness::start(test_config(Composition::Mixed), options);

    let journal = h.journal.clone();
    let err = h.finish().await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Startup(StartupError::IndexRefresh(_))));
    assert!(journal.contains("search:shutdown"), "teardown still runs");
    assert!(journal.contains("vfs:close"));
  }

  #[tokio::test]
  async fn test_index_ready_reported_to_client() {
    let options = FakeOptions {
      refresh: RefreshBehavior::Succeed(RefreshStats {
        deleted: 3,
        inserted: 5,
      }),
      ..Default::default()
    };
    let mut h = Harness::start(test_config(Composition::Mixed), options);
    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");

    assert_eq!(
      h.next_event().await,
      Event::IndexReady {
        deleted: 3,
        inserted: 5
      }
    );
  }

  #[tokio::test]
  async fn test_exit_after_index() {
    let mut config = test_config(Composition::Mixed);
    config.index.exit_after_index = true;
    let options = FakeOptions {
      refresh: RefreshBehavior::Succeed(RefreshStats::default()),
      ..Default::default()
    };
    let h = Harness::start(config, options);

    assert_eq!(h.finish().await.unwrap(), ExitReason::IndexComplete);
  }
}
