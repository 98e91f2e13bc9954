//! Routing and topology tests through a running coordinator.

#[cfg(test)]
mod tests {
  use std::{path::PathBuf, time::Duration};

  use ipc::{CompilerRestartParams, Event, Request, RequestData, WorkerKind};
  use serde_json::json;
  use pretty_assertions::assert_eq;

  use crate::{
    actor::{
      __tests__::helpers::{FakeOptions, Harness, analyze, batch, handshake, request_id, search, test_config},
      message::{ChangeEvent, WorkerMessage},
      router::PARTIAL_BATCH_METHOD,
    },
    config::Composition,
  };

  fn batch_files(msg: &WorkerMessage) -> Vec<String> {
    match msg {
      WorkerMessage::Request(Request {
        data: RequestData::AnalyzeBatch(params),
        ..
      }) => params.files.iter().map(|f| f.path().display().to_string()).collect(),
      other => panic!("expected a batch request, got {other:?}"),
    }
  }

  // ==========================================================================
  // Mixed topology
  // ==========================================================================

  #[tokio::test]
  async fn test_batch_split_between_java_and_primary() {
    let mut h = Harness::start(test_config(Composition::Mixed), FakeOptions::default());
    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");

    h.send(batch("b", &["a.java", "b.scala", "c.java"])).await;

    let mut parts = vec![h.next_dispatch().await, h.next_dispatch().await];
    parts.sort_by_key(|(kind, _)| *kind);

    assert_eq!(parts[0].0, WorkerKind::Primary);
    assert_eq!(batch_files(&parts[0].1), vec!["b.scala"]);
    assert_eq!(parts[1].0, WorkerKind::Java);
    assert_eq!(batch_files(&parts[1].1), vec!["a.java", "c.java"]);
  }

  #[tokio::test]
  async fn test_single_file_requests_follow_classification() {
    let mut h = Harness::start(test_config(Composition::Mixed), FakeOptions::default());
    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");

    h.send(analyze("j", "src/Main.java")).await;
    assert_eq!(h.next_dispatch().await.0, WorkerKind::Java);

    h.send(analyze("s", "src/Main.scala")).await;
    assert_eq!(h.next_dispatch().await.0, WorkerKind::Primary);

    h.send(Request::new(
      "r",
      RequestData::CompilerRestart(CompilerRestartParams::default()),
    ))
    .await;
    assert_eq!(h.next_dispatch().await.0, WorkerKind::Primary);
  }

  #[tokio::test]
  async fn test_lone_analysis_worker_readiness_passes_through() {
    let options = FakeOptions {
      failing: vec![WorkerKind::Primary],
      ready: vec![WorkerKind::Java],
      ..Default::default()
    };
    let mut h = Harness::start(test_config(Composition::Mixed), options);
    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");

    h.send(search("s1", "needle")).await;
    let mut before_search = Vec::new();
    loop {
      let event = h.next_event().await;
      if event.response_id() == Some("s1") {
        break;
      }
      before_search.push(event);
    }

    assert_eq!(before_search, vec![Event::Ready { worker: WorkerKind::Java }]);
  }

  #[tokio::test]
  async fn test_half_delivered_batch_answered_once() {
    let options = FakeOptions {
      failing: vec![WorkerKind::Primary],
      ..Default::default()
    };
    let mut h = Harness::start(test_config(Composition::Mixed), options);
    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");

    h.send(batch("b", &["a.java", "b.scala"])).await;

    let (kind, msg) = h.next_dispatch().await;
    assert_eq!(kind, WorkerKind::Java);
    assert_eq!(batch_files(&msg), vec!["a.java"]);

    let events = [h.next_event().await, h.next_event().await];
    let responses: Vec<_> = events
      .iter()
      .filter_map(|e| match e {
        Event::Response(r) => Some(r),
        _ => None,
      })
      .collect();
    assert_eq!(responses.len(), 1, "one reply per request id: {events:?}");
    assert_eq!(responses[0].id, "b");
    assert!(!responses[0].is_error());

    let notice = events
      .iter()
      .find_map(|e| match e {
        Event::Notification { method, params } if method == PARTIAL_BATCH_METHOD => Some(params),
        _ => None,
      })
      .expect("undelivered half is reported");
    assert_eq!(notice["id"], "b");
    assert_eq!(notice["failed"][0]["worker"], "primary");
    assert_eq!(notice["failed"][0]["files"], json!(["b.scala"]));

    h.expect_quiet().await;
  }

  // ==========================================================================
  // Java-only topology
  // ==========================================================================

  #[tokio::test]
  async fn test_java_only_topology_has_no_primary_worker() {
    let options = FakeOptions {
      ready: vec![WorkerKind::Java],
      ..Default::default()
    };
    let mut h = Harness::start(test_config(Composition::JavaOnly), options);
    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");

    // Readiness is forwarded as-is, not merged
    assert_eq!(h.next_event().await, Event::Ready { worker: WorkerKind::Java });
    assert!(!h.journal.contains("spawn:primary"));

    h.send(analyze("s", "src/Main.scala")).await;
    assert_eq!(h.next_dispatch().await.0, WorkerKind::Java);

    h.send(Request::new(
      "r",
      RequestData::CompilerRestart(CompilerRestartParams::default()),
    ))
    .await;
    assert_eq!(h.next_dispatch().await.0, WorkerKind::Java);
  }

  // ==========================================================================
  // Debounced recompile
  // ==========================================================================

  #[tokio::test(start_paused = true)]
  async fn test_change_burst_triggers_one_recompile_per_analysis_worker() {
    let mut h = Harness::start(test_config(Composition::Mixed), FakeOptions::default());

    for name in ["A.java", "B.scala", "C.java"] {
      h.handle
        .file_changed(ChangeEvent::Changed(PathBuf::from(name)))
        .await
        .unwrap();
      tokio::time::sleep(Duration::from_millis(5)).await;
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.no_dispatches(), "recompile must wait for the quiet period");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut recompiled = vec![h.next_dispatch().await, h.next_dispatch().await];
    recompiled.sort_by_key(|(kind, _)| *kind);
    assert_eq!(
      recompiled,
      vec![
        (WorkerKind::Primary, WorkerMessage::Recompile),
        (WorkerKind::Java, WorkerMessage::Recompile),
      ]
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(h.no_dispatches(), "one burst, one recompile");
  }

  #[tokio::test(start_paused = true)]
  async fn test_due_recompile_not_held_back_by_queued_requests() {
    let mut h = Harness::start(test_config(Composition::JavaOnly), FakeOptions::default());
    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");

    h.handle
      .file_changed(ChangeEvent::Changed(PathBuf::from("A.java")))
      .await
      .unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    // Queue requests, then jump past the deadline before the coordinator runs
    for id in ["1", "2", "3"] {
      h.send(analyze(id, "src/A.java")).await;
    }
    tokio::time::advance(Duration::from_millis(300)).await;

    let mut order = Vec::new();
    for _ in 0..4 {
      let (_, msg) = h.next_dispatch().await;
      order.push(request_id(&msg).unwrap_or("recompile").to_string());
    }
    let recompile = order.iter().position(|m| m == "recompile").expect("recompile dispatched");
    assert!(recompile <= 1, "recompile waited for the mailbox to drain: {order:?}");
  }

  #[tokio::test(start_paused = true)]
  async fn test_steady_changes_still_recompile_within_max_delay() {
    let mut h = Harness::start(test_config(Composition::JavaOnly), FakeOptions::default());

    // A change every 10ms never leaves a 50ms quiet gap, but max delay is 200ms
    for _ in 0..25 {
      h.handle
        .file_changed(ChangeEvent::Changed(PathBuf::from("A.java")))
        .await
        .unwrap();
      tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(h.next_dispatch().await, (WorkerKind::Java, WorkerMessage::Recompile));
  }
}
