//! Connection state tests: handshake gating, pending queue, outbound order.

#[cfg(test)]
mod tests {
  use ipc::{Event, Request, RequestData, WorkerKind, codes};
  use pretty_assertions::assert_eq;
  use serde_json::json;

  use crate::{
    actor::{
      __tests__::helpers::{FakeOptions, Harness, analyze, handshake, request_id, search, shutdown, test_config},
      coordinator::ExitReason,
    },
    config::Composition,
  };

  // ==========================================================================
  // Handshake gating
  // ==========================================================================

  #[tokio::test]
  async fn test_parked_requests_follow_handshake_in_order() {
    let mut h = Harness::start(test_config(Composition::Mixed), FakeOptions::default());

    h.send(analyze("1", "src/A.java")).await;
    h.send(analyze("2", "src/B.java")).await;
    h.send(analyze("3", "src/C.java")).await;

    h.expect_quiet().await;
    assert!(h.no_dispatches(), "nothing may be routed before the handshake");

    h.send(handshake("hs")).await;

    let first = h.next_response().await;
    assert_eq!(first.id, "hs");
    let descriptor = first.result.expect("handshake result");
    assert_eq!(descriptor["server_name"], "switchyard");
    assert!(descriptor["capabilities"].as_array().is_some_and(|c| c.contains(&json!("analyze_batch"))));

    let mut routed = Vec::new();
    for _ in 0..3 {
      let (kind, msg) = h.next_dispatch().await;
      assert_eq!(kind, WorkerKind::Java);
      routed.push(request_id(&msg).unwrap().to_string());
    }
    assert_eq!(routed, vec!["1", "2", "3"]);

    let replies: Vec<String> = [h.next_response().await, h.next_response().await, h.next_response().await]
      .into_iter()
      .map(|r| r.id)
      .collect();
    assert_eq!(replies, vec!["1", "2", "3"]);
  }

  #[tokio::test]
  async fn test_worker_events_held_until_handshake() {
    let options = FakeOptions {
      ready: vec![WorkerKind::Primary, WorkerKind::Java, WorkerKind::Docs],
      ..Default::default()
    };
    let mut h = Harness::start(test_config(Composition::Mixed), options);

    // Workers report readiness during startup; none of it may leak out
    h.expect_quiet().await;

    h.send(handshake("hs")).await;
    assert_eq!(h.next_event().await.response_id(), Some("hs"));

    h.send(search("s1", "needle")).await;

    let mut before_search = Vec::new();
    loop {
      let event = h.next_event().await;
      if event.response_id() == Some("s1") {
        break;
      }
      before_search.push(event);
    }

    assert!(before_search.contains(&Event::AnalysisReady {
      workers: vec![WorkerKind::Primary, WorkerKind::Java]
    }));
    assert!(before_search.contains(&Event::Ready {
      worker: WorkerKind::Docs
    }));
    let merged = before_search
      .iter()
      .filter(|e| matches!(e, Event::AnalysisReady { .. } | Event::Ready { worker: WorkerKind::Primary | WorkerKind::Java }))
      .count();
    assert_eq!(merged, 1, "analysis readiness must be merged into a single event");
  }

  #[tokio::test]
  async fn test_repeated_handshake_answered_without_side_effects() {
    let mut h = Harness::start(test_config(Composition::Mixed), FakeOptions::default());

    h.send(handshake("a")).await;
    let first = h.next_response().await;
    h.send(handshake("b")).await;
    let second = h.next_response().await;

    assert_eq!(second.id, "b");
    assert_eq!(first.result, second.result);
    assert!(h.no_dispatches());
  }

  #[tokio::test]
  async fn test_shutdown_before_handshake_exits_immediately() {
    let mut h = Harness::start(test_config(Composition::Mixed), FakeOptions::default());

    h.send(analyze("1", "src/A.java")).await;
    h.send(shutdown("bye", "editor closed")).await;

    let events = h.drain().await;
    assert!(events.is_empty(), "no reply may precede a handshake: {events:?}");
    assert!(h.no_dispatches());

    let journal = h.journal.clone();
    let reason = h.finish().await.unwrap();
    assert_eq!(
      reason,
      ExitReason::Requested {
        reason: "editor closed".to_string(),
        error: false
      }
    );
    assert!(journal.contains("vfs:close"));
  }

  #[tokio::test]
  async fn test_shutdown_after_handshake_is_acknowledged() {
    let mut h = Harness::start(test_config(Composition::Mixed), FakeOptions::default());

    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");
    h.send(shutdown("bye", "done")).await;

    let ack = h.next_response().await;
    assert_eq!(ack.id, "bye");
    assert!(!ack.is_error());

    assert!(matches!(h.finish().await, Ok(ExitReason::Requested { .. })));
  }

  // ==========================================================================
  // Pending queue limits
  // ==========================================================================

  #[tokio::test]
  async fn test_pending_overflow_rejected_after_handshake() {
    let mut config = test_config(Composition::Mixed);
    config.session.max_pending = 2;
    let mut h = Harness::start(config, FakeOptions::default());

    h.send(analyze("1", "src/A.java")).await;
    h.send(analyze("2", "src/B.java")).await;
    h.send(analyze("3", "src/C.java")).await;

    h.expect_quiet().await;
    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");

    let mut rejected = None;
    for _ in 0..3 {
      let response = h.next_response().await;
      if response.is_error() {
        rejected = Some(response);
      }
    }
    let rejected = rejected.expect("overflowing request must be answered");
    assert_eq!(rejected.id, "3");
    assert_eq!(rejected.error_code(), Some(codes::NOT_INITIALIZED));

    let routed: Vec<String> = [h.next_dispatch().await, h.next_dispatch().await]
      .iter()
      .map(|(_, msg)| request_id(msg).unwrap().to_string())
      .collect();
    assert_eq!(routed, vec!["1", "2"]);
    assert!(h.no_dispatches());
  }

  // ==========================================================================
  // Dispatch errors
  // ==========================================================================

  #[tokio::test]
  async fn test_unknown_method_answered_with_error() {
    let mut h = Harness::start(test_config(Composition::Mixed), FakeOptions::default());
    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");

    h.send(Request::new(
      "x",
      RequestData::Unknown {
        method: "frobnicate".to_string(),
        params: json!({}),
      },
    ))
    .await;

    let response = h.next_response().await;
    assert_eq!(response.id, "x");
    assert_eq!(response.error_code(), Some(codes::METHOD_NOT_FOUND));
  }

  #[tokio::test]
  async fn test_stalled_worker_does_not_block_shutdown() {
    let options = FakeOptions {
      stalled: vec![WorkerKind::Java],
      ..Default::default()
    };
    let mut h = Harness::start(test_config(Composition::JavaOnly), options);
    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");

    // The first request fills the mailbox, the rest are turned away at once
    h.send(analyze("1", "src/A.java")).await;
    h.send(analyze("2", "src/B.java")).await;
    h.send(analyze("3", "src/C.java")).await;
    h.send(shutdown("bye", "done")).await;

    for id in ["2", "3"] {
      let busy = h.next_response().await;
      assert_eq!(busy.id, id);
      assert_eq!(busy.error_code(), Some(codes::SERVER_ERROR));
    }
    assert_eq!(h.next_response().await.id, "bye");

    let journal = h.journal.clone();
    assert!(matches!(h.finish().await, Ok(ExitReason::Requested { .. })));
    assert!(journal.contains("vfs:close"));
  }

  #[tokio::test]
  async fn test_stalled_worker_does_not_block_cancellation() {
    let options = FakeOptions {
      stalled: vec![WorkerKind::Java],
      ..Default::default()
    };
    let mut h = Harness::start(test_config(Composition::JavaOnly), options);
    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");

    for id in ["1", "2", "3"] {
      h.send(analyze(id, "src/A.java")).await;
    }
    h.cancel.cancel();

    let journal = h.journal.clone();
    assert_eq!(h.finish().await.unwrap(), ExitReason::Cancelled);
    assert!(journal.contains("vfs:close"));
  }

  #[tokio::test]
  async fn test_request_for_failed_worker_answered_with_error() {
    let options = FakeOptions {
      failing: vec![WorkerKind::Indexer],
      ..Default::default()
    };
    let mut h = Harness::start(test_config(Composition::Mixed), options);
    h.send(handshake("hs")).await;
    assert_eq!(h.next_response().await.id, "hs");

    h.send(search("s", "needle")).await;

    let response = h.next_response().await;
    assert_eq!(response.id, "s");
    assert_eq!(response.error_code(), Some(codes::SERVER_ERROR));
    assert!(!h.journal.contains("spawn:indexer"));
    assert!(h.journal.contains("spawn:docs"), "later workers still start");
  }
}
