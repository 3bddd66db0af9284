//! Integration tests for the Registry Actor.
//!
//! These tests verify the registry works correctly as a complete system,
//! testing the spawn_registry() function and RegistryHandle interface
//! under concurrent use.
//!
//! Tests CAN use `.unwrap()` and `.expect()`. We test the panic-free
//! behavior of production code through assertions.

use std::sync::Arc;

use chat_core::{DisplayName, SessionId};
use chatd::registry::{spawn_registry, OutboundLine, Sink};
use tokio::sync::mpsc;

// ============================================================================
// Test Helpers
// ============================================================================

fn name(s: &str) -> DisplayName {
    DisplayName::from(s)
}

fn line(s: &str) -> OutboundLine {
    Arc::from(s)
}

fn drain(rx: &mut mpsc::Receiver<OutboundLine>) -> Vec<String> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|l| l.to_string())
        .collect()
}

// ============================================================================
// Name Claims
// ============================================================================

#[tokio::test]
async fn test_basic_lifecycle() {
    let handle = spawn_registry();
    let id = SessionId::new(1);

    assert!(handle.try_claim(id, name("alice")).await.unwrap());
    let (sink, mut rx) = Sink::channel(8);
    assert!(handle.join(id, sink, Some(line("NAMEACCEPTED\n"))).await.unwrap());

    assert_eq!(handle.names().await, vec![name("alice")]);
    assert_eq!(handle.recipient_count().await, 1);

    let report = handle.broadcast(line("MESSAGE alice: hi\n")).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(drain(&mut rx), vec!["NAMEACCEPTED\n", "MESSAGE alice: hi\n"]);

    assert!(handle.leave(id).await.unwrap());
    assert!(handle.release(id, name("alice")).await.unwrap());
    assert!(handle.names().await.is_empty());
    assert_eq!(handle.recipient_count().await, 0);
    assert!(handle.is_connected());
}

#[tokio::test]
async fn test_concurrent_claims_single_winner() {
    let handle = spawn_registry();

    let mut tasks = Vec::new();
    for i in 0..32 {
        let h = handle.clone();
        tasks.push(tokio::spawn(async move {
            h.try_claim(SessionId::new(i), name("alice")).await
        }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.expect("task should complete").unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1, "exactly one claim should win");
    assert_eq!(handle.names().await, vec![name("alice")]);
}

#[tokio::test]
async fn test_concurrent_distinct_claims_all_win() {
    let handle = spawn_registry();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let h = handle.clone();
        tasks.push(tokio::spawn(async move {
            h.try_claim(SessionId::new(i), name(&format!("user-{i}"))).await
        }));
    }

    for task in tasks {
        assert!(task.await.unwrap().unwrap());
    }
    assert_eq!(handle.names().await.len(), 20);
}

#[tokio::test]
async fn test_released_name_claimable_again() {
    let handle = spawn_registry();

    assert!(handle.try_claim(SessionId::new(1), name("bob")).await.unwrap());
    assert!(!handle.try_claim(SessionId::new(2), name("bob")).await.unwrap());

    handle.release(SessionId::new(1), name("bob")).await.unwrap();
    assert!(handle.try_claim(SessionId::new(2), name("bob")).await.unwrap());
}

#[tokio::test]
async fn test_leave_and_release_idempotent() {
    let handle = spawn_registry();
    let id = SessionId::new(1);
    let (sink, _rx) = Sink::channel(4);

    handle.try_claim(id, name("carol")).await.unwrap();
    handle.join(id, sink, None).await.unwrap();

    assert!(handle.leave(id).await.unwrap());
    assert!(!handle.leave(id).await.unwrap());
    assert!(handle.release(id, name("carol")).await.unwrap());
    assert!(!handle.release(id, name("carol")).await.unwrap());

    assert!(handle.names().await.is_empty());
    assert_eq!(handle.recipient_count().await, 0);
}

#[tokio::test]
async fn test_release_of_unclaimed_name_is_noop() {
    let handle = spawn_registry();
    handle.try_claim(SessionId::new(1), name("dave")).await.unwrap();

    // A session that never held the name cannot free it
    assert!(!handle.release(SessionId::new(2), name("dave")).await.unwrap());
    assert!(!handle.release(SessionId::new(2), name("nobody")).await.unwrap());
    assert_eq!(handle.names().await, vec![name("dave")]);
}

// ============================================================================
// Broadcast
// ============================================================================

#[tokio::test]
async fn test_broadcast_reaches_only_present_recipients() {
    let handle = spawn_registry();
    let (sink_a, mut rx_a) = Sink::channel(8);
    let (sink_b, mut rx_b) = Sink::channel(8);
    let (sink_c, mut rx_c) = Sink::channel(8);

    handle.join(SessionId::new(1), sink_a, None).await.unwrap();
    handle.join(SessionId::new(2), sink_b, None).await.unwrap();
    handle.broadcast(line("one\n")).await.unwrap();

    handle.leave(SessionId::new(2)).await.unwrap();
    handle.join(SessionId::new(3), sink_c, None).await.unwrap();
    handle.broadcast(line("two\n")).await.unwrap();

    assert_eq!(drain(&mut rx_a), vec!["one\n", "two\n"]);
    assert_eq!(drain(&mut rx_b), vec!["one\n"]);
    assert_eq!(drain(&mut rx_c), vec!["two\n"]);
}

#[tokio::test]
async fn test_broadcast_with_no_recipients() {
    let handle = spawn_registry();
    let report = handle.broadcast(line("anyone?\n")).await.unwrap();
    assert_eq!(report.delivered, 0);
    assert!(report.flagged.is_empty());
}

#[tokio::test]
async fn test_concurrent_broadcasts_arrive_whole_and_in_same_order() {
    let handle = spawn_registry();
    let (sink_a, mut rx_a) = Sink::channel(256);
    let (sink_b, mut rx_b) = Sink::channel(256);
    handle.join(SessionId::new(1), sink_a, None).await.unwrap();
    handle.join(SessionId::new(2), sink_b, None).await.unwrap();

    let mut tasks = Vec::new();
    for sender in 0..4 {
        let h = handle.clone();
        tasks.push(tokio::spawn(async move {
            for n in 0..25 {
                h.broadcast(Arc::from(format!("{sender}:{n}\n"))).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let seen_a = drain(&mut rx_a);
    let seen_b = drain(&mut rx_b);
    assert_eq!(seen_a.len(), 100);
    // Every recipient observes the same serialized order
    assert_eq!(seen_a, seen_b);

    // Each sender's own lines stay in order
    for sender in 0..4 {
        let prefix = format!("{sender}:");
        let mine: Vec<&String> = seen_a.iter().filter(|l| l.starts_with(&prefix)).collect();
        let expected: Vec<String> = (0..25).map(|n| format!("{sender}:{n}\n")).collect();
        assert_eq!(mine, expected.iter().collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_join_racing_broadcasts_gets_whole_lines_only() {
    let handle = spawn_registry();
    let (early, mut early_rx) = Sink::channel(512);
    handle.join(SessionId::new(1), early, None).await.unwrap();

    let h = handle.clone();
    let broadcaster = tokio::spawn(async move {
        for n in 0..200 {
            h.broadcast(Arc::from(format!("{n}\n"))).await.unwrap();
        }
    });

    let (late, mut late_rx) = Sink::channel(512);
    handle
        .join(SessionId::new(2), late, Some(line("NAMEACCEPTED\n")))
        .await
        .unwrap();
    broadcaster.await.unwrap();

    let early_seen = drain(&mut early_rx);
    let late_seen = drain(&mut late_rx);
    assert_eq!(early_seen.len(), 200);
    assert_eq!(late_seen.first().map(String::as_str), Some("NAMEACCEPTED\n"));

    // The late joiner sees a suffix of the stream with no gaps
    let tail = &late_seen[1..];
    assert_eq!(tail, &early_seen[early_seen.len() - tail.len()..]);
}

#[tokio::test]
async fn test_slow_recipient_flagged_others_unaffected() {
    let handle = spawn_registry();
    let (slow, _slow_rx) = Sink::channel(1);
    let slow_flag = slow.eviction_token();
    let (fast, mut fast_rx) = Sink::channel(64);
    handle.join(SessionId::new(1), slow, None).await.unwrap();
    handle.join(SessionId::new(2), fast, None).await.unwrap();

    for n in 0..10 {
        handle.broadcast(Arc::from(format!("{n}\n"))).await.unwrap();
    }

    assert!(slow_flag.is_cancelled());
    assert_eq!(drain(&mut fast_rx).len(), 10);

    // Flagged, not removed: its own session does that
    assert_eq!(handle.recipient_count().await, 2);
}

#[tokio::test]
async fn test_handle_cloning() {
    let handle1 = spawn_registry();
    let handle2 = handle1.clone();

    handle1.try_claim(SessionId::new(1), name("erin")).await.unwrap();
    assert_eq!(handle2.names().await, vec![name("erin")]);
}
