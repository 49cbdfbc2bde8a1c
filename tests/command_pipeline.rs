//! End-to-end behavior of the command pipeline through a `Guard`.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use circuit_guard::{CommandConfig, ErrorKind, EventKind, GuardError};
use common::{fail, guard_with, succeed};

fn tripping(sleep_window_ms: u64) -> CommandConfig {
    CommandConfig {
        request_volume_threshold: 3,
        error_percent_threshold: 50,
        sleep_window_ms,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_trips_after_volume_and_error_rate() {
    let (guard, sink) = guard_with("inventory", tripping(5000));

    assert!(matches!(fail(&guard, "inventory").await, GuardError::Work(_)));
    assert!(matches!(fail(&guard, "inventory").await, GuardError::Work(_)));
    assert!(succeed(&guard, "inventory").await.is_ok());

    let err = succeed(&guard, "inventory").await.unwrap_err();
    assert!(matches!(err, GuardError::CircuitOpen));
    assert_eq!(err.to_string(), "circuit open");

    assert_eq!(
        sink.kinds(),
        vec![
            EventKind::Failure,
            EventKind::Failure,
            EventKind::Success,
            EventKind::ShortCircuit,
        ]
    );
}

#[tokio::test]
async fn test_below_volume_never_trips() {
    let (guard, sink) = guard_with("search", CommandConfig {
        request_volume_threshold: 20,
        ..Default::default()
    });

    for _ in 0..19 {
        assert!(matches!(fail(&guard, "search").await, GuardError::Work(_)));
    }
    assert_eq!(sink.count(EventKind::ShortCircuit), 0);
    assert!(!guard.circuit("search").unwrap().is_open());
}

#[tokio::test]
async fn test_short_circuit_is_offered_to_fallback() {
    let (guard, sink) = guard_with("pricing", tripping(5000));
    for _ in 0..3 {
        fail(&guard, "pricing").await;
    }

    let value = guard
        .run_with_fallback(
            "pricing",
            || async { Ok::<u32, GuardError>(1) },
            |err| async move {
                assert_eq!(err.kind(), ErrorKind::CircuitOpen);
                Ok::<u32, GuardError>(0)
            },
        )
        .await
        .unwrap();

    assert_eq!(value, 0);
    assert_eq!(sink.count(EventKind::ShortCircuit), 1);
    assert_eq!(sink.count(EventKind::FallbackSuccess), 1);
}

#[tokio::test]
async fn test_short_circuits_do_not_count_toward_volume() {
    let (guard, _) = guard_with("ledger", tripping(5000));
    for _ in 0..3 {
        fail(&guard, "ledger").await;
    }
    for _ in 0..5 {
        assert!(matches!(succeed(&guard, "ledger").await, Err(GuardError::CircuitOpen)));
    }

    let circuit = guard.circuit("ledger").unwrap();
    let counts = circuit.metrics().counts();
    assert_eq!(counts.short_circuits, 5);
    assert_eq!(circuit.metrics().volume(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_probe_success_closes_circuit() {
    let (guard, _) = guard_with("profile", tripping(1000));
    for _ in 0..3 {
        fail(&guard, "profile").await;
    }
    assert!(matches!(succeed(&guard, "profile").await, Err(GuardError::CircuitOpen)));

    tokio::time::advance(Duration::from_millis(1001)).await;
    succeed(&guard, "profile").await.unwrap();

    let circuit = guard.circuit("profile").unwrap();
    assert!(!circuit.is_open());
    assert_eq!(circuit.metrics().volume(), 0, "closing starts a clean window");

    succeed(&guard, "profile").await.unwrap();
    succeed(&guard, "profile").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_probe_failure_keeps_circuit_open() {
    let (guard, _) = guard_with("profile", tripping(1000));
    for _ in 0..3 {
        fail(&guard, "profile").await;
    }
    assert!(matches!(succeed(&guard, "profile").await, Err(GuardError::CircuitOpen)));

    tokio::time::advance(Duration::from_millis(1001)).await;
    assert!(matches!(fail(&guard, "profile").await, GuardError::Work(_)));
    assert!(guard.circuit("profile").unwrap().is_open());
    assert!(matches!(succeed(&guard, "profile").await, Err(GuardError::CircuitOpen)));

    tokio::time::advance(Duration::from_millis(1001)).await;
    succeed(&guard, "profile").await.unwrap();
}

#[tokio::test]
async fn test_saturated_pool_fails_fast() {
    let (guard, sink) = guard_with("reports", CommandConfig {
        max_concurrent_requests: 1,
        timeout_enabled: false,
        ..Default::default()
    });

    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let first = guard.go("reports", move || async move {
        let _ = started_tx.send(());
        let _ = release_rx.await;
        Ok::<_, GuardError>("slow")
    });
    started_rx.await.unwrap();

    let second = guard.run("reports", || async { Ok::<_, GuardError>("fast") }).await;
    assert!(matches!(second, Err(GuardError::MaxConcurrency)));
    assert_eq!(sink.count(EventKind::Rejected), 1);

    release_tx.send(()).unwrap();
    assert_eq!(first.await.unwrap(), "slow");
    assert_eq!(guard.circuit("reports").unwrap().pool().in_use(), 0);
    assert_eq!(
        guard.run("reports", || async { Ok::<_, GuardError>("again") }).await.unwrap(),
        "again"
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_returns_promptly() {
    let (guard, sink) = guard_with("geo", CommandConfig {
        timeout_ms: 100,
        ..Default::default()
    });

    let started = tokio::time::Instant::now();
    let err = guard
        .run("geo", || async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<(), GuardError>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, GuardError::Timeout));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(sink.kinds(), vec![EventKind::Timeout]);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_work_holds_ticket_until_done() {
    let (guard, _) = guard_with("geo", CommandConfig {
        timeout_ms: 10,
        max_concurrent_requests: 2,
        ..Default::default()
    });
    let slow = || async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<(), GuardError>(())
    };

    assert!(matches!(guard.run("geo", slow).await, Err(GuardError::Timeout)));
    assert!(matches!(guard.run("geo", slow).await, Err(GuardError::Timeout)));
    assert!(matches!(guard.run("geo", slow).await, Err(GuardError::MaxConcurrency)));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let circuit = guard.circuit("geo").unwrap();
    assert_eq!(circuit.pool().in_use(), 0);
    assert!(guard.run("geo", || async { Ok::<(), GuardError>(()) }).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_timeout_waits_for_work() {
    let (guard, sink) = guard_with("batch", CommandConfig {
        timeout_ms: 10,
        timeout_enabled: false,
        ..Default::default()
    });

    let value = guard
        .run("batch", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, GuardError>(5)
        })
        .await
        .unwrap();

    assert_eq!(value, 5);
    assert_eq!(sink.kinds(), vec![EventKind::Success]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_offered_to_fallback() {
    let (guard, sink) = guard_with("geo", CommandConfig {
        timeout_ms: 50,
        ..Default::default()
    });

    let value = guard
        .run_with_fallback(
            "geo",
            || async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, GuardError>("live")
            },
            |err| async move {
                assert_eq!(err.kind(), ErrorKind::Timeout);
                Ok::<_, GuardError>("stale")
            },
        )
        .await
        .unwrap();

    assert_eq!(value, "stale");
    assert_eq!(sink.kinds(), vec![EventKind::Timeout, EventKind::FallbackSuccess]);
}

#[tokio::test]
async fn test_fallback_failure_wraps_both_errors() {
    let (guard, sink) = guard_with("catalog", CommandConfig::default());

    let err = guard
        .run_with_fallback(
            "catalog",
            || async { Err::<u8, _>("dependency failure") },
            |_err| async { Err::<u8, _>("cache miss") },
        )
        .await
        .unwrap_err();

    match &err {
        GuardError::FallbackFailed { cause_kind, cause, .. } => {
            assert_eq!(*cause_kind, ErrorKind::Work);
            assert_eq!(cause, "command failed: dependency failure");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        err.to_string(),
        "fallback failed with 'cache miss'. run error was 'command failed: dependency failure'"
    );
    assert_eq!(sink.kinds(), vec![EventKind::Failure, EventKind::FallbackFailure]);
}

#[tokio::test]
async fn test_force_fallback_skips_work() {
    let (guard, sink) = guard_with("recs", CommandConfig::default());
    succeed(&guard, "recs").await.unwrap();

    guard.configure_command("recs", &CommandConfig {
        force_fallback: true,
        ..Default::default()
    });

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    let value = guard
        .run_with_fallback(
            "recs",
            move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, GuardError>("personalised")
            },
            |err| async move {
                assert_eq!(err.kind(), ErrorKind::ForceFallback);
                Ok::<_, GuardError>("popular")
            },
        )
        .await
        .unwrap();

    assert_eq!(value, "popular");
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(
        sink.kinds(),
        vec![EventKind::Success, EventKind::ForceFallback, EventKind::FallbackSuccess]
    );

    let err = succeed(&guard, "recs").await.unwrap_err();
    assert!(matches!(err, GuardError::ForceFallback));
}

#[tokio::test]
async fn test_disabled_breaker_still_limits_concurrency() {
    let (guard, _) = guard_with("audit", CommandConfig {
        circuit_breaker_enabled: false,
        max_concurrent_requests: 1,
        timeout_enabled: false,
        ..tripping(5000)
    });

    for _ in 0..10 {
        assert!(matches!(fail(&guard, "audit").await, GuardError::Work(_)));
    }

    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let held = guard.go("audit", move || async move {
        let _ = started_tx.send(());
        let _ = release_rx.await;
        Ok::<(), GuardError>(())
    });
    started_rx.await.unwrap();

    assert!(matches!(succeed(&guard, "audit").await, Err(GuardError::MaxConcurrency)));

    release_tx.send(()).unwrap();
    held.await.unwrap();
}

#[tokio::test]
async fn test_events_carry_circuit_name() {
    let (guard, sink) = guard_with("mail", CommandConfig::default());
    succeed(&guard, "mail").await.unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(&*events[0].circuit, "mail");
    assert!(events[0].run_duration.is_some());
}

#[tokio::test]
async fn test_force_fallback_bypasses_open_circuit_and_full_pool() {
    let (guard, sink) = guard_with("quotes", CommandConfig {
        max_concurrent_requests: 1,
        timeout_enabled: false,
        ..Default::default()
    });

    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let held = guard.go("quotes", move || async move {
        let _ = started_tx.send(());
        let _ = release_rx.await;
        Ok::<(), GuardError>(())
    });
    started_rx.await.unwrap();
    guard.toggle_force_open("quotes", true).unwrap();

    guard.configure_command("quotes", &CommandConfig {
        force_fallback: true,
        timeout_enabled: false,
        ..Default::default()
    });

    let value = guard
        .run_with_fallback(
            "quotes",
            || async { Ok::<_, GuardError>("live") },
            |err| async move {
                assert_eq!(err.kind(), ErrorKind::ForceFallback);
                Ok::<_, GuardError>("canned")
            },
        )
        .await
        .unwrap();

    assert_eq!(value, "canned");
    assert_eq!(sink.count(EventKind::ShortCircuit), 0);
    assert_eq!(sink.count(EventKind::Rejected), 0);

    release_tx.send(()).unwrap();
    held.await.unwrap();
}

#[tokio::test]
async fn test_breaker_enablement_is_read_per_call() {
    let (guard, _) = guard_with("stock", tripping(5000));
    for _ in 0..3 {
        fail(&guard, "stock").await;
    }
    assert!(matches!(succeed(&guard, "stock").await, Err(GuardError::CircuitOpen)));

    guard.configure_command("stock", &CommandConfig {
        circuit_breaker_enabled: false,
        ..Default::default()
    });
    assert!(matches!(fail(&guard, "stock").await, GuardError::Work(_)));
    assert!(!guard.circuit("stock").unwrap().is_enabled());

    guard.configure_command("stock", &CommandConfig::default());
    assert!(matches!(succeed(&guard, "stock").await, Err(GuardError::CircuitOpen)));
}
