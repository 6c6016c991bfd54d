//! Integration tests for graceful shutdown
//!
//! Covers draining of background work, the grace window, and in-flight
//! requests finishing after the signal.

use axum::routing::get;
use axum::Router;
use sales_api::lifecycle::{Lifecycle, LifecycleState, ShutdownError};
use sales_api::services::notifier::mock::RecordingNotifier;
use sales_api::services::BackgroundTasks;
use sales_test_utils::{TestApiServer, TestWorld, TEST_PASSWORD};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_outstanding_background_tasks_finish_before_stopped() -> Result<(), anyhow::Error> {
    const TASKS: usize = 5;
    let world = TestWorld::new();
    let finished = Arc::new(AtomicUsize::new(0));

    for _ in 0..TASKS {
        let finished = Arc::clone(&finished);
        world.background.run("slow_test_task", async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            finished.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        });
    }

    let server = TestApiServer::spawn(world).await?;
    let states = server.states();
    let components = server.components();
    assert_eq!(server.state(), LifecycleState::Listening);

    server.shutdown().await?;

    assert_eq!(finished.load(Ordering::SeqCst), TASKS);
    assert_eq!(*states.borrow(), LifecycleState::Stopped);
    assert!(components.is_cancelled());
    Ok(())
}

#[tokio::test]
async fn test_activation_notice_is_delivered_during_shutdown() -> Result<(), anyhow::Error> {
    let world =
        TestWorld::new().with_notifier(RecordingNotifier::with_delay(Duration::from_millis(300)));
    let server = TestApiServer::spawn(world).await?;
    let notifier = Arc::clone(&server.world().notifier);

    let response = reqwest::Client::new()
        .post(format!("{}/v1/users", server.url()))
        .json(&json!({
            "first_name": "Katherine",
            "last_name": "Johnson",
            "email": "katherine@example.com",
            "password": TEST_PASSWORD,
            "role": "guest",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    assert!(notifier.deliveries().await.is_empty());

    server.shutdown().await?;

    assert_eq!(notifier.deliveries().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_grace_exceeded_is_reported() -> Result<(), anyhow::Error> {
    let world = TestWorld::new();
    world.background.run("stuck_test_task", async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok::<(), String>(())
    });

    let server = TestApiServer::spawn_with_grace(world, Duration::from_millis(100)).await?;
    let states = server.states();

    match server.shutdown().await {
        Err(ShutdownError::GraceExceeded {
            grace,
            outstanding_tasks,
        }) => {
            assert_eq!(grace, Duration::from_millis(100));
            assert_eq!(outstanding_tasks, 1);
        }
        other => panic!("expected GraceExceeded, got {:?}", other),
    }
    assert_eq!(*states.borrow(), LifecycleState::ShuttingDown);
    Ok(())
}

#[tokio::test]
async fn test_in_flight_request_completes_after_signal() -> Result<(), anyhow::Error> {
    let started = Arc::new(Notify::new());
    let handler_started = Arc::clone(&started);
    let app = Router::new().route(
        "/slow",
        get(move || {
            let handler_started = Arc::clone(&handler_started);
            async move {
                handler_started.notify_one();
                tokio::time::sleep(Duration::from_millis(300)).await;
                "done"
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}/slow", listener.local_addr()?);

    let lifecycle = Lifecycle::new(
        Duration::from_secs(5),
        BackgroundTasks::new(),
        CancellationToken::new(),
    );
    let (signal_tx, signal_rx) = oneshot::channel::<()>();
    let serving = tokio::spawn(lifecycle.serve(listener, app, async move {
        let _ = signal_rx.await;
    }));

    let request = tokio::spawn(async move { reqwest::get(url).await?.text().await });

    started.notified().await;
    signal_tx.send(()).unwrap();

    let body = request.await??;
    assert_eq!(body, "done");
    serving.await??;
    Ok(())
}

#[tokio::test]
async fn test_new_connections_are_refused_after_shutdown() -> Result<(), anyhow::Error> {
    let server = TestApiServer::spawn(TestWorld::new()).await?;
    let url = format!("{}/health", server.url());

    let before = reqwest::get(&url).await?;
    assert_eq!(before.status(), reqwest::StatusCode::OK);
    drop(before);

    server.shutdown().await?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;
    assert!(client.get(&url).send().await.is_err());
    Ok(())
}
