//! Graceful shutdown behaviour of a running proxy.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use typeproxy::lifecycle::{ShutdownReason, ShutdownState, TerminationSignal};

mod common;

const SIGTERM: ShutdownReason = ShutdownReason::Signal(TerminationSignal::Terminate);

#[tokio::test]
async fn in_flight_requests_finish_before_stop() {
    let backend = common::start_slow_backend(Duration::from_millis(500)).await;
    let proxy = common::start_proxy(&format!("http://{backend}"), Duration::from_secs(5)).await;

    let mut requests = Vec::new();
    for i in 0..3 {
        let url = proxy.url(&format!("/slow/{i}"));
        requests.push(tokio::spawn(async move {
            common::client().get(url).send().await
        }));
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(proxy.shutdown.trigger(SIGTERM));

    // No new connections once draining.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let late = common::client().get(proxy.url("/late")).send().await;
    assert!(late.is_err(), "connection accepted after shutdown");

    for request in requests {
        let res = request.await.unwrap().expect("in-flight request dropped");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text().await.unwrap(), "done");
    }

    let result = tokio::time::timeout(Duration::from_secs(5), proxy.handle)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(proxy.shutdown.state(), ShutdownState::Stopped);
}

#[tokio::test]
async fn slow_request_is_cut_at_deadline() {
    let backend = common::start_slow_backend(Duration::from_secs(30)).await;
    let grace = Duration::from_millis(400);
    let proxy = common::start_proxy(&format!("http://{backend}"), grace).await;

    let url = proxy.url("/forever");
    let request = tokio::spawn(async move { common::client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    proxy.shutdown.trigger(SIGTERM);

    let result = tokio::time::timeout(Duration::from_secs(5), proxy.handle)
        .await
        .expect("server did not stop")
        .unwrap();
    let elapsed = started.elapsed();

    assert!(result.is_ok(), "forced close must not fail the server");
    assert!(elapsed >= grace, "stopped before the grace period: {elapsed:?}");
    assert!(elapsed < grace + Duration::from_secs(2), "drain overran: {elapsed:?}");

    let response = request.await.unwrap();
    assert!(response.is_err(), "request should have been cut off");
}

#[tokio::test]
async fn idle_keepalive_connection_does_not_hold_drain() {
    let backend = common::start_echo_backend().await;
    let proxy = common::start_proxy(&format!("http://{backend}"), Duration::from_secs(5)).await;

    // Leaves a pooled keep-alive connection open to the proxy.
    let client = common::client();
    let res = client.get(proxy.url("/ping")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let _ = res.bytes().await.unwrap();

    let started = Instant::now();
    proxy.shutdown.trigger(SIGTERM);
    tokio::time::timeout(Duration::from_secs(5), proxy.handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    drop(client);
}

#[tokio::test]
async fn second_trigger_does_not_restart_drain() {
    let backend = common::start_echo_backend().await;
    let proxy = common::start_proxy(&format!("http://{backend}"), Duration::from_secs(5)).await;

    assert!(proxy.shutdown.trigger(SIGTERM));
    assert!(!proxy.shutdown.trigger(ShutdownReason::ListenerExited));

    tokio::time::timeout(Duration::from_secs(5), proxy.handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
    assert!(!proxy.shutdown.trigger(SIGTERM));
    assert_eq!(proxy.shutdown.state(), ShutdownState::Stopped);
}
