//! Real SIGTERM delivery. One test per binary: the signal hits the whole process.
#![cfg(unix)]

use std::net::Ipv4Addr;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::net::TcpListener;
use url::Url;

use typeproxy::lifecycle::{startup, Shutdown, ShutdownState, SignalWatcher};
use typeproxy::ProxyConfig;

mod common;

async fn send_sigterm() {
    let status = tokio::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .await
        .unwrap();
    assert!(status.success());
}

async fn free_port() -> u16 {
    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    socket.local_addr().unwrap().port()
}

#[tokio::test]
async fn sigterm_drains_and_stops_the_proxy() {
    // The watcher alone moves the coordinator to Draining.
    let shutdown = Shutdown::new();
    let watcher = SignalWatcher::install().unwrap().spawn(shutdown.clone());

    send_sigterm().await;
    tokio::time::timeout(Duration::from_secs(5), shutdown.draining())
        .await
        .expect("signal did not start the drain");
    assert_eq!(shutdown.state(), ShutdownState::Draining);
    tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .unwrap()
        .unwrap();

    // The full startup path returns once the drain has finished.
    let backend = common::start_echo_backend().await;
    let port = free_port().await;
    let mut config = ProxyConfig::new(Url::parse(&format!("http://{backend}")).unwrap());
    config.listener.bind_address = Ipv4Addr::LOCALHOST.into();
    config.listener.port = port;
    config.grace = Duration::from_secs(5);
    let running = tokio::spawn(startup::run(config));

    // A response means the server is serving, so handlers are installed.
    let client = common::client();
    let url = format!("http://127.0.0.1:{port}/ready");
    let mut attempts = 0;
    loop {
        match client.get(&url).send().await {
            Ok(res) => {
                assert_eq!(res.status(), StatusCode::CREATED);
                break;
            }
            Err(_) if attempts < 100 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(e) => panic!("proxy never came up: {e}"),
        }
    }

    send_sigterm().await;
    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("proxy did not stop")
        .unwrap();
    assert!(result.is_ok());
}
