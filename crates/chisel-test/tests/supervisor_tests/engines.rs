//! The concrete tunnel engines under supervision.

use std::sync::Arc;
use std::time::Duration;

use chisel_core::{ClientConfig, LifecycleState, Mode, ServerConfig, ShutdownOutcome};
use chisel_test::SupervisorHarness;
use chisel_tunnel::{TunnelClient, TunnelServer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn loopback_server() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: "0".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn server_closes_gracefully_on_interrupt() {
    let mut running = SupervisorHarness::server(TunnelServer::new(loopback_server()).unwrap()).launch();
    running
        .wait_for(LifecycleState::Active, Duration::from_secs(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    running.interrupt().await.unwrap();
    let outcome = running.finish_within(Duration::from_secs(5)).await.unwrap();
    assert_eq!(outcome, ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn server_answers_health_while_supervised() {
    let server = Arc::new(TunnelServer::new(loopback_server()).unwrap());
    let shutdown = chisel_core::ShutdownContext::new();
    let run = tokio::spawn(
        chisel_core::Orchestrator::from_shared(Mode::Server, Arc::clone(&server), shutdown.clone())
            .run(),
    );

    let mut addr = None;
    for _ in 0..200 {
        addr = server.local_addr();
        if addr.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let addr = addr.expect("server should bind");

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: chisel\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"));

    shutdown.trigger();
    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn retrying_client_closes_gracefully() {
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ClientConfig::new(format!("127.0.0.1:{port}"), vec!["3000".to_string()]);
    let running = SupervisorHarness::client(TunnelClient::new(config).unwrap()).launch();

    tokio::time::sleep(Duration::from_millis(250)).await;
    running.terminate().await.unwrap();
    let outcome = running.finish_within(Duration::from_secs(5)).await.unwrap();
    assert_eq!(outcome, ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn client_out_of_retries_is_fatal() {
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = ClientConfig::new(format!("127.0.0.1:{port}"), vec!["3000".to_string()]);
    config.max_retry_count = 0;
    let running = SupervisorHarness::client(TunnelClient::new(config).unwrap()).launch();

    let err = running
        .finish_within(Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed after 1 attempts"));
}
