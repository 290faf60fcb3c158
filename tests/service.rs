//! The `serve` lifecycle over real sockets: startup restore and the forced
//! cookie flush on shutdown.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

use kiosk_service::{KioskConfig, KioskService};

const PATIENCE: Duration = Duration::from_secs(5);

fn config(root: &Path) -> KioskConfig {
    KioskConfig {
        http_port: 0,
        relay_port: 0,
        dialer_url: None,
        monitored_ports: vec![],
        battery_dir: root.join("no-battery"),
        uptime_program: "kiosk-no-such-uptime-binary".to_string(),
        // Far longer than the test, so only the shutdown flush can write.
        cookie_debounce: Duration::from_secs(600),
        ..KioskConfig::rooted_at(root)
    }
}

/// One HTTP/1.1 exchange on a fresh connection; returns the status code and
/// the body.
async fn http(addr: SocketAddr, method: &str, path: &str, body: Option<Value>) -> (u16, String) {
    let body = body.map(|value| value.to_string()).unwrap_or_default();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    timeout(PATIENCE, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    let status = response
        .split(' ')
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

fn read_cookies(path: &Path) -> Vec<Value> {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn shutdown_flushes_changes_still_inside_the_debounce_window() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let cookies_path = config.cookies_path();

    let service = KioskService::bind(config).await.unwrap();
    let addr = service.http_addr().unwrap();
    let (stop, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(service.run(async move {
        let _ = stop_rx.await;
    }));

    let (status, _) = http(
        addr,
        "POST",
        "/api/session/cookies",
        Some(json!({
            "cookie": {
                "url": "http://kiosk.local/",
                "name": "sid",
                "value": "live",
                "domain": "kiosk.local"
            },
            "cause": "explicit"
        })),
    )
    .await;
    assert_eq!(status, 204);
    assert!(!cookies_path.exists());

    stop.send(()).unwrap();
    timeout(PATIENCE, running).await.unwrap().unwrap().unwrap();

    let saved = read_cookies(&cookies_path);
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0]["name"], "sid");
    assert_eq!(saved[0]["value"], "live");
}

#[tokio::test]
async fn startup_restores_the_previous_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    std::fs::create_dir_all(&config.data_dir).unwrap();
    std::fs::write(
        config.cookies_path(),
        json!([
            { "url": "https://kiosk.local/", "name": "lang", "value": "fr", "domain": ".kiosk.local", "secure": true },
            { "name": "orphan" }
        ])
        .to_string(),
    )
    .unwrap();

    let service = KioskService::bind(config).await.unwrap();
    let addr = service.http_addr().unwrap();
    let (stop, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(service.run(async move {
        let _ = stop_rx.await;
    }));

    let (status, body) = http(addr, "GET", "/api/session/cookies", None).await;
    assert_eq!(status, 200);
    let listed: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(listed["cookies"].as_array().unwrap().len(), 1);
    assert_eq!(listed["cookies"][0]["value"], "fr");

    stop.send(()).unwrap();
    timeout(PATIENCE, running).await.unwrap().unwrap().unwrap();
}
