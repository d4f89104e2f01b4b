use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::checksum::sha256_hex;
use super::*;
use crate::error::ErrorKind;

const PAYLOAD: &[u8] = b"PK\x03\x04 pretend this is a zip archive";

fn downloader() -> Downloader {
    Downloader::new(reqwest::Client::new())
}

async fn serve(server: &MockServer, status: u16, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path("/archive.zip"))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Raw HTTP server. Connection `n` (1-based) gets a full body when
/// `complete(n)` is true and a body cut short of its Content-Length otherwise.
async fn flaky_server(complete: fn(u32) -> bool) -> (String, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/archive.zip", listener.local_addr().unwrap());
    let connections = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&connections);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst).saturating_add(1);
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;

                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    PAYLOAD.len()
                );
                let body = if complete(n) {
                    PAYLOAD
                } else {
                    &PAYLOAD[..PAYLOAD.len() / 2]
                };
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (url, connections)
}

#[tokio::test]
async fn streams_and_verifies_checksum() {
    let server = MockServer::start().await;
    serve(&server, 200, PAYLOAD).await;
    let url = format!("{}/archive.zip", server.uri());

    let archive = downloader()
        .download(&url, Some(&sha256_hex(PAYLOAD)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(std::fs::read(archive.path()).unwrap(), PAYLOAD);
    assert_eq!(archive.sha256(), sha256_hex(PAYLOAD));
    assert!(!archive.is_local());
}

#[tokio::test]
async fn flipped_byte_fails_and_discards_file() {
    let mut tampered = PAYLOAD.to_vec();
    tampered[5] ^= 0x20;

    let server = MockServer::start().await;
    serve(&server, 200, &tampered).await;
    let url = format!("{}/archive.zip", server.uri());

    let archive = downloader()
        .fetch(&url, &CancellationToken::new())
        .await
        .unwrap();
    let temp_path = archive.path().to_path_buf();
    assert!(temp_path.exists());

    let err = archive.verify(Some(&sha256_hex(PAYLOAD))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    assert!(!temp_path.exists(), "temp file should be removed on mismatch");
}

#[tokio::test]
async fn missing_checksum_skips_verification() {
    let server = MockServer::start().await;
    serve(&server, 200, PAYLOAD).await;
    let url = format!("{}/archive.zip", server.uri());

    for expected in [None, Some("")] {
        downloader()
            .download(&url, expected, &CancellationToken::new())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(path("/archive.zip"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({ "message": "version not published" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let url = format!("{}/archive.zip", server.uri());

    let err = downloader()
        .download(&url, None, &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        InstallError::HttpClient { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "version not published");
        },
        other => panic!("expected HttpClient, got {other:?}"),
    }
}

#[tokio::test]
async fn connection_refused_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/archive.zip", listener.local_addr().unwrap());
    drop(listener);

    let err = downloader()
        .download(&url, None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn truncated_body_is_retried_then_reported() {
    let (url, connections) = flaky_server(|_| false).await;

    let err = downloader()
        .download(&url, None, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        InstallError::CorruptResponse { attempts, .. } => assert_eq!(attempts, MAX_ATTEMPTS),
        other => panic!("expected CorruptResponse, got {other:?}"),
    }
    assert_eq!(connections.load(Ordering::SeqCst), MAX_ATTEMPTS);
}

#[tokio::test]
async fn retry_starts_from_an_empty_file() {
    let (url, connections) = flaky_server(|n| n >= 2).await;

    let archive = downloader()
        .download(&url, Some(&sha256_hex(PAYLOAD)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(connections.load(Ordering::SeqCst), 2);
    assert_eq!(std::fs::read(archive.path()).unwrap(), PAYLOAD);
}

#[tokio::test]
async fn local_file_is_copied_without_checksum_enforcement() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("offline.zip");
    std::fs::write(&source, PAYLOAD).unwrap();

    let archive = downloader()
        .download(
            source.to_str().unwrap(),
            Some("00".repeat(32).as_str()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(archive.is_local());
    assert_ne!(archive.path(), source.as_path());
    assert_eq!(std::fs::read(archive.path()).unwrap(), PAYLOAD);
    assert_eq!(archive.sha256(), sha256_hex(PAYLOAD));
}

#[tokio::test]
async fn cancelled_download() {
    let server = MockServer::start().await;
    serve(&server, 200, PAYLOAD).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = downloader()
        .download(&format!("{}/archive.zip", server.uri()), None, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}
