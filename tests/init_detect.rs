#![cfg(feature = "gcp")]

mod common;

use common::Capture;
use ctxlog::platform::gcp::GCE_METADATA_HOST_ENV;
use ctxlog::{set_output, Attr, Context, HandlerOptions, LogFormat};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answers the two compute metadata lookups; everything else is a 404.
async fn gce_metadata_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap_or(0);
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let first = request.lines().next().unwrap_or_default();

            let body = if first.starts_with("GET /computeMetadata/v1/project/project-id") {
                "shop-prod"
            } else if first.starts_with("GET /computeMetadata/v1/instance/name") {
                "web-1"
            } else {
                ""
            };
            let status = if body.is_empty() { "404 Not Found" } else { "200 OK" };
            let response = format!(
                "HTTP/1.1 {status}\r\nmetadata-flavor: Google\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    host
}

// Process-wide state, so everything runs in one test.
#[tokio::test]
async fn init_detect_installs_the_gcp_logger_as_default() {
    let host = gce_metadata_server().await;
    std::env::set_var(GCE_METADATA_HOST_ENV, &host);

    let capture = Capture::default();
    set_output(capture.clone());

    let ctx = Context::background();
    let logger = ctxlog::init_detect(
        &ctx,
        HandlerOptions {
            enable_gcp: true,
            format: LogFormat::Json,
            ..HandlerOptions::default()
        },
    )
    .await;

    ctxlog::info(&ctx, "on gcp", &[Attr::int("x", 1)]);
    logger.warn(&ctx, "same logger", &[]);

    let lines = capture.json_lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["severity"], "INFO");
    assert_eq!(lines[0]["message"], "on gcp");
    assert_eq!(lines[0]["project_id"], "shop-prod");
    assert_eq!(lines[0]["instance_name"], "web-1");
    assert_eq!(lines[0]["x"], 1);
    assert!(lines[0].get("msg").is_none());
    assert_eq!(lines[1]["severity"], "WARN");
}
