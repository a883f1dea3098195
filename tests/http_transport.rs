//! HTTP transport against a minimal local responder.

mod common;

use std::sync::Arc;
use std::time::Duration;

use agent_link::{
    ActivityHub, AgentClient, Environment, Error, HttpTransport, LinkConfig, TransportKind,
};
use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ============================================================================
// Responder
// ============================================================================

type Handler = Arc<dyn Fn(Value) -> (u16, Value) + Send + Sync>;

/// Serves one JSON answer per connection until the test ends.
async fn serve<F>(handler: F) -> Result<String>
where
    F: Fn(Value) -> (u16, Value) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}/rpc", listener.local_addr()?);
    let handler: Handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let _ = answer(stream, handler).await;
            });
        }
    });

    Ok(url)
}

async fn answer(mut stream: TcpStream, handler: Handler) -> Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            bail!("connection closed before headers");
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buffer[..header_end]).to_lowercase();
    let length: usize = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .context("missing content-length")?
        .trim()
        .parse()?;

    while buffer.len() < header_end + length {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            bail!("connection closed before body");
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let request: Value = serde_json::from_slice(&buffer[header_end..header_end + length])?;
    let (status, body) = handler(request);
    let body = body.to_string();

    let response = format!(
        "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

fn echo(request: Value) -> (u16, Value) {
    let reply = json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "result": {"method": request["method"], "params": request["params"]},
    });
    (200, reply)
}

fn transport(url: &str) -> Result<(HttpTransport, Arc<ActivityHub>)> {
    let hub = Arc::new(ActivityHub::new());
    let config = LinkConfig::new().with_http_endpoint(url);
    Ok((HttpTransport::new(&config, Arc::clone(&hub))?, hub))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_successful_call() -> Result<()> {
    common::init_logging();
    let url = serve(echo).await?;
    let (transport, _hub) = transport(&url)?;

    let result = transport.request("get_info", json!({"verbose": true})).await?;
    assert_eq!(result["method"], json!("get_info"));
    assert_eq!(result["params"], json!({"verbose": true}));
    assert_eq!(transport.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_non_success_status() -> Result<()> {
    common::init_logging();
    let url = serve(|_| (500, json!({"oops": true}))).await?;
    let (transport, _hub) = transport(&url)?;

    // The responder's own reason phrase is replaced by the canonical one.
    let err = transport.request("get_info", json!({})).await.unwrap_err();
    match &err {
        Error::Http { status, message } => {
            assert_eq!(*status, 500);
            assert_eq!(message, "Internal Server Error");
        }
        other => bail!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_error_envelope_rejects() -> Result<()> {
    common::init_logging();
    let url = serve(|request| {
        let reply = json!({
            "id": request["id"],
            "error": {"code": 7, "user_message": "Transfer not found"},
        });
        (200, reply)
    })
    .await?;
    let (transport, _hub) = transport(&url)?;

    let err = transport
        .request("get_transfer", json!({"uuid": "missing"}))
        .await
        .unwrap_err();
    match err {
        Error::RemoteRejected {
            message,
            debug_data,
        } => {
            assert_eq!(message, "Transfer not found");
            assert_eq!(debug_data.context("debug data")?["code"], json!(7));
        }
        other => bail!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_reply_for_other_call() -> Result<()> {
    common::init_logging();
    let url = serve(|_| (200, json!({"id": 999, "result": "stray"}))).await?;
    let (transport, hub) = transport(&url)?;

    let err = transport.request("get_info", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }), "{err:?}");
    assert_eq!(hub.diagnostics().snapshot().unknown_replies, 1);
    assert_eq!(transport.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_calls_resolve_independently() -> Result<()> {
    common::init_logging();
    let url = serve(echo).await?;
    let (transport, _hub) = transport(&url)?;

    let (a, b, c) = tokio::join!(
        transport.request("first", json!([1])),
        transport.request("second", json!([2])),
        transport.request("third", json!([3])),
    );

    assert_eq!(a?["method"], json!("first"));
    assert_eq!(b?["params"], json!([2]));
    assert_eq!(c?["method"], json!("third"));
    assert_eq!(transport.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_client_over_http() -> Result<()> {
    common::init_logging();
    let url = serve(echo).await?;

    // No push server: discovery keeps failing in the background.
    let unused = TcpListener::bind("127.0.0.1:0").await?;
    let push_port = unused.local_addr()?.port();
    drop(unused);

    let client = AgentClient::builder()
        .config(
            LinkConfig::new()
                .with_http_endpoint(&url)
                .with_push_host("127.0.0.1")
                .with_ports(push_port, push_port)
                .with_reconnect_backoff(Duration::from_millis(50)),
        )
        .environment(Environment::new())
        .build()?;
    assert_eq!(client.kind(), TransportKind::Http);

    let err = client.request("get_info", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::ChannelNotReady));

    client.start();
    client.subscribe_activity().await?;

    let result = client.request("get_version", json!({})).await?;
    assert_eq!(result["method"], json!("get_version"));
    assert!(!client.is_ready());

    client.shutdown();

    let err = client.request("get_version", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::ChannelNotReady), "{err:?}");
    let err = client.subscribe_activity().await.unwrap_err();
    assert!(matches!(err, Error::ChannelNotReady), "{err:?}");
    Ok(())
}
