//! Push channel against a real WebSocket server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use agent_link::{ActivityHub, ConnectionState, ConnectionStatus, LinkConfig, PushChannel};
use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

// ============================================================================
// Helpers
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

async fn eventually(what: &str, condition: impl Fn() -> bool) -> Result<()> {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .with_context(|| format!("timed out waiting for {what}"))
}

async fn accept(listener: &TcpListener) -> Result<WebSocketStream<TcpStream>> {
    let (stream, _) = timeout(WAIT, listener.accept()).await??;
    Ok(accept_async(stream).await?)
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Result<Value> {
    loop {
        match timeout(WAIT, ws.next()).await? {
            Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => bail!("socket closed"),
        }
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) -> Result<()> {
    ws.send(Message::Text(value.to_string().into())).await?;
    Ok(())
}

/// Binds a listener whose `dead` ports directly below are free.
///
/// Returns the first port of the block and the listener on its last port.
async fn listener_after_dead_ports(dead: u16) -> Result<(u16, TcpListener)> {
    for _ in 0..20 {
        let first = TcpListener::bind("127.0.0.1:0").await?;
        let first_port = first.local_addr()?.port();
        let Some(live_port) = first_port.checked_add(dead) else {
            continue;
        };

        let mut block = vec![first];
        for port in first_port + 1..=live_port {
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => block.push(listener),
                Err(_) => break,
            }
        }
        if block.len() != usize::from(dead) + 1 {
            continue;
        }

        let live = block.pop().context("live listener")?;
        drop(block);
        return Ok((first_port, live));
    }
    bail!("no free block of {} ports", dead + 1)
}

struct Harness {
    listener: TcpListener,
    channel: PushChannel,
    hub: Arc<ActivityHub>,
    statuses: Arc<Mutex<Vec<ConnectionStatus>>>,
    updated: Arc<Mutex<Vec<String>>>,
}

async fn harness() -> Result<Harness> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let config = LinkConfig::new()
        .with_push_host("127.0.0.1")
        .with_ports(port, port)
        .with_reconnect_backoff(Duration::from_millis(100));
    config.validate()?;

    let hub = Arc::new(ActivityHub::new());

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&statuses);
    hub.connection()
        .register(move |status| recorded.lock().push(*status));

    let updated = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&updated);
    hub.activity().register(move |batch: &Vec<agent_link::TransferRecord>| {
        recorded
            .lock()
            .extend(batch.iter().map(|record| record.uuid.clone()));
    });

    let channel = PushChannel::new(config, Arc::clone(&hub));
    Ok(Harness {
        listener,
        channel,
        hub,
        statuses,
        updated,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_handshake_activity_and_reconnect() -> Result<()> {
    common::init_logging();
    let h = harness().await?;
    h.channel.start();

    let mut ws = accept(&h.listener).await?;

    let handshake = next_json(&mut ws).await?;
    assert_eq!(handshake["id"], json!(1));
    assert_eq!(handshake["jsonrpc"], json!("2.0"));
    assert_eq!(handshake["method"], json!("subscribe_transfer_activity"));
    assert_eq!(
        handshake["params"],
        json!([h.channel.subscriber().to_string()])
    );
    assert_eq!(h.channel.state(), ConnectionState::Open);
    assert!(!h.channel.is_ready());

    // Acknowledge twice; the duplicate is ignored.
    send_json(&mut ws, json!({"jsonrpc": "2.0", "id": 1, "result": true})).await?;
    send_json(&mut ws, json!({"jsonrpc": "2.0", "id": 1, "result": true})).await?;
    send_json(
        &mut ws,
        json!({
            "id": 5,
            "method": "transfer_activity",
            "params": {"result": [{"uuid": "t1"}, {"uuid": "t2"}, {"uuid": "t3"}]}
        }),
    )
    .await?;

    eventually("activity batch", || h.updated.lock().len() == 3).await?;
    assert!(h.channel.is_ready());
    assert_eq!(*h.updated.lock(), vec!["t1", "t2", "t3"]);
    assert_eq!(
        *h.statuses.lock(),
        vec![ConnectionStatus::Closed, ConnectionStatus::Reconnect]
    );

    // Server drops the socket: one Closed, then a fresh discovery cycle.
    ws.close(None).await?;
    drop(ws);
    eventually("closed status", || h.statuses.lock().len() == 3).await?;
    assert_eq!(h.statuses.lock()[2], ConnectionStatus::Closed);

    let mut ws = accept(&h.listener).await?;
    let handshake = next_json(&mut ws).await?;
    assert_eq!(handshake["id"], json!(1));
    send_json(&mut ws, json!({"id": 1, "result": true})).await?;

    eventually("second reconnect", || h.statuses.lock().len() == 4).await?;
    assert_eq!(h.statuses.lock()[3], ConnectionStatus::Reconnect);
    assert_eq!(h.hub.diagnostics().snapshot().reconnects, 2);

    h.channel.shutdown();
    eventually("shutdown", || h.channel.state() == ConnectionState::Closed).await?;
    assert_eq!(
        *h.statuses.lock().last().context("status")?,
        ConnectionStatus::Closed
    );
    Ok(())
}

#[tokio::test]
async fn test_discovery_skips_dead_ports() -> Result<()> {
    common::init_logging();
    let (first_port, listener) = listener_after_dead_ports(3).await?;
    let live_port = listener.local_addr()?.port();

    let config = LinkConfig::new()
        .with_push_host("127.0.0.1")
        .with_ports(first_port, first_port.saturating_add(5))
        .with_reconnect_backoff(Duration::from_millis(100));
    let hub = Arc::new(ActivityHub::new());
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&statuses);
    hub.connection()
        .register(move |status| recorded.lock().push(*status));

    let channel = PushChannel::new(config, Arc::clone(&hub));
    channel.start();

    let mut ws = accept(&listener).await?;
    let handshake = next_json(&mut ws).await?;
    assert_eq!(handshake["id"], json!(1));
    assert_eq!(handshake["method"], json!("subscribe_transfer_activity"));
    assert_eq!(handshake["params"], json!([channel.subscriber().to_string()]));
    assert_eq!(channel.state(), ConnectionState::Open);
    assert_eq!(channel.port(), Some(live_port));

    send_json(&mut ws, json!({"id": 1, "result": true})).await?;
    eventually("ready", || channel.is_ready()).await?;

    assert_eq!(
        *statuses.lock(),
        vec![ConnectionStatus::Closed, ConnectionStatus::Reconnect]
    );
    let snapshot = hub.diagnostics().snapshot();
    assert_eq!(snapshot.reconnects, 1);
    assert_eq!(snapshot.failed_discoveries, 0);

    channel.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_refused_subscription_reconnects() -> Result<()> {
    common::init_logging();
    let h = harness().await?;
    h.channel.start();

    let mut ws = accept(&h.listener).await?;
    next_json(&mut ws).await?;
    send_json(&mut ws, json!({"id": 1, "error": {"message": "not now"}})).await?;

    // The client drops the socket and comes back after the backoff.
    let mut ws = accept(&h.listener).await?;
    next_json(&mut ws).await?;
    send_json(&mut ws, json!({"id": 1, "result": true})).await?;

    eventually("ready", || h.channel.is_ready()).await?;
    assert_eq!(
        *h.statuses.lock(),
        vec![ConnectionStatus::Closed, ConnectionStatus::Reconnect]
    );

    h.channel.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_no_server_counts_failed_discoveries() -> Result<()> {
    common::init_logging();
    let h = harness().await?;
    let Harness {
        listener,
        channel,
        hub,
        ..
    } = h;

    // Nothing listens on the port any more.
    drop(listener);
    channel.start();

    eventually("failed discoveries", || {
        hub.diagnostics().snapshot().failed_discoveries >= 2
    })
    .await?;
    assert!(!channel.is_ready());
    assert_eq!(hub.connection().current(), ConnectionStatus::Closed);

    channel.shutdown();
    Ok(())
}
