//! Minimal gateway client: identify, heartbeat, forward dispatches.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;
const OP_HEARTBEAT_ACK: u64 = 11;

/// GUILDS; interactions arrive regardless of intents.
const INTENTS: u64 = 1;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Close codes after which reconnecting cannot help.
const FATAL_CLOSE_CODES: [u16; 6] = [4004, 4010, 4011, 4012, 4013, 4014];

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Ready { application_id: u64, user: String },
    Interaction(Value),
}

enum Exit {
    Reconnect,
    Fatal(String),
    Shutdown,
}

pub fn spawn(
    url: String,
    token: String,
    tx: mpsc::Sender<GatewayEvent>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match run_gateway(&url, &token, &tx, &mut shutdown).await {
                Ok(Exit::Shutdown) => {
                    info!("Gateway shutting down");
                    return;
                }
                Ok(Exit::Fatal(reason)) => {
                    error!("Gateway closed permanently: {}", reason);
                    return;
                }
                Ok(Exit::Reconnect) => {
                    info!("Gateway asked to reconnect, reconnecting in 5s...");
                }
                Err(e) => {
                    error!("Gateway error: {:#}, reconnecting in 5s...", e);
                }
            }
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = sleep(RECONNECT_DELAY) => {}
            }
        }
    })
}

fn heartbeat(seq: Option<u64>) -> WsMessage {
    WsMessage::Text(json!({ "op": OP_HEARTBEAT, "d": seq }).to_string().into())
}

fn identify(token: &str) -> WsMessage {
    let payload = json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "anthranks",
                "device": "anthranks"
            }
        }
    });
    WsMessage::Text(payload.to_string().into())
}

/// What a READY dispatch tells us about ourselves.
pub fn parse_ready(d: &Value) -> Option<GatewayEvent> {
    let application_id = d["application"]["id"].as_str()?.parse().ok()?;
    let user = d["user"]["username"].as_str().unwrap_or_default().to_string();
    Some(GatewayEvent::Ready { application_id, user })
}

async fn run_gateway(
    url: &str,
    token: &str,
    tx: &mpsc::Sender<GatewayEvent>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<Exit> {
    info!("Connecting to gateway...");
    let (ws, _) = connect_async(url).await.context("Gateway connection failed")?;
    let (mut write, mut read) = ws.split();

    // HELLO comes first and carries the heartbeat period.
    let period = loop {
        let msg = read
            .next()
            .await
            .context("Gateway closed before HELLO")?
            .context("Gateway read error")?;
        if let WsMessage::Text(text) = msg {
            let frame: Value = serde_json::from_str(&text).context("Invalid gateway frame")?;
            if frame["op"].as_u64() == Some(OP_HELLO) {
                let ms = frame["d"]["heartbeat_interval"]
                    .as_u64()
                    .context("HELLO without heartbeat_interval")?;
                break Duration::from_millis(ms);
            }
        }
    };
    debug!("Gateway heartbeat every {:?}", period);

    write.send(identify(token)).await.context("Failed to identify")?;

    let mut ticker = interval_at(Instant::now() + period, period);
    let mut seq: Option<u64> = None;
    let mut acked = true;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                write.send(WsMessage::Close(None)).await.ok();
                return Ok(Exit::Shutdown);
            }
            _ = ticker.tick() => {
                if !acked {
                    warn!("Missed heartbeat ACK, reconnecting");
                    return Ok(Exit::Reconnect);
                }
                acked = false;
                write.send(heartbeat(seq)).await.context("Failed to send heartbeat")?;
            }
            msg = read.next() => {
                let Some(msg) = msg else {
                    info!("Gateway stream ended");
                    return Ok(Exit::Reconnect);
                };
                let text = match msg.context("Gateway read error")? {
                    WsMessage::Text(t) => t.to_string(),
                    WsMessage::Ping(d) => {
                        write.send(WsMessage::Pong(d)).await.ok();
                        continue;
                    }
                    WsMessage::Close(frame) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code)).unwrap_or(1000);
                        if FATAL_CLOSE_CODES.contains(&code) {
                            let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                            return Ok(Exit::Fatal(format!("close code {}: {}", code, reason)));
                        }
                        info!("Gateway sent close frame ({})", code);
                        return Ok(Exit::Reconnect);
                    }
                    _ => continue,
                };

                let frame: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Unparsable gateway frame: {}", e);
                        continue;
                    }
                };
                if let Some(s) = frame["s"].as_u64() {
                    seq = Some(s);
                }

                match frame["op"].as_u64() {
                    Some(OP_DISPATCH) => {
                        let event = match frame["t"].as_str() {
                            Some("READY") => parse_ready(&frame["d"]),
                            Some("INTERACTION_CREATE") => Some(GatewayEvent::Interaction(frame["d"].clone())),
                            Some(other) => {
                                debug!("Ignoring dispatch {}", other);
                                None
                            }
                            None => None,
                        };
                        if let Some(event) = event {
                            if tx.send(event).await.is_err() {
                                warn!("Gateway event receiver dropped");
                                return Ok(Exit::Shutdown);
                            }
                        }
                    }
                    Some(OP_HEARTBEAT) => {
                        write.send(heartbeat(seq)).await.context("Failed to send heartbeat")?;
                    }
                    Some(OP_HEARTBEAT_ACK) => acked = true,
                    Some(OP_RECONNECT) => return Ok(Exit::Reconnect),
                    Some(OP_INVALID_SESSION) => {
                        warn!("Gateway session invalidated");
                        return Ok(Exit::Reconnect);
                    }
                    other => debug!("Gateway op {:?}", other),
                }
            }
        }
    }
}
