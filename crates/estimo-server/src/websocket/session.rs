//! One socket from upgrade to disconnect.
//!
//! Each session runs three cooperating tasks:
//!
//! 1. the read loop (this task) feeding text frames to the dispatcher
//! 2. a writer draining the connection's queue and sending keep-alive pings
//! 3. a heartbeat that closes the connection once the client goes quiet
//!
//! Closing the connection's token stops all three.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::SessionContext;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::server::AppState;

/// Serve one upgraded socket for `user_id` in `room_id`.
#[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
pub async fn run_session(
    ws: WebSocket,
    room_id: String,
    user_id: String,
    nickname: String,
    state: AppState,
) {
    let config = state.config.clone();
    let (ws_tx, mut ws_rx) = ws.split();

    let (tx, rx) = mpsc::channel(config.send_buffer_size);
    let cancel = state.shutdown.child_token();
    let conn = Arc::new(ClientConnection::new(room_id, user_id, tx, cancel.clone()));
    info!(conn_id = %conn.id, "client connected");

    let writer = tokio::spawn(write_loop(
        ws_tx,
        rx,
        conn.clone(),
        config.ping_interval,
        config.write_timeout,
    ));

    let ctx = SessionContext::new(state.services.clone(), state.hub.clone(), conn.clone());
    if ctx.join(&nickname).await.is_err() {
        conn.close();
        finish_writer(writer, config.write_timeout).await;
        return;
    }

    let heartbeat = {
        let conn = conn.clone();
        let cancel = cancel.clone();
        let (every, timeout) = (config.ping_interval, config.pong_timeout);
        tokio::spawn(async move {
            if run_heartbeat(conn.clone(), every, timeout, cancel).await == HeartbeatResult::TimedOut {
                warn!(conn_id = %conn.id, idle_secs = conn.idle_for().as_secs(), "client unresponsive, disconnecting");
                conn.close();
            }
        })
    };

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = ws_rx.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                conn.touch();
                ctx.handle_text(text.as_str()).await;
            }
            Some(Ok(Message::Binary(data))) => {
                conn.touch();
                match std::str::from_utf8(&data) {
                    Ok(text) => ctx.handle_text(text).await,
                    Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
                }
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => conn.touch(),
            Some(Ok(Message::Close(_))) => {
                debug!("client sent close frame");
                break;
            }
            Some(Err(e)) => {
                debug!(error = %e, "read failed");
                break;
            }
            None => break,
        }
    }

    ctx.leave().await;
    conn.close();
    heartbeat.abort();
    finish_writer(writer, config.write_timeout).await;
    info!(
        conn_id = %conn.id,
        duration_secs = conn.age().as_secs_f64(),
        dropped = conn.drop_count(),
        "client disconnected"
    );
}

async fn finish_writer(writer: JoinHandle<()>, limit: Duration) {
    let abort = writer.abort_handle();
    if time::timeout(limit, writer).await.is_err() {
        warn!("writer did not finish in time, aborting");
        abort.abort();
    }
}

/// Forward queued frames to `sink` and ping every `ping_every`.
///
/// Once the connection closes, frames still queued are flushed before a
/// Close frame. A write that fails or exceeds `write_timeout` closes the
/// connection immediately.
pub(crate) async fn write_loop<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Arc<String>>,
    conn: Arc<ClientConnection>,
    ping_every: Duration,
    write_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let mut ping = time::interval(ping_every);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let _ = ping.tick().await;

    loop {
        let frame = tokio::select! {
            biased;
            () = conn.closed() => break,
            queued = rx.recv() => match queued {
                Some(text) => Message::Text(text.as_str().to_owned().into()),
                None => break,
            },
            _ = ping.tick() => Message::Ping(Vec::new().into()),
        };
        if !write_frame(&mut sink, frame, write_timeout).await {
            conn.close();
            return;
        }
    }

    while let Ok(text) = rx.try_recv() {
        let frame = Message::Text(text.as_str().to_owned().into());
        if !write_frame(&mut sink, frame, write_timeout).await {
            return;
        }
    }
    let _ = write_frame(&mut sink, Message::Close(None), write_timeout).await;
}

async fn write_frame<S>(sink: &mut S, frame: Message, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    match time::timeout(limit, sink.send(frame)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "write failed");
            false
        }
        Err(_) => {
            warn!(timeout_ms = limit.as_millis(), "write timed out");
            false
        }
    }
}
