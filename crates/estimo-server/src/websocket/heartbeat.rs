//! Idle-connection detection.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Nothing arrived from the client within the timeout window.
    TimedOut,
    /// The session ended first.
    Cancelled,
}

/// Watch a connection's inbound activity.
///
/// Every `check_every` the time since the last frame (data, ping or pong) is
/// compared against `timeout`. The writer's pings provoke pongs from a live
/// client, so a healthy connection never goes quiet for a whole window.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    check_every: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(check_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.idle_for() >= timeout {
                    return HeartbeatResult::TimedOut;
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_connection(cancel: &CancellationToken) -> Arc<ClientConnection> {
        let (tx, _rx) = mpsc::channel(1);
        Arc::new(ClientConnection::new("r1", "u1", tx, cancel.clone()))
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out() {
        let cancel = CancellationToken::new();
        let conn = make_connection(&cancel);
        let result = run_heartbeat(
            conn,
            Duration::from_secs(10),
            Duration::from_secs(30),
            cancel,
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn active_client_stays_connected() {
        let cancel = CancellationToken::new();
        let conn = make_connection(&cancel);
        let handle = tokio::spawn(run_heartbeat(
            conn.clone(),
            Duration::from_secs(10),
            Duration::from_secs(30),
            cancel.clone(),
        ));

        for _ in 0..12 {
            time::sleep(Duration::from_secs(10)).await;
            conn.touch();
        }
        assert!(!handle.is_finished());

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_measured_from_last_activity() {
        let cancel = CancellationToken::new();
        let conn = make_connection(&cancel);
        let started = time::Instant::now();
        let handle = tokio::spawn(run_heartbeat(
            conn.clone(),
            Duration::from_secs(5),
            Duration::from_secs(20),
            cancel,
        ));

        time::sleep(Duration::from_secs(15)).await;
        conn.touch();

        assert_eq!(handle.await.unwrap(), HeartbeatResult::TimedOut);
        // Last activity at 15s, so the 20s window closes at the 35s check.
        assert!(started.elapsed() >= Duration::from_secs(35));
    }

    #[tokio::test]
    async fn cancel_wins_immediately() {
        let cancel = CancellationToken::new();
        let conn = make_connection(&cancel);
        cancel.cancel();
        let result = run_heartbeat(
            conn,
            Duration::from_secs(60),
            Duration::from_secs(180),
            cancel,
        )
        .await;
        assert_eq!(result, HeartbeatResult::Cancelled);
    }
}
