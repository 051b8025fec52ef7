//! Per-room fan-out.
//!
//! Register, unregister and broadcast requests travel over one channel and are
//! applied by a single loop in arrival order, so two broadcasts to a room reach
//! every registered handle in submission order. The room table sits behind its
//! own lock so that count queries can read it from any task.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::ClientConnection;
use super::protocol::ServerEvent;

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 1024;

type RoomTable = HashMap<String, HashMap<String, Arc<ClientConnection>>>;

/// Requests applied by the hub loop.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a handle to its room.
    Register(Arc<ClientConnection>),
    /// Remove a handle and close it.
    Unregister(Arc<ClientConnection>),
    /// Deliver a serialized frame to a room.
    Broadcast {
        /// Target room.
        room_id: String,
        /// Frame, serialized once.
        message: Arc<String>,
        /// Connection ID to skip.
        exclude: Option<String>,
    },
    /// Acknowledged once every earlier command has been applied.
    Sync(oneshot::Sender<()>),
}

/// Handle to the hub loop. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<HubCommand>,
    rooms: Arc<RwLock<RoomTable>>,
}

impl Hub {
    /// Start the loop. It stops when `cancel` fires, closing every handle.
    pub fn spawn(cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let rooms = Arc::new(RwLock::new(RoomTable::new()));
        let handle = tokio::spawn(run_hub(rx, rooms.clone(), cancel));
        (Self { commands: tx, rooms }, handle)
    }

    async fn submit(&self, command: HubCommand) {
        if self.commands.send(command).await.is_err() {
            debug!("hub loop stopped, command dropped");
        }
    }

    /// Add `conn` to its room.
    pub async fn register(&self, conn: Arc<ClientConnection>) {
        self.submit(HubCommand::Register(conn)).await;
    }

    /// Remove `conn` from its room and close it.
    pub async fn unregister(&self, conn: Arc<ClientConnection>) {
        self.submit(HubCommand::Unregister(conn)).await;
    }

    /// Deliver `event` to every handle in `room_id` except `exclude`.
    pub async fn broadcast(&self, room_id: &str, event: &ServerEvent, exclude: Option<&str>) {
        let message = match serde_json::to_string(event) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
                return;
            }
        };
        self.submit(HubCommand::Broadcast {
            room_id: room_id.to_owned(),
            message,
            exclude: exclude.map(str::to_owned),
        })
        .await;
    }

    /// Wait until every command submitted before this call has been applied.
    pub async fn sync(&self) {
        let (tx, rx) = oneshot::channel();
        self.submit(HubCommand::Sync(tx)).await;
        let _ = rx.await;
    }

    /// Handles registered in `room_id`.
    pub fn client_count(&self, room_id: &str) -> usize {
        self.rooms.read().get(room_id).map_or(0, HashMap::len)
    }

    /// Handles registered across all rooms.
    pub fn connection_count(&self) -> usize {
        self.rooms.read().values().map(HashMap::len).sum()
    }

    /// Rooms with at least one handle.
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

}

async fn run_hub(
    mut rx: mpsc::Receiver<HubCommand>,
    rooms: Arc<RwLock<RoomTable>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            command = rx.recv() => {
                match command {
                    Some(command) => apply(&rooms, command),
                    None => break,
                }
            }
            () = cancel.cancelled() => break,
        }
    }

    let drained = std::mem::take(&mut *rooms.write());
    let mut closed = 0usize;
    for conn in drained.values().flat_map(HashMap::values) {
        conn.close();
        closed += 1;
    }
    info!(closed, "hub stopped");
}

fn apply(rooms: &RwLock<RoomTable>, command: HubCommand) {
    match command {
        HubCommand::Register(conn) => {
            let mut table = rooms.write();
            let room = table.entry(conn.room_id.clone()).or_default();
            let _ = room.insert(conn.id.clone(), conn.clone());
            debug!(room_id = %conn.room_id, conn_id = %conn.id, clients = room.len(), "connection registered");
        }
        HubCommand::Unregister(conn) => {
            remove(&mut rooms.write(), &conn.room_id, &conn.id);
            conn.close();
            debug!(room_id = %conn.room_id, conn_id = %conn.id, "connection unregistered");
        }
        HubCommand::Broadcast {
            room_id,
            message,
            exclude,
        } => {
            let mut stalled = Vec::new();
            {
                let table = rooms.read();
                let Some(conns) = table.get(&room_id) else {
                    return;
                };
                debug!(room_id, recipients = conns.len(), "broadcast");
                for conn in conns.values() {
                    if exclude.as_deref() == Some(conn.id.as_str()) {
                        continue;
                    }
                    if !conn.send(message.clone()) {
                        stalled.push(conn.clone());
                    }
                }
            }
            if stalled.is_empty() {
                return;
            }
            let mut table = rooms.write();
            for conn in stalled {
                warn!(
                    room_id,
                    conn_id = %conn.id,
                    user_id = %conn.user_id,
                    dropped = conn.drop_count(),
                    "slow consumer, disconnecting"
                );
                remove(&mut table, &room_id, &conn.id);
                conn.close();
            }
        }
        HubCommand::Sync(ack) => {
            let _ = ack.send(());
        }
    }
}

fn remove(table: &mut RoomTable, room_id: &str, conn_id: &str) {
    if let Some(room) = table.get_mut(room_id) {
        let _ = room.remove(conn_id);
        if room.is_empty() {
            let _ = table.remove(room_id);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
