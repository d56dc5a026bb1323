//! Relay task and authoritative tick loop
//!
//! One task owns the `VehicleState` and `ConnectionRegistry`. Connection
//! events arrive over an mpsc channel and the physics timer fires inside the
//! same loop, so every mutation runs to completion before the next one starts
//! and is followed by exactly one broadcast.

use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::{tick_interval, unix_millis};
use crate::vehicle::{ControlCommand, ControlInput, ControlOutcome, VehicleState};
use crate::ws::protocol::ServerMsg;

use super::registry::{ClientRole, ConnectionRegistry, ConnectionStats};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const BROADCAST_CHANNEL_CAPACITY: usize = 256;

/// Events submitted to the relay by connection tasks
#[derive(Debug)]
pub enum RelayEvent {
    /// Socket opened; `direct_tx` reaches only this connection
    Connected {
        conn_id: Uuid,
        direct_tx: mpsc::Sender<ServerMsg>,
    },
    /// Client declared its role (raw string from the wire)
    Register { conn_id: Uuid, role: String },
    /// Control input from a client
    Control {
        conn_id: Uuid,
        command: ControlCommand,
    },
    /// Socket closed
    Disconnected { conn_id: Uuid },
    /// Read-only view for HTTP endpoints
    Query { reply: oneshot::Sender<RelaySnapshot> },
}

/// Point-in-time copy of relay state
#[derive(Debug, Clone)]
pub struct RelaySnapshot {
    pub state: VehicleState,
    pub connections: ConnectionStats,
    /// Open sockets, registered or not
    pub live_connections: usize,
}

/// Relay errors seen by handle users
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Relay task is not running")]
    Closed,
}

/// Cloneable handle to the running relay
#[derive(Clone)]
pub struct RelayHandle {
    event_tx: mpsc::Sender<RelayEvent>,
    broadcast_tx: broadcast::Sender<ServerMsg>,
}

impl RelayHandle {
    /// Receive every broadcast from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.broadcast_tx.subscribe()
    }

    pub async fn send(&self, event: RelayEvent) -> Result<(), RelayError> {
        self.event_tx.send(event).await.map_err(|_| RelayError::Closed)
    }

    pub async fn snapshot(&self) -> Result<RelaySnapshot, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayEvent::Query { reply }).await?;
        rx.await.map_err(|_| RelayError::Closed)
    }
}

/// Per-connection bookkeeping
struct Connection {
    /// Last registered role, if any
    role: Option<ClientRole>,
    direct_tx: mpsc::Sender<ServerMsg>,
}

/// The relay (owned by its task)
pub struct Relay {
    state: VehicleState,
    registry: ConnectionRegistry,
    connections: HashMap<Uuid, Connection>,
    event_rx: mpsc::Receiver<RelayEvent>,
    broadcast_tx: broadcast::Sender<ServerMsg>,
}

impl Relay {
    /// Create the relay with boot-time state
    pub fn new() -> (Self, RelayHandle) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);

        let handle = RelayHandle {
            event_tx,
            broadcast_tx: broadcast_tx.clone(),
        };

        let relay = Self {
            state: VehicleState::new(unix_millis()),
            registry: ConnectionRegistry::new(),
            connections: HashMap::new(),
            event_rx,
            broadcast_tx,
        };

        (relay, handle)
    }

    /// Run events and physics ticks until every handle is dropped
    pub async fn run(mut self) {
        info!(tick_ms = tick_interval().as_millis() as u64, "Relay started");

        let mut ticker = interval(tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(unix_millis());
                }
                event = self.event_rx.recv() => match event {
                    Some(event) => self.handle_event(event, unix_millis()),
                    None => {
                        info!("All relay handles dropped, stopping");
                        break;
                    }
                },
            }
        }
    }

    /// Advance physics one step and broadcast the result
    fn tick(&mut self, now: u64) {
        self.state.step_physics(now);
        self.broadcast_state();
    }

    fn handle_event(&mut self, event: RelayEvent, now: u64) {
        match event {
            RelayEvent::Connected { conn_id, direct_tx } => self.handle_connect(conn_id, direct_tx),
            RelayEvent::Register { conn_id, role } => self.handle_register(conn_id, &role),
            RelayEvent::Control { conn_id, command } => self.handle_control(conn_id, command, now),
            RelayEvent::Disconnected { conn_id } => self.handle_disconnect(conn_id),
            RelayEvent::Query { reply } => {
                let _ = reply.send(RelaySnapshot {
                    state: self.state.clone(),
                    connections: self.registry.snapshot(),
                    live_connections: self.connections.len(),
                });
            }
        }
    }

    fn handle_connect(&mut self, conn_id: Uuid, direct_tx: mpsc::Sender<ServerMsg>) {
        info!(conn_id = %conn_id, "Client connected");

        self.connections.insert(
            conn_id,
            Connection {
                role: None,
                direct_tx,
            },
        );

        // Queued before the stats broadcast so the writer sends it first
        self.send_direct(conn_id, ServerMsg::VehicleUpdate(self.state.clone()));
        self.broadcast_stats();
    }

    fn handle_register(&mut self, conn_id: Uuid, raw_role: &str) {
        let role = match raw_role.parse::<ClientRole>() {
            Ok(role) => role,
            Err(e) => {
                warn!(conn_id = %conn_id, role = raw_role, "Rejected registration: {}", e);
                self.send_direct(conn_id, ServerMsg::error(e.code(), e.to_string()));
                return;
            }
        };

        let Some(connection) = self.connections.get_mut(&conn_id) else {
            warn!(conn_id = %conn_id, "Registration from unknown connection");
            return;
        };

        match connection.role.replace(role) {
            Some(previous) if previous == role => {
                debug!(conn_id = %conn_id, role = %role, "Duplicate registration ignored");
                return;
            }
            Some(previous) => {
                self.registry.unregister(previous);
            }
            None => {}
        }
        self.registry.register(role);

        info!(
            conn_id = %conn_id,
            role = %role,
            total = self.registry.count(role),
            "Client registered"
        );
        self.broadcast_stats();
    }

    fn handle_control(&mut self, conn_id: Uuid, command: ControlCommand, now: u64) {
        let input = match ControlInput::try_from(&command) {
            Ok(input) => input,
            Err(e) => {
                warn!(conn_id = %conn_id, control = %command.kind, "Rejected control input: {}", e);
                self.send_direct(conn_id, ServerMsg::error(e.code(), e.to_string()));
                return;
            }
        };

        if self.state.apply_control_input(input, now) == ControlOutcome::Ignored {
            debug!(conn_id = %conn_id, control = %command.kind, "Unrecognized control ignored");
        }
        self.broadcast_state();
    }

    fn handle_disconnect(&mut self, conn_id: Uuid) {
        let Some(connection) = self.connections.remove(&conn_id) else {
            return;
        };

        info!(conn_id = %conn_id, role = ?connection.role, "Client disconnected");

        if let Some(role) = connection.role {
            if self.registry.unregister(role) {
                self.broadcast_stats();
            }
        }
    }

    fn broadcast_state(&self) {
        // No receivers is fine: nobody is watching yet
        let _ = self
            .broadcast_tx
            .send(ServerMsg::VehicleUpdate(self.state.clone()));
    }

    fn broadcast_stats(&self) {
        let _ = self
            .broadcast_tx
            .send(ServerMsg::ConnectionStats(self.registry.snapshot()));
    }

    /// Fire-and-forget send to one connection; never blocks the relay
    fn send_direct(&self, conn_id: Uuid, msg: ServerMsg) {
        let Some(connection) = self.connections.get(&conn_id) else {
            return;
        };
        match connection.direct_tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn_id = %conn_id, "Direct channel full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(conn_id = %conn_id, "Direct channel closed");
            }
        }
    }
}
