//! Server network layer: WebSocket connections and the fixed-rate tick loop

use crate::client_manager::{interval_elapsed, ClientManager};
use crate::game::GameState;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use shared::protocol::{ClientMessage, ServerMessage};
use shared::SimConfig;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

/// Capacity of each connection's outbound frame queue.
pub const OUTBOUND_QUEUE: usize = 64;
/// Capacity of the queue carrying decoded client messages to the main loop.
pub const INBOUND_QUEUE: usize = 1024;
/// Name a snake carries until its connection sends Join.
pub const DEFAULT_PLAYER_NAME: &str = "Player";
/// Longest simulated step, in seconds, whatever the wall clock says.
pub const MAX_TICK_DT: f32 = 0.05;
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        conn_id: u64,
        addr: SocketAddr,
        sender: mpsc::Sender<Vec<u8>>,
    },
    Message {
        conn_id: u64,
        message: ClientMessage,
        received_at: Instant,
    },
    Disconnected {
        conn_id: u64,
    },
}

/// Rolling tick timing, logged once per second
#[derive(Debug)]
struct TickStats {
    ticks: u32,
    busy: Duration,
    window_start: Instant,
}

impl TickStats {
    fn new(now: Instant) -> Self {
        Self {
            ticks: 0,
            busy: Duration::ZERO,
            window_start: now,
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.ticks += 1;
        self.busy += elapsed;
    }

    fn average_ms(&self) -> f64 {
        self.busy.as_secs_f64() * 1000.0 / f64::from(self.ticks.max(1))
    }

    fn reset(&mut self, now: Instant) {
        *self = Self::new(now);
    }
}

/// Main server coordinating connections and the simulation
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: ClientManager,
    game_state: GameState,
    tick_duration: Duration,

    // Connection lifecycle; never dropped
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    // Client messages; dropped when full
    message_tx: mpsc::Sender<ServerEvent>,
    message_rx: mpsc::Receiver<ServerEvent>,
}

/// Outcome of offering a decoded message to the main loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Forward {
    Sent,
    Dropped,
    Closed,
}

/// Per-connection filter in front of the shared inbound queue
///
/// Inputs arriving sooner than the minimum interval after the last forwarded
/// one never leave the connection task. Everything else is offered to the
/// bounded inbound queue and dropped if the main loop has fallen behind.
struct InboundGate {
    conn_id: u64,
    min_input_interval: Duration,
    last_input_at: Option<Instant>,
    messages: mpsc::Sender<ServerEvent>,
}

impl InboundGate {
    fn new(conn_id: u64, min_input_interval: Duration, messages: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            conn_id,
            min_input_interval,
            last_input_at: None,
            messages,
        }
    }

    fn forward(&mut self, message: ClientMessage, now: Instant) -> Forward {
        if let ClientMessage::Input { sequence, .. } = &message {
            if !interval_elapsed(self.last_input_at, now, self.min_input_interval) {
                trace!("Connection {} input {} throttled", self.conn_id, sequence);
                return Forward::Dropped;
            }
        }

        let is_input = matches!(message, ClientMessage::Input { .. });
        let event = ServerEvent::Message {
            conn_id: self.conn_id,
            message,
            received_at: now,
        };
        match self.messages.try_send(event) {
            Ok(()) => {
                if is_input {
                    self.last_input_at = Some(now);
                }
                Forward::Sent
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!("Inbound queue full, dropping message from {}", self.conn_id);
                Forward::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Forward::Closed,
        }
    }
}

impl Server {
    pub async fn bind(
        addr: &str,
        config: SimConfig,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on ws://{}", local_addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::channel(INBOUND_QUEUE);
        let clients = ClientManager::new(max_clients, config.min_input_interval());
        let tick_duration = config.tick_duration();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients,
            game_state: GameState::new(config),
            tick_duration,
            event_tx,
            event_rx,
            message_tx,
            message_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the task accepting new TCP connections
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let event_tx = self.event_tx.clone();
        let message_tx = self.message_tx.clone();
        let min_input_interval = self.game_state.config().min_input_interval();

        tokio::spawn(async move {
            let mut next_conn_id: u64 = 1;
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let conn_id = next_conn_id;
                        next_conn_id += 1;
                        let gate = InboundGate::new(conn_id, min_input_interval, message_tx.clone());
                        tokio::spawn(handle_connection(stream, addr, conn_id, event_tx.clone(), gate));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn send_message(&self, conn_id: u64, message: &ServerMessage) {
        self.clients.send_to(conn_id, message.encode());
    }

    fn send_welcome(&self, conn_id: u64, player_id: u16) {
        let welcome = ServerMessage::Welcome {
            player_id,
            world_size: self.game_state.config().world_size,
        };
        self.send_message(conn_id, &welcome);
    }

    /// Applies one event from a connection task
    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected {
                conn_id,
                addr,
                sender,
            } => {
                info!("Connection {} opened from {}", conn_id, addr);
                if self.clients.is_full() {
                    warn!("Server full, refusing connection {}", conn_id);
                    return;
                }

                let Some(player_id) = self.game_state.spawn_player(DEFAULT_PLAYER_NAME) else {
                    warn!("No free player id for connection {}", conn_id);
                    return;
                };

                if self.clients.add_client(conn_id, player_id, sender) {
                    self.send_welcome(conn_id, player_id);
                } else {
                    self.game_state.remove_player(player_id);
                }
            }

            ServerEvent::Message {
                conn_id,
                message,
                received_at,
            } => {
                self.handle_message(conn_id, message, received_at);
            }

            ServerEvent::Disconnected { conn_id } => {
                if let Some(client) = self.clients.remove_client(conn_id) {
                    self.game_state.remove_player(client.player_id);
                }
            }
        }
    }

    fn handle_message(&mut self, conn_id: u64, message: ClientMessage, received_at: Instant) {
        let Some(player_id) = self.clients.get(conn_id).map(|c| c.player_id) else {
            trace!("Message from unregistered connection {}", conn_id);
            return;
        };

        match message {
            ClientMessage::Join { name } => {
                self.game_state.rename(player_id, &name);
            }

            ClientMessage::Input {
                sequence,
                angle,
                boost,
            } => {
                self.clients
                    .submit_input(conn_id, sequence, angle, boost, received_at);
            }

            ClientMessage::Respawn => match self.game_state.respawn(player_id) {
                Some(new_id) => {
                    self.clients.set_player(conn_id, new_id);
                    self.send_welcome(conn_id, new_id);
                }
                None => trace!("Ignoring respawn from live player {}", player_id),
            },

            ClientMessage::Ping { client_time } => {
                self.send_message(conn_id, &ServerMessage::Pong { client_time });
            }
        }
    }

    /// Runs one tick: inputs, simulation, then one snapshot per connection
    pub fn tick(&mut self, dt: f32) {
        for (player_id, input) in self.clients.take_pending_inputs() {
            self.game_state.set_input(player_id, input.angle, input.boost);
        }

        self.game_state.step(dt.clamp(0.0, MAX_TICK_DT));
        self.broadcast_snapshots();
    }

    fn broadcast_snapshots(&self) {
        for (conn_id, player_id) in self.clients.connections() {
            if let Some(snapshot) = self.game_state.snapshot_for(player_id) {
                self.clients
                    .send_to(conn_id, ServerMessage::State(snapshot).encode());
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();
        let mut stats = TickStats::new(last_tick);

        info!(
            "Server started at {} Hz",
            self.game_state.config().tick_rate
        );

        loop {
            tokio::select! {
                // Lifecycle first, so a connection is registered before its messages
                biased;

                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                Some(event) = self.message_rx.recv() => self.handle_event(event),

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;
                    if dt > MAX_TICK_DT {
                        debug!("Large tick delta {:.3}s, capping to {:.3}s", dt, MAX_TICK_DT);
                    }

                    self.tick(dt);
                    stats.record(now.elapsed());

                    if stats.window_start.elapsed() >= STATS_INTERVAL {
                        info!(
                            "[tick] {} ticks, avg {:.2} ms, players={}, food={}",
                            stats.ticks,
                            stats.average_ms(),
                            self.game_state.player_count(),
                            self.game_state.food_count()
                        );
                        stats.reset(Instant::now());
                    }
                },
            }
        }

        Ok(())
    }
}

/// Drives one WebSocket connection until either side closes it
///
/// Decoded client messages pass through the connection's `InboundGate`;
/// Ping is answered here directly. Outbound frames are written as they are
/// queued by the tick.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: u64,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    mut gate: InboundGate,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let (sender, mut outbound) = mpsc::channel::<Vec<u8>>(OUTBOUND_QUEUE);
    if event_tx
        .send(ServerEvent::Connected {
            conn_id,
            addr,
            sender,
        })
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(bytes) => {
                        if let Err(e) = write.send(Message::Binary(bytes)).await {
                            debug!("Write to connection {} failed: {}", conn_id, e);
                            break;
                        }
                    }
                    // The main loop dropped this connection
                    None => break,
                }
            },

            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Binary(data))) => match ClientMessage::decode(&data) {
                        Ok(ClientMessage::Ping { client_time }) => {
                            let pong = ServerMessage::Pong { client_time }.encode();
                            if let Err(e) = write.send(Message::Binary(pong)).await {
                                debug!("Write to connection {} failed: {}", conn_id, e);
                                break;
                            }
                        }
                        Ok(message) => {
                            if gate.forward(message, Instant::now()) == Forward::Closed {
                                break;
                            }
                        }
                        Err(e) => warn!("Malformed message from {}: {}", addr, e),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error on connection {}: {}", conn_id, e);
                        break;
                    }
                }
            },
        }
    }

    let _ = write.close().await;
    let _ = event_tx.send(ServerEvent::Disconnected { conn_id });
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::StateSnapshot;

    fn test_config() -> SimConfig {
        SimConfig {
            food_target: 10,
            ..SimConfig::default()
        }
    }

    async fn test_server() -> Server {
        Server::bind("127.0.0.1:0", test_config(), 4).await.unwrap()
    }

    fn connect(server: &mut Server, conn_id: u64) -> mpsc::Receiver<Vec<u8>> {
        let (sender, rx) = mpsc::channel(OUTBOUND_QUEUE);
        server.handle_event(ServerEvent::Connected {
            conn_id,
            addr: "127.0.0.1:9000".parse().unwrap(),
            sender,
        });
        rx
    }

    fn recv(rx: &mut mpsc::Receiver<Vec<u8>>) -> ServerMessage {
        ServerMessage::decode(&rx.try_recv().unwrap()).unwrap()
    }

    fn welcome_id(message: ServerMessage) -> u16 {
        match message {
            ServerMessage::Welcome {
                player_id,
                world_size,
            } => {
                assert_eq!(world_size, 3000);
                player_id
            }
            other => panic!("Expected Welcome, got {:?}", other),
        }
    }

    fn state(message: ServerMessage) -> StateSnapshot {
        match message {
            ServerMessage::State(snapshot) => snapshot,
            other => panic!("Expected State, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = test_server().await;
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = SimConfig {
            tick_rate: 0,
            ..SimConfig::default()
        };
        assert!(Server::bind("127.0.0.1:0", config, 4).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_sends_welcome_then_state() {
        let mut server = test_server().await;
        let mut rx = connect(&mut server, 1);

        let player_id = welcome_id(recv(&mut rx));
        assert_eq!(server.game_state.player_count(), 1);

        server.tick(1.0 / 30.0);
        let snapshot = state(recv(&mut rx));
        assert_eq!(snapshot.tick, 1);
        assert!(snapshot.player(player_id).unwrap().alive);
    }

    #[tokio::test]
    async fn test_join_renames_player() {
        let mut server = test_server().await;
        let mut rx = connect(&mut server, 1);
        let player_id = welcome_id(recv(&mut rx));

        server.handle_event(ServerEvent::Message {
            conn_id: 1,
            received_at: Instant::now(),
            message: ClientMessage::Join {
                name: "an excessively long name".into(),
            },
        });
        assert_eq!(
            server.game_state.player(player_id).unwrap().name,
            "an excessively l"
        );
    }

    #[tokio::test]
    async fn test_input_applies_on_next_tick() {
        let mut server = test_server().await;
        let mut rx = connect(&mut server, 1);
        let player_id = welcome_id(recv(&mut rx));

        server.handle_event(ServerEvent::Message {
            conn_id: 1,
            received_at: Instant::now(),
            message: ClientMessage::Input {
                sequence: 1,
                angle: 1.25,
                boost: true,
            },
        });
        server.tick(1.0 / 30.0);

        let snake = server.game_state.player(player_id).unwrap();
        assert_eq!(snake.target_heading, 1.25);
        assert!(snake.boost);
    }

    #[tokio::test]
    async fn test_respawn_only_when_dead() {
        let mut server = test_server().await;
        let mut rx = connect(&mut server, 1);
        let player_id = welcome_id(recv(&mut rx));

        server.handle_event(ServerEvent::Message {
            conn_id: 1,
            received_at: Instant::now(),
            message: ClientMessage::Respawn,
        });
        assert!(rx.try_recv().is_err());

        if let Some(snake) = server.game_state.player(player_id).cloned() {
            // Kill the snake by parking another head on it
            let other = server.game_state.spawn_player("killer").unwrap();
            server.game_state.place_player(other, snake.head(), 0.0);
        }
        server.tick(0.0);
        let _ = state(recv(&mut rx));
        assert!(!server.game_state.player(player_id).unwrap().alive);

        server.handle_event(ServerEvent::Message {
            conn_id: 1,
            received_at: Instant::now(),
            message: ClientMessage::Respawn,
        });
        let new_id = welcome_id(recv(&mut rx));
        assert_ne!(new_id, player_id);
        assert_eq!(server.clients.get(1).unwrap().player_id, new_id);
        assert!(server.game_state.player(player_id).is_none());
    }

    #[tokio::test]
    async fn test_disconnect_removes_player() {
        let mut server = test_server().await;
        let mut rx = connect(&mut server, 1);
        let player_id = welcome_id(recv(&mut rx));

        server.handle_event(ServerEvent::Disconnected { conn_id: 1 });
        assert!(server.clients.is_empty());
        assert!(server.game_state.player(player_id).is_none());
    }

    #[tokio::test]
    async fn test_full_server_refuses_connection() {
        let mut server = Server::bind("127.0.0.1:0", test_config(), 1).await.unwrap();
        let mut first = connect(&mut server, 1);
        let _ = welcome_id(recv(&mut first));

        let mut second = connect(&mut server, 2);
        assert!(second.try_recv().is_err());
        assert_eq!(server.game_state.player_count(), 1);
    }

    #[tokio::test]
    async fn test_ping_through_main_loop_gets_pong() {
        let mut server = test_server().await;
        let mut rx = connect(&mut server, 1);
        let _ = welcome_id(recv(&mut rx));

        server.handle_event(ServerEvent::Message {
            conn_id: 1,
            received_at: Instant::now(),
            message: ClientMessage::Ping { client_time: 77 },
        });
        assert_eq!(recv(&mut rx), ServerMessage::Pong { client_time: 77 });
    }

    #[test]
    fn test_tick_stats_average() {
        let mut stats = TickStats::new(Instant::now());
        stats.record(Duration::from_millis(2));
        stats.record(Duration::from_millis(4));
        assert_eq!(stats.ticks, 2);
        assert!((stats.average_ms() - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_new_connection_gets_default_name() {
        let mut server = test_server().await;
        let mut rx = connect(&mut server, 1);
        let player_id = welcome_id(recv(&mut rx));
        assert_eq!(
            server.game_state.player(player_id).unwrap().name,
            DEFAULT_PLAYER_NAME
        );
    }

    fn input(sequence: u16) -> ClientMessage {
        ClientMessage::Input {
            sequence,
            angle: 0.0,
            boost: false,
        }
    }

    #[test]
    fn test_inbound_gate_throttles_inputs() {
        let (tx, mut rx) = mpsc::channel(INBOUND_QUEUE);
        let mut gate = InboundGate::new(3, Duration::from_millis(16), tx);
        let start = Instant::now();

        // A burst of inputs within one interval forwards only the first
        for seq in 1..=50 {
            let at = start + Duration::from_micros(seq as u64 * 100);
            let expected = if seq == 1 { Forward::Sent } else { Forward::Dropped };
            assert_eq!(gate.forward(input(seq), at), expected);
        }
        assert_eq!(
            gate.forward(input(51), start + Duration::from_millis(16)),
            Forward::Sent
        );
        // Other messages are never throttled
        assert_eq!(gate.forward(ClientMessage::Respawn, start), Forward::Sent);

        let mut forwarded = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, ServerEvent::Message { conn_id: 3, .. }));
            forwarded += 1;
        }
        assert_eq!(forwarded, 3);
    }

    #[test]
    fn test_inbound_gate_drops_when_queue_full() {
        let (tx, mut rx) = mpsc::channel(2);
        let mut gate = InboundGate::new(1, Duration::from_millis(16), tx);
        let now = Instant::now();

        assert_eq!(gate.forward(ClientMessage::Respawn, now), Forward::Sent);
        assert_eq!(gate.forward(ClientMessage::Respawn, now), Forward::Sent);
        assert_eq!(gate.forward(ClientMessage::Respawn, now), Forward::Dropped);
        // A dropped input does not count against the interval
        assert_eq!(gate.forward(input(1), now), Forward::Dropped);
        assert!(gate.last_input_at.is_none());

        rx.try_recv().unwrap();
        assert_eq!(gate.forward(input(1), now), Forward::Sent);

        drop(rx);
        assert_eq!(gate.forward(ClientMessage::Respawn, now), Forward::Closed);
    }
}
