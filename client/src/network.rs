use crate::game::ClientPredictor;
use crate::input::InputManager;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::protocol::{ClientMessage, ServerMessage, StateSnapshot};
use shared::MotionParams;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);
const PING_INTERVAL: Duration = Duration::from_secs(2);

/// Behaviour switches for a client session
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Ask for a new snake as soon as the current one dies
    pub auto_respawn: bool,
    /// Constant steering rate in rad/s
    pub steer_rate: f32,
    pub boost: bool,
    /// Simulated one-way latency is half of this, applied on send and receive
    pub fake_ping_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auto_respawn: true,
            steer_rate: 0.0,
            boost: false,
            fake_ping_ms: 0,
        }
    }
}

pub struct Client {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,

    predictor: ClientPredictor,
    input_manager: InputManager,
    options: ClientOptions,

    started: Instant,
    world_size: Option<u16>,
    rtt_ms: Option<u32>,
    respawn_requested: bool,
    last_snapshot: Option<StateSnapshot>,
    snapshots_received: u64,
}

impl Client {
    /// Opens the WebSocket and announces `name` to the server.
    pub async fn connect(
        url: &str,
        name: &str,
        options: ClientOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to {}...", url);
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();

        let mut input_manager = InputManager::with_steer_rate(options.steer_rate);
        input_manager.set_controls(0.0, options.boost);

        let mut client = Client {
            write,
            read,
            predictor: ClientPredictor::new(MotionParams::client()),
            input_manager,
            options,
            started: Instant::now(),
            world_size: None,
            rtt_ms: None,
            respawn_requested: false,
            last_snapshot: None,
            snapshots_received: 0,
        };

        client
            .send(&ClientMessage::Join {
                name: name.to_string(),
            })
            .await?;
        Ok(client)
    }

    /// Milliseconds since this client started, the clock used for inputs.
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), Box<dyn std::error::Error>> {
        if self.options.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.options.fake_ping_ms / 2)).await;
        }
        self.write.send(Message::Binary(message.encode())).await?;
        Ok(())
    }

    async fn handle_message(
        &mut self,
        message: ServerMessage,
        receive_time: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match message {
            ServerMessage::Welcome {
                player_id,
                world_size,
            } => {
                info!("Welcome! Player ID: {} (world {})", player_id, world_size);
                self.world_size = Some(world_size);
                self.predictor.reset(player_id, world_size);
                self.respawn_requested = false;
            }

            ServerMessage::State(snapshot) => {
                self.snapshots_received += 1;
                let rtt = u64::from(self.rtt_ms.unwrap_or(0));
                let reference_time = receive_time.saturating_sub(rtt);
                let was_alive = self.predictor.alive();
                self.predictor
                    .reconcile(&snapshot, reference_time, receive_time);

                if was_alive && !self.predictor.alive() {
                    info!("Died with score {}", self.predictor.score());
                }
                if !self.predictor.alive()
                    && self.predictor.player_id().is_some()
                    && self.options.auto_respawn
                    && !self.respawn_requested
                {
                    self.respawn_requested = true;
                    self.send(&ClientMessage::Respawn).await?;
                }
                self.last_snapshot = Some(snapshot);
            }

            ServerMessage::Pong { client_time } => {
                let now = self.now_ms() as u32;
                let rtt = now.wrapping_sub(client_time);
                debug!("RTT {} ms", rtt);
                self.rtt_ms = Some(rtt);
            }
        }
        Ok(())
    }

    /// Samples controls, sends them and predicts locally.
    async fn frame(&mut self, dt: f32) -> Result<(), Box<dyn std::error::Error>> {
        if self.predictor.player_id().is_none() {
            return Ok(());
        }

        self.input_manager.steer(dt);
        let command = self.input_manager.next_command(self.now_ms());
        self.send(&ClientMessage::Input {
            sequence: command.sequence,
            angle: command.angle,
            boost: command.boost,
        })
        .await?;
        self.predictor.update(command, dt);
        Ok(())
    }

    /// Runs until the server closes the connection.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(None).await
    }

    /// Runs for at most `duration`, then returns.
    pub async fn run_for(&mut self, duration: Duration) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(Some(tokio::time::Instant::now() + duration))
            .await
    }

    async fn run_until(
        &mut self,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut frame_interval = interval(FRAME_INTERVAL);
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ping_interval = interval(PING_INTERVAL);
        let mut last_frame = Instant::now();

        let stop = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(stop);

        loop {
            tokio::select! {
                incoming = self.read.next() => {
                    let receive_time = self.now_ms();
                    match incoming {
                        Some(Ok(Message::Binary(data))) => {
                            if self.options.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.options.fake_ping_ms / 2)).await;
                            }
                            match ServerMessage::decode(&data) {
                                Ok(message) => self.handle_message(message, receive_time).await?,
                                Err(e) => warn!("Failed to decode server message: {}", e),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Server closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("WebSocket error: {}", e);
                            return Err(e.into());
                        }
                    }
                },

                _ = frame_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_frame).as_secs_f32();
                    last_frame = now;
                    self.frame(dt).await?;
                },

                _ = ping_interval.tick() => {
                    let client_time = self.now_ms() as u32;
                    self.send(&ClientMessage::Ping { client_time }).await?;
                },

                _ = &mut stop => break,
            }
        }

        Ok(())
    }

    /// Closes the connection politely.
    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.close().await?;
        Ok(())
    }

    pub fn predictor(&self) -> &ClientPredictor {
        &self.predictor
    }

    pub fn world_size(&self) -> Option<u16> {
        self.world_size
    }

    pub fn rtt_ms(&self) -> Option<u32> {
        self.rtt_ms
    }

    pub fn last_snapshot(&self) -> Option<&StateSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn snapshots_received(&self) -> u64 {
        self.snapshots_received
    }
}
