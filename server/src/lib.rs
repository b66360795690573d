//! # Snake Arena Server Library
//!
//! The authoritative server for the multiplayer snake arena. It owns the one
//! true world, gates client inputs, advances the simulation at a fixed tick
//! rate and sends every client a view of the world culled to what is near its
//! own snake.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Movement, body maintenance, food pickup, collisions and food repletion all
//! run here. Clients predict their own snake but always conform to the state
//! the server sends.
//!
//! ### Client Management
//! Handles the lifecycle of WebSocket connections:
//! - Player assignment on connect and a fresh identity on respawn
//! - Input ordering by sequence number and input rate limiting
//! - Cleanup of the snake when its connection closes
//!
//! ### State Broadcasting
//! After every tick each connection receives its own snapshot, containing
//! only the snakes and food within the interest radius of its head.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! The main loop is the only code that touches the world. Connection tasks
//! decode frames and forward them over a channel, so a tick is never
//! interleaved with message handling.
//!
//! ### Non-Blocking Output
//! Each connection has a bounded outbound queue. The tick enqueues without
//! waiting; a client that falls behind loses snapshots instead of stalling
//! everyone else.
//!
//! ## Module Organization
//!
//! - `client_manager`: per-connection state, input gating, outbound queues
//! - `game`: the world and the tick pipeline
//! - `interest`: per-observer snapshot culling
//! - `network`: WebSocket accept loop, connection tasks, tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::SimConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind("127.0.0.1:8080", SimConfig::default(), 64).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod interest;
pub mod network;
