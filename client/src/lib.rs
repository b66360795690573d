//! # Snake Arena Client Library
//!
//! Client-side networking and prediction for the multiplayer snake arena. The
//! client steers one snake, shows its movement without waiting for the server,
//! and quietly corrects itself whenever an authoritative snapshot arrives.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! Every frame the current controls become a sequenced input. The input is
//! sent to the server and applied locally at once with the same head physics
//! and trail rules the server uses.
//!
//! ### Server Reconciliation
//! A snapshot carries the server's view of our head, score and liveness. The
//! predictor resets to it, then replays the buffered inputs the snapshot
//! cannot include yet, estimated from the measured round-trip time.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The `ClientPredictor`: local snake state, the input replay buffer and the
//! reconciliation step, plus a read-only view for presentation.
//!
//! ### Input Module (`input`)
//! Current controls and sequence numbering of outgoing inputs.
//!
//! ### Network Module (`network`)
//! The WebSocket session: Join, 60 Hz inputs, periodic Ping for RTT, snapshot
//! handling and automatic respawn.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("ws://127.0.0.1:8080", "player", ClientOptions::default()).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Philosophy
//!
//! ### Responsiveness First
//! The client never waits for server confirmation before moving its snake.
//!
//! ### Shared Rules
//! Physics, trail maintenance and the wire format all come from the `shared`
//! crate. Only the idle drag differs, and reconciliation absorbs it.

pub mod game;
pub mod input;
pub mod network;
