//! Client connection bookkeeping and input gating for the snake server
//!
//! This module tracks, for every open WebSocket connection:
//! - Which snake the connection currently controls
//! - The outbound frame queue drained by the connection's writer task
//! - The last accepted input sequence and when it arrived
//! - A single pending input slot consumed by the next tick
//!
//! Inputs are gated here before they ever reach the simulation: stale
//! sequence numbers and inputs arriving faster than the configured rate are
//! dropped silently, and only the newest accepted input survives until the
//! tick picks it up.

use log::{debug, info, trace};
use shared::sequence_newer;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Returns true when `now` is at least `min_interval` after `last`, or when
/// nothing was accepted yet.
pub fn interval_elapsed(last: Option<Instant>, now: Instant, min_interval: Duration) -> bool {
    match last {
        Some(last) => now.saturating_duration_since(last) >= min_interval,
        None => true,
    }
}

/// An accepted steering input waiting for the next tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingInput {
    pub sequence: u16,
    pub angle: f32,
    pub boost: bool,
}

/// Represents one open connection and the snake it drives
///
/// Each client maintains:
/// - Connection metadata (connection ID, current player ID)
/// - The sender half of its bounded outbound queue
/// - Input ordering state used to reject stale or flooding inputs
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned when the socket was accepted
    pub id: u64,
    /// Snake controlled by this connection; changes on respawn
    pub player_id: u16,
    /// Encoded frames queued for the connection's writer task
    pub sender: mpsc::Sender<Vec<u8>>,
    /// Highest input sequence accepted so far
    pub last_input_seq: Option<u16>,
    /// Arrival time of the last accepted input
    pub last_input_at: Option<Instant>,
    /// Newest accepted input not yet applied by a tick
    pub pending_input: Option<PendingInput>,
}

impl Client {
    /// Creates a new client for the given connection and player
    ///
    /// The client starts with no accepted inputs, so the first input it
    /// sends is accepted whatever its sequence number.
    pub fn new(id: u64, player_id: u16, sender: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            id,
            player_id,
            sender,
            last_input_seq: None,
            last_input_at: None,
            pending_input: None,
        }
    }

    /// Offers an input to this client's pending slot
    ///
    /// Returns true if the input was accepted. An input is rejected if its
    /// sequence is not newer than the last accepted one, or if it arrives
    /// sooner than `min_interval` after the last accepted input.
    pub fn submit_input(
        &mut self,
        input: PendingInput,
        now: Instant,
        min_interval: Duration,
    ) -> bool {
        if !sequence_newer(input.sequence, self.last_input_seq) {
            trace!(
                "Client {} sent stale input {} (last {:?})",
                self.id,
                input.sequence,
                self.last_input_seq
            );
            return false;
        }

        if !interval_elapsed(self.last_input_at, now, min_interval) {
            trace!("Client {} input {} rate limited", self.id, input.sequence);
            return false;
        }

        self.last_input_seq = Some(input.sequence);
        self.last_input_at = Some(now);
        self.pending_input = Some(input);
        true
    }
}

/// Manages all open connections
///
/// The ClientManager is owned by the server main loop. It enforces the
/// connection limit, routes outbound frames without ever blocking the tick,
/// and hands the tick exactly one input per client.
pub struct ClientManager {
    /// Connected clients indexed by their connection ID
    clients: HashMap<u64, Client>,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    /// Minimum spacing between two accepted inputs of one client
    min_input_interval: Duration,
}

impl ClientManager {
    /// Creates a new client manager with the specified limits
    pub fn new(max_clients: usize, min_input_interval: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
            min_input_interval,
        }
    }

    /// Returns true if no further connection can be registered
    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Registers a connection controlling `player_id`
    ///
    /// Returns false if the server is at capacity or the connection ID is
    /// already known; the caller is then responsible for cleaning up.
    pub fn add_client(
        &mut self,
        conn_id: u64,
        player_id: u16,
        sender: mpsc::Sender<Vec<u8>>,
    ) -> bool {
        if self.is_full() || self.clients.contains_key(&conn_id) {
            return false;
        }

        info!("Client {} connected as player {}", conn_id, player_id);
        self.clients
            .insert(conn_id, Client::new(conn_id, player_id, sender));
        true
    }

    /// Removes a connection, returning it if it was present
    ///
    /// Dropping the returned client drops its outbound sender, which ends
    /// the connection's writer task.
    pub fn remove_client(&mut self, conn_id: u64) -> Option<Client> {
        let removed = self.clients.remove(&conn_id);
        if let Some(client) = &removed {
            info!(
                "Client {} disconnected (player {})",
                client.id, client.player_id
            );
        }
        removed
    }

    pub fn get(&self, conn_id: u64) -> Option<&Client> {
        self.clients.get(&conn_id)
    }

    /// Points a connection at a new snake after a respawn
    ///
    /// Input ordering state is kept: the client's sequence counter keeps
    /// running across respawns. Any pending input for the old snake is
    /// discarded.
    pub fn set_player(&mut self, conn_id: u64, player_id: u16) -> bool {
        if let Some(client) = self.clients.get_mut(&conn_id) {
            client.player_id = player_id;
            client.pending_input = None;
            true
        } else {
            false
        }
    }

    /// Offers an input from a connection
    ///
    /// Returns false if the connection is unknown or the input was dropped
    /// as stale or rate limited.
    pub fn submit_input(
        &mut self,
        conn_id: u64,
        sequence: u16,
        angle: f32,
        boost: bool,
        now: Instant,
    ) -> bool {
        let min_interval = self.min_input_interval;
        match self.clients.get_mut(&conn_id) {
            Some(client) => client.submit_input(
                PendingInput {
                    sequence,
                    angle,
                    boost,
                },
                now,
                min_interval,
            ),
            None => false,
        }
    }

    /// Drains every pending input, paired with the player it steers
    ///
    /// Each client contributes at most one input per call, so a tick never
    /// applies more than one input per player.
    pub fn take_pending_inputs(&mut self) -> Vec<(u16, PendingInput)> {
        let mut inputs: Vec<(u16, PendingInput)> = self
            .clients
            .values_mut()
            .filter_map(|client| {
                client
                    .pending_input
                    .take()
                    .map(|input| (client.player_id, input))
            })
            .collect();
        inputs.sort_unstable_by_key(|(player_id, _)| *player_id);
        inputs
    }

    /// Queues an encoded frame for a connection without waiting
    ///
    /// A full queue means the client is not keeping up; the frame is dropped
    /// and the next snapshot supersedes it. Returns true if the frame was
    /// queued.
    pub fn send_to(&self, conn_id: u64, frame: Vec<u8>) -> bool {
        let Some(client) = self.clients.get(&conn_id) else {
            return false;
        };

        match client.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Outbound queue full for client {}, dropping frame", conn_id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Outbound queue closed for client {}", conn_id);
                false
            }
        }
    }

    /// Gets every connection ID with the player it controls
    ///
    /// Used by the tick to build one culled snapshot per connection.
    pub fn connections(&self) -> Vec<(u64, u16)> {
        self.clients
            .values()
            .map(|client| (client.id, client.player_id))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Test suite for connection bookkeeping
///
/// Covers the client lifecycle, input ordering and rate gating, and the
/// non-blocking outbound queue.
#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(16);

    fn manager_with_client(conn_id: u64, player_id: u16) -> (ClientManager, mpsc::Receiver<Vec<u8>>) {
        let mut manager = ClientManager::new(4, INTERVAL);
        let (tx, rx) = mpsc::channel(2);
        assert!(manager.add_client(conn_id, player_id, tx));
        (manager, rx)
    }

    #[test]
    fn test_client_creation() {
        let (tx, _rx) = mpsc::channel(1);
        let client = Client::new(7, 3, tx);

        assert_eq!(client.id, 7);
        assert_eq!(client.player_id, 3);
        assert_eq!(client.last_input_seq, None);
        assert!(client.last_input_at.is_none());
        assert!(client.pending_input.is_none());
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1, INTERVAL);
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);

        assert!(manager.add_client(1, 10, tx1));
        assert!(manager.is_full());
        assert!(!manager.add_client(2, 11, tx2));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_duplicate_connection_id_rejected() {
        let (mut manager, _rx) = manager_with_client(1, 10);
        let (tx, _rx2) = mpsc::channel(1);
        assert!(!manager.add_client(1, 11, tx));
        assert_eq!(manager.get(1).unwrap().player_id, 10);
    }

    #[test]
    fn test_remove_client() {
        let (mut manager, _rx) = manager_with_client(1, 10);

        let removed = manager.remove_client(1).unwrap();
        assert_eq!(removed.player_id, 10);
        assert!(manager.is_empty());
        assert!(manager.remove_client(1).is_none());
    }

    #[test]
    fn test_first_input_is_accepted() {
        let (mut manager, _rx) = manager_with_client(1, 10);
        let now = Instant::now();

        assert!(manager.submit_input(1, 500, 0.5, true, now));
        let client = manager.get(1).unwrap();
        assert_eq!(client.last_input_seq, Some(500));
        assert_eq!(
            client.pending_input,
            Some(PendingInput {
                sequence: 500,
                angle: 0.5,
                boost: true
            })
        );
    }

    #[test]
    fn test_stale_input_is_ignored() {
        let (mut manager, _rx) = manager_with_client(1, 10);
        let start = Instant::now();

        assert!(manager.submit_input(1, 5, 1.0, false, start));
        let later = start + Duration::from_millis(100);
        assert!(!manager.submit_input(1, 5, 2.0, false, later));
        assert!(!manager.submit_input(1, 3, 2.0, false, later));

        let client = manager.get(1).unwrap();
        assert_eq!(client.last_input_seq, Some(5));
        assert_eq!(client.pending_input.unwrap().angle, 1.0);
    }

    #[test]
    fn test_sequence_wraps() {
        let (mut manager, _rx) = manager_with_client(1, 10);
        let start = Instant::now();

        assert!(manager.submit_input(1, u16::MAX, 0.0, false, start));
        assert!(manager.submit_input(1, 0, 0.1, false, start + Duration::from_millis(20)));
        assert!(manager.submit_input(1, 1, 0.2, false, start + Duration::from_millis(40)));
        assert_eq!(manager.get(1).unwrap().last_input_seq, Some(1));
    }

    #[test]
    fn test_inputs_are_rate_limited() {
        let (mut manager, _rx) = manager_with_client(1, 10);
        let start = Instant::now();

        assert!(manager.submit_input(1, 1, 0.0, false, start));
        assert!(!manager.submit_input(1, 2, 0.1, false, start + Duration::from_millis(5)));
        assert!(manager.submit_input(1, 3, 0.2, false, start + Duration::from_millis(16)));
        assert_eq!(manager.get(1).unwrap().last_input_seq, Some(3));
    }

    #[test]
    fn test_pending_slot_keeps_newest() {
        let (mut manager, _rx) = manager_with_client(1, 10);
        let start = Instant::now();

        manager.submit_input(1, 1, 0.0, false, start);
        manager.submit_input(1, 2, 0.7, true, start + Duration::from_millis(20));

        let inputs = manager.take_pending_inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].0, 10);
        assert_eq!(inputs[0].1.sequence, 2);
        assert!(manager.take_pending_inputs().is_empty());
    }

    #[test]
    fn test_interval_elapsed() {
        let start = Instant::now();
        assert!(interval_elapsed(None, start, INTERVAL));
        assert!(!interval_elapsed(Some(start), start + Duration::from_millis(15), INTERVAL));
        assert!(interval_elapsed(Some(start), start + INTERVAL, INTERVAL));
        // A clock that appears to run backwards never admits early
        assert!(!interval_elapsed(Some(start + INTERVAL), start, INTERVAL));
    }

    #[test]
    fn test_input_for_unknown_connection() {
        let mut manager = ClientManager::new(4, INTERVAL);
        assert!(!manager.submit_input(99, 1, 0.0, false, Instant::now()));
    }

    #[test]
    fn test_set_player_discards_pending_input() {
        let (mut manager, _rx) = manager_with_client(1, 10);
        manager.submit_input(1, 1, 0.0, false, Instant::now());

        assert!(manager.set_player(1, 11));
        assert!(manager.take_pending_inputs().is_empty());
        assert_eq!(manager.connections(), vec![(1, 11)]);
        assert!(!manager.set_player(2, 12));
    }

    #[test]
    fn test_send_to_drops_when_full() {
        let (manager, mut rx) = manager_with_client(1, 10);

        assert!(manager.send_to(1, vec![1]));
        assert!(manager.send_to(1, vec![2]));
        assert!(!manager.send_to(1, vec![3]));

        assert_eq!(rx.try_recv().unwrap(), vec![1]);
        assert_eq!(rx.try_recv().unwrap(), vec![2]);
        assert!(rx.try_recv().is_err());
        assert!(!manager.send_to(42, vec![4]));
    }

    #[test]
    fn test_send_to_closed_queue() {
        let (manager, rx) = manager_with_client(1, 10);
        drop(rx);
        assert!(!manager.send_to(1, vec![1]));
    }
}
