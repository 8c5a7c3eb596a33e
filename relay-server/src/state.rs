use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Identifies one WebSocket connection (a user may hold several)
pub type ConnectionId = u64;

struct Client {
    user_id: String,
    tx: mpsc::UnboundedSender<String>,
}

/// Relay state: live connections and room membership
pub struct RelayState {
    clients: DashMap<ConnectionId, Client>,
    /// room -> connections subscribed to it
    rooms: DashMap<String, HashSet<ConnectionId>>,
    next_id: AtomicU64,
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            rooms: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an authenticated connection
    pub fn add_client(&self, user_id: String, tx: mpsc::UnboundedSender<String>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.insert(id, Client { user_id, tx });
        id
    }

    /// Remove a connection and drop it from every room. Returns the rooms it was in.
    pub fn remove_client(&self, id: ConnectionId) -> Vec<String> {
        self.clients.remove(&id);

        let mut left = Vec::new();
        for mut entry in self.rooms.iter_mut() {
            if entry.value_mut().remove(&id) {
                left.push(entry.key().clone());
            }
        }
        self.rooms.retain(|_, members| !members.is_empty());
        left
    }

    /// Subscribe a connection to a room. Returns false if it was already a member.
    pub fn join(&self, id: ConnectionId, room: &str) -> bool {
        self.rooms.entry(room.to_string()).or_default().insert(id)
    }

    /// Unsubscribe a connection from a room. Returns false if it was not a member.
    pub fn leave(&self, id: ConnectionId, room: &str) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(mut members) => members.remove(&id),
            None => return false,
        };
        self.rooms.remove_if(room, |_, members| members.is_empty());
        removed
    }

    pub fn is_member(&self, id: ConnectionId, room: &str) -> bool {
        self.rooms
            .get(room)
            .map(|members| members.contains(&id))
            .unwrap_or(false)
    }

    /// Deliver a frame to every connection in the room, sender included.
    /// Returns the number of connections it was handed to.
    pub fn broadcast_to_room(&self, room: &str, message: &str) -> usize {
        // Snapshot membership so no room shard lock is held while sending
        let members: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for id in members {
            if self.send_to(id, message) {
                delivered += 1;
            }
        }
        debug!(room, delivered, "Room broadcast");
        delivered
    }

    /// Send a frame to one connection
    pub fn send_to(&self, id: ConnectionId, message: &str) -> bool {
        self.clients
            .get(&id)
            .map(|client| client.tx.send(message.to_string()).is_ok())
            .unwrap_or(false)
    }

    pub fn user_id(&self, id: ConnectionId) -> Option<String> {
        self.clients.get(&id).map(|client| client.user_id.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    pub fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map(|members| members.len()).unwrap_or(0)
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_relay_state() {
        let state = RelayState::new();
        assert_eq!(state.connection_count(), 0);
        assert_eq!(state.room_size("chat1"), 0);
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let state = RelayState::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let a = state.add_client("U1".to_string(), tx1);
        let b = state.add_client("U1".to_string(), tx2);
        assert_ne!(a, b);
        assert_eq!(state.connection_count(), 2);
        assert_eq!(state.user_id(a).as_deref(), Some("U1"));
    }

    #[test]
    fn test_join_and_leave() {
        let state = RelayState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = state.add_client("U1".to_string(), tx);

        assert!(state.join(id, "chat1"));
        assert!(!state.join(id, "chat1"));
        assert!(state.is_member(id, "chat1"));
        assert_eq!(state.room_size("chat1"), 1);

        assert!(state.leave(id, "chat1"));
        assert!(!state.leave(id, "chat1"));
        assert!(!state.is_member(id, "chat1"));
        assert_eq!(state.room_size("chat1"), 0);
    }

    #[test]
    fn test_broadcast_reaches_room_members_including_sender() {
        let state = RelayState::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();

        let buyer = state.add_client("U2".to_string(), tx1);
        let seller = state.add_client("U1".to_string(), tx2);
        let outsider = state.add_client("U3".to_string(), tx3);

        state.join(buyer, "chat1");
        state.join(seller, "chat1");
        state.join(outsider, "chat2");

        assert_eq!(state.broadcast_to_room("chat1", "hello"), 2);

        assert_eq!(rx1.try_recv().unwrap(), "hello");
        assert_eq!(rx2.try_recv().unwrap(), "hello");
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_to_unknown_room() {
        let state = RelayState::new();
        assert_eq!(state.broadcast_to_room("nobody-here", "hello"), 0);
    }

    #[test]
    fn test_remove_client_cleans_up_rooms() {
        let state = RelayState::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let a = state.add_client("U1".to_string(), tx1);
        let b = state.add_client("U2".to_string(), tx2);
        state.join(a, "chat1");
        state.join(a, "chat2");
        state.join(b, "chat2");

        let mut left = state.remove_client(a);
        left.sort();
        assert_eq!(left, vec!["chat1".to_string(), "chat2".to_string()]);
        assert_eq!(state.room_size("chat1"), 0);
        assert_eq!(state.room_size("chat2"), 1);
        assert_eq!(state.connection_count(), 1);
    }

    #[test]
    fn test_send_to_closed_connection() {
        let state = RelayState::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.add_client("U1".to_string(), tx);

        drop(rx);
        assert!(!state.send_to(id, "hello"));
    }
}
