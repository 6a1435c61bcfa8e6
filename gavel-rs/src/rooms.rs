//! Replica-local subscriber sets, keyed by auction. Rooms have no durable
//! form: they are created on first join and dropped when the last member
//! leaves. Membership mutation takes the registry guard; broadcasts iterate a
//! snapshot so a slow socket never blocks the writer holding the guard.

use crate::events::ServerEvent;
use crate::types::{AuctionId, ConnectionId, UserId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;

/// Outbound queue bound per connection. A subscriber whose queue backs up
/// past this is evicted and its connection closed as a slow consumer.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Handle to one connection's outbound side, shared between the rooms it has
/// joined and the gateway that owns the socket.
#[derive(Clone)]
pub struct Subscriber {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub username: String,
    outbound: mpsc::Sender<ServerEvent>,
    slow: Arc<AtomicBool>,
    kill: Arc<Notify>,
}

impl Subscriber {
    pub fn new(
        connection_id: ConnectionId,
        user_id: UserId,
        username: String,
        outbound: mpsc::Sender<ServerEvent>,
        slow: Arc<AtomicBool>,
        kill: Arc<Notify>,
    ) -> Self {
        Self { connection_id, user_id, username, outbound, slow, kill }
    }
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<AuctionId, HashMap<ConnectionId, Subscriber>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `subscriber` to the auction's room, creating the room if needed.
    /// Returns false when the connection was already a member.
    pub fn join(&self, auction_id: AuctionId, subscriber: Subscriber) -> bool {
        let mut rooms = self.rooms.write();
        rooms
            .entry(auction_id)
            .or_default()
            .insert(subscriber.connection_id, subscriber)
            .is_none()
    }

    /// Drop membership; the room itself is dropped with its last member.
    /// Returns whether the connection was a member.
    pub fn leave(&self, auction_id: &AuctionId, connection_id: &ConnectionId) -> bool {
        let mut rooms = self.rooms.write();
        let Some(members) = rooms.get_mut(auction_id) else {
            return false;
        };
        let was_member = members.remove(connection_id).is_some();
        if members.is_empty() {
            rooms.remove(auction_id);
        }
        was_member
    }

    /// Remove the connection from every room it belongs to.
    pub fn on_disconnect(&self, connection_id: &ConnectionId) {
        let mut rooms = self.rooms.write();
        rooms.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
    }

    pub fn member_count(&self, auction_id: &AuctionId) -> usize {
        self.rooms
            .read()
            .get(auction_id)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Fire-and-forget delivery to every current member's outbound queue.
    /// Delivery never waits: a member whose queue is full is marked slow,
    /// evicted from all rooms, and its writer is told to close the socket.
    /// Returns the number of queues the event reached.
    pub fn broadcast(&self, auction_id: &AuctionId, event: &ServerEvent) -> usize {
        let members: Vec<Subscriber> = {
            let rooms = self.rooms.read();
            match rooms.get(auction_id) {
                Some(members) => members.values().cloned().collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for member in members {
            match member.outbound.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %member.connection_id,
                        username = %member.username,
                        "outbound queue full; closing slow consumer"
                    );
                    member.slow.store(true, Ordering::Release);
                    member.kill.notify_one();
                    self.on_disconnect(&member.connection_id);
                }
                Err(TrySendError::Closed(_)) => {
                    self.on_disconnect(&member.connection_id);
                }
            }
        }
        delivered
    }
}
