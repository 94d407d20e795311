//! Channel hub
//!
//! Addressing only: one bounded private channel per connected user and one
//! broadcast channel per joined area. No business state lives here.
//!
//! Overflow policy: a full private channel drops the newest push (and logs
//! it); a lagging area subscriber loses the oldest broadcasts, which the
//! receiving connection observes as `Lagged`. Publishers never wait.

use crate::protocol::ServerMessage;
use atrium_core::{BuildingId, UserId, UserLocation};
use atrium_tracking::{TrackingEvent, TrackingEventSink};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};

/// Identifies one connection of a user.
pub type ConnectionId = u64;

/// Area channel key: `<building>` or `<building>_floor_<n>`.
pub fn area_key(building: &BuildingId, floor: Option<i32>) -> String {
    match floor {
        Some(floor) => format!("{building}_floor_{floor}"),
        None => building.to_string(),
    }
}

/// A location published to an area.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaBroadcast {
    /// User who moved
    pub sender: UserId,
    /// Their accepted fix
    pub location: UserLocation,
}

#[derive(Debug)]
struct UserChannel {
    connection: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
}

/// Per-user and per-area channel registry.
#[derive(Debug)]
pub struct ChannelHub {
    users: RwLock<HashMap<UserId, UserChannel>>,
    areas: RwLock<HashMap<String, broadcast::Sender<AreaBroadcast>>>,
    next_connection: AtomicU64,
    user_capacity: usize,
    area_capacity: usize,
}

impl ChannelHub {
    /// Create a hub with the given channel bounds.
    pub fn new(user_capacity: usize, area_capacity: usize) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            areas: RwLock::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
            user_capacity: user_capacity.max(1),
            area_capacity: area_capacity.max(1),
        }
    }

    /// Open the private channel for a new connection of `user`.
    ///
    /// A previous connection of the same user is superseded: its receiver
    /// closes once its sender is dropped here.
    pub fn register(&self, user: &UserId) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.user_capacity);
        let previous = self
            .users
            .write()
            .insert(user.clone(), UserChannel { connection, tx });
        if let Some(previous) = previous {
            tracing::info!(
                user_id = %user,
                superseded = previous.connection,
                connection,
                "Connection superseded"
            );
        }
        (connection, rx)
    }

    /// Close the private channel if `connection` still owns it.
    ///
    /// Returns whether it did, i.e. whether this was the user's live connection.
    pub fn unregister(&self, user: &UserId, connection: ConnectionId) -> bool {
        let mut users = self.users.write();
        match users.get(user) {
            Some(channel) if channel.connection == connection => {
                users.remove(user);
                true
            }
            _ => false,
        }
    }

    /// Whether `user` has a live connection.
    pub fn is_connected(&self, user: &UserId) -> bool {
        self.users.read().contains_key(user)
    }

    /// Number of live connections.
    pub fn connected_users(&self) -> usize {
        self.users.read().len()
    }

    /// Push to one user without waiting. Returns whether it was queued.
    pub fn send_to_user(&self, user: &UserId, message: ServerMessage) -> bool {
        let users = self.users.read();
        let Some(channel) = users.get(user) else {
            return false;
        };
        match channel.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::warn!(user_id = %user, kind = message.kind(), "Private channel full, push dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Subscribe to an area, creating its channel on first use.
    pub fn subscribe(&self, area: &str) -> broadcast::Receiver<AreaBroadcast> {
        if let Some(tx) = self.areas.read().get(area) {
            return tx.subscribe();
        }
        self.areas
            .write()
            .entry(area.to_string())
            .or_insert_with(|| broadcast::channel(self.area_capacity).0)
            .subscribe()
    }

    /// Drop an area channel nobody listens to any more.
    pub fn prune(&self, area: &str) {
        let mut areas = self.areas.write();
        if areas.get(area).map_or(false, |tx| tx.receiver_count() == 0) {
            areas.remove(area);
        }
    }

    /// Publish to an area. Returns the number of subscribers reached.
    pub fn publish(&self, area: &str, broadcast: AreaBroadcast) -> usize {
        self.areas
            .read()
            .get(area)
            .and_then(|tx| tx.send(broadcast).ok())
            .unwrap_or(0)
    }

    /// Publish a fix to the building-wide and floor areas it falls in.
    pub fn publish_location(&self, sender: &UserId, location: &UserLocation) -> usize {
        let broadcast = AreaBroadcast {
            sender: sender.clone(),
            location: location.clone(),
        };
        let building = area_key(&location.building, None);
        let floor = area_key(&location.building, Some(location.floor));
        self.publish(&building, broadcast.clone()) + self.publish(&floor, broadcast)
    }
}

impl TrackingEventSink for ChannelHub {
    fn emit(&self, user: &UserId, event: TrackingEvent) {
        self.send_to_user(user, ServerMessage::from(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::{LocationSource, Point};
    use chrono::Utc;

    fn location(floor: i32) -> UserLocation {
        UserLocation {
            point: Point::new(1.0, 1.0),
            floor,
            building: BuildingId::new("main"),
            accuracy: 1.0,
            source: LocationSource::Manual,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_area_keys() {
        let main = BuildingId::new("main");
        assert_eq!(area_key(&main, None), "main");
        assert_eq!(area_key(&main, Some(2)), "main_floor_2");
        assert_eq!(area_key(&main, Some(-1)), "main_floor_-1");
    }

    #[test]
    fn test_full_private_channel_drops_newest() {
        let hub = ChannelHub::new(2, 4);
        let user = UserId::new("u1");
        let (_, mut rx) = hub.register(&user);
        for floor in 0..3 {
            hub.send_to_user(&user, ServerMessage::location(location(floor)));
        }
        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
        assert_matches::assert_matches!(first, ServerMessage::LocationConfirmed { location, .. } if location.floor == 0);
        assert_matches::assert_matches!(second, ServerMessage::LocationConfirmed { location, .. } if location.floor == 1);
    }

    #[test]
    fn test_superseded_connection_does_not_unregister() {
        let hub = ChannelHub::new(4, 4);
        let user = UserId::new("u1");
        let (old, mut old_rx) = hub.register(&user);
        let (new, _new_rx) = hub.register(&user);
        assert!(old_rx.try_recv().is_err());
        assert!(!hub.unregister(&user, old));
        assert!(hub.is_connected(&user));
        assert!(hub.unregister(&user, new));
        assert!(!hub.is_connected(&user));
    }

    #[test]
    fn test_lagging_subscriber_loses_oldest() {
        let hub = ChannelHub::new(4, 2);
        let mut rx = hub.subscribe("main_floor_1");
        for _ in 0..3 {
            hub.publish_location(&UserId::new("u2"), &location(1));
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_prune_keeps_areas_with_listeners() {
        let hub = ChannelHub::new(4, 4);
        let rx = hub.subscribe("main");
        hub.prune("main");
        assert_eq!(hub.publish_location(&UserId::new("u2"), &location(1)), 1);
        drop(rx);
        hub.prune("main");
        assert_eq!(hub.publish_location(&UserId::new("u2"), &location(1)), 0);
    }
}
