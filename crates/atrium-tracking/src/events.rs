//! Session events

use crate::geofence::Geofence;
use crate::stay::Stay;
use atrium_core::{GeofenceId, UserId, UserLocation};
use serde::{Deserialize, Serialize};

/// Transition reported to the user whose session produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackingEvent {
    /// The user crossed into a geofence
    GeofenceEnter {
        /// Geofence crossed
        geofence_id: GeofenceId,
        /// Its display name
        name: String,
        /// Fix that triggered the crossing
        location: UserLocation,
    },
    /// The user crossed out of a geofence
    GeofenceExit {
        /// Geofence crossed
        geofence_id: GeofenceId,
        /// Its display name
        name: String,
        /// Fix that triggered the crossing
        location: UserLocation,
    },
    /// The user has stayed in one place
    ProlongedStay {
        /// Fix the stay was measured around
        location: UserLocation,
        /// Seconds since the oldest qualifying fix
        duration_secs: u64,
        /// Qualifying fixes
        fixes: usize,
    },
}

impl TrackingEvent {
    pub(crate) fn enter(geofence: &Geofence, location: &UserLocation) -> Self {
        Self::GeofenceEnter {
            geofence_id: geofence.id.clone(),
            name: geofence.name.clone(),
            location: location.clone(),
        }
    }

    pub(crate) fn exit(geofence: &Geofence, location: &UserLocation) -> Self {
        Self::GeofenceExit {
            geofence_id: geofence.id.clone(),
            name: geofence.name.clone(),
            location: location.clone(),
        }
    }

    pub(crate) fn stay(stay: Stay) -> Self {
        Self::ProlongedStay {
            location: stay.location,
            duration_secs: stay.duration.as_secs(),
            fixes: stay.fixes,
        }
    }

    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GeofenceEnter { .. } => "geofence_enter",
            Self::GeofenceExit { .. } => "geofence_exit",
            Self::ProlongedStay { .. } => "prolonged_stay",
        }
    }
}

/// Receiver of session events.
///
/// Called while the session is locked so per-user order is preserved.
/// Implementations must not block.
pub trait TrackingEventSink: Send + Sync {
    /// Deliver one event for `user`.
    fn emit(&self, user: &UserId, event: TrackingEvent);
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl TrackingEventSink for TracingEventSink {
    fn emit(&self, user: &UserId, event: TrackingEvent) {
        tracing::info!(user_id = %user, event = event.kind(), "Tracking event");
    }
}
