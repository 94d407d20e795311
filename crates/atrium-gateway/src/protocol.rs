//! Realtime wire protocol
//!
//! JSON text frames, internally tagged by `type`. Every client request may
//! carry a `request_id`; the single reply to it echoes that id. Unsolicited
//! pushes carry no id.

use atrium_core::{
    AtriumError, BeaconObservation, BuildingId, ErrorCode, GeofenceId, LocationSource, Point,
    Route, UserId, UserLocation, UserPreferences,
};
use atrium_routing::RouteEndpoint;
use atrium_tracking::{ManualFix, TrackingEvent};
use serde::{Deserialize, Serialize};

fn default_accuracy() -> f64 {
    5.0
}

fn default_source() -> LocationSource {
    LocationSource::Manual
}

/// Requests sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Client-reported position
    UpdateLocation {
        /// Correlation id
        #[serde(default)]
        request_id: Option<String>,
        /// Position in the building frame
        coordinates: Point,
        /// Floor number
        floor: i32,
        /// Building
        building: BuildingId,
        /// Claimed accuracy in meters
        #[serde(default = "default_accuracy")]
        accuracy: f64,
        /// Fix origin
        #[serde(default = "default_source")]
        source: LocationSource,
    },
    /// Beacon scan to triangulate
    BeaconScan {
        /// Correlation id
        #[serde(default)]
        request_id: Option<String>,
        /// Observations in scan order
        beacons: Vec<BeaconObservation>,
    },
    /// Route computation
    RequestRoute {
        /// Correlation id
        #[serde(default)]
        request_id: Option<String>,
        /// Start
        from: RouteEndpoint,
        /// Destination
        to: RouteEndpoint,
        /// Overrides the stored preferences
        #[serde(default)]
        preferences: Option<UserPreferences>,
    },
    /// Subscribe to an area channel
    JoinArea {
        /// Correlation id
        #[serde(default)]
        request_id: Option<String>,
        /// Building
        building: BuildingId,
        /// Floor, or the whole building when absent
        #[serde(default)]
        floor: Option<i32>,
    },
    /// Unsubscribe from an area channel
    LeaveArea {
        /// Correlation id
        #[serde(default)]
        request_id: Option<String>,
        /// Building
        building: BuildingId,
        /// Floor, or the whole building when absent
        #[serde(default)]
        floor: Option<i32>,
    },
}

impl ClientMessage {
    /// Correlation id of the request.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::UpdateLocation { request_id, .. }
            | Self::BeaconScan { request_id, .. }
            | Self::RequestRoute { request_id, .. }
            | Self::JoinArea { request_id, .. }
            | Self::LeaveArea { request_id, .. } => request_id.as_deref(),
        }
    }

    /// Wire name of the request.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpdateLocation { .. } => "update_location",
            Self::BeaconScan { .. } => "beacon_scan",
            Self::RequestRoute { .. } => "request_route",
            Self::JoinArea { .. } => "join_area",
            Self::LeaveArea { .. } => "leave_area",
        }
    }
}

/// Converts the location fields of an `update_location` request.
pub(crate) fn manual_fix(
    coordinates: Point,
    floor: i32,
    building: BuildingId,
    accuracy: f64,
    source: LocationSource,
) -> ManualFix {
    ManualFix {
        point: coordinates,
        floor,
        building,
        accuracy,
        source,
    }
}

/// Messages sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// An accepted fix for the receiving user
    LocationConfirmed {
        /// Correlation id when replying
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        /// Accepted fix
        location: UserLocation,
        /// Matched beacons when the fix came from a scan
        #[serde(default, skip_serializing_if = "Option::is_none")]
        beacons_used: Option<usize>,
        /// Triangulation confidence when the fix came from a scan
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },
    /// A computed route
    RouteCalculated {
        /// Correlation id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        /// The route
        route: Route,
    },
    /// Area subscription confirmed
    AreaJoined {
        /// Correlation id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        /// Area key
        area: String,
    },
    /// Area subscription removed
    AreaLeft {
        /// Correlation id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        /// Area key
        area: String,
    },
    /// Typed failure of one request
    Error {
        /// Correlation id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        /// Stable error code
        code: ErrorCode,
        /// Human-readable reason
        message: String,
    },
    /// Another user in a joined area moved
    NearbyUserUpdate {
        /// The user who moved
        user_id: UserId,
        /// Their new fix
        location: UserLocation,
        /// Distance to the recipient when both are on the same floor
        #[serde(default, skip_serializing_if = "Option::is_none")]
        distance: Option<f64>,
    },
    /// The receiving user entered a geofence
    GeofenceEnter {
        /// Geofence
        geofence_id: GeofenceId,
        /// Geofence name
        name: String,
        /// Fix that crossed the boundary
        location: UserLocation,
    },
    /// The receiving user left a geofence
    GeofenceExit {
        /// Geofence
        geofence_id: GeofenceId,
        /// Geofence name
        name: String,
        /// Fix that crossed the boundary
        location: UserLocation,
    },
    /// The receiving user has stayed in one place
    ProlongedStay {
        /// Fix the stay was measured around
        location: UserLocation,
        /// Seconds since the oldest qualifying fix
        duration_secs: u64,
        /// Qualifying fixes
        fixes: usize,
    },
}

impl ServerMessage {
    /// Error reply for a failed request.
    pub fn error(request_id: Option<String>, err: &AtriumError) -> Self {
        Self::Error {
            request_id,
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Unsolicited location push.
    pub fn location(location: UserLocation) -> Self {
        Self::LocationConfirmed {
            request_id: None,
            location,
            beacons_used: None,
            confidence: None,
        }
    }

    /// Wire name of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LocationConfirmed { .. } => "location_confirmed",
            Self::RouteCalculated { .. } => "route_calculated",
            Self::AreaJoined { .. } => "area_joined",
            Self::AreaLeft { .. } => "area_left",
            Self::Error { .. } => "error",
            Self::NearbyUserUpdate { .. } => "nearby_user_update",
            Self::GeofenceEnter { .. } => "geofence_enter",
            Self::GeofenceExit { .. } => "geofence_exit",
            Self::ProlongedStay { .. } => "prolonged_stay",
        }
    }
}

impl From<TrackingEvent> for ServerMessage {
    fn from(event: TrackingEvent) -> Self {
        match event {
            TrackingEvent::GeofenceEnter {
                geofence_id,
                name,
                location,
            } => Self::GeofenceEnter {
                geofence_id,
                name,
                location,
            },
            TrackingEvent::GeofenceExit {
                geofence_id,
                name,
                location,
            } => Self::GeofenceExit {
                geofence_id,
                name,
                location,
            },
            TrackingEvent::ProlongedStay {
                location,
                duration_secs,
                fixes,
            } => Self::ProlongedStay {
                location,
                duration_secs,
                fixes,
            },
        }
    }
}

/// Decode one client frame.
pub fn decode(raw: &str) -> Result<ClientMessage, AtriumError> {
    Ok(serde_json::from_str(raw)?)
}

/// Encode one server frame.
pub fn encode(message: &ServerMessage) -> Result<String, AtriumError> {
    Ok(serde_json::to_string(message)?)
}

/// Best-effort `request_id` from a frame that failed to decode.
pub fn salvage_request_id(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    value.get("request_id")?.as_str().map(str::to_string)
}
