//! Unified error type
//!
//! All layers report failures as `AtriumError`. Every variant is recoverable
//! at the request boundary; the gateway turns them into typed error
//! acknowledgements using the stable `ErrorCode`.

use crate::ids::{NodeId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the workspace.
pub type AtriumResult<T> = Result<T, AtriumError>;

/// Stable, machine-readable error codes sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No active waypoint near the requested coordinates
    NoNodeNearby,
    /// Graph search exhausted without reaching the goal
    NoRouteFound,
    /// Fewer matched beacon observations than required
    InsufficientBeacons,
    /// Missing or invalid realtime credential
    InvalidAuth,
    /// Operation named a user the tracker does not know
    UnknownUser,
    /// Operation requires an active tracking session
    NotTracking,
    /// Tracking was already started for the user
    AlreadyTracking,
    /// Malformed request input
    InvalidInput,
    /// Invalid configuration
    Configuration,
    /// An external collaborator failed
    Collaborator,
    /// Wire protocol violation
    Protocol,
}

/// Errors from positioning, routing, tracking and gateway operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AtriumError {
    /// No active node within the search radius of the requested point.
    #[error("no navigation node within {radius_m} m of ({x:.2}, {y:.2})")]
    NoNodeNearby {
        /// Query easting
        x: f64,
        /// Query northing
        y: f64,
        /// Search radius in meters
        radius_m: f64,
    },

    /// The search exhausted the reachable graph without reaching the goal.
    #[error("no route found from {from} to {to}")]
    NoRouteFound {
        /// Start node
        from: NodeId,
        /// Goal node
        to: NodeId,
    },

    /// Fewer beacon observations matched the registry than required.
    #[error("insufficient beacons: {matched} matched, {required} required")]
    InsufficientBeacons {
        /// Observations matched against active registry beacons
        matched: usize,
        /// Minimum required
        required: usize,
    },

    /// Realtime credential missing or rejected.
    #[error("invalid authentication: {0}")]
    InvalidAuth(String),

    /// The user has no session state at all.
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    /// The user exists but is not currently tracked.
    #[error("user {0} is not being tracked")]
    NotTracking(UserId),

    /// Tracking was started twice for the same user.
    #[error("user {0} is already being tracked")]
    AlreadyTracking(UserId),

    /// Request input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An external collaborator (store, sink, resolver) failed.
    #[error("collaborator failure: {0}")]
    Collaborator(String),

    /// The realtime wire protocol was violated.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl AtriumError {
    /// Create a no-node-nearby error.
    pub fn no_node_nearby(x: f64, y: f64, radius_m: f64) -> Self {
        Self::NoNodeNearby { x, y, radius_m }
    }

    /// Create a no-route error.
    pub fn no_route(from: NodeId, to: NodeId) -> Self {
        Self::NoRouteFound { from, to }
    }

    /// Create an insufficient-beacons error.
    pub fn insufficient_beacons(matched: usize, required: usize) -> Self {
        Self::InsufficientBeacons { matched, required }
    }

    /// Create an authentication error.
    pub fn invalid_auth(reason: impl Into<String>) -> Self {
        Self::InvalidAuth(reason.into())
    }

    /// Create an input validation error.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    /// Create a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Create a collaborator failure.
    pub fn collaborator(reason: impl Into<String>) -> Self {
        Self::Collaborator(reason.into())
    }

    /// Create a protocol error.
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }

    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoNodeNearby { .. } => ErrorCode::NoNodeNearby,
            Self::NoRouteFound { .. } => ErrorCode::NoRouteFound,
            Self::InsufficientBeacons { .. } => ErrorCode::InsufficientBeacons,
            Self::InvalidAuth(_) => ErrorCode::InvalidAuth,
            Self::UnknownUser(_) => ErrorCode::UnknownUser,
            Self::NotTracking(_) => ErrorCode::NotTracking,
            Self::AlreadyTracking(_) => ErrorCode::AlreadyTracking,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::Configuration(_) => ErrorCode::Configuration,
            Self::Collaborator(_) => ErrorCode::Collaborator,
            Self::Protocol(_) => ErrorCode::Protocol,
        }
    }
}

impl From<serde_json::Error> for AtriumError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<toml::de::Error> for AtriumError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
