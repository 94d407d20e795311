//! Identifier newtypes
//!
//! Every entity the core touches is addressed by an opaque string identifier
//! issued by the map-ingestion or identity layers. Wrapping them keeps a
//! `NodeId` from being passed where a `BeaconId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

string_id!(
    /// Navigation waypoint identifier.
    NodeId
);
string_id!(
    /// Navigation edge identifier.
    EdgeId
);
string_id!(
    /// Beacon registry identifier (not the radio identity tuple).
    BeaconId
);
string_id!(
    /// Building identifier.
    BuildingId
);
string_id!(
    /// Authenticated user identifier.
    UserId
);
string_id!(
    /// Geofence identifier.
    GeofenceId
);
string_id!(
    /// Route identifier, unique per computed route.
    RouteId
);

impl RouteId {
    /// Mint a fresh route identifier.
    pub fn generate() -> Self {
        Self(format!("route_{}", uuid::Uuid::new_v4().simple()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_display_and_serde_transparent() {
        let id = NodeId::new("node-1");
        assert_eq!(id.to_string(), "node-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"node-1\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_route_ids_are_unique() {
        let a = RouteId::generate();
        let b = RouteId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("route_"));
    }
}
