//! Proximity beacons and scan observations

use crate::geometry::Point;
use crate::ids::{BeaconId, BuildingId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_tx_power() -> f64 {
    -70.0
}

fn default_nominal_accuracy() -> f64 {
    5.0
}

/// Radio identity of a physical beacon. Unique per device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconIdentity {
    /// Proximity UUID
    pub uuid: String,
    /// Major number
    pub major: u16,
    /// Minor number
    pub minor: u16,
}

impl BeaconIdentity {
    /// Create an identity tuple.
    pub fn new(uuid: impl Into<String>, major: u16, minor: u16) -> Self {
        Self {
            uuid: uuid.into(),
            major,
            minor,
        }
    }
}

/// Operational state of a beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeaconStatus {
    /// Participates in triangulation
    #[default]
    Active,
    /// Switched off
    Inactive,
    /// Temporarily out of service
    Maintenance,
}

/// Coarse distance class derived from an RSSI reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityZone {
    /// Under 1 m
    Immediate,
    /// 1 to 3 m
    Near,
    /// Beyond 3 m
    Far,
    /// No usable reading
    Unknown,
}

/// A registered beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    /// Registry identifier
    pub id: BeaconId,
    /// Radio identity
    pub identity: BeaconIdentity,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Installed position
    pub point: Point,
    /// Installed floor
    pub floor: i32,
    /// Installed building
    pub building: BuildingId,
    /// Calibrated RSSI at one meter, in dBm
    #[serde(default = "default_tx_power")]
    pub tx_power: f64,
    /// Expected accuracy in meters
    #[serde(default = "default_nominal_accuracy")]
    pub nominal_accuracy: f64,
    /// Operational state
    #[serde(default)]
    pub status: BeaconStatus,
    /// Last time an observation of this beacon was used
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Beacon {
    /// Estimate distance in meters from an RSSI reading.
    ///
    /// Two-region model on `ratio = rssi / tx_power`: `ratio^10` below one,
    /// `0.89976 * ratio^7.7095 + 0.111` otherwise. An RSSI of exactly zero is
    /// a missing reading and yields `None`.
    pub fn estimate_distance(&self, rssi: f64) -> Option<f64> {
        if rssi == 0.0 || self.tx_power == 0.0 {
            return None;
        }
        let ratio = rssi / self.tx_power;
        if ratio < 1.0 {
            Some(ratio.powi(10))
        } else {
            Some(0.89976 * ratio.powf(7.7095) + 0.111)
        }
    }

    /// Proximity zone for an RSSI reading.
    pub fn proximity_zone(&self, rssi: f64) -> ProximityZone {
        match self.estimate_distance(rssi) {
            None => ProximityZone::Unknown,
            Some(d) if d < 1.0 => ProximityZone::Immediate,
            Some(d) if d < 3.0 => ProximityZone::Near,
            Some(_) => ProximityZone::Far,
        }
    }

    /// Whether the beacon may participate in triangulation.
    pub fn is_active(&self) -> bool {
        self.status == BeaconStatus::Active
    }
}

/// One beacon sighting from a client scan. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconObservation {
    /// Radio identity seen
    pub identity: BeaconIdentity,
    /// Received signal strength in dBm
    pub rssi: f64,
    /// Accuracy claimed by the client SDK, in meters
    pub accuracy: f64,
}
