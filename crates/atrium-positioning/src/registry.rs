//! Beacon registry
//!
//! The registry is an immutable snapshot indexed by beacon id and radio
//! identity. Triangulation reads it without locking beyond an `Arc` clone.
//! Administrative upserts and removals rebuild the snapshot and swap it in.
//! Last-seen touches from the hot path go to a side table instead, so a busy
//! scan stream never forces a rebuild.

use atrium_core::{
    AtriumError, AtriumResult, Beacon, BeaconId, BeaconIdentity, BeaconStatus, BuildingId, Point,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum number of results returned by [`BeaconRegistry::nearby`].
pub const NEARBY_BEACONS_LIMIT: usize = 20;

/// Immutable set of registered beacons.
#[derive(Debug, Clone, Default)]
pub struct BeaconRegistry {
    beacons: Vec<Beacon>,
    by_id: HashMap<BeaconId, usize>,
    by_identity: HashMap<BeaconIdentity, usize>,
}

impl BeaconRegistry {
    /// Build a registry. Ids and identity tuples must be unique.
    pub fn build(beacons: Vec<Beacon>) -> AtriumResult<Self> {
        let mut by_id = HashMap::with_capacity(beacons.len());
        let mut by_identity = HashMap::with_capacity(beacons.len());
        for (i, beacon) in beacons.iter().enumerate() {
            if by_id.insert(beacon.id.clone(), i).is_some() {
                return Err(AtriumError::configuration(format!(
                    "duplicate beacon id {}",
                    beacon.id
                )));
            }
            if by_identity.insert(beacon.identity.clone(), i).is_some() {
                return Err(AtriumError::configuration(format!(
                    "beacon {} reuses identity {}/{}/{}",
                    beacon.id, beacon.identity.uuid, beacon.identity.major, beacon.identity.minor
                )));
            }
        }
        Ok(Self {
            beacons,
            by_id,
            by_identity,
        })
    }

    /// Number of registered beacons.
    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }

    /// All beacons in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Beacon> {
        self.beacons.iter()
    }

    /// Beacon by id.
    pub fn get(&self, id: &BeaconId) -> Option<&Beacon> {
        self.by_id.get(id).map(|&i| &self.beacons[i])
    }

    /// Beacon by radio identity, whatever its status.
    pub fn lookup(&self, identity: &BeaconIdentity) -> Option<&Beacon> {
        self.by_identity.get(identity).map(|&i| &self.beacons[i])
    }

    /// Active beacon by radio identity.
    pub fn lookup_active(&self, identity: &BeaconIdentity) -> Option<&Beacon> {
        self.lookup(identity).filter(|b| b.is_active())
    }

    /// Active beacons within `radius_m`, nearest first, at most
    /// [`NEARBY_BEACONS_LIMIT`].
    pub fn nearby(
        &self,
        point: Point,
        radius_m: f64,
        building: Option<&BuildingId>,
    ) -> Vec<(&Beacon, f64)> {
        let mut found: Vec<(&Beacon, f64)> = self
            .beacons
            .iter()
            .filter(|b| b.is_active())
            .filter(|b| building.map_or(true, |id| &b.building == id))
            .map(|b| (b, b.point.distance_to(&point)))
            .filter(|(_, d)| *d <= radius_m)
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1));
        found.truncate(NEARBY_BEACONS_LIMIT);
        found
    }
}

/// Beacon counts by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BeaconStats {
    /// All registered beacons
    pub total: usize,
    /// Active beacons
    pub active: usize,
    /// Inactive beacons
    pub inactive: usize,
    /// Beacons under maintenance
    pub maintenance: usize,
    /// Beacons seen within the last hour
    pub recently_seen: usize,
}

/// Holder of the current registry snapshot plus last-seen times.
#[derive(Debug, Default)]
pub struct BeaconRegistryStore {
    current: RwLock<Arc<BeaconRegistry>>,
    last_seen: Mutex<HashMap<BeaconId, DateTime<Utc>>>,
}

impl BeaconRegistryStore {
    /// Create a store holding `registry`.
    pub fn new(registry: BeaconRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<BeaconRegistry> {
        Arc::clone(&self.current.read())
    }

    /// Atomically replace the whole registry.
    pub fn replace(&self, registry: BeaconRegistry) {
        let beacons = registry.len();
        *self.current.write() = Arc::new(registry);
        tracing::info!(beacons, "Beacon registry snapshot replaced");
    }

    /// Insert or replace one beacon, publishing a new snapshot.
    pub fn upsert(&self, beacon: Beacon) -> AtriumResult<()> {
        let mut current = self.current.write();
        let mut beacons = current.beacons.clone();
        let id = beacon.id.clone();
        match current.by_id.get(&beacon.id) {
            Some(&i) => beacons[i] = beacon,
            None => beacons.push(beacon),
        }
        *current = Arc::new(BeaconRegistry::build(beacons)?);
        tracing::debug!(beacon_id = %id, "Beacon upserted");
        Ok(())
    }

    /// Remove one beacon, publishing a new snapshot.
    pub fn remove(&self, id: &BeaconId) -> AtriumResult<Beacon> {
        let mut current = self.current.write();
        let index = *current
            .by_id
            .get(id)
            .ok_or_else(|| AtriumError::invalid_input(format!("unknown beacon {id}")))?;
        let mut beacons = current.beacons.clone();
        let removed = beacons.remove(index);
        *current = Arc::new(BeaconRegistry::build(beacons)?);
        self.last_seen.lock().remove(id);
        tracing::debug!(beacon_id = %id, "Beacon removed");
        Ok(removed)
    }

    /// Record that beacons were used at `at`.
    pub fn touch<'a>(&self, ids: impl IntoIterator<Item = &'a BeaconId>, at: DateTime<Utc>) {
        let mut last_seen = self.last_seen.lock();
        for id in ids {
            last_seen.insert(id.clone(), at);
        }
    }

    /// Last time a beacon was used, falling back to the registered value.
    pub fn last_seen(&self, id: &BeaconId) -> Option<DateTime<Utc>> {
        if let Some(at) = self.last_seen.lock().get(id) {
            return Some(*at);
        }
        self.snapshot().get(id).and_then(|b| b.last_seen_at)
    }

    /// A beacon with its current last-seen time filled in.
    pub fn beacon(&self, id: &BeaconId) -> Option<Beacon> {
        let mut beacon = self.snapshot().get(id).cloned()?;
        if let Some(at) = self.last_seen.lock().get(id) {
            beacon.last_seen_at = Some(*at);
        }
        Some(beacon)
    }

    /// Counts by status and of beacons seen in the hour before `now`.
    pub fn stats(&self, now: DateTime<Utc>) -> BeaconStats {
        let registry = self.snapshot();
        let last_seen = self.last_seen.lock();
        let cutoff = now - Duration::hours(1);
        let mut stats = BeaconStats {
            total: registry.len(),
            ..BeaconStats::default()
        };
        for beacon in registry.iter() {
            match beacon.status {
                BeaconStatus::Active => stats.active += 1,
                BeaconStatus::Inactive => stats.inactive += 1,
                BeaconStatus::Maintenance => stats.maintenance += 1,
            }
            let seen = last_seen.get(&beacon.id).copied().or(beacon.last_seen_at);
            if seen.map_or(false, |at| at > cutoff) {
                stats.recently_seen += 1;
            }
        }
        stats
    }
}
