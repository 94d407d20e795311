//! Session lifecycle, transitions and queries

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use atrium_core::{
    AtriumError, BuildingFootprint, BuildingFootprints, BuildingId, LocationSource, Point,
    Polygon, UserId,
};
use atrium_positioning::{LocationFilter, TriangulationResult};
use atrium_testkit::{ManualClock, RecordingAnalyticsSink, RecordingArchiveSink};
use atrium_tracking::{
    Geofence, ManualFix, SessionTracker, TrackerEffects, TrackingConfig, TrackingEvent,
    TrackingEventSink,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct RecordingEventSink {
    events: Mutex<Vec<(UserId, TrackingEvent)>>,
}

impl RecordingEventSink {
    fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(_, e)| e.kind() == kind)
            .count()
    }
}

impl TrackingEventSink for RecordingEventSink {
    fn emit(&self, user: &UserId, event: TrackingEvent) {
        self.events.lock().push((user.clone(), event));
    }
}

struct Harness {
    tracker: SessionTracker,
    clock: ManualClock,
    archive: Arc<RecordingArchiveSink>,
    analytics: Arc<RecordingAnalyticsSink>,
    events: Arc<RecordingEventSink>,
}

fn harness(config: TrackingConfig) -> Harness {
    let clock = ManualClock::default();
    let archive = Arc::new(RecordingArchiveSink::new());
    let analytics = Arc::new(RecordingAnalyticsSink::new());
    let events = Arc::new(RecordingEventSink::default());
    let annex = BuildingFootprint {
        building: BuildingId::new("annex"),
        outline: Polygon::new(vec![
            Point::new(200.0, 0.0),
            Point::new(300.0, 0.0),
            Point::new(300.0, 100.0),
            Point::new(200.0, 100.0),
        ]),
        ground_floor: 0,
    };
    let tracker = SessionTracker::new(
        config,
        LocationFilter::default(),
        Arc::new(clock.clone()),
        TrackerEffects {
            spatial: Arc::new(BuildingFootprints::new(vec![annex])),
            archive: archive.clone(),
            analytics: analytics.clone(),
            events: events.clone(),
        },
    );
    Harness {
        tracker,
        clock,
        archive,
        analytics,
        events,
    }
}

fn manual(x: f64, y: f64, floor: i32) -> ManualFix {
    ManualFix {
        point: Point::new(x, y),
        floor,
        building: BuildingId::new("main"),
        accuracy: 2.0,
        source: LocationSource::Manual,
    }
}

fn user(name: &str) -> UserId {
    UserId::new(name)
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let h = harness(TrackingConfig::default());
    h.tracker.start_tracking(&user("u1")).unwrap();
    assert_matches!(
        h.tracker.start_tracking(&user("u1")),
        Err(AtriumError::AlreadyTracking(_))
    );
    assert_eq!(h.tracker.active_users(), vec![user("u1")]);
}

#[tokio::test]
async fn test_update_without_session_is_not_tracking() {
    let h = harness(TrackingConfig::default());
    let err = h
        .tracker
        .update_manual(&user("ghost"), manual(0.0, 0.0, 1))
        .await
        .unwrap_err();
    assert_matches!(err, AtriumError::NotTracking(_));
    assert_matches!(
        h.tracker.stop_tracking(&user("ghost")).await,
        Err(AtriumError::NotTracking(_))
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_archives_history_and_cancels_timer() {
    let h = harness(TrackingConfig::default());
    let u = user("u1");
    h.tracker.start_tracking(&u).unwrap();
    for i in 0..3 {
        h.clock.advance_secs(1);
        h.tracker
            .update_manual(&u, manual(i as f64, 0.0, 1))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(h.analytics.count("location_analytics"), 2);

    let archived = h.tracker.stop_tracking(&u).await.unwrap();
    assert_eq!(archived, 3);
    let handed_off = h.archive.archived();
    assert_eq!(handed_off.len(), 1);
    assert_eq!(handed_off[0].0, u);
    assert_eq!(handed_off[0].1.len(), 3);
    assert!(!h.tracker.is_tracking(&u));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.analytics.count("location_analytics"), 2);
    assert_matches!(
        h.tracker.stop_tracking(&u).await,
        Err(AtriumError::NotTracking(_))
    );
}

#[tokio::test]
async fn test_failed_archive_still_discards_session() {
    let h = harness(TrackingConfig::default());
    let u = user("u1");
    h.tracker.start_tracking(&u).unwrap();
    h.tracker.update_manual(&u, manual(0.0, 0.0, 1)).await.unwrap();
    h.archive.fail_next(true);
    assert_matches!(
        h.tracker.stop_tracking(&u).await,
        Err(AtriumError::Collaborator(_))
    );
    assert!(!h.tracker.is_tracking(&u));
    // The last known location outlives the session
    assert!(h.tracker.current_location(&u).is_some());
}

#[tokio::test]
async fn test_every_accepted_update_is_recorded() {
    let h = harness(TrackingConfig::default());
    let u = user("u1");
    h.tracker.start_tracking(&u).unwrap();
    h.tracker.update_manual(&u, manual(1.0, 1.0, 1)).await.unwrap();
    h.tracker.update_manual(&u, manual(1.0, 1.0, 1)).await.unwrap();
    assert_eq!(h.analytics.count("location_update"), 2);
}

#[tokio::test]
async fn test_invalid_manual_fix_rejected() {
    let h = harness(TrackingConfig::default());
    let u = user("u1");
    h.tracker.start_tracking(&u).unwrap();
    let mut fix = manual(f64::NAN, 0.0, 1);
    assert_matches!(
        h.tracker.update_manual(&u, fix.clone()).await,
        Err(AtriumError::InvalidInput(_))
    );
    fix.point = Point::new(0.0, 0.0);
    fix.accuracy = -1.0;
    assert_matches!(
        h.tracker.update_manual(&u, fix).await,
        Err(AtriumError::InvalidInput(_))
    );
}

// ============================================================================
// Beacon fixes
// ============================================================================

fn triangulated(x: f64, y: f64, building: &str, floor: i32) -> TriangulationResult {
    TriangulationResult {
        point: Point::new(x, y),
        accuracy: 3.0,
        confidence: 0.8,
        beacons_used: 3,
        matched: Vec::new(),
        building: BuildingId::new(building),
        floor,
    }
}

#[tokio::test]
async fn test_beacon_fix_uses_resolved_building() {
    let h = harness(TrackingConfig::default());
    let u = user("u1");
    h.tracker.start_tracking(&u).unwrap();

    let inside_annex = h
        .tracker
        .update_from_triangulation(&u, &triangulated(250.0, 50.0, "main", 3))
        .await
        .unwrap();
    assert_eq!(inside_annex.building, BuildingId::new("annex"));
    assert_eq!(inside_annex.floor, 0);
    assert_eq!(inside_annex.source, LocationSource::Beacon);
}

#[tokio::test]
async fn test_beacon_fix_falls_back_to_beacon_placement() {
    let h = harness(TrackingConfig::default());
    let u = user("u1");
    h.tracker.start_tracking(&u).unwrap();
    let location = h
        .tracker
        .update_from_triangulation(&u, &triangulated(10.0, 10.0, "main", 3))
        .await
        .unwrap();
    assert_eq!(location.building, BuildingId::new("main"));
    assert_eq!(location.floor, 3);
}

// ============================================================================
// Geofences and stays
// ============================================================================

fn fenced() -> TrackingConfig {
    TrackingConfig::with_geofences(vec![Geofence::circle(
        "cafe",
        "Cafeteria",
        Point::new(0.0, 0.0),
        10.0,
    )])
}

#[tokio::test]
async fn test_geofence_enter_and_exit_fire_once() {
    let h = harness(fenced());
    let u = user("u1");
    h.tracker.start_tracking(&u).unwrap();

    for _ in 0..5 {
        h.clock.advance_secs(1);
        h.tracker.update_manual(&u, manual(0.0, 0.0, 1)).await.unwrap();
    }
    assert_eq!(h.events.count("geofence_enter"), 1);

    let mut last = None;
    for _ in 0..20 {
        h.clock.advance_secs(1);
        last = Some(h.tracker.update_manual(&u, manual(100.0, 0.0, 1)).await.unwrap());
    }
    assert!(last.unwrap().point.distance_to(&Point::new(100.0, 0.0)) < 1.0);
    assert_eq!(h.events.count("geofence_enter"), 1);
    assert_eq!(h.events.count("geofence_exit"), 1);
}

#[tokio::test]
async fn test_prolonged_stay_is_debounced() {
    let h = harness(TrackingConfig::default());
    let u = user("u1");
    h.tracker.start_tracking(&u).unwrap();
    for _ in 0..12 {
        h.clock.advance_secs(10);
        h.tracker.update_manual(&u, manual(5.0, 5.0, 1)).await.unwrap();
    }
    assert_eq!(h.events.count("prolonged_stay"), 1);

    h.tracker.evaluate_now(&u).await.unwrap();
    h.tracker.evaluate_now(&u).await.unwrap();
    assert_eq!(h.events.count("prolonged_stay"), 1);
    assert_eq!(h.analytics.count("location_analytics"), 2);

    let events = h.events.events.lock();
    let (_, stay) = events
        .iter()
        .find(|(_, e)| e.kind() == "prolonged_stay")
        .unwrap();
    assert_matches!(stay, TrackingEvent::ProlongedStay { fixes: 10, duration_secs: 90, .. });
}

#[tokio::test]
async fn test_stay_rearms_once_the_window_empties() {
    let h = harness(TrackingConfig::default());
    let u = user("u1");
    h.tracker.start_tracking(&u).unwrap();
    for _ in 0..10 {
        h.clock.advance_secs(10);
        h.tracker.update_manual(&u, manual(5.0, 5.0, 1)).await.unwrap();
    }
    assert_eq!(h.events.count("prolonged_stay"), 1);

    // Silence longer than the look-back window clears the condition
    h.clock.advance_secs(600);
    h.tracker.evaluate_now(&u).await.unwrap();
    for _ in 0..10 {
        h.clock.advance_secs(10);
        h.tracker.update_manual(&u, manual(5.0, 5.0, 1)).await.unwrap();
    }
    assert_eq!(h.events.count("prolonged_stay"), 2);
}

#[tokio::test]
async fn test_stale_last_known_locations_are_pruned_on_stop() {
    let h = harness(TrackingConfig::default());
    let (old, active, fresh) = (user("old"), user("active"), user("fresh"));
    for u in [&old, &active] {
        h.tracker.start_tracking(u).unwrap();
        h.tracker.update_manual(u, manual(0.0, 0.0, 1)).await.unwrap();
    }
    h.tracker.stop_tracking(&old).await.unwrap();

    // Past the history retention, the next stop forgets the idle user
    h.clock.advance_secs(25 * 60 * 60);
    h.tracker.start_tracking(&fresh).unwrap();
    h.tracker.update_manual(&fresh, manual(1.0, 1.0, 1)).await.unwrap();
    h.tracker.stop_tracking(&fresh).await.unwrap();

    assert!(h.tracker.current_location(&old).is_none());
    // Still tracked, so kept however old its fix is
    assert!(h.tracker.current_location(&active).is_some());
    assert!(h.tracker.current_location(&fresh).is_some());
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn test_history_respects_max_age() {
    let h = harness(TrackingConfig::default());
    let u = user("u1");
    h.tracker.start_tracking(&u).unwrap();
    h.tracker.update_manual(&u, manual(0.0, 0.0, 1)).await.unwrap();
    h.clock.advance_secs(120);
    h.tracker.update_manual(&u, manual(0.0, 0.0, 1)).await.unwrap();

    let recent = h
        .tracker
        .history(&u, Some(Duration::from_secs(60)))
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(h.tracker.history(&u, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_nearby_users_same_floor_only() {
    let h = harness(TrackingConfig::default());
    for (name, x, floor) in [("me", 0.0, 1), ("near", 3.0, 1), ("upstairs", 0.0, 2), ("far", 80.0, 1)] {
        h.tracker.start_tracking(&user(name)).unwrap();
        h.tracker
            .update_manual(&user(name), manual(x, 4.0, floor))
            .await
            .unwrap();
    }
    // A stopped user keeps a last known location but is not reported
    h.tracker.start_tracking(&user("gone")).unwrap();
    h.tracker
        .update_manual(&user("gone"), manual(1.0, 4.0, 1))
        .await
        .unwrap();
    h.tracker.stop_tracking(&user("gone")).await.unwrap();

    let nearby = h.tracker.nearby_users(&user("me"), 50.0).unwrap();
    let names: Vec<_> = nearby.iter().map(|n| n.user.as_str()).collect();
    assert_eq!(names, vec!["near"]);
    assert!((nearby[0].distance - 3.0).abs() < 1e-9);

    assert_matches!(
        h.tracker.nearby_users(&user("nobody"), 50.0),
        Err(AtriumError::UnknownUser(_))
    );
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_geofence_transitions_fire_once_per_crossing(
        xs in prop::collection::vec(-40.0..40.0f64, 1..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let h = harness(fenced());
            let u = user("u1");
            h.tracker.start_tracking(&u).unwrap();

            let fence = Geofence::circle("cafe", "Cafeteria", Point::new(0.0, 0.0), 10.0);
            let (mut inside, mut enters, mut exits) = (false, 0, 0);
            for x in xs {
                h.clock.advance_secs(1);
                let accepted = h.tracker.update_manual(&u, manual(x, 0.0, 1)).await.unwrap();
                let now_inside = fence.contains(&accepted);
                match (inside, now_inside) {
                    (false, true) => enters += 1,
                    (true, false) => exits += 1,
                    _ => {}
                }
                inside = now_inside;
            }
            prop_assert_eq!(h.events.count("geofence_enter"), enters);
            prop_assert_eq!(h.events.count("geofence_exit"), exits);
            prop_assert!(enters == exits || enters == exits + 1);
            Ok(())
        })?;
    }
}
