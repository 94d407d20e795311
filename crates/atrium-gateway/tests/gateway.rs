//! End-to-end gateway behavior over real sockets

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_matches::assert_matches;
use atrium_core::{
    AtriumError, BuildingId, InMemoryPreferences, LocationSource, Point, StaticTokenVerifier,
    UserId, UserPreferences,
};
use atrium_gateway::{AtriumConfig, Gateway, GatewayConfig, GatewayContext, MapBundle, ServerEffects};
use atrium_testkit::{ManualClock, MapBuilder, RecordingAnalyticsSink, RecordingArchiveSink};
use atrium_tracking::{Geofence, ManualFix, TrackingConfig};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    addr: SocketAddr,
    ctx: Arc<GatewayContext>,
    archive: Arc<RecordingArchiveSink>,
    analytics: Arc<RecordingAnalyticsSink>,
    preferences: Arc<InMemoryPreferences>,
    _shutdown: watch::Sender<bool>,
}

fn bundle() -> MapBundle {
    let map = MapBuilder::new("main")
        .node("A", 0.0, 0.0, 1)
        .node("B", 10.0, 0.0, 1)
        .node("C", 10.0, 10.0, 1)
        .corridor("A", "B", 10.0)
        .corridor("B", "C", 10.0)
        .inaccessible()
        .beacon("b1", 1, 0.0, 0.0, 1)
        .beacon("b2", 2, 10.0, 0.0, 1)
        .beacon("b3", 3, 5.0, 10.0, 1);
    MapBundle {
        nodes: map.nodes().to_vec(),
        edges: map.edges().to_vec(),
        beacons: map.beacons().to_vec(),
        footprints: Vec::new(),
    }
}

async fn start() -> Server {
    let archive = Arc::new(RecordingArchiveSink::new());
    let analytics = Arc::new(RecordingAnalyticsSink::new());
    let preferences = Arc::new(InMemoryPreferences::new());
    let verifier = StaticTokenVerifier::new()
        .with_token("t1", UserId::new("u1"))
        .with_token("t2", UserId::new("u2"));
    let config = AtriumConfig {
        gateway: GatewayConfig::testing(),
        tracking: TrackingConfig::with_geofences(vec![Geofence::circle(
            "desk",
            "Front desk",
            Point::new(0.0, 0.0),
            5.0,
        )]),
        ..AtriumConfig::default()
    };
    let effects = ServerEffects {
        verifier: Arc::new(verifier),
        preferences: preferences.clone(),
        archive: archive.clone(),
        analytics: analytics.clone(),
        clock: Arc::new(ManualClock::default()),
        spatial: None,
    };
    let gateway = Gateway::assemble(config, bundle().build().unwrap(), effects).unwrap();
    let listener = gateway.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let ctx = Arc::clone(gateway.context());
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move { gateway.serve(listener, shutdown_rx).await });
    Server {
        addr,
        ctx,
        archive,
        analytics,
        preferences,
        _shutdown: shutdown,
    }
}

async fn connect(server: &Server, token: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{}/ws?token={token}", server.addr))
        .await
        .unwrap();
    client
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

async fn recv(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn update(request_id: &str, x: f64, y: f64) -> Value {
    json!({
        "type": "update_location",
        "request_id": request_id,
        "coordinates": {"x": x, "y": y},
        "floor": 1,
        "building": "main",
        "accuracy": 2.0
    })
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_invalid_token_closed_with_policy_violation() {
    let server = start().await;
    let mut client = connect(&server, "forged").await;
    let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_matches!(frame, Message::Close(Some(close)) if close.code == CloseCode::Policy);
    assert!(!server.ctx.service.tracker().is_tracking(&UserId::new("u1")));
}

#[tokio::test]
async fn test_bearer_header_accepted() {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let server = start().await;
    let mut request = format!("ws://{}/ws", server.addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("Authorization", "Bearer t2".parse().unwrap());
    let (mut client, _) = connect_async(request).await.unwrap();

    send(&mut client, update("r1", 1.0, 1.0)).await;
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "location_confirmed");
}

// ============================================================================
// Requests
// ============================================================================

#[tokio::test]
async fn test_update_location_confirmed_and_tracked() {
    let server = start().await;
    let mut client = connect(&server, "t1").await;
    send(&mut client, update("r1", 20.0, 20.0)).await;

    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "location_confirmed");
    assert_eq!(reply["request_id"], "r1");
    assert_eq!(reply["location"]["building"], "main");
    assert!(server.ctx.service.tracker().is_tracking(&UserId::new("u1")));
}

#[tokio::test]
async fn test_geofence_push_follows_update() {
    let server = start().await;
    let mut client = connect(&server, "t1").await;
    send(&mut client, update("r1", 1.0, 0.0)).await;

    let mut kinds = vec![
        recv(&mut client).await["type"].as_str().unwrap().to_string(),
        recv(&mut client).await["type"].as_str().unwrap().to_string(),
    ];
    kinds.sort();
    assert_eq!(kinds, vec!["geofence_enter", "location_confirmed"]);
}

#[tokio::test]
async fn test_route_request_uses_stored_preferences() {
    let server = start().await;
    let mut client = connect(&server, "t1").await;
    let request = json!({
        "type": "request_route",
        "request_id": "route-1",
        "from": {"point": {"x": 0.0, "y": 0.0}},
        "to": {"point": {"x": 10.0, "y": 10.0}}
    });

    send(&mut client, request.clone()).await;
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "route_calculated");
    assert_eq!(reply["route"]["total_distance"], 20.0);
    assert_eq!(reply["route"]["accessible"], false);
    assert_eq!(server.analytics.count("route_request"), 1);

    server.preferences.set(
        UserId::new("u1"),
        UserPreferences {
            accessible_only: true,
            ..UserPreferences::default()
        },
    );
    send(&mut client, request).await;
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "no_route_found");
    assert_eq!(reply["request_id"], "route-1");
}

#[tokio::test]
async fn test_short_beacon_scan_is_typed_error() {
    let server = start().await;
    let mut client = connect(&server, "t1").await;
    send(
        &mut client,
        json!({
            "type": "beacon_scan",
            "request_id": "scan-1",
            "beacons": [
                {"identity": {"uuid": "main", "major": 1, "minor": 1}, "rssi": -60.0, "accuracy": 1.0},
                {"identity": {"uuid": "main", "major": 1, "minor": 2}, "rssi": -60.0, "accuracy": 1.0}
            ]
        }),
    )
    .await;
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "insufficient_beacons");
    assert_eq!(reply["request_id"], "scan-1");
}

#[tokio::test]
async fn test_beacon_scan_confirms_location() {
    let server = start().await;
    let mut client = connect(&server, "t1").await;
    let beacons: Vec<Value> = (1..=3)
        .map(|minor| {
            json!({"identity": {"uuid": "main", "major": 1, "minor": minor}, "rssi": -60.0, "accuracy": 1.0})
        })
        .collect();
    send(
        &mut client,
        json!({"type": "beacon_scan", "request_id": "scan-2", "beacons": beacons}),
    )
    .await;

    // The solved point sits far from the front desk, so no geofence push
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "location_confirmed");
    assert_eq!(reply["beacons_used"], 3);
    assert_eq!(reply["location"]["source"], "beacon");
    assert_eq!(reply["location"]["floor"], 1);
}

#[tokio::test]
async fn test_malformed_frame_is_answered() {
    let server = start().await;
    let mut client = connect(&server, "t1").await;
    client
        .send(Message::Text("{not json".to_string()))
        .await
        .unwrap();
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "protocol");
}

// ============================================================================
// Areas
// ============================================================================

#[tokio::test]
async fn test_nearby_updates_reach_area_members_only() {
    let server = start().await;
    let mut watcher = connect(&server, "t1").await;
    send(
        &mut watcher,
        json!({"type": "join_area", "request_id": "j1", "building": "main", "floor": 1}),
    )
    .await;
    let joined = recv(&mut watcher).await;
    assert_eq!(joined["type"], "area_joined");
    assert_eq!(joined["area"], "main_floor_1");

    send(&mut watcher, update("w1", 20.0, 20.0)).await;
    assert_eq!(recv(&mut watcher).await["type"], "location_confirmed");

    let mut mover = connect(&server, "t2").await;
    send(&mut mover, update("m1", 23.0, 24.0)).await;
    assert_eq!(recv(&mut mover).await["type"], "location_confirmed");

    let pushed = recv(&mut watcher).await;
    assert_eq!(pushed["type"], "nearby_user_update");
    assert_eq!(pushed["user_id"], "u2");
    assert_eq!(pushed["distance"], 5.0);

    // The watcher's own updates are never echoed back
    send(&mut watcher, update("w2", 20.0, 20.0)).await;
    assert_eq!(recv(&mut watcher).await["type"], "location_confirmed");
    send(
        &mut watcher,
        json!({"type": "leave_area", "request_id": "l1", "building": "main", "floor": 1}),
    )
    .await;
    assert_eq!(recv(&mut watcher).await["type"], "area_left");
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_disconnect_stops_tracking_once() {
    let server = start().await;
    let user = UserId::new("u1");
    let mut client = connect(&server, "t1").await;
    send(&mut client, update("r1", 20.0, 20.0)).await;
    recv(&mut client).await;

    client.close(None).await.unwrap();
    let tracker = Arc::clone(server.ctx.service.tracker());
    wait_until(|| !tracker.is_tracking(&user)).await;

    let archived = server.archive.archived();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].0, user);
    assert_eq!(archived[0].1.len(), 1);
}

#[tokio::test]
async fn test_reconnect_pushes_last_known_location() {
    let server = start().await;
    let user = UserId::new("u1");
    let mut first = connect(&server, "t1").await;
    send(&mut first, update("r1", 20.0, 20.0)).await;
    recv(&mut first).await;
    first.close(None).await.unwrap();
    let tracker = Arc::clone(server.ctx.service.tracker());
    wait_until(|| !tracker.is_tracking(&user)).await;

    let mut second = connect(&server, "t1").await;
    let pushed = recv(&mut second).await;
    assert_eq!(pushed["type"], "location_confirmed");
    assert!(pushed.get("request_id").is_none());
    assert_eq!(pushed["location"]["point"]["x"], 20.0);
    wait_until(|| tracker.is_tracking(&user)).await;
}

#[tokio::test]
async fn test_superseded_connection_keeps_session() {
    let server = start().await;
    let user = UserId::new("u1");
    let mut first = connect(&server, "t1").await;
    send(&mut first, update("r1", 20.0, 20.0)).await;
    recv(&mut first).await;

    let mut second = connect(&server, "t1").await;
    // The first connection is told it was replaced
    let frame = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await
    .unwrap();
    assert_matches!(frame, Some(close) if close.code == CloseCode::Normal);

    send(&mut second, update("r2", 20.0, 20.0)).await;
    let mut saw_reply = false;
    for _ in 0..2 {
        if recv(&mut second).await["request_id"] == "r2" {
            saw_reply = true;
            break;
        }
    }
    assert!(saw_reply);
    assert!(server.ctx.service.tracker().is_tracking(&user));
    assert!(server.archive.archived().is_empty());
}

#[tokio::test]
async fn test_reconnect_during_disconnect_keeps_tracking() {
    let server = start().await;
    let ctx = &server.ctx;
    let tracker = ctx.service.tracker();
    let user = UserId::new("u1");

    let (old, _old_rx) = ctx.hub.register(&user);
    ctx.service.start_tracking(&user).unwrap();
    let fix = ManualFix {
        point: Point::new(20.0, 20.0),
        floor: 1,
        building: BuildingId::new("main"),
        accuracy: 5.0,
        source: LocationSource::Manual,
    };
    ctx.service.update_location_manual(&user, fix).await.unwrap();

    // The old connection leaves the hub, then a reconnect registers and
    // finds the old session still in place
    assert!(ctx.hub.unregister(&user, old));
    let (_new, _new_rx) = ctx.hub.register(&user);
    assert_matches!(
        ctx.service.start_tracking(&user),
        Err(AtriumError::AlreadyTracking(_))
    );

    ctx.end_session(&user).await;

    assert_eq!(server.archive.archived().len(), 1);
    assert!(tracker.is_tracking(&user));
}
