//! Per-connection loop
//!
//! One task per authenticated socket. It multiplexes inbound frames, the
//! user's private channel and the joined area channels. Every decoded
//! request gets exactly one reply, written straight to the socket. On exit
//! the connection releases its areas and, if it was still the user's live
//! connection, stops tracking.

use crate::config::GatewayConfig;
use crate::hub::{area_key, AreaBroadcast, ChannelHub, ConnectionId};
use crate::protocol::{self, ClientMessage, ServerMessage};
use crate::service::NavigatorService;
use atrium_core::{AtriumError, AtriumResult, UserId};
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamMap;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Shared state every connection needs.
#[derive(Debug)]
pub struct GatewayContext {
    /// Request facade
    pub service: NavigatorService,
    /// Channel addressing
    pub hub: Arc<ChannelHub>,
    /// Gateway tunables
    pub config: GatewayConfig,
}

impl GatewayContext {
    /// Stop tracking for a user whose live connection just went away.
    ///
    /// A reconnect can register between the old connection leaving the hub
    /// and this stop, and its own start is then refused as already tracking.
    /// Tracking is restarted for it once the old session is archived.
    pub async fn end_session(&self, user: &UserId) {
        match self.service.stop_tracking(user).await {
            Ok(records) => tracing::debug!(user_id = %user, records, "Session closed on disconnect"),
            Err(AtriumError::NotTracking(_)) => {}
            Err(err) => tracing::warn!(user_id = %user, error = %err, "Stop tracking on disconnect failed"),
        }
        if self.hub.is_connected(user) {
            match self.service.start_tracking(user) {
                Ok(()) => tracing::debug!(user_id = %user, "Tracking resumed for newer connection"),
                Err(AtriumError::AlreadyTracking(_)) => {}
                Err(err) => tracing::warn!(user_id = %user, error = %err, "Failed to resume tracking"),
            }
        }
    }
}

struct Connection {
    ctx: Arc<GatewayContext>,
    user: UserId,
    id: ConnectionId,
    areas: StreamMap<String, BroadcastStream<AreaBroadcast>>,
    relayed: HashMap<UserId, DateTime<Utc>>,
}

/// Serve an authenticated socket until either side closes it.
pub async fn run_connection<S>(ctx: Arc<GatewayContext>, user: UserId, socket: WebSocketStream<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (id, mut private_rx) = ctx.hub.register(&user);
    let (mut sink, mut stream) = socket.split();
    let mut conn = Connection {
        ctx,
        user,
        id,
        areas: StreamMap::new(),
        relayed: HashMap::new(),
    };
    tracing::info!(user_id = %conn.user, connection = id, "Connection opened");

    if let Some(location) = conn.ctx.service.tracker().current_location(&conn.user) {
        send(&mut sink, &ServerMessage::location(location)).await;
    }
    match conn.ctx.service.start_tracking(&conn.user) {
        Ok(()) | Err(AtriumError::AlreadyTracking(_)) => {}
        Err(err) => tracing::warn!(user_id = %conn.user, error = %err, "Failed to start tracking"),
    }

    loop {
        tokio::select! {
            inbound = stream.next() => {
                let reply = match inbound {
                    Some(Ok(Message::Text(text))) => Some(conn.handle_frame(&text).await),
                    Some(Ok(Message::Binary(bytes))) => Some(match std::str::from_utf8(&bytes) {
                        Ok(text) => conn.handle_frame(text).await,
                        Err(_) => ServerMessage::error(None, &AtriumError::protocol("frames must be UTF-8 JSON")),
                    }),
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                        None
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => None,
                    Some(Err(err)) => {
                        tracing::debug!(user_id = %conn.user, error = %err, "Socket read failed");
                        break;
                    }
                };
                if let Some(reply) = reply {
                    if !send(&mut sink, &reply).await {
                        break;
                    }
                }
            }
            pushed = private_rx.recv() => match pushed {
                Some(message) => {
                    if !send(&mut sink, &message).await {
                        break;
                    }
                }
                None => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "superseded by a newer connection".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            },
            Some((area, item)) = conn.areas.next(), if !conn.areas.is_empty() => match item {
                Ok(broadcast) => {
                    if let Some(update) = conn.relay(broadcast) {
                        if !send(&mut sink, &update).await {
                            break;
                        }
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    tracing::warn!(user_id = %conn.user, area = %area, missed, "Area updates dropped for slow subscriber");
                }
            },
        }
    }

    conn.close().await;
}

/// Write one message. Returns false once the socket is unusable.
async fn send<S>(sink: &mut SplitSink<WebSocketStream<S>, Message>, message: &ServerMessage) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let text = match protocol::encode(message) {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(kind = message.kind(), error = %err, "Failed to encode message");
            return true;
        }
    };
    sink.send(Message::Text(text)).await.is_ok()
}

impl Connection {
    async fn handle_frame(&mut self, raw: &str) -> ServerMessage {
        let message = match protocol::decode(raw) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(user_id = %self.user, error = %err, "Malformed frame");
                return ServerMessage::error(protocol::salvage_request_id(raw), &err);
            }
        };
        let request_id = message.request_id().map(str::to_string);
        let kind = message.kind();
        match self.dispatch(message).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::debug!(user_id = %self.user, kind, code = ?err.code(), error = %err, "Request failed");
                ServerMessage::error(request_id, &err)
            }
        }
    }

    async fn dispatch(&mut self, message: ClientMessage) -> AtriumResult<ServerMessage> {
        let service = &self.ctx.service;
        match message {
            ClientMessage::UpdateLocation {
                request_id,
                coordinates,
                floor,
                building,
                accuracy,
                source,
            } => {
                let fix = protocol::manual_fix(coordinates, floor, building, accuracy, source);
                let location = service.update_location_manual(&self.user, fix).await?;
                self.ctx.hub.publish_location(&self.user, &location);
                Ok(ServerMessage::LocationConfirmed {
                    request_id,
                    location,
                    beacons_used: None,
                    confidence: None,
                })
            }
            ClientMessage::BeaconScan {
                request_id,
                beacons,
            } => {
                let (location, result) = service
                    .update_location_from_beacons(&self.user, &beacons)
                    .await?;
                self.ctx.hub.publish_location(&self.user, &location);
                Ok(ServerMessage::LocationConfirmed {
                    request_id,
                    location,
                    beacons_used: Some(result.beacons_used),
                    confidence: Some(result.confidence),
                })
            }
            ClientMessage::RequestRoute {
                request_id,
                from,
                to,
                preferences,
            } => {
                let route = service
                    .compute_route(Some(&self.user), &from, &to, preferences)
                    .await?;
                tracing::debug!(
                    user_id = %self.user,
                    route_id = %route.id,
                    distance = route.total_distance,
                    "Route calculated"
                );
                Ok(ServerMessage::RouteCalculated { request_id, route })
            }
            ClientMessage::JoinArea {
                request_id,
                building,
                floor,
            } => {
                let area = area_key(&building, floor);
                if !self.areas.contains_key(&area) {
                    let rx = self.ctx.hub.subscribe(&area);
                    self.areas.insert(area.clone(), BroadcastStream::new(rx));
                }
                tracing::debug!(user_id = %self.user, area = %area, "Joined area");
                Ok(ServerMessage::AreaJoined { request_id, area })
            }
            ClientMessage::LeaveArea {
                request_id,
                building,
                floor,
            } => {
                let area = area_key(&building, floor);
                if self.areas.remove(&area).is_some() {
                    self.ctx.hub.prune(&area);
                }
                tracing::debug!(user_id = %self.user, area = %area, "Left area");
                Ok(ServerMessage::AreaLeft { request_id, area })
            }
        }
    }

    /// Turn an area broadcast into a push for this user, if it should get one.
    fn relay(&mut self, broadcast: AreaBroadcast) -> Option<ServerMessage> {
        if broadcast.sender == self.user {
            return None;
        }
        // Joined to both the building and its floor: deliver once
        let stamp = broadcast.location.timestamp;
        if self.relayed.insert(broadcast.sender.clone(), stamp) == Some(stamp) {
            return None;
        }

        let own = self.ctx.service.tracker().current_location(&self.user);
        let distance = own
            .filter(|own| own.same_area(&broadcast.location))
            .map(|own| own.distance_to(&broadcast.location));
        if distance.map_or(false, |d| d > self.ctx.config.nearby_radius_m) {
            return None;
        }
        Some(ServerMessage::NearbyUserUpdate {
            user_id: broadcast.sender,
            location: broadcast.location,
            distance,
        })
    }

    async fn close(mut self) {
        let areas: Vec<String> = self.areas.keys().cloned().collect();
        self.areas.clear();
        for area in &areas {
            self.ctx.hub.prune(area);
        }

        if self.ctx.hub.unregister(&self.user, self.id) {
            self.ctx.end_session(&self.user).await;
        }
        tracing::info!(user_id = %self.user, connection = self.id, "Connection closed");
    }
}
