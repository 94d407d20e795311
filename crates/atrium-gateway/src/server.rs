//! WebSocket server
//!
//! Accepts TCP connections, completes the WebSocket handshake while
//! capturing the bearer token, verifies it, and hands authenticated sockets
//! to [`run_connection`]. A connection without a valid token is closed with a
//! policy-violation frame before any message is read.

use crate::config::AtriumConfig;
use crate::connection::{run_connection, GatewayContext};
use crate::hub::ChannelHub;
use crate::map::LoadedMap;
use crate::service::NavigatorService;
use atrium_core::{
    AnalyticsSink, ArchiveSink, AtriumError, AtriumResult, AuthVerifier, Clock, PreferencesStore,
    SpatialResolver, UserId,
};
use atrium_positioning::{BeaconRegistryStore, LocationFilter, TriangulationEngine};
use atrium_routing::{GraphStore, PathfindingEngine};
use atrium_tracking::{SessionTracker, TrackerEffects};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

/// External collaborators wired into a gateway.
#[derive(Clone)]
pub struct ServerEffects {
    /// Token verification
    pub verifier: Arc<dyn AuthVerifier>,
    /// Stored routing preferences
    pub preferences: Arc<dyn PreferencesStore>,
    /// History hand-off
    pub archive: Arc<dyn ArchiveSink>,
    /// Analytics events
    pub analytics: Arc<dyn AnalyticsSink>,
    /// Wall clock
    pub clock: Arc<dyn Clock>,
    /// Overrides the map's building footprints when set
    pub spatial: Option<Arc<dyn SpatialResolver>>,
}

/// The realtime gateway.
pub struct Gateway {
    ctx: Arc<GatewayContext>,
    verifier: Arc<dyn AuthVerifier>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Wire every layer together from configuration and a loaded map.
    pub fn assemble(config: AtriumConfig, map: LoadedMap, effects: ServerEffects) -> AtriumResult<Self> {
        config.validate()?;
        let hub = Arc::new(ChannelHub::new(
            config.gateway.user_channel_capacity,
            config.gateway.area_channel_capacity,
        ));

        let routing = PathfindingEngine::new(Arc::new(GraphStore::new(map.graph)), config.routing);
        let triangulation = TriangulationEngine::new(
            Arc::new(BeaconRegistryStore::new(map.registry)),
            config.triangulation,
            effects.clock.clone(),
        );
        let spatial = effects
            .spatial
            .unwrap_or_else(|| Arc::new(map.footprints) as Arc<dyn SpatialResolver>);
        let tracker = Arc::new(SessionTracker::new(
            config.tracking,
            LocationFilter::new(config.filter),
            effects.clock,
            TrackerEffects {
                spatial,
                archive: effects.archive,
                analytics: effects.analytics.clone(),
                events: hub.clone(),
            },
        ));
        let service = NavigatorService::new(
            routing,
            triangulation,
            tracker,
            effects.preferences,
            effects.analytics,
        );

        Ok(Self {
            ctx: Arc::new(GatewayContext {
                service,
                hub,
                config: config.gateway,
            }),
            verifier: effects.verifier,
        })
    }

    /// Shared connection context.
    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.ctx
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> AtriumResult<TcpListener> {
        let addr = &self.ctx.config.listen_addr;
        TcpListener::bind(addr)
            .await
            .map_err(|e| AtriumError::configuration(format!("cannot listen on {addr}: {e}")))
    }

    /// Accept connections until `shutdown` flips to true, then stop every session.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> AtriumResult<()> {
        let local = listener.local_addr().ok();
        tracing::info!(addr = ?local, "Gateway listening");
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(handle_socket(
                            Arc::clone(&self.ctx),
                            Arc::clone(&self.verifier),
                            stream,
                            peer,
                        ));
                    }
                    Err(err) => tracing::warn!(error = %err, "Accept failed"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        tracing::info!(open = connections.len(), "Gateway shutting down");
        connections.shutdown().await;
        self.ctx.service.tracker().stop_all().await;
        Ok(())
    }
}

async fn handle_socket(
    ctx: Arc<GatewayContext>,
    verifier: Arc<dyn AuthVerifier>,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let accepted = timeout(
        ctx.config.handshake_timeout,
        authenticate(stream, verifier.as_ref()),
    )
    .await;
    match accepted {
        Ok(Ok(Some((socket, user)))) => run_connection(ctx, user, socket).await,
        Ok(Ok(None)) => {}
        Ok(Err(err)) => tracing::debug!(%peer, error = %err, "Handshake failed"),
        Err(_) => tracing::warn!(%peer, "Handshake timed out"),
    }
}

/// Complete the WebSocket handshake and verify the caller's token.
///
/// Returns `Ok(None)` when the token is missing or rejected; the socket has
/// then already been closed with a policy-violation frame.
pub async fn authenticate<S>(
    stream: S,
    verifier: &dyn AuthVerifier,
) -> AtriumResult<Option<(WebSocketStream<S>, UserId)>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut token = None;
    let mut socket = accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            token = extract_token(request);
            Ok(response)
        },
    )
    .await
    .map_err(|e| AtriumError::protocol(format!("websocket handshake failed: {e}")))?;

    let verified = match token {
        Some(token) => verifier.verify(&token).await,
        None => Err(AtriumError::invalid_auth("missing token")),
    };
    match verified {
        Ok(user) => Ok(Some((socket, user))),
        Err(err) => {
            tracing::warn!(error = %err, "Connection rejected");
            let frame = CloseFrame {
                code: CloseCode::Policy,
                reason: err.to_string().into(),
            };
            let _ = socket.close(Some(frame)).await;
            Ok(None)
        }
    }
}

/// Token from `Authorization: Bearer <token>` or the `token` query parameter.
pub fn extract_token(request: &Request) -> Option<String> {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    request
        .uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, auth: Option<&str>) -> Request {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_bearer_header_wins() {
        let req = request("/ws?token=query", Some("Bearer header"));
        assert_eq!(extract_token(&req), Some("header".to_string()));
    }

    #[test]
    fn test_query_token() {
        let req = request("/ws?lang=en&token=abc.def", None);
        assert_eq!(extract_token(&req), Some("abc.def".to_string()));
    }

    #[test]
    fn test_missing_token() {
        assert_eq!(extract_token(&request("/ws", None)), None);
        assert_eq!(extract_token(&request("/ws?token=", Some("Basic xyz"))), None);
    }
}
