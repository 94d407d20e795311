//! Atrium Gateway - Realtime Access
//!
//! Ties the routing, positioning and tracking layers to authenticated
//! WebSocket clients:
//!
//! - [`NavigatorService`]: protocol-agnostic request surface
//! - [`ChannelHub`]: per-user private channels and per-area broadcasts
//! - [`Gateway`]: handshake, token verification and the connection loop
//! - [`AtriumConfig`] / [`MapBundle`]: startup configuration and map ingestion
//!
//! The `atrium-server` binary wires these together with the in-process
//! collaborator adapters from `atrium-core`.

pub mod config;
pub mod connection;
pub mod hub;
pub mod map;
pub mod protocol;
pub mod server;
pub mod service;

pub use config::{AtriumConfig, GatewayConfig};
pub use connection::{run_connection, GatewayContext};
pub use hub::{area_key, AreaBroadcast, ChannelHub, ConnectionId};
pub use map::{LoadedMap, MapBundle};
pub use protocol::{ClientMessage, ServerMessage};
pub use server::{authenticate, extract_token, Gateway, ServerEffects};
pub use service::NavigatorService;
