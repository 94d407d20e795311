//! Gateway and server configuration

use atrium_core::{time::duration_secs, AtriumError, AtriumResult};
use atrium_positioning::{FilterConfig, TriangulationConfig};
use atrium_routing::RoutingConfig;
use atrium_tracking::TrackingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Realtime gateway tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Socket address to listen on
    pub listen_addr: String,
    /// Pending pushes per user before new ones are dropped
    pub user_channel_capacity: usize,
    /// Pending broadcasts per area before the oldest are dropped
    pub area_channel_capacity: usize,
    /// Recipients on the same floor farther than this skip nearby-user updates
    pub nearby_radius_m: f64,
    /// Time allowed for the WebSocket handshake and token check
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
            user_channel_capacity: 64,
            area_channel_capacity: 256,
            nearby_radius_m: 50.0,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl GatewayConfig {
    /// Loopback listener on an ephemeral port with small channels.
    pub fn testing() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_string(),
            user_channel_capacity: 16,
            area_channel_capacity: 16,
            handshake_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Reject nonsensical values.
    pub fn validate(&self) -> AtriumResult<()> {
        if self.user_channel_capacity == 0 || self.area_channel_capacity == 0 {
            return Err(AtriumError::configuration(
                "gateway channel capacities must be positive",
            ));
        }
        if !(self.nearby_radius_m >= 0.0) {
            return Err(AtriumError::configuration(
                "gateway.nearby_radius_m must be non-negative",
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(AtriumError::configuration(
                "gateway.handshake_timeout must be positive",
            ));
        }
        Ok(())
    }
}

/// Whole-server configuration, one TOML table per concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtriumConfig {
    /// Route search
    pub routing: RoutingConfig,
    /// Beacon triangulation
    pub triangulation: TriangulationConfig,
    /// Fix smoothing
    pub filter: FilterConfig,
    /// Tracking sessions
    pub tracking: TrackingConfig,
    /// Realtime gateway
    pub gateway: GatewayConfig,
}

impl AtriumConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> AtriumResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> AtriumResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AtriumError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Validate every section.
    pub fn validate(&self) -> AtriumResult<()> {
        self.routing.validate()?;
        self.triangulation.validate()?;
        self.filter.validate()?;
        self.tracking.validate()?;
        self.gateway.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = AtriumConfig::from_toml_str("").unwrap();
        assert_eq!(config, AtriumConfig::default());
    }

    #[test]
    fn test_sections_override_independently() {
        let config = AtriumConfig::from_toml_str(
            r#"
            [routing]
            max_search_radius_m = 25.0

            [gateway]
            listen_addr = "127.0.0.1:9000"
            handshake_timeout = 3

            [[tracking.geofences]]
            id = "lobby"
            name = "Lobby"
            shape = "circle"
            center = { x = 0.0, y = 0.0 }
            radius_m = 8.0
            "#,
        )
        .unwrap();
        assert_eq!(config.routing.max_search_radius_m, 25.0);
        assert_eq!(config.routing.elevator_wait_secs, 20.0);
        assert_eq!(config.gateway.handshake_timeout, Duration::from_secs(3));
        assert_eq!(config.gateway.user_channel_capacity, 64);
        assert_eq!(config.tracking.geofences.len(), 1);
    }

    #[test]
    fn test_invalid_section_rejected() {
        let err = AtriumConfig::from_toml_str("[gateway]\nuser_channel_capacity = 0").unwrap_err();
        assert!(matches!(err, AtriumError::Configuration(_)));
    }

    #[test]
    fn test_load_reads_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tracking]\nhistory_max_len = 7").unwrap();
        let config = AtriumConfig::load(file.path()).unwrap();
        assert_eq!(config.tracking.history_max_len, 7);

        let dir = tempfile::tempdir().unwrap();
        let err = AtriumConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, AtriumError::Configuration(_)));
    }
}
