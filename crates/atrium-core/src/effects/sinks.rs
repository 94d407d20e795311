//! Log-only archive and analytics sinks
//!
//! Single-process deployments have no time-series store; these sinks record
//! what would have been handed off.

use super::{AnalyticsEvent, AnalyticsSink, ArchiveSink};
use crate::error::AtriumResult;
use crate::ids::UserId;
use crate::types::UserLocation;
use async_trait::async_trait;

/// Archive sink that only logs the hand-off.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingArchiveSink;

#[async_trait]
impl ArchiveSink for TracingArchiveSink {
    async fn archive(&self, user: &UserId, history: Vec<UserLocation>) -> AtriumResult<()> {
        tracing::info!(
            user_id = %user,
            records = history.len(),
            "Archiving location history"
        );
        Ok(())
    }
}

/// Analytics sink that logs events at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalyticsSink;

#[async_trait]
impl AnalyticsSink for TracingAnalyticsSink {
    async fn record(&self, event: AnalyticsEvent) -> AtriumResult<()> {
        tracing::debug!(kind = event.kind(), ?event, "Analytics event");
        Ok(())
    }
}
