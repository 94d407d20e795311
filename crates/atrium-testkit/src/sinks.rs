//! Recording collaborators

use async_trait::async_trait;
use atrium_core::{
    AnalyticsEvent, AnalyticsSink, ArchiveSink, AtriumError, AtriumResult, UserId, UserLocation,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Archive sink that keeps every hand-off.
#[derive(Debug, Default)]
pub struct RecordingArchiveSink {
    archived: Mutex<Vec<(UserId, Vec<UserLocation>)>>,
    fail: AtomicBool,
}

impl RecordingArchiveSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent archive calls fail.
    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Everything archived so far.
    pub fn archived(&self) -> Vec<(UserId, Vec<UserLocation>)> {
        self.archived.lock().clone()
    }
}

#[async_trait]
impl ArchiveSink for RecordingArchiveSink {
    async fn archive(&self, user: &UserId, history: Vec<UserLocation>) -> AtriumResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AtriumError::collaborator("archive unavailable"));
        }
        self.archived.lock().push((user.clone(), history));
        Ok(())
    }
}

/// Analytics sink that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingAnalyticsSink {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingAnalyticsSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events.
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events of one kind.
    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }
}

#[async_trait]
impl AnalyticsSink for RecordingAnalyticsSink {
    async fn record(&self, event: AnalyticsEvent) -> AtriumResult<()> {
        self.events.lock().push(event);
        Ok(())
    }
}
