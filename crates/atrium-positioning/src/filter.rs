//! Location smoothing
//!
//! A per-axis, single-state Kalman-style blend between the last filtered
//! position and each new fix, preceded by an outlier check against the
//! accuracy-weighted mean of recent raw fixes. This is a smoothing
//! heuristic, not a full state estimator: there is no velocity term and the
//! covariance is not carried between updates.
//!
//! Filtering never fails. An outlier is replaced by the window's weighted
//! mean rather than rejected.

use atrium_core::{time::duration_secs, AtriumError, AtriumResult, Point, UserLocation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Floor on the measurement noise so the gain stays below one.
const MIN_MEASUREMENT_NOISE: f64 = 1e-3;

/// Filter tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Raw fixes older than this leave the window
    #[serde(with = "duration_secs")]
    pub window_max_age: Duration,
    /// Maximum raw fixes kept in the window
    pub window_max_len: usize,
    /// Process noise `q`
    pub process_noise: f64,
    /// Claimed accuracy is divided by this to get measurement noise `r`
    pub measurement_noise_scale: f64,
    /// Outlier threshold as a multiple of the mean window accuracy
    pub outlier_accuracy_factor: f64,
    /// Outlier threshold never drops below this many meters
    pub outlier_floor_m: f64,
    /// Window samples needed before the outlier check applies
    pub outlier_min_samples: usize,
    /// Output accuracy ceiling in meters
    pub accuracy_cap_m: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            window_max_age: Duration::from_secs(30),
            window_max_len: 5,
            process_noise: 0.01,
            measurement_noise_scale: 100.0,
            outlier_accuracy_factor: 3.0,
            outlier_floor_m: 20.0,
            outlier_min_samples: 1,
            accuracy_cap_m: 10.0,
        }
    }
}

impl FilterConfig {
    /// Reject nonsensical values.
    pub fn validate(&self) -> AtriumResult<()> {
        if self.window_max_len == 0 || self.window_max_age.is_zero() {
            return Err(AtriumError::configuration(
                "filter window must allow at least one fix",
            ));
        }
        if !(self.process_noise > 0.0 && self.measurement_noise_scale > 0.0) {
            return Err(AtriumError::configuration(
                "filter noise parameters must be positive",
            ));
        }
        if !(self.outlier_accuracy_factor > 0.0
            && self.outlier_floor_m >= 0.0
            && self.accuracy_cap_m > 0.0)
        {
            return Err(AtriumError::configuration(
                "filter outlier thresholds and accuracy cap must be positive",
            ));
        }
        Ok(())
    }
}

/// One user's filter state.
#[derive(Debug, Clone, Default)]
pub struct FilterWindow {
    samples: VecDeque<UserLocation>,
    last_filtered: Option<Point>,
}

impl FilterWindow {
    /// Empty window; the next fix passes through unfiltered, as does the
    /// first fix after every recent one has aged out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw fixes currently in the window, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &UserLocation> {
        self.samples.iter()
    }

    /// Last emitted position.
    pub fn last_filtered(&self) -> Option<Point> {
        self.last_filtered
    }

    fn evict(&mut self, now: DateTime<Utc>, max_age: Duration) {
        let cutoff = now - atrium_core::time::to_chrono(max_age);
        while self.samples.front().map_or(false, |s| s.timestamp < cutoff) {
            self.samples.pop_front();
        }
        // Nothing recent to smooth against: the next fix starts afresh
        if self.samples.is_empty() {
            self.last_filtered = None;
        }
    }

    /// Accuracy-weighted mean and mean accuracy of the window.
    fn reference(&self) -> Option<(Point, f64)> {
        let mean = Point::weighted_mean(
            self.samples
                .iter()
                .map(|s| (s.point, 1.0 / (s.accuracy + 1.0))),
        )?;
        let mean_accuracy =
            self.samples.iter().map(|s| s.accuracy).sum::<f64>() / self.samples.len() as f64;
        Some((mean, mean_accuracy))
    }
}

/// Stateless smoothing policy applied to a caller-owned [`FilterWindow`].
#[derive(Debug, Clone, Default)]
pub struct LocationFilter {
    config: FilterConfig,
}

impl LocationFilter {
    /// Create a filter.
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Kalman gain for a fix claiming `accuracy` meters.
    pub fn gain(&self, accuracy: f64) -> f64 {
        let q = self.config.process_noise;
        let r = (accuracy / self.config.measurement_noise_scale).max(MIN_MEASUREMENT_NOISE);
        q / (q + r)
    }

    /// Filter one fix against the user's window and record it.
    ///
    /// The raw fix always enters the window, even when corrected, so a
    /// genuine move is followed once enough fixes agree.
    pub fn apply(
        &self,
        window: &mut FilterWindow,
        fix: UserLocation,
        now: DateTime<Utc>,
    ) -> UserLocation {
        window.evict(now, self.config.window_max_age);

        let point = match window.last_filtered {
            None => fix.point,
            Some(predicted) => self
                .corrected_outlier(window, &fix)
                .unwrap_or_else(|| self.blend(predicted, &fix)),
        };

        window.samples.push_back(fix.clone());
        while window.samples.len() > self.config.window_max_len {
            window.samples.pop_front();
        }
        window.last_filtered = Some(point);

        UserLocation {
            point,
            accuracy: fix.accuracy.min(self.config.accuracy_cap_m),
            ..fix
        }
    }

    fn corrected_outlier(&self, window: &FilterWindow, fix: &UserLocation) -> Option<Point> {
        if window.samples.len() < self.config.outlier_min_samples.max(1) {
            return None;
        }
        let (reference, mean_accuracy) = window.reference()?;
        let threshold = (self.config.outlier_accuracy_factor * mean_accuracy)
            .max(self.config.outlier_floor_m);
        let deviation = fix.point.distance_to(&reference);
        if deviation <= threshold {
            return None;
        }
        tracing::warn!(
            deviation,
            threshold,
            "Outlier fix replaced by window average"
        );
        Some(reference)
    }

    fn blend(&self, predicted: Point, fix: &UserLocation) -> Point {
        let k = self.gain(fix.accuracy);
        Point::new(
            predicted.x + k * (fix.point.x - predicted.x),
            predicted.y + k * (fix.point.y - predicted.y),
        )
    }
}
