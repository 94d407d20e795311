//! Atrium Testing Infrastructure
//!
//! Fixtures shared by the workspace's unit and integration tests:
//!
//! - [`ManualClock`]: a `Clock` advanced explicitly by the test
//! - [`RecordingArchiveSink`] / [`RecordingAnalyticsSink`]: collaborators that
//!   keep everything handed to them
//! - [`MapBuilder`]: terse construction of nodes, edges and beacons
//!
//! ```
//! use atrium_testkit::MapBuilder;
//!
//! let map = MapBuilder::new("main")
//!     .node("a", 0.0, 0.0, 1)
//!     .node("b", 10.0, 0.0, 1)
//!     .corridor("a", "b", 10.0);
//! assert_eq!(map.nodes().len(), 2);
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod builders;
pub mod clock;
pub mod sinks;

pub use builders::MapBuilder;
pub use clock::ManualClock;
pub use sinks::{RecordingAnalyticsSink, RecordingArchiveSink};
