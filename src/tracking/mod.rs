pub mod parser;
pub mod post_ir;

use anyhow::Result;
use serde::Serialize;

/// One milestone in a parcel's journey, as reported by the tracking portal.
///
/// `event_date` is the normalized Gregorian `YYYY-MM-DD` form of the Jalali
/// date header the event appeared under; `event_time` is kept exactly as the
/// portal printed it. `location` may be empty, never absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingEvent {
    pub step_number: u32,
    pub event_date: String,
    pub event_time: String,
    pub description: String,
    pub location: String,
}

/// Source of tracking events for a tracking number.
///
/// Implementations return the full event history sorted ascending by step
/// number, or an empty vector when the upstream has no record. An `Err` means
/// the provider could not even reach the point of asking (e.g. the form
/// handshake failed); callers isolate such failures per tracking number.
pub trait TrackingProvider: Send {
    fn fetch_events(&self, tracking_number: &str) -> Result<Vec<TrackingEvent>>;
}
