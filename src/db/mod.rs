mod sqlite;

pub use sqlite::SqliteDatabase;

use crate::tracking::TrackingEvent;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A parcel the user is watching.
pub struct Delivery {
    pub id: i64,
    pub name: String,
    pub tracking_number: String,
}

#[derive(Debug, Serialize)]
pub struct DeliveryWithEvents {
    pub id: i64,
    pub name: String,
    pub tracking_number: String,
    pub created_at: String,
    pub events: Vec<TrackingEvent>,
}

pub trait Database: Send {
    /// Insert a delivery. Returns the new row id, or `None` when the
    /// tracking number is already registered.
    fn insert_delivery(&mut self, name: &str, tracking_number: &str) -> Result<Option<i64>>;

    /// Remove a delivery and (via cascade) its events.
    /// Returns `true` if a row was removed.
    fn delete_delivery(&mut self, delivery_id: i64) -> Result<bool>;

    /// All watched deliveries, oldest first.
    fn list_deliveries(&self) -> Result<Vec<Delivery>>;

    /// All deliveries with their events, events ascending by step number.
    fn get_deliveries_with_events(&self) -> Result<Vec<DeliveryWithEvents>>;

    /// Replace the full event history for one delivery: delete everything,
    /// then insert the given sequence. An empty slice clears the history.
    fn replace_events(&mut self, delivery_id: i64, events: &[TrackingEvent]) -> Result<()>;

    /// When the last batch refresh completed, if ever.
    fn get_last_refresh(&self) -> Result<Option<DateTime<Utc>>>;

    fn set_last_refresh(&mut self, at: DateTime<Utc>) -> Result<()>;

    /// Forget the last refresh time, making the next poller cycle refresh.
    fn clear_last_refresh(&mut self) -> Result<()>;
}
