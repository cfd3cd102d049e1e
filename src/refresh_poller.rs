use crate::config::RefreshConfig;
use crate::db::Database;
use crate::tracking::TrackingProvider;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

/// Periodically re-scrapes tracking data for every watched delivery.
///
/// A batch refresh runs when the stored `last_refresh` timestamp is missing
/// or older than the configured max age. Deliveries are refreshed strictly
/// one at a time; the upstream is a session-oriented form that parallel
/// requests destabilize. A failure on one delivery never aborts the rest of
/// the batch.
pub struct RefreshPoller {
    config: RefreshConfig,
    db: Box<dyn Database>,
    provider: Box<dyn TrackingProvider>,
    running: Arc<AtomicBool>,
}

impl RefreshPoller {
    pub fn new(
        config: RefreshConfig,
        db: Box<dyn Database>,
        provider: Box<dyn TrackingProvider>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            db,
            provider,
            running,
        }
    }

    /// Run the poll loop. Blocks until the shutdown signal fires.
    pub fn run(mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.poll_once();
            self.sleep();
        }

        info!("Refresh poller shutting down");
    }

    fn poll_once(&mut self) {
        let due = match self.db.get_last_refresh() {
            Ok(Some(at)) => {
                Utc::now() - at >= ChronoDuration::seconds(self.config.max_age_seconds as i64)
            }
            Ok(None) => true,
            Err(err) => {
                error!(error = %err, "Failed to read last refresh time");
                return;
            }
        };

        if !due {
            debug!("Tracking data still fresh");
            return;
        }

        self.refresh_all();
    }

    fn refresh_all(&mut self) {
        let deliveries = match self.db.list_deliveries() {
            Ok(deliveries) => deliveries,
            Err(err) => {
                error!(error = %err, "Failed to list deliveries");
                return;
            }
        };

        if !deliveries.is_empty() {
            info!(count = deliveries.len(), "Refreshing tracking data");
        }

        for delivery in &deliveries {
            let events = match self.provider.fetch_events(&delivery.tracking_number) {
                Ok(events) => events,
                Err(err) => {
                    // Degrade to an empty history; the next item still runs.
                    error!(
                        error = %err,
                        tracking_number = %delivery.tracking_number,
                        "Tracking refresh failed"
                    );
                    Vec::new()
                }
            };

            debug!(
                tracking_number = %delivery.tracking_number,
                count = events.len(),
                "Storing refreshed events"
            );

            if let Err(err) = self.db.replace_events(delivery.id, &events) {
                error!(
                    error = %err,
                    tracking_number = %delivery.tracking_number,
                    "Failed to store refreshed events"
                );
            }
        }

        if let Err(err) = self.db.set_last_refresh(Utc::now()) {
            error!(error = %err, "Failed to record refresh time");
        }
    }

    fn sleep(&self) {
        let mut slept = 0;
        while slept < self.config.check_interval_seconds && self.running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_secs(1));
            slept += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Delivery, DeliveryWithEvents};
    use crate::tracking::TrackingEvent;
    use anyhow::{Result, bail};
    use chrono::DateTime;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct SharedState {
        stored_events: HashMap<i64, Vec<TrackingEvent>>,
        last_refresh: Option<DateTime<Utc>>,
    }

    /// Trait fake that records every write through a shared handle, so the
    /// test can inspect what the poller did after it ran.
    struct FakeDb {
        deliveries: Vec<(i64, String)>,
        state: Arc<Mutex<SharedState>>,
    }

    impl Database for FakeDb {
        fn insert_delivery(&mut self, _: &str, _: &str) -> Result<Option<i64>> {
            unimplemented!()
        }

        fn delete_delivery(&mut self, _: i64) -> Result<bool> {
            unimplemented!()
        }

        fn list_deliveries(&self) -> Result<Vec<Delivery>> {
            Ok(self
                .deliveries
                .iter()
                .map(|(id, tracking_number)| Delivery {
                    id: *id,
                    name: format!("delivery {id}"),
                    tracking_number: tracking_number.clone(),
                })
                .collect())
        }

        fn get_deliveries_with_events(&self) -> Result<Vec<DeliveryWithEvents>> {
            unimplemented!()
        }

        fn replace_events(&mut self, delivery_id: i64, events: &[TrackingEvent]) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .stored_events
                .insert(delivery_id, events.to_vec());
            Ok(())
        }

        fn get_last_refresh(&self) -> Result<Option<DateTime<Utc>>> {
            Ok(self.state.lock().unwrap().last_refresh)
        }

        fn set_last_refresh(&mut self, at: DateTime<Utc>) -> Result<()> {
            self.state.lock().unwrap().last_refresh = Some(at);
            Ok(())
        }

        fn clear_last_refresh(&mut self) -> Result<()> {
            self.state.lock().unwrap().last_refresh = None;
            Ok(())
        }
    }

    /// Succeeds with one canned event per tracking number, except for the
    /// numbers it is told to fail on.
    struct FakeProvider {
        failing: Vec<String>,
    }

    impl TrackingProvider for FakeProvider {
        fn fetch_events(&self, tracking_number: &str) -> Result<Vec<TrackingEvent>> {
            if self.failing.iter().any(|n| n == tracking_number) {
                bail!("handshake failed");
            }

            Ok(vec![TrackingEvent {
                step_number: 1,
                event_date: "2025-07-17".to_string(),
                event_time: "09:01:00".to_string(),
                description: format!("قبول مرسوله {tracking_number}"),
                location: String::new(),
            }])
        }
    }

    fn poller_with(
        deliveries: Vec<(i64, String)>,
        failing: Vec<String>,
    ) -> (RefreshPoller, Arc<Mutex<SharedState>>) {
        let state = Arc::new(Mutex::new(SharedState::default()));
        let db = FakeDb {
            deliveries,
            state: Arc::clone(&state),
        };
        let poller = RefreshPoller::new(
            RefreshConfig {
                check_interval_seconds: 1,
                max_age_seconds: 3600,
            },
            Box::new(db),
            Box::new(FakeProvider { failing }),
            Arc::new(AtomicBool::new(true)),
        );
        (poller, state)
    }

    #[test]
    fn one_failing_item_does_not_abort_the_batch() {
        let (mut poller, state) = poller_with(
            vec![
                (1, "1111111111111111".to_string()),
                (2, "2222222222222222".to_string()),
                (3, "3333333333333333".to_string()),
            ],
            vec!["2222222222222222".to_string()],
        );

        poller.poll_once();

        let state = state.lock().unwrap();
        assert_eq!(state.stored_events[&1].len(), 1);
        assert_eq!(state.stored_events[&3].len(), 1);
        // The failed item degrades to an empty (cleared) history.
        assert!(state.stored_events[&2].is_empty());
        assert!(state.last_refresh.is_some());
    }

    #[test]
    fn fresh_data_skips_the_refresh() {
        let (mut poller, state) = poller_with(vec![(1, "1111111111111111".to_string())], vec![]);
        state.lock().unwrap().last_refresh = Some(Utc::now());

        poller.poll_once();

        assert!(state.lock().unwrap().stored_events.is_empty());
    }

    #[test]
    fn stale_data_triggers_the_refresh() {
        let (mut poller, state) = poller_with(vec![(1, "1111111111111111".to_string())], vec![]);
        state.lock().unwrap().last_refresh = Some(Utc::now() - ChronoDuration::seconds(7200));

        poller.poll_once();

        let state = state.lock().unwrap();
        assert_eq!(state.stored_events[&1].len(), 1);
    }
}
