use super::{Database, Delivery, DeliveryWithEvents};
use crate::tracking::TrackingEvent;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {path}"))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;

        let mut db = Self { conn };
        db.migrate()?;

        Ok(db)
    }

    fn migrate(&mut self) -> Result<()> {
        const MIGRATIONS: &[&str] = &[
            include_str!("../../migrations/0001_create_deliveries_and_meta.sql"),
            include_str!("../../migrations/0002_create_events.sql"),
        ];

        let version: u32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .context("Failed to read user_version")?;

        for (i, sql) in MIGRATIONS.iter().enumerate() {
            let target = (i + 1) as u32;
            if version < target {
                info!("Running database migration: v{} → v{}", target - 1, target);
                self.conn
                    .execute_batch(sql)
                    .with_context(|| format!("Migration v{} → v{} failed", target - 1, target))?;
                self.conn
                    .pragma_update(None, "user_version", target)
                    .with_context(|| format!("Failed to set user_version to {target}"))?;
            }
        }

        Ok(())
    }

    fn events_for_delivery(&self, delivery_id: i64) -> Result<Vec<TrackingEvent>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT step_number, event_date, event_time, description, location
                 FROM events
                 WHERE delivery_id = ?1
                 ORDER BY step_number ASC",
            )
            .context("Failed to prepare events query")?;

        let events = stmt
            .query_map([delivery_id], |row| {
                Ok(TrackingEvent {
                    step_number: row.get(0)?,
                    event_date: row.get(1)?,
                    event_time: row.get(2)?,
                    description: row.get(3)?,
                    location: row.get(4)?,
                })
            })
            .context("Failed to query events")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read event rows")?;

        Ok(events)
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("Failed to query meta key {key}"))
    }

    fn set_meta(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, value],
            )
            .with_context(|| format!("Failed to update meta key {key}"))?;

        Ok(())
    }
}

const LAST_REFRESH_KEY: &str = "last_refresh";

impl Database for SqliteDatabase {
    fn insert_delivery(&mut self, name: &str, tracking_number: &str) -> Result<Option<i64>> {
        let changes = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO deliveries (name, tracking_number) VALUES (?1, ?2)",
                [name, tracking_number],
            )
            .context("Failed to insert delivery")?;

        if changes > 0 {
            Ok(Some(self.conn.last_insert_rowid()))
        } else {
            Ok(None)
        }
    }

    fn delete_delivery(&mut self, delivery_id: i64) -> Result<bool> {
        let changes = self
            .conn
            .execute("DELETE FROM deliveries WHERE id = ?1", [delivery_id])
            .context("Failed to delete delivery")?;

        Ok(changes > 0)
    }

    fn list_deliveries(&self) -> Result<Vec<Delivery>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, tracking_number FROM deliveries ORDER BY id ASC")
            .context("Failed to prepare deliveries query")?;

        let deliveries = stmt
            .query_map([], |row| {
                Ok(Delivery {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    tracking_number: row.get(2)?,
                })
            })
            .context("Failed to query deliveries")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read delivery rows")?;

        Ok(deliveries)
    }

    fn get_deliveries_with_events(&self) -> Result<Vec<DeliveryWithEvents>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, tracking_number, created_at
                 FROM deliveries ORDER BY id ASC",
            )
            .context("Failed to prepare deliveries query")?;

        let deliveries = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("Failed to query deliveries")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read delivery rows")?;

        deliveries
            .into_iter()
            .map(|(id, name, tracking_number, created_at)| {
                Ok(DeliveryWithEvents {
                    id,
                    name,
                    tracking_number,
                    created_at,
                    events: self.events_for_delivery(id)?,
                })
            })
            .collect()
    }

    fn replace_events(&mut self, delivery_id: i64, events: &[TrackingEvent]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to start replace_events transaction")?;

        tx.execute("DELETE FROM events WHERE delivery_id = ?1", [delivery_id])
            .context("Failed to delete old events")?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO events
                        (delivery_id, step_number, event_date, event_time, description, location)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .context("Failed to prepare event insert")?;

            for event in events {
                stmt.execute(rusqlite::params![
                    delivery_id,
                    event.step_number,
                    event.event_date,
                    event.event_time,
                    event.description,
                    event.location,
                ])
                .context("Failed to insert event")?;
            }
        }

        tx.commit().context("Failed to commit replace_events")?;

        Ok(())
    }

    fn get_last_refresh(&self) -> Result<Option<DateTime<Utc>>> {
        match self.get_meta(LAST_REFRESH_KEY)? {
            Some(value) => {
                let at = DateTime::parse_from_rfc3339(&value)
                    .context("Invalid last_refresh value in meta")?;
                Ok(Some(at.with_timezone(&Utc)))
            }
            None => Ok(None),
        }
    }

    fn set_last_refresh(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.set_meta(LAST_REFRESH_KEY, &at.to_rfc3339())
    }

    fn clear_last_refresh(&mut self) -> Result<()> {
        self.conn
            .execute("DELETE FROM meta WHERE key = ?1", [LAST_REFRESH_KEY])
            .context("Failed to clear last_refresh")?;

        Ok(())
    }
}
