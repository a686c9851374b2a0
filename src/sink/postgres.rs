use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::errors::SinkError;
use crate::telemetry::{IoValue, TelemetryRecord};

use super::TelemetrySink;

/// `TelemetrySink` backed by the `telemetry_data` table (§6).
pub struct PgTelemetrySink {
    pool: PgPool,
}

impl PgTelemetrySink {
    pub fn new(pool: PgPool) -> Self {
        PgTelemetrySink { pool }
    }
}

/// `TE`-only trip-summary columns, promoted out of `io_elements` to bypass
/// downstream schema-cache issues (§9 "Trip-summary column promotion").
/// Other message types leave these columns `NULL`.
struct TripSummary {
    start_timestamp: Option<String>,
    end_timestamp: Option<String>,
    duration_seconds: Option<i64>,
    start_fuel: Option<f64>,
    end_fuel: Option<f64>,
    distance_km: Option<f64>,
    start_latitude: Option<f64>,
    start_longitude: Option<f64>,
}

fn trip_summary(record: &TelemetryRecord) -> TripSummary {
    if record.message_type != "TE" {
        return TripSummary {
            start_timestamp: None,
            end_timestamp: None,
            duration_seconds: None,
            start_fuel: None,
            end_fuel: None,
            distance_km: None,
            start_latitude: None,
            start_longitude: None,
        };
    }

    let text = |key: &str| match record.io_elements.get(key) {
        Some(IoValue::Text(value)) => Some(value.clone()),
        _ => None,
    };
    let float = |key: &str| record.io_elements.get(key).and_then(IoValue::as_f64);
    let int = |key: &str| match record.io_elements.get(key) {
        Some(IoValue::Integer(value)) => Some(*value),
        _ => None,
    };

    TripSummary {
        start_timestamp: text("start_timestamp"),
        end_timestamp: text("end_timestamp"),
        duration_seconds: int("duration_seconds"),
        start_fuel: float("start_fuel"),
        end_fuel: float("end_fuel"),
        distance_km: float("distance_km"),
        start_latitude: float("start_latitude"),
        start_longitude: float("start_longitude"),
    }
}

#[async_trait]
impl TelemetrySink for PgTelemetrySink {
    async fn insert(&self, record: &TelemetryRecord) -> Result<(), SinkError> {
        let summary = trip_summary(record);
        sqlx::query(
            r#"
            INSERT INTO telemetry_data (
                device_id, timestamp, latitude, longitude, altitude, speed, heading,
                satellites, fuel_level, protocol, message_type, io_elements,
                start_timestamp, end_timestamp, duration_seconds, start_fuel, end_fuel,
                distance_km, start_latitude, start_longitude
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(&record.device_id)
        .bind(record.timestamp)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.altitude)
        .bind(record.speed)
        .bind(record.heading.map(|h| h as i32))
        .bind(record.satellites.map(|s| s as i32))
        .bind(record.fuel_level)
        .bind(record.protocol.as_str())
        .bind(&record.message_type)
        .bind(Json(&record.io_elements))
        .bind(&summary.start_timestamp)
        .bind(&summary.end_timestamp)
        .bind(summary.duration_seconds)
        .bind(summary.start_fuel)
        .bind(summary.end_fuel)
        .bind(summary.distance_km)
        .bind(summary.start_latitude)
        .bind(summary.start_longitude)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_batch(&self, records: &[TelemetryRecord]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut builder = sqlx::QueryBuilder::new(
            "INSERT INTO telemetry_data (
                device_id, timestamp, latitude, longitude, altitude, speed, heading,
                satellites, fuel_level, protocol, message_type, io_elements,
                start_timestamp, end_timestamp, duration_seconds, start_fuel, end_fuel,
                distance_km, start_latitude, start_longitude
            ) ",
        );

        builder.push_values(records, |mut row, record| {
            let summary = trip_summary(record);
            row.push_bind(&record.device_id)
                .push_bind(record.timestamp)
                .push_bind(record.latitude)
                .push_bind(record.longitude)
                .push_bind(record.altitude)
                .push_bind(record.speed)
                .push_bind(record.heading.map(|h| h as i32))
                .push_bind(record.satellites.map(|s| s as i32))
                .push_bind(record.fuel_level)
                .push_bind(record.protocol.as_str())
                .push_bind(&record.message_type)
                .push_bind(Json(&record.io_elements))
                .push_bind(summary.start_timestamp)
                .push_bind(summary.end_timestamp)
                .push_bind(summary.duration_seconds)
                .push_bind(summary.start_fuel)
                .push_bind(summary.end_fuel)
                .push_bind(summary.distance_km)
                .push_bind(summary.start_latitude)
                .push_bind(summary.start_longitude);
        });

        builder.build().execute(&self.pool).await?;
        Ok(())
    }
}
