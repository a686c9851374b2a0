pub mod memory;
pub mod postgres;

pub use memory::InMemoryTelemetrySink;
pub use postgres::PgTelemetrySink;

use async_trait::async_trait;

use crate::errors::SinkError;
use crate::telemetry::TelemetryRecord;

/// Narrow contract to the external telemetry store (§4.6). Best-effort:
/// failures are surfaced to the caller, which logs and keeps the
/// connection open rather than retrying here (§7 Persistence).
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn insert(&self, record: &TelemetryRecord) -> Result<(), SinkError>;

    async fn insert_batch(&self, records: &[TelemetryRecord]) -> Result<(), SinkError>;
}
