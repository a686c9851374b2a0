use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::SinkError;
use crate::telemetry::TelemetryRecord;

use super::TelemetrySink;

/// Test fake for [`TelemetrySink`]; records are kept in parse/insert order
/// so tests can assert on ordering within a batch (§5).
#[derive(Default)]
pub struct InMemoryTelemetrySink {
    records: Mutex<Vec<TelemetryRecord>>,
}

impl InMemoryTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl TelemetrySink for InMemoryTelemetrySink {
    async fn insert(&self, record: &TelemetryRecord) -> Result<(), SinkError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn insert_batch(&self, records: &[TelemetryRecord]) -> Result<(), SinkError> {
        self.records.lock().await.extend_from_slice(records);
        Ok(())
    }
}
