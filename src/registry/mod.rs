pub mod memory;
pub mod postgres;

pub use memory::InMemoryDeviceRegistry;
pub use postgres::PgDeviceRegistry;

use async_trait::async_trait;
use uuid::Uuid;

use crate::device::{Device, DeviceUpdate, DeviceUpsert};
use crate::errors::RegistryError;
use crate::telemetry::Protocol;

/// Narrow contract to the external device store (§4.5), consulted only on
/// handshake — never on the steady-state record path.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn get_device(&self, device_id: &str) -> Result<Option<Device>, RegistryError>;

    async fn get_device_by_imei(&self, imei: &str) -> Result<Option<Device>, RegistryError>;

    async fn upsert_device(&self, upsert: DeviceUpsert) -> Result<Device, RegistryError>;

    async fn update_device_by_uuid(
        &self,
        id: Uuid,
        update: DeviceUpdate,
    ) -> Result<Device, RegistryError>;

    async fn update_device_last_seen(&self, device_id: &str) -> Result<(), RegistryError>;

    /// Returns the device's short alias, assigning the next one (starting
    /// at 100) if it doesn't have one yet. Must be linearizable against
    /// concurrent assigners for distinct IMEIs (§4.5, P5).
    async fn assign_short_device_id(
        &self,
        imei: &str,
        protocol: Protocol,
    ) -> Result<i32, RegistryError>;
}
