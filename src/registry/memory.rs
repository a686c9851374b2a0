use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::device::{Device, DeviceUpdate, DeviceUpsert};
use crate::errors::RegistryError;
use crate::telemetry::Protocol;

use super::DeviceRegistry;

struct State {
    devices: HashMap<Uuid, Device>,
    next_short_id: i32,
}

/// Test fake for [`DeviceRegistry`] (§9 "a fake in-memory backend suffices
/// for testing"). Assignment is linearizable because the whole
/// read-then-write sequence runs under one `tokio::sync::Mutex` guard, the
/// same discipline the teacher's `RwLock`-guarded caches use for a single
/// critical section.
pub struct InMemoryDeviceRegistry {
    state: Mutex<State>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        InMemoryDeviceRegistry {
            state: Mutex::new(State {
                devices: HashMap::new(),
                next_short_id: 100,
            }),
        }
    }

    /// Seeds a pre-provisioned device row, as an external portal would.
    pub async fn seed(&self, device: Device) {
        self.state.lock().await.devices.insert(device.id, device);
    }
}

impl Default for InMemoryDeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryDeviceRegistry {
    async fn get_device(&self, device_id: &str) -> Result<Option<Device>, RegistryError> {
        let state = self.state.lock().await;
        Ok(state.devices.values().find(|d| d.device_id == device_id).cloned())
    }

    async fn get_device_by_imei(&self, imei: &str) -> Result<Option<Device>, RegistryError> {
        let state = self.state.lock().await;
        Ok(state
            .devices
            .values()
            .find(|d| d.imei.as_deref() == Some(imei))
            .cloned())
    }

    async fn upsert_device(&self, upsert: DeviceUpsert) -> Result<Device, RegistryError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(existing) = state
            .devices
            .values_mut()
            .find(|d| d.device_id == upsert.device_id)
        {
            existing.imei = upsert.imei.or_else(|| existing.imei.clone());
            existing.protocol = upsert.protocol.as_str().to_string();
            existing.firmware_version = upsert.firmware_version.or_else(|| existing.firmware_version.clone());
            existing.sim_iccid = upsert.sim_iccid.or_else(|| existing.sim_iccid.clone());
            existing.last_seen = now;
            return Ok(existing.clone());
        }

        let device = Device {
            id: Uuid::new_v4(),
            device_id: upsert.device_id,
            imei: upsert.imei,
            short_device_id: None,
            protocol: upsert.protocol.as_str().to_string(),
            firmware_version: upsert.firmware_version,
            sim_iccid: upsert.sim_iccid,
            last_seen: now,
            is_active: true,
            created_at: now,
        };
        state.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn update_device_by_uuid(
        &self,
        id: Uuid,
        update: DeviceUpdate,
    ) -> Result<Device, RegistryError> {
        let mut state = self.state.lock().await;
        let device = state
            .devices
            .get_mut(&id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if let Some(device_id) = update.device_id {
            device.device_id = device_id;
        }
        if let Some(short_device_id) = update.short_device_id {
            device.short_device_id = Some(short_device_id);
        }
        if let Some(firmware_version) = update.firmware_version {
            device.firmware_version = Some(firmware_version);
        }
        if let Some(sim_iccid) = update.sim_iccid {
            device.sim_iccid = Some(sim_iccid);
        }
        Ok(device.clone())
    }

    async fn update_device_last_seen(&self, device_id: &str) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        match state.devices.values_mut().find(|d| d.device_id == device_id) {
            Some(device) => {
                device.last_seen = now;
                Ok(())
            }
            None => Err(RegistryError::NotFound(device_id.to_string())),
        }
    }

    async fn assign_short_device_id(
        &self,
        imei: &str,
        _protocol: Protocol,
    ) -> Result<i32, RegistryError> {
        let mut state = self.state.lock().await;
        let existing = state
            .devices
            .values()
            .find(|d| d.imei.as_deref() == Some(imei))
            .and_then(|d| d.short_device_id);
        if let Some(short_id) = existing {
            return Ok(short_id);
        }

        let device_uuid = state
            .devices
            .values()
            .find(|d| d.imei.as_deref() == Some(imei))
            .map(|d| d.id)
            .ok_or_else(|| RegistryError::NotFound(imei.to_string()))?;

        let assigned = state.next_short_id;
        state.next_short_id += 1;
        state.devices.get_mut(&device_uuid).unwrap().short_device_id = Some(assigned);
        Ok(assigned)
    }
}
