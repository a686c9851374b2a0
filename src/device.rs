use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::telemetry::Protocol;

/// A device row as persisted by the external store.
///
/// The core only ever reads/writes the subset of columns listed in
/// `spec.md` §3; any additional columns the store carries are opaque to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: Uuid,
    pub device_id: String,
    pub imei: Option<String>,
    pub short_device_id: Option<i32>,
    pub protocol: String,
    pub firmware_version: Option<String>,
    pub sim_iccid: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields written on first successful identify (§3 "Lifecycle").
///
/// `device_id` is the upsert key; Teltonika devices use their IMEI as
/// `device_id` directly, TFMS90 devices are renamed to their IMEI once a
/// short alias has been assigned (see [`crate::registry::DeviceRegistry::update_device_by_uuid`]).
#[derive(Debug, Clone)]
pub struct DeviceUpsert {
    pub device_id: String,
    pub imei: Option<String>,
    pub protocol: Protocol,
    pub firmware_version: Option<String>,
    pub sim_iccid: Option<String>,
}

impl DeviceUpsert {
    pub fn new(device_id: impl Into<String>, protocol: Protocol) -> Self {
        DeviceUpsert {
            device_id: device_id.into(),
            imei: None,
            protocol,
            firmware_version: None,
            sim_iccid: None,
        }
    }

    pub fn with_imei(mut self, imei: impl Into<String>) -> Self {
        self.imei = Some(imei.into());
        self
    }

    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = Some(firmware_version.into());
        self
    }

    pub fn with_sim_iccid(mut self, sim_iccid: impl Into<String>) -> Self {
        self.sim_iccid = Some(sim_iccid.into());
        self
    }
}

/// Partial update applied via [`crate::registry::DeviceRegistry::update_device_by_uuid`].
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    pub device_id: Option<String>,
    pub short_device_id: Option<i32>,
    pub firmware_version: Option<String>,
    pub sim_iccid: Option<String>,
}
