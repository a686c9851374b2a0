use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::device::{Device, DeviceUpdate, DeviceUpsert};
use crate::errors::RegistryError;
use crate::telemetry::Protocol;

use super::DeviceRegistry;

/// `DeviceRegistry` backed by the `devices` table (§6).
pub struct PgDeviceRegistry {
    pool: PgPool,
}

impl PgDeviceRegistry {
    pub fn new(pool: PgPool) -> Self {
        PgDeviceRegistry { pool }
    }
}

#[async_trait]
impl DeviceRegistry for PgDeviceRegistry {
    async fn get_device(&self, device_id: &str) -> Result<Option<Device>, RegistryError> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE device_id = $1")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(device)
    }

    async fn get_device_by_imei(&self, imei: &str) -> Result<Option<Device>, RegistryError> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE imei = $1")
            .bind(imei)
            .fetch_optional(&self.pool)
            .await?;
        Ok(device)
    }

    async fn upsert_device(&self, upsert: DeviceUpsert) -> Result<Device, RegistryError> {
        let now = Utc::now();
        let device = sqlx::query_as::<_, Device>(
            r#"
            INSERT INTO devices (id, device_id, imei, protocol, firmware_version, sim_iccid, is_active, last_seen, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, true, $7, $7)
            ON CONFLICT (device_id) DO UPDATE SET
                imei = COALESCE(EXCLUDED.imei, devices.imei),
                protocol = EXCLUDED.protocol,
                firmware_version = COALESCE(EXCLUDED.firmware_version, devices.firmware_version),
                sim_iccid = COALESCE(EXCLUDED.sim_iccid, devices.sim_iccid),
                last_seen = EXCLUDED.last_seen
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&upsert.device_id)
        .bind(&upsert.imei)
        .bind(upsert.protocol.as_str())
        .bind(&upsert.firmware_version)
        .bind(&upsert.sim_iccid)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(device)
    }

    async fn update_device_by_uuid(
        &self,
        id: Uuid,
        update: DeviceUpdate,
    ) -> Result<Device, RegistryError> {
        let device = sqlx::query_as::<_, Device>(
            r#"
            UPDATE devices SET
                device_id = COALESCE($2, device_id),
                short_device_id = COALESCE($3, short_device_id),
                firmware_version = COALESCE($4, firmware_version),
                sim_iccid = COALESCE($5, sim_iccid)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.device_id)
        .bind(update.short_device_id)
        .bind(&update.firmware_version)
        .bind(&update.sim_iccid)
        .fetch_one(&self.pool)
        .await?;
        Ok(device)
    }

    async fn update_device_last_seen(&self, device_id: &str) -> Result<(), RegistryError> {
        sqlx::query("UPDATE devices SET last_seen = $2 WHERE device_id = $1")
            .bind(device_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn assign_short_device_id(
        &self,
        imei: &str,
        _protocol: Protocol,
    ) -> Result<i32, RegistryError> {
        let short_device_id: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE devices
            SET short_device_id = COALESCE(short_device_id, nextval('short_device_id_seq')::int)
            WHERE imei = $1
            RETURNING short_device_id
            "#,
        )
        .bind(imei)
        .fetch_optional(&self.pool)
        .await?;

        short_device_id.ok_or_else(|| RegistryError::NotFound(imei.to_string()))
    }
}
