use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::device::{DeviceUpdate, DeviceUpsert};
use crate::errors::ConnectionError;
use crate::protocol::tfms90::{self, AliasMap, ParsedFrame};
use crate::protocol::{sniff, teltonika, ParserVariant, Sniff};
use crate::registry::DeviceRegistry;
use crate::sink::TelemetrySink;
use crate::telemetry::Protocol;

/// Per-connection state machine (§4.4): `READ_INIT -> SNIFF -> IDENTIFY ->
/// HANDSHAKE -> STEADY -> CLOSED`. One instance owns its socket pair and
/// chosen parser variant exclusively for the connection's lifetime (§5);
/// nothing here is shared except through `registry`/`sink`/`alias_map`.
pub struct ConnectionHandler<S> {
    stream: S,
    registry: Arc<dyn DeviceRegistry>,
    sink: Arc<dyn TelemetrySink>,
    alias_map: Arc<AliasMap>,
    buffer_size: usize,
    idle_timeout: Duration,
    device_id: Option<String>,
    variant: Option<ParserVariant>,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> ConnectionHandler<S> {
    pub fn new(
        stream: S,
        registry: Arc<dyn DeviceRegistry>,
        sink: Arc<dyn TelemetrySink>,
        alias_map: Arc<AliasMap>,
        buffer_size: usize,
        idle_timeout: Duration,
    ) -> Self {
        ConnectionHandler {
            stream,
            registry,
            sink,
            alias_map,
            buffer_size,
            idle_timeout,
            device_id: None,
            variant: None,
        }
    }

    fn log_target(&self) -> &str {
        self.device_id.as_deref().unwrap_or("unidentified")
    }

    async fn read_with_timeout(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        match timeout(self.idle_timeout, self.stream.read(buf)).await {
            Ok(read_result) => Ok(read_result?),
            Err(_) => {
                debug!(target: self.log_target(), "idle timeout, closing connection");
                Ok(0)
            }
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Drives the connection to completion: READ_INIT through CLOSED.
    /// Framing/Parse/Persistence errors are handled internally per §7 and
    /// never stop the loop; only Transport and Identity errors (and a
    /// clean empty read) end the connection.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let mut buf = vec![0u8; self.buffer_size];
        let n = self.read_with_timeout(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let first = buf[..n].to_vec();

        match sniff(&first) {
            Sniff::Teltonika => self.run_teltonika(&first).await,
            Sniff::Tfms90 => self.run_tfms90(&first).await,
            Sniff::Unknown => {
                debug!("unrecognized protocol, closing connection");
                Ok(())
            }
        }
    }

    async fn run_teltonika(&mut self, handshake_bytes: &[u8]) -> Result<(), ConnectionError> {
        let imei = match teltonika::read_imei(handshake_bytes) {
            Some(imei) => imei,
            None => {
                debug!("malformed IMEI handshake, closing connection");
                return Ok(());
            }
        };
        self.device_id = Some(imei.clone());
        self.variant = Some(ParserVariant::Teltonika);
        info!(target: self.log_target(), "accepted Teltonika IMEI handshake");

        if let Err(err) = self
            .registry
            .upsert_device(DeviceUpsert::new(imei.clone(), Protocol::Teltonika).with_imei(imei.clone()))
            .await
        {
            error!(target: self.log_target(), "failed to upsert device: {err}");
        }

        self.write_all(&[teltonika::IMEI_ACCEPT]).await?;

        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let n = self.read_with_timeout(&mut buf).await?;
            if n == 0 {
                info!(target: self.log_target(), "client disconnected");
                return Ok(());
            }
            self.process_teltonika_frame(&buf[..n], &imei).await?;
        }
    }

    async fn process_teltonika_frame(
        &mut self,
        frame_bytes: &[u8],
        imei: &str,
    ) -> Result<(), ConnectionError> {
        let frame = match teltonika::decode_frame(frame_bytes, imei) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(target: self.log_target(), "frame error: {err}");
                return Ok(());
            }
        };

        if let Some((header, trailing)) = frame.count_mismatch {
            warn!(
                target: self.log_target(),
                "record count mismatch: header={header} trailing={trailing}, keeping {} decoded records",
                frame.records.len()
            );
        }

        if frame.records.is_empty() {
            self.write_all(&teltonika::create_response(0)).await?;
            return Ok(());
        }

        match self.sink.insert_batch(&frame.records).await {
            Ok(()) => {
                let _ = self.registry.update_device_last_seen(imei).await;
                let ack = teltonika::create_response(frame.records.len() as u32);
                self.write_all(&ack).await?;
            }
            Err(err) => {
                error!(target: self.log_target(), "failed to persist records: {err}");
            }
        }
        Ok(())
    }

    async fn run_tfms90(&mut self, first_bytes: &[u8]) -> Result<(), ConnectionError> {
        let text = String::from_utf8_lossy(first_bytes).into_owned();
        self.process_tfms90_text(&text).await?;

        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let n = self.read_with_timeout(&mut buf).await?;
            if n == 0 {
                info!(target: self.log_target(), "client disconnected");
                return Ok(());
            }
            let text = match std::str::from_utf8(&buf[..n]) {
                Ok(text) => text.to_string(),
                Err(_) => {
                    warn!("non-ASCII TFMS90 frame, dropping");
                    continue;
                }
            };
            self.process_tfms90_text(&text).await?;
        }
    }

    async fn process_tfms90_text(&mut self, text: &str) -> Result<(), ConnectionError> {
        let frame = match tfms90::split_frame(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(target: self.log_target(), "frame error: {err}");
                return Ok(());
            }
        };

        if frame.msg_type == "LG" {
            return self.handle_login(&frame).await;
        }

        if self.device_id.is_none() {
            if let Err(err) = self.resolve_identity(&frame) {
                error!("{err}");
                return Err(err);
            }
        }

        self.process_tfms90_message(&frame).await
    }

    /// §4.5 login handshake: reject unprovisioned IMEIs by closing the
    /// connection (§7 Identity); otherwise assign/reuse a short alias and
    /// reply with the login ACK.
    async fn handle_login(&mut self, frame: &ParsedFrame) -> Result<(), ConnectionError> {
        let login = tfms90::parse_login(frame)?;

        let device = self.registry.get_device_by_imei(&login.imei).await?;
        let device = match device {
            Some(device) => device,
            None => {
                error!(target: &login.imei, "IMEI not pre-provisioned, rejecting connection");
                return Err(ConnectionError::Identity(format!(
                    "imei {} is not pre-provisioned",
                    login.imei
                )));
            }
        };

        let short_id = self
            .registry
            .assign_short_device_id(&login.imei, Protocol::Tfms90)
            .await?;
        self.alias_map.insert(short_id as u32, login.imei.clone());

        self.registry
            .update_device_by_uuid(
                device.id,
                DeviceUpdate {
                    device_id: Some(login.imei.clone()),
                    short_device_id: Some(short_id),
                    firmware_version: Some(login.firmware_version.clone()),
                    sim_iccid: Some(login.sim_iccid.clone()),
                },
            )
            .await?;

        self.device_id = Some(login.imei.clone());
        self.variant = Some(ParserVariant::Tfms90);
        info!(target: self.log_target(), "TFMS90 login accepted, short id {short_id}");

        self.write_all(tfms90::login_ack(short_id as u32).as_bytes()).await?;
        Ok(())
    }

    fn resolve_identity(&mut self, frame: &ParsedFrame) -> Result<(), ConnectionError> {
        let short_id: u32 = frame
            .short_device_id_field
            .parse()
            .map_err(|_| ConnectionError::Identity("invalid short device id field".to_string()))?;
        let imei = self
            .alias_map
            .get(short_id)
            .ok_or_else(|| ConnectionError::Identity(format!("unknown short device id {short_id}")))?;
        self.device_id = Some(imei);
        self.variant = Some(ParserVariant::Tfms90);
        Ok(())
    }

    async fn process_tfms90_message(&mut self, frame: &ParsedFrame) -> Result<(), ConnectionError> {
        let device_id = self
            .device_id
            .clone()
            .expect("device id resolved before processing a non-LG TFMS90 message");

        let record = match tfms90::build_record(frame, &device_id) {
            Ok(record) => record,
            Err(err) => {
                warn!(target: self.log_target(), "parse error: {err}");
                return Ok(());
            }
        };

        match self.sink.insert(&record).await {
            Ok(()) => {
                let _ = self.registry.update_device_last_seen(&device_id).await;
                let ack = tfms90::data_ack(&frame.token, &frame.short_device_id_field, 1);
                self.write_all(ack.as_bytes()).await?;
            }
            Err(err) => {
                error!(target: self.log_target(), "failed to persist record: {err}");
            }
        }
        Ok(())
    }
}
