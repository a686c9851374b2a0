//! End-to-end scenarios driven through `ConnectionHandler` against mock
//! sockets and in-memory registry/sink fakes (no real Postgres).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_test::io::Builder;

use gps_telemetry_ingest::connection::ConnectionHandler;
use gps_telemetry_ingest::device::Device;
use gps_telemetry_ingest::errors::SinkError;
use gps_telemetry_ingest::protocol::teltonika::{self, CodecWidth};
use gps_telemetry_ingest::protocol::tfms90::AliasMap;
use gps_telemetry_ingest::registry::InMemoryDeviceRegistry;
use gps_telemetry_ingest::sink::{InMemoryTelemetrySink, TelemetrySink};
use gps_telemetry_ingest::telemetry::TelemetryRecord;
use gps_telemetry_ingest::test_support::{build_frame, build_imei_packet, AvlRecordFixture};

fn seeded_device(imei: &str) -> Device {
    let now = Utc::now();
    Device {
        id: uuid::Uuid::new_v4(),
        device_id: imei.to_string(),
        imei: Some(imei.to_string()),
        short_device_id: None,
        protocol: "tfms90".to_string(),
        firmware_version: None,
        sim_iccid: None,
        last_seen: now,
        is_active: true,
        created_at: now,
    }
}

/// Flips the trailing record-count byte of a built Codec 8/8E frame, leaving
/// the header count and every record untouched. Used to exercise S4.
fn corrupt_trailing_count(mut frame_bytes: Vec<u8>, trailing_count: u8) -> Vec<u8> {
    let crc_start = frame_bytes.len() - 4;
    frame_bytes[crc_start - 1] = trailing_count;
    frame_bytes
}

#[tokio::test]
async fn s4_count_mismatch_keeps_decoded_prefix_and_stays_open() {
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    let sink = Arc::new(InMemoryTelemetrySink::new());
    let alias_map = Arc::new(AliasMap::new());

    let records: Vec<AvlRecordFixture> = (0..3)
        .map(|i| AvlRecordFixture::new().with_position(10.0 + i as f64, 20.0 + i as f64))
        .collect();
    let frame_bytes = build_frame(CodecWidth::Codec8E, &records);
    let mismatched = corrupt_trailing_count(frame_bytes, 2);

    let imei_packet = build_imei_packet("352094087456789");
    let stream = Builder::new()
        .read(&imei_packet)
        .write(&[teltonika::IMEI_ACCEPT])
        .read(&mismatched)
        .write(&teltonika::create_response(3))
        .build();

    let handler = ConnectionHandler::new(stream, registry, sink.clone(), alias_map, 4096, Duration::from_secs(600));
    handler.run().await.unwrap();

    let persisted = sink.records().await;
    assert_eq!(persisted.len(), 3, "all 3 successfully decoded records should be kept");
}

#[tokio::test]
async fn s5_tfms90_flf_fuel_fill() {
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    registry.seed(seeded_device("867762040399039")).await;
    let sink = Arc::new(InMemoryTelemetrySink::new());
    let alias_map = Arc::new(AliasMap::new());

    let login = "$,0,LG,000,867762040399039,2.0.1,8997000000000000000,#?";
    let flf = "$,5,FLF,100,1,2A3B4C5D,40.0,70.0,30.0,12.9716,77.5946,#?";

    let stream = Builder::new()
        .read(login.as_bytes())
        .write(b"$,0,ACK,100,#?\n")
        .read(flf.as_bytes())
        .write(b"$,5,ACK,100,1,#?\n")
        .build();

    let handler = ConnectionHandler::new(stream, registry, sink.clone(), alias_map, 4096, Duration::from_secs(600));
    handler.run().await.unwrap();

    let records = sink.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message_type, "FLF");
    assert_eq!(records[0].fuel_level, Some(70.0));
}

struct FailingSink;

#[async_trait]
impl TelemetrySink for FailingSink {
    async fn insert(&self, _record: &TelemetryRecord) -> Result<(), SinkError> {
        Err(SinkError::Backend("simulated outage".to_string()))
    }

    async fn insert_batch(&self, _records: &[TelemetryRecord]) -> Result<(), SinkError> {
        Err(SinkError::Backend("simulated outage".to_string()))
    }
}

#[tokio::test]
async fn p7_no_ack_is_written_when_persistence_fails() {
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    let sink = Arc::new(FailingSink);
    let alias_map = Arc::new(AliasMap::new());

    let imei_packet = build_imei_packet("352094087456789");
    let record = AvlRecordFixture::new().with_position(1.0, 2.0);
    let data_packet = build_frame(CodecWidth::Codec8E, &[record]);

    // No ACK write is scripted after the data packet: if the handler tried
    // to write one, the mock stream would panic on an unexpected write.
    let stream = Builder::new()
        .read(&imei_packet)
        .write(&[teltonika::IMEI_ACCEPT])
        .read(&data_packet)
        .build();

    let handler = ConnectionHandler::new(stream, registry, sink, alias_map, 4096, Duration::from_secs(600));
    handler.run().await.unwrap();
}

#[tokio::test]
async fn p8_malformed_connection_does_not_affect_a_concurrent_healthy_one() {
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    let sink = Arc::new(InMemoryTelemetrySink::new());
    let alias_map = Arc::new(AliasMap::new());

    let good_imei_packet = build_imei_packet("111111111111111");
    let good_record = AvlRecordFixture::new().with_position(3.0, 4.0);
    let good_data = build_frame(CodecWidth::Codec8E, &[good_record]);
    let good_stream = Builder::new()
        .read(&good_imei_packet)
        .write(&[teltonika::IMEI_ACCEPT])
        .read(&good_data)
        .write(&teltonika::create_response(1))
        .build();
    let good_handler = ConnectionHandler::new(
        good_stream,
        registry.clone(),
        sink.clone(),
        alias_map.clone(),
        4096,
        Duration::from_secs(600),
    );

    // Garbage that fails the IMEI handshake outright.
    let bad_stream = Builder::new().read(b"\xff\xff\xff\xff not an imei").build();
    let bad_handler = ConnectionHandler::new(bad_stream, registry, sink.clone(), alias_map, 4096, Duration::from_secs(600));

    let (good_result, bad_result) = tokio::join!(good_handler.run(), bad_handler.run());
    assert!(good_result.is_ok());
    assert!(bad_result.is_ok());

    let records = sink.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].device_id, "111111111111111");
}
