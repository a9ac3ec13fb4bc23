//! Output formatting for text and NDJSON output.

use anyhow::Result;
use owo_colors::OwoColorize;
use pulse_core::{
    DecoderTable, DisconnectReason, DiscoveredDevice, IssueCategory, ServiceEntry, SessionEvent,
};
use pulse_types::uuid::display_uuid;
use pulse_types::{Device, DeviceInfo};
use serde::Serialize;
use serde_json::json;
use tabled::{Table, Tabled};
use time::OffsetDateTime;

use crate::cli::OutputFormat;
use crate::style::apply_table_style;

/// Format one event as a single output line.
pub fn format_event(
    event: &SessionEvent,
    format: OutputFormat,
    at: OffsetDateTime,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_event_text(event, at, no_color)),
        OutputFormat::Json => format_event_json(event),
    }
}

/// NDJSON line for an event.
pub fn format_event_json(event: &SessionEvent) -> Result<String> {
    Ok(format!("{}\n", serde_json::to_string(event)?))
}

#[must_use]
pub fn format_event_text(event: &SessionEvent, at: OffsetDateTime, no_color: bool) -> String {
    let stamp = format!("{:02}:{:02}:{:02}", at.hour(), at.minute(), at.second());
    let body = match event {
        SessionEvent::Connecting { generation } => {
            paint(&format!("connecting ({generation})"), Tone::Dim, no_color)
        }
        SessionEvent::Connected { device, .. } => {
            paint(&format!("connected to {device}"), Tone::Good, no_color)
        }
        SessionEvent::Ready {
            device, services, ..
        } => paint(
            &format!("{device} ready, {services} service(s)"),
            Tone::Good,
            no_color,
        ),
        SessionEvent::Disconnected { device, reason, .. } => {
            let who = device
                .as_ref()
                .map(|d| format!(" from {d}"))
                .unwrap_or_default();
            let tone = match reason {
                DisconnectReason::UserRequested => Tone::Dim,
                _ => Tone::Warn,
            };
            paint(
                &format!("disconnected{who} ({})", format_reason(reason)),
                tone,
                no_color,
            )
        }
        SessionEvent::Sample {
            characteristic,
            sample,
        } => match characteristic {
            Some(uuid) => format!("{sample} [{}]", display_uuid(uuid)),
            None => sample.to_string(),
        },
        SessionEvent::Error {
            category,
            characteristic,
            message,
        } => {
            let at = characteristic
                .as_ref()
                .map(|uuid| format!(" {}", display_uuid(uuid)))
                .unwrap_or_default();
            paint(
                &format!("{} error{at}: {message}", category_label(*category)),
                Tone::Bad,
                no_color,
            )
        }
        other => other.name().to_string(),
    };

    if no_color {
        format!("{stamp} {body}\n")
    } else {
        format!("{} {body}\n", stamp.dimmed())
    }
}

#[must_use]
pub fn format_reason(reason: &DisconnectReason) -> String {
    match reason {
        DisconnectReason::UserRequested => "user requested".to_string(),
        DisconnectReason::LinkLost => "link lost".to_string(),
        DisconnectReason::ConnectFailed(kind) => format!("connect failed: {}", kind.code()),
        _ => "unknown".to_string(),
    }
}

fn category_label(category: IssueCategory) -> &'static str {
    match category {
        IssueCategory::Discovery => "discovery",
        IssueCategory::Decode => "decode",
    }
}

#[derive(Clone, Copy)]
enum Tone {
    Good,
    Warn,
    Bad,
    Dim,
}

fn paint(text: &str, tone: Tone, no_color: bool) -> String {
    if no_color {
        return text.to_string();
    }
    match tone {
        Tone::Good => text.green().to_string(),
        Tone::Warn => text.yellow().to_string(),
        Tone::Bad => text.red().to_string(),
        Tone::Dim => text.dimmed().to_string(),
    }
}

// ============================================================================
// Scan formatting
// ============================================================================

pub fn format_scan_json(devices: &[DiscoveredDevice]) -> Result<String> {
    #[derive(Serialize)]
    struct ScanResult<'a> {
        count: usize,
        devices: Vec<DeviceJson<'a>>,
    }

    #[derive(Serialize)]
    struct DeviceJson<'a> {
        name: Option<&'a str>,
        address: &'a str,
        identifier: &'a str,
        rssi: Option<i16>,
        services: Vec<String>,
    }

    let result = ScanResult {
        count: devices.len(),
        devices: devices
            .iter()
            .map(|d| DeviceJson {
                name: d.name.as_deref(),
                address: &d.address,
                identifier: &d.identifier,
                rssi: d.rssi,
                services: d.services.iter().map(display_uuid).collect(),
            })
            .collect(),
    };

    Ok(format!("{}\n", serde_json::to_string_pretty(&result)?))
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Identifier")]
    identifier: String,
    #[tabled(rename = "RSSI")]
    rssi: String,
    #[tabled(rename = "Services")]
    services: String,
}

#[must_use]
pub fn format_scan_text(devices: &[DiscoveredDevice], no_color: bool) -> String {
    if devices.is_empty() {
        return "No devices found.\n".to_string();
    }

    let rows: Vec<DeviceRow> = devices
        .iter()
        .map(|d| {
            let name = d.name.as_deref().unwrap_or("Unknown");
            DeviceRow {
                name: if no_color {
                    name.to_string()
                } else {
                    name.bold().to_string()
                },
                identifier: d.identifier.clone(),
                rssi: d
                    .rssi
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                services: d
                    .services
                    .iter()
                    .map(display_uuid)
                    .collect::<Vec<_>>()
                    .join(","),
            }
        })
        .collect();

    let mut table = Table::new(rows);
    apply_table_style(&mut table, no_color);
    format!("{table}\n\nFound {} device(s)\n", devices.len())
}

// ============================================================================
// Discovery formatting
// ============================================================================

/// Everything `discover` reports about a connected device.
pub struct DiscoverySummary<'a> {
    pub device: &'a Device,
    pub services: &'a [ServiceEntry],
    pub info: Option<&'a DeviceInfo>,
    pub battery: Option<u8>,
}

#[derive(Tabled)]
struct CharacteristicRow {
    #[tabled(rename = "Characteristic")]
    uuid: String,
    #[tabled(rename = "Properties")]
    properties: String,
    #[tabled(rename = "Subscribed")]
    subscribed: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Decoded cached value, if one was read.
fn describe_value(decoders: &DecoderTable, uuid: uuid::Uuid, value: Option<&[u8]>) -> Option<String> {
    let bytes = value?;
    Some(match decoders.decode(uuid, bytes) {
        Ok(sample) => sample.to_string(),
        Err(e) => format!("<undecodable: {e}>"),
    })
}

#[must_use]
pub fn format_discovery_text(
    summary: &DiscoverySummary<'_>,
    decoders: &DecoderTable,
    no_color: bool,
) -> String {
    let title = format!("{}", summary.device);
    let mut output = if no_color {
        format!("{title}\n")
    } else {
        format!("{}\n", title.bold())
    };

    if let Some(info) = summary.info {
        for (label, value) in [
            ("Manufacturer", &info.manufacturer),
            ("Model", &info.model),
            ("Serial", &info.serial),
        ] {
            if let Some(value) = value {
                output.push_str(&format!("  {label}: {value}\n"));
            }
        }
    }
    if let Some(battery) = summary.battery {
        output.push_str(&format!("  Battery: {battery}%\n"));
    }

    for service in summary.services {
        output.push_str(&format!("\nService {}\n", display_uuid(&service.uuid)));
        let rows: Vec<CharacteristicRow> = service
            .characteristics
            .values()
            .map(|entry| CharacteristicRow {
                uuid: display_uuid(&entry.uuid),
                properties: entry.properties.flags(),
                subscribed: if entry.subscribed { "yes" } else { "-" }.to_string(),
                value: describe_value(decoders, entry.uuid, entry.last_value.as_deref())
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        let mut table = Table::new(rows);
        apply_table_style(&mut table, no_color);
        output.push_str(&format!("{table}\n"));
    }
    output
}

pub fn format_discovery_json(
    summary: &DiscoverySummary<'_>,
    decoders: &DecoderTable,
) -> Result<String> {
    let services: Vec<_> = summary
        .services
        .iter()
        .map(|service| {
            let characteristics: Vec<_> = service
                .characteristics
                .values()
                .map(|entry| {
                    json!({
                        "uuid": entry.uuid,
                        "properties": entry.properties.flags(),
                        "subscribed": entry.subscribed,
                        "value": entry.last_value,
                        "decoded": describe_value(decoders, entry.uuid, entry.last_value.as_deref()),
                    })
                })
                .collect();
            json!({ "uuid": service.uuid, "characteristics": characteristics })
        })
        .collect();

    let document = json!({
        "device": summary.device,
        "device_info": summary.info,
        "battery_level": summary.battery,
        "services": services,
    });
    Ok(format!("{}\n", serde_json::to_string_pretty(&document)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{DecodedSample, Generation};
    use pulse_types::uuids::{BATTERY_LEVEL, HEART_RATE_MEASUREMENT};

    fn at() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(3_723).unwrap()
    }

    fn ready() -> SessionEvent {
        SessionEvent::Ready {
            device: Device::new("AA:BB").with_name("HRM"),
            generation: Generation::new(1),
            services: 3,
        }
    }

    #[test]
    fn test_format_event_text_no_color() {
        assert_eq!(
            format_event_text(&ready(), at(), true),
            "01:02:03 HRM (AA:BB) ready, 3 service(s)\n"
        );

        let event = SessionEvent::Sample {
            characteristic: Some(BATTERY_LEVEL),
            sample: DecodedSample::BatteryLevel { percent: 80 },
        };
        assert_eq!(
            format_event_text(&event, at(), true),
            "01:02:03 battery 80% [0x2A19]\n"
        );
    }

    #[test]
    fn test_format_event_text_disconnect_reason() {
        let event = SessionEvent::Disconnected {
            device: None,
            reason: DisconnectReason::LinkLost,
            generation: Generation::new(2),
        };
        assert_eq!(
            format_event_text(&event, at(), true),
            "01:02:03 disconnected (link lost)\n"
        );
    }

    #[test]
    fn test_format_event_text_colored_differs() {
        let plain = format_event_text(&ready(), at(), true);
        let colored = format_event_text(&ready(), at(), false);
        assert_ne!(plain, colored);
        assert!(colored.contains("\u{1b}["));
    }

    #[test]
    fn test_format_event_json_is_one_line() {
        let line = format_event(&ready(), OutputFormat::Json, at(), false).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["type"], "ready");
        assert_eq!(value["services"], 3);
    }

    #[test]
    fn test_format_scan_text_empty() {
        assert_eq!(format_scan_text(&[], true), "No devices found.\n");
    }

    #[test]
    fn test_format_scan_json() {
        let devices = vec![DiscoveredDevice {
            id: "hci0/dev_AA".to_string(),
            name: Some("Polar H10".to_string()),
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            identifier: "AA:BB:CC:DD:EE:FF".to_string(),
            rssi: Some(-61),
            services: vec![pulse_types::uuids::HEART_RATE_SERVICE],
        }];
        let value: serde_json::Value =
            serde_json::from_str(&format_scan_json(&devices).unwrap()).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["devices"][0]["name"], "Polar H10");
        assert_eq!(value["devices"][0]["services"][0], "0x180D");

        let text = format_scan_text(&devices, true);
        assert!(text.contains("Polar H10"));
        assert!(text.contains("Found 1 device(s)"));
    }

    #[test]
    fn test_format_scan_text_table() {
        let devices = vec![DiscoveredDevice {
            id: "hci0/dev_01".to_string(),
            name: None,
            address: "AA:BB:CC:DD:EE:01".to_string(),
            identifier: "AA:BB:CC:DD:EE:01".to_string(),
            rssi: None,
            services: Vec::new(),
        }];
        let text = format_scan_text(&devices, true);
        let header = text.lines().next().unwrap();
        for column in ["Name", "Identifier", "RSSI", "Services"] {
            assert!(header.contains(column), "missing column {column}");
        }
        let row = text.lines().nth(1).unwrap();
        assert!(row.contains("Unknown"));
        assert!(row.contains("AA:BB:CC:DD:EE:01"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn test_format_discovery_text_tables_per_service() {
        use std::collections::BTreeMap;

        use pulse_core::CharacteristicEntry;
        use pulse_types::CharacteristicProperties;
        use pulse_types::uuids::BATTERY_SERVICE;

        let device = Device::new("AA:BB").with_name("HRM");
        let entry = CharacteristicEntry {
            uuid: BATTERY_LEVEL,
            service_uuid: BATTERY_SERVICE,
            properties: CharacteristicProperties::READ_NOTIFY,
            last_value: Some(vec![42]),
            subscribed: true,
        };
        let services = vec![ServiceEntry {
            uuid: BATTERY_SERVICE,
            characteristics: BTreeMap::from([(BATTERY_LEVEL, entry)]),
        }];
        let summary = DiscoverySummary {
            device: &device,
            services: &services,
            info: None,
            battery: Some(42),
        };

        let text = format_discovery_text(&summary, &DecoderTable::standard(), true);
        assert!(text.starts_with("HRM (AA:BB)\n"));
        assert!(text.contains("Battery: 42%"));
        assert!(text.contains("Service 0x180F"));
        let row = text
            .lines()
            .find(|line| line.contains("0x2A19"))
            .expect("battery level row");
        assert!(row.contains("R-N"));
        assert!(row.contains("yes"));
        assert!(row.contains("battery 42%"));
    }

    #[test]
    fn test_describe_value_decodes_cached_bytes() {
        let decoders = DecoderTable::standard();
        assert_eq!(
            describe_value(&decoders, BATTERY_LEVEL, Some(&[55][..])).as_deref(),
            Some("battery 55%")
        );
        assert_eq!(describe_value(&decoders, BATTERY_LEVEL, None), None);
        let broken = describe_value(&decoders, HEART_RATE_MEASUREMENT, Some(&[0x01, 0x40][..]));
        assert!(broken.unwrap().starts_with("<undecodable"));
    }
}
