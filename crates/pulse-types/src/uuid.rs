//! Bluetooth SIG assigned GATT UUIDs used by wearables.
//!
//! Standard services and characteristics are 16-bit identifiers expanded onto
//! the Bluetooth base UUID `0000xxxx-0000-1000-8000-00805f9b34fb`.

use uuid::{Uuid, uuid};

/// The Bluetooth base UUID onto which 16-bit identifiers are placed.
pub const BLUETOOTH_BASE: Uuid = uuid!("00000000-0000-1000-8000-00805f9b34fb");

const BASE_LOW_BITS: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;
const LOW_96_MASK: u128 = (1u128 << 96) - 1;

/// Expand a 16-bit assigned number onto the Bluetooth base UUID.
pub const fn from_short(short: u16) -> Uuid {
    Uuid::from_u128(BASE_LOW_BITS | ((short as u128) << 96))
}

/// Return the 16-bit assigned number if `uuid` lies on the Bluetooth base.
pub fn to_short(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if value & LOW_96_MASK == BASE_LOW_BITS && value >> 112 == 0 {
        Some((value >> 96) as u16)
    } else {
        None
    }
}

/// Format a UUID compactly: `0x2A37` for base UUIDs, full form otherwise.
pub fn display_uuid(uuid: &Uuid) -> String {
    match to_short(uuid) {
        Some(short) => format!("0x{:04X}", short),
        None => uuid.to_string(),
    }
}

// --- Service UUIDs ---

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = from_short(0x180A);

/// Heart Rate service.
pub const HEART_RATE_SERVICE: Uuid = from_short(0x180D);

/// Battery service.
pub const BATTERY_SERVICE: Uuid = from_short(0x180F);

/// Blood Pressure service.
pub const BLOOD_PRESSURE_SERVICE: Uuid = from_short(0x1810);

/// Glucose service.
pub const GLUCOSE_SERVICE: Uuid = from_short(0x1813);

// --- Characteristic UUIDs ---

/// Heart Rate Measurement characteristic.
pub const HEART_RATE_MEASUREMENT: Uuid = from_short(0x2A37);

/// Body Sensor Location characteristic.
pub const BODY_SENSOR_LOCATION: Uuid = from_short(0x2A38);

/// Heart Rate Control Point characteristic.
pub const HEART_RATE_CONTROL_POINT: Uuid = from_short(0x2A39);

/// Battery Level characteristic.
pub const BATTERY_LEVEL: Uuid = from_short(0x2A19);

/// Model Number String characteristic.
pub const MODEL_NUMBER: Uuid = from_short(0x2A24);

/// Serial Number String characteristic.
pub const SERIAL_NUMBER: Uuid = from_short(0x2A25);

/// Manufacturer Name String characteristic.
pub const MANUFACTURER_NAME: Uuid = from_short(0x2A29);

/// Services advertised by standard wearables.
pub const WEARABLE_SERVICES: [Uuid; 5] = [
    HEART_RATE_SERVICE,
    DEVICE_INFO_SERVICE,
    BATTERY_SERVICE,
    BLOOD_PRESSURE_SERVICE,
    GLUCOSE_SERVICE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heart_rate_service_uuid() {
        let expected = "0000180d-0000-1000-8000-00805f9b34fb";
        assert_eq!(HEART_RATE_SERVICE.to_string(), expected);
    }

    #[test]
    fn test_battery_service_uuid() {
        let expected = "0000180f-0000-1000-8000-00805f9b34fb";
        assert_eq!(BATTERY_SERVICE.to_string(), expected);
    }

    #[test]
    fn test_device_info_service_uuid() {
        let expected = "0000180a-0000-1000-8000-00805f9b34fb";
        assert_eq!(DEVICE_INFO_SERVICE.to_string(), expected);
    }

    #[test]
    fn test_heart_rate_measurement_uuid() {
        let expected = "00002a37-0000-1000-8000-00805f9b34fb";
        assert_eq!(HEART_RATE_MEASUREMENT.to_string(), expected);
    }

    #[test]
    fn test_battery_level_uuid() {
        let expected = "00002a19-0000-1000-8000-00805f9b34fb";
        assert_eq!(BATTERY_LEVEL.to_string(), expected);
    }

    #[test]
    fn test_device_info_string_uuids() {
        assert_eq!(
            MANUFACTURER_NAME.to_string(),
            "00002a29-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            MODEL_NUMBER.to_string(),
            "00002a24-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            SERIAL_NUMBER.to_string(),
            "00002a25-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_to_short_on_base_uuid() {
        assert_eq!(to_short(&HEART_RATE_MEASUREMENT), Some(0x2A37));
        assert_eq!(to_short(&BATTERY_SERVICE), Some(0x180F));
        assert_eq!(to_short(&BLUETOOTH_BASE), Some(0x0000));
    }

    #[test]
    fn test_to_short_rejects_vendor_uuid() {
        let vendor = uuid!("f0cd1503-95da-4f4b-9ac8-aa55d312af0c");
        assert_eq!(to_short(&vendor), None);
    }

    #[test]
    fn test_to_short_rejects_32_bit_form() {
        let wide = uuid!("12342a37-0000-1000-8000-00805f9b34fb");
        assert_eq!(to_short(&wide), None);
    }

    #[test]
    fn test_display_uuid() {
        assert_eq!(display_uuid(&HEART_RATE_MEASUREMENT), "0x2A37");
        let vendor = uuid!("f0cd1503-95da-4f4b-9ac8-aa55d312af0c");
        assert_eq!(display_uuid(&vendor), vendor.to_string());
    }

    #[test]
    fn test_wearable_services_are_distinct() {
        for (i, a) in WEARABLE_SERVICES.iter().enumerate() {
            for b in &WEARABLE_SERVICES[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
