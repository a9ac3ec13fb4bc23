//! Core types for wearable telemetry.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{DecodeError, DecodeResult};

/// A peripheral selected for a session.
///
/// `id` is assigned by the platform and stays stable for the lifetime of the
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Device {
    /// Platform-assigned identifier.
    pub id: String,
    /// Advertised display name, if any.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
}

impl Device {
    /// Create a device handle without a display name.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Attach a display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Capability flags of a GATT characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    /// Notify or indicate.
    pub notify: bool,
}

impl CharacteristicProperties {
    /// Readable-only characteristic.
    pub const READ: Self = Self {
        read: true,
        write: false,
        notify: false,
    };

    /// Notify-only characteristic.
    pub const NOTIFY: Self = Self {
        read: false,
        write: false,
        notify: true,
    };

    /// Readable and notifiable characteristic.
    pub const READ_NOTIFY: Self = Self {
        read: true,
        write: false,
        notify: true,
    };

    /// Short flag string such as `RWN` or `R--`.
    pub fn flags(&self) -> String {
        let mut s = String::with_capacity(3);
        s.push(if self.read { 'R' } else { '-' });
        s.push(if self.write { 'W' } else { '-' });
        s.push(if self.notify { 'N' } else { '-' });
        s
    }
}

impl fmt::Display for CharacteristicProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flags())
    }
}

/// Lifecycle state of a device session.
///
/// There is no error state: failures are reported as events and the session
/// falls back to [`SessionState::Disconnected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SessionState {
    #[default]
    Disconnected,
    /// Selecting a device and establishing the link.
    Connecting,
    /// Link established, walking services and characteristics.
    Discovering,
    /// Discovery finished; samples are flowing.
    Ready,
}

impl SessionState {
    /// Whether the link is up (discovering or ready).
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Discovering | Self::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Discovering => "connected (discovering)",
            SessionState::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// Heart Rate Measurement flag: bpm is a `u16` instead of a `u8`.
pub const HR_FLAG_VALUE_U16: u8 = 0x01;
/// Heart Rate Measurement flag: skin contact detected.
pub const HR_FLAG_CONTACT_DETECTED: u8 = 0x02;
/// Heart Rate Measurement flag: contact detection supported.
pub const HR_FLAG_CONTACT_SUPPORTED: u8 = 0x04;
/// Heart Rate Measurement flag: energy expended field present.
pub const HR_FLAG_ENERGY_EXPENDED: u8 = 0x08;
/// Heart Rate Measurement flag: RR intervals follow.
pub const HR_FLAG_RR_INTERVALS: u8 = 0x10;

/// A decoded Heart Rate Measurement (0x2A37).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeartRateMeasurement {
    /// Beats per minute.
    pub bpm: u16,
    pub contact_detected: bool,
    pub contact_supported: bool,
    /// Cumulative energy expended in kilojoules, if reported.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub energy_expended: Option<u16>,
    /// RR intervals in 1/1024 s units, in wire order.
    pub rr_intervals: Vec<u16>,
    /// When the value was observed by the central.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub observed_at: OffsetDateTime,
}

impl HeartRateMeasurement {
    /// Decode a Heart Rate Measurement value.
    ///
    /// The byte format is:
    /// - byte 0: flags
    /// - bpm: `u8`, or `u16` LE when bit 0 is set
    /// - energy expended: `u16` LE, present when bit 3 is set
    /// - RR intervals: remaining bytes as `u16` LE chunks when bit 4 is set
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Empty`] for an empty buffer,
    /// [`DecodeError::Truncated`] if the buffer is shorter than its flags
    /// require, and [`DecodeError::OddRrIntervalBytes`] if the RR payload has a
    /// dangling byte.
    #[must_use = "decoding returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8], observed_at: OffsetDateTime) -> DecodeResult<Self> {
        use bytes::Buf;

        let Some((&flags, _)) = data.split_first() else {
            return Err(DecodeError::Empty);
        };

        let wide = flags & HR_FLAG_VALUE_U16 != 0;
        let has_energy = flags & HR_FLAG_ENERGY_EXPENDED != 0;
        let required = 1 + if wide { 2 } else { 1 } + if has_energy { 2 } else { 0 };
        if data.len() < required {
            return Err(DecodeError::truncated(required, data.len()));
        }

        let mut buf = &data[1..];
        let bpm = if wide {
            buf.get_u16_le()
        } else {
            u16::from(buf.get_u8())
        };
        let energy_expended = has_energy.then(|| buf.get_u16_le());

        let rr_intervals = if flags & HR_FLAG_RR_INTERVALS != 0 {
            if buf.remaining() % 2 != 0 {
                return Err(DecodeError::OddRrIntervalBytes {
                    remaining: buf.remaining(),
                });
            }
            let mut rr = Vec::with_capacity(buf.remaining() / 2);
            while buf.has_remaining() {
                rr.push(buf.get_u16_le());
            }
            rr
        } else {
            Vec::new()
        };

        Ok(Self {
            bpm,
            contact_detected: flags & HR_FLAG_CONTACT_DETECTED != 0,
            contact_supported: flags & HR_FLAG_CONTACT_SUPPORTED != 0,
            energy_expended,
            rr_intervals,
            observed_at,
        })
    }
}

/// A typed sample produced from a characteristic value or a synthetic source.
///
/// This enum is marked `#[non_exhaustive]` so new sample kinds can be added
/// without breaking downstream matches.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
#[non_exhaustive]
pub enum DecodedSample {
    HeartRate(HeartRateMeasurement),
    BatteryLevel {
        percent: u8,
    },
    /// One of the Device Information string characteristics.
    DeviceInfoString {
        field_uuid: Uuid,
        text: String,
    },
    /// A value with no registered decoder.
    Raw {
        uuid: Uuid,
        bytes: Vec<u8>,
    },
    Steps {
        count: u32,
        distance_km: f32,
        calories: u32,
    },
    OxygenSaturation {
        percent: f32,
        confidence: u8,
    },
}

impl DecodedSample {
    /// Stable snake_case name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedSample::HeartRate(_) => "heart_rate",
            DecodedSample::BatteryLevel { .. } => "battery_level",
            DecodedSample::DeviceInfoString { .. } => "device_info_string",
            DecodedSample::Raw { .. } => "raw",
            DecodedSample::Steps { .. } => "steps",
            DecodedSample::OxygenSaturation { .. } => "oxygen_saturation",
        }
    }
}

impl fmt::Display for DecodedSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedSample::HeartRate(hr) => {
                write!(f, "heart rate {} bpm", hr.bpm)?;
                if hr.contact_supported {
                    let contact = if hr.contact_detected { "on" } else { "off" };
                    write!(f, ", contact {contact}")?;
                }
                if let Some(energy) = hr.energy_expended {
                    write!(f, ", energy {energy} kJ")?;
                }
                if !hr.rr_intervals.is_empty() {
                    write!(f, ", rr {:?}", hr.rr_intervals)?;
                }
                Ok(())
            }
            DecodedSample::BatteryLevel { percent } => write!(f, "battery {percent}%"),
            DecodedSample::DeviceInfoString { field_uuid, text } => {
                write!(f, "{} = {:?}", crate::uuid::display_uuid(field_uuid), text)
            }
            DecodedSample::Raw { uuid, bytes } => {
                write!(f, "{} raw [", crate::uuid::display_uuid(uuid))?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{b:02X}")?;
                }
                f.write_str("]")
            }
            DecodedSample::Steps {
                count,
                distance_km,
                calories,
            } => write!(
                f,
                "steps {count}, distance {distance_km:.2} km, calories {calories}"
            ),
            DecodedSample::OxygenSaturation {
                percent,
                confidence,
            } => write!(f, "SpO2 {percent:.1}% (confidence {confidence}%)"),
        }
    }
}

/// Device Information service strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceInfo {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub manufacturer: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub model: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub serial: Option<String>,
}

impl DeviceInfo {
    /// True when no field was populated.
    pub fn is_empty(&self) -> bool {
        self.manufacturer.is_none() && self.model.is_none() && self.serial.is_none()
    }
}
