//! Decoder table mapping characteristic UUIDs to typed samples.
//!
//! Decoding is a pure lookup: the table holds one decoder per characteristic
//! UUID, and values of unregistered characteristics are passed through as
//! [`DecodedSample::Raw`]. New device types extend the table with
//! [`DecoderTable::register`] instead of changing the dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use pulse_types::uuids::{
    BATTERY_LEVEL, HEART_RATE_MEASUREMENT, MANUFACTURER_NAME, MODEL_NUMBER, SERIAL_NUMBER,
};
use pulse_types::{DecodeError, DecodeResult, DecodedSample, HeartRateMeasurement};

/// A decoder for one characteristic.
///
/// Receives the characteristic UUID, the raw value and the observation time.
pub type Decoder =
    Arc<dyn Fn(Uuid, &[u8], OffsetDateTime) -> DecodeResult<DecodedSample> + Send + Sync>;

/// Registration-based lookup from characteristic UUID to decoder.
#[derive(Clone, Default)]
pub struct DecoderTable {
    decoders: HashMap<Uuid, Decoder>,
}

impl DecoderTable {
    /// A table with no decoders; every value decodes as `Raw`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard wearable table:
    ///
    /// | UUID | Sample |
    /// |------|--------|
    /// | 0x2A37 Heart Rate Measurement | [`DecodedSample::HeartRate`] |
    /// | 0x2A19 Battery Level | [`DecodedSample::BatteryLevel`] |
    /// | 0x2A29 / 0x2A24 / 0x2A25 | [`DecodedSample::DeviceInfoString`] |
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table
            .register(HEART_RATE_MEASUREMENT, decode_heart_rate)
            .register(BATTERY_LEVEL, decode_battery_level);
        for uuid in [MANUFACTURER_NAME, MODEL_NUMBER, SERIAL_NUMBER] {
            table.register(uuid, decode_device_info_string);
        }
        table
    }

    /// Register (or replace) the decoder for `uuid`.
    pub fn register<F>(&mut self, uuid: Uuid, decoder: F) -> &mut Self
    where
        F: Fn(Uuid, &[u8], OffsetDateTime) -> DecodeResult<DecodedSample> + Send + Sync + 'static,
    {
        self.decoders.insert(uuid, Arc::new(decoder));
        self
    }

    /// Whether a decoder is registered for `uuid`.
    pub fn is_registered(&self, uuid: &Uuid) -> bool {
        self.decoders.contains_key(uuid)
    }

    /// Registered UUIDs in ascending order.
    pub fn registered(&self) -> Vec<Uuid> {
        let mut uuids: Vec<_> = self.decoders.keys().copied().collect();
        uuids.sort();
        uuids
    }

    /// Decode a value observed now.
    pub fn decode(&self, uuid: Uuid, bytes: &[u8]) -> DecodeResult<DecodedSample> {
        self.decode_at(uuid, bytes, OffsetDateTime::now_utc())
    }

    /// Decode a value observed at `observed_at`.
    ///
    /// # Errors
    ///
    /// Returns the registered decoder's error. Unregistered UUIDs never fail.
    pub fn decode_at(
        &self,
        uuid: Uuid,
        bytes: &[u8],
        observed_at: OffsetDateTime,
    ) -> DecodeResult<DecodedSample> {
        match self.decoders.get(&uuid) {
            Some(decoder) => decoder(uuid, bytes, observed_at),
            None => Ok(DecodedSample::Raw {
                uuid,
                bytes: bytes.to_vec(),
            }),
        }
    }
}

impl fmt::Debug for DecoderTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderTable")
            .field("registered", &self.registered())
            .finish()
    }
}

/// Heart Rate Measurement (0x2A37).
pub fn decode_heart_rate(
    _uuid: Uuid,
    bytes: &[u8],
    observed_at: OffsetDateTime,
) -> DecodeResult<DecodedSample> {
    HeartRateMeasurement::from_bytes(bytes, observed_at).map(DecodedSample::HeartRate)
}

/// Battery Level (0x2A19): the first byte; extra bytes are ignored.
pub fn decode_battery_level(
    _uuid: Uuid,
    bytes: &[u8],
    _observed_at: OffsetDateTime,
) -> DecodeResult<DecodedSample> {
    let percent = *bytes.first().ok_or(DecodeError::Empty)?;
    Ok(DecodedSample::BatteryLevel { percent })
}

/// Device Information strings: the whole buffer as UTF-8, trailing NULs trimmed.
pub fn decode_device_info_string(
    uuid: Uuid,
    bytes: &[u8],
    _observed_at: OffsetDateTime,
) -> DecodeResult<DecodedSample> {
    let text = std::str::from_utf8(bytes)?.trim_end_matches('\0');
    Ok(DecodedSample::DeviceInfoString {
        field_uuid: uuid,
        text: text.to_owned(),
    })
}
