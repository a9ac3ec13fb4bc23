//! Device selection filters.
//!
//! A [`DeviceSelector`] is configuration, not protocol logic: it decides which
//! advertising peripheral the session connects to. An empty selector accepts
//! every device.

use uuid::Uuid;

use pulse_types::uuids::WEARABLE_SERVICES;

/// Name prefixes used by common wearable vendors.
pub const WEARABLE_NAME_PREFIXES: [&str; 4] = ["Fitbit", "Garmin", "Apple", "Samsung"];

const NULL_ADDRESS: &str = "00:00:00:00:00:00";

/// What a peripheral advertised during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Advertisement {
    /// Platform peripheral identifier.
    pub id: String,
    /// Bluetooth address; all zeros on platforms that hide it.
    pub address: Option<String>,
    pub name: Option<String>,
    /// Advertised service UUIDs.
    pub services: Vec<Uuid>,
    pub rssi: Option<i16>,
}

/// Filter for device selection.
///
/// A device matches when it advertises any listed service or its name starts
/// with any listed prefix. With neither list set, every device matches. An
/// `identifier` narrows the match further to one peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceSelector {
    pub services: Vec<Uuid>,
    /// Case-sensitive name prefixes.
    pub name_prefixes: Vec<String>,
    /// Peripheral id, address, or case-insensitive name substring.
    pub identifier: Option<String>,
}

impl DeviceSelector {
    /// Accept any device and explore all of its services.
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Standard wearables: Heart Rate, Device Information, Battery, Blood
    /// Pressure or Glucose service, or a known vendor name prefix.
    pub fn wearables() -> Self {
        Self {
            services: WEARABLE_SERVICES.to_vec(),
            name_prefixes: WEARABLE_NAME_PREFIXES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            identifier: None,
        }
    }

    /// Add an advertised service to accept.
    #[must_use]
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.services.push(service);
        self
    }

    /// Add a name prefix to accept.
    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefixes.push(prefix.into());
        self
    }

    /// Restrict selection to one peripheral.
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Whether the service and name filters are both empty.
    pub fn is_accept_all(&self) -> bool {
        self.services.is_empty() && self.name_prefixes.is_empty()
    }

    /// Check an advertisement against this selector.
    pub fn matches(&self, adv: &Advertisement) -> bool {
        if let Some(identifier) = &self.identifier
            && !matches_identifier(adv, identifier)
        {
            return false;
        }

        if self.is_accept_all() {
            return true;
        }

        let by_service = adv.services.iter().any(|s| self.services.contains(s));
        let by_name = adv.name.as_deref().is_some_and(|name| {
            self.name_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
        });
        by_service || by_name
    }
}

/// Match by peripheral id, address (with or without colons) or name substring.
fn matches_identifier(adv: &Advertisement, identifier: &str) -> bool {
    let identifier = identifier.to_lowercase();

    if adv.id.to_lowercase() == identifier {
        return true;
    }

    if let Some(address) = &adv.address {
        let address = address.to_lowercase();
        if address != NULL_ADDRESS
            && (address == identifier || address.replace(':', "") == identifier.replace(':', ""))
        {
            return true;
        }
    }

    adv.name
        .as_deref()
        .is_some_and(|name| name.to_lowercase().contains(&identifier))
}
