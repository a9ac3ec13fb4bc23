//! Session event model.
//!
//! Every lifecycle transition of a [`DeviceSession`](crate::DeviceSession)
//! publishes exactly one event, and every decoded value is published as a
//! [`SessionEvent::Sample`]. Events are serializable so UI and persistence
//! collaborators can consume them as JSON.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pulse_types::{DecodedSample, Device};

use crate::classify::ErrorKind;
use crate::generation::Generation;

/// Events published on a [`NotificationBus`](crate::NotificationBus).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// Device selection and link establishment started.
    Connecting { generation: Generation },
    /// Link established; discovery is running.
    Connected {
        device: Device,
        generation: Generation,
    },
    /// Discovery finished.
    Ready {
        device: Device,
        generation: Generation,
        /// Number of services in the registry.
        services: usize,
    },
    /// The session returned to `Disconnected`.
    Disconnected {
        #[serde(skip_serializing_if = "Option::is_none")]
        device: Option<Device>,
        reason: DisconnectReason,
        generation: Generation,
    },
    /// A decoded sample.
    Sample {
        /// Source characteristic, absent for synthetic samples.
        #[serde(skip_serializing_if = "Option::is_none")]
        characteristic: Option<Uuid>,
        sample: DecodedSample,
    },
    /// A non-fatal failure observed while the session stays alive.
    Error {
        category: IssueCategory,
        #[serde(skip_serializing_if = "Option::is_none")]
        characteristic: Option<Uuid>,
        message: String,
    },
}

impl SessionEvent {
    /// Stable snake_case name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Connecting { .. } => "connecting",
            SessionEvent::Connected { .. } => "connected",
            SessionEvent::Ready { .. } => "ready",
            SessionEvent::Disconnected { .. } => "disconnected",
            SessionEvent::Sample { .. } => "sample",
            SessionEvent::Error { .. } => "error",
        }
    }

    /// Whether this event marks a state transition.
    pub fn is_transition(&self) -> bool {
        matches!(
            self,
            SessionEvent::Connecting { .. }
                | SessionEvent::Connected { .. }
                | SessionEvent::Ready { .. }
                | SessionEvent::Disconnected { .. }
        )
    }

    /// The sample carried by this event, if any.
    pub fn sample(&self) -> Option<&DecodedSample> {
        match self {
            SessionEvent::Sample { sample, .. } => Some(sample),
            _ => None,
        }
    }

    pub(crate) fn sample_from(characteristic: Uuid, sample: DecodedSample) -> Self {
        SessionEvent::Sample {
            characteristic: Some(characteristic),
            sample,
        }
    }

    pub(crate) fn issue(
        category: IssueCategory,
        characteristic: Option<Uuid>,
        message: impl Into<String>,
    ) -> Self {
        SessionEvent::Error {
            category,
            characteristic,
            message: message.into(),
        }
    }
}

/// Reason for disconnection.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// `disconnect()` was called.
    UserRequested,
    /// The peer or radio dropped the link.
    LinkLost,
    /// The connect attempt failed before the link was up.
    ConnectFailed(ErrorKind),
}

/// Category of a non-fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// Characteristic read or subscription failed during discovery.
    Discovery,
    /// A value did not match its declared wire format.
    Decode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_tag() {
        let event = SessionEvent::Connecting {
            generation: Generation::new(3),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connecting");
        assert_eq!(json["generation"], 3);
    }

    #[test]
    fn test_disconnect_reason_json() {
        let event = SessionEvent::Disconnected {
            device: None,
            reason: DisconnectReason::ConnectFailed(ErrorKind::DeviceNotFound),
            generation: Generation::new(1),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "disconnected");
        assert_eq!(json["reason"]["connect_failed"], "device_not_found");
        assert!(json.get("device").is_none());

        let json = serde_json::to_value(DisconnectReason::LinkLost).unwrap();
        assert_eq!(json, "link_lost");
    }

    #[test]
    fn test_sample_event_round_trip() {
        let event = SessionEvent::sample_from(
            pulse_types::uuids::BATTERY_LEVEL,
            DecodedSample::BatteryLevel { percent: 77 },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(
            back.sample(),
            Some(&DecodedSample::BatteryLevel { percent: 77 })
        );
    }

    #[test]
    fn test_is_transition() {
        assert!(
            SessionEvent::Connecting {
                generation: Generation::ZERO
            }
            .is_transition()
        );
        let issue = SessionEvent::issue(IssueCategory::Decode, None, "bad");
        assert!(!issue.is_transition());
        assert_eq!(issue.name(), "error");
    }
}
