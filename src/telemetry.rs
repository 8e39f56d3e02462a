//! Outbound telemetry
//!
//! Button clicks and finished replays are wrapped in an envelope stamped with
//! the unit tag and send time, then handed to a [`ReplayTransport`]. Delivery
//! and retries are the transport's business.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::platform::{datetime_human, epoch_millis};
use crate::settings::{
    Group, UnitSettings, deserialize_group, deserialize_unit_number, unknown_unit_number,
};
use crate::sim::{FinishedReplay, Gains};

/// Which control was pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Start,
    Stop,
}

/// Payload variants, discriminated by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TelemetryMessage {
    /// Gains are absent in clicks from older clients
    Click {
        button: Button,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        p: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        i: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        d: Option<f64>,
    },
    Replay {
        replay: FinishedReplay,
    },
}

impl TelemetryMessage {
    pub fn click(button: Button, gains: Gains) -> Self {
        TelemetryMessage::Click {
            button,
            p: Some(gains.p),
            i: Some(gains.i),
            d: Some(gains.d),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryMessage::Click { .. } => "click",
            TelemetryMessage::Replay { .. } => "replay",
        }
    }
}

/// A message plus the unit tag and send time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(flatten)]
    pub message: TelemetryMessage,
    #[serde(default = "unknown_unit_number", deserialize_with = "deserialize_unit_number")]
    pub unit_number: i64,
    #[serde(default, deserialize_with = "deserialize_group")]
    pub group: Option<Group>,
    #[serde(default)]
    pub datetime: i64,
    #[serde(default)]
    pub datetime_human: String,
}

impl Envelope {
    pub fn new(message: TelemetryMessage, unit: &UnitSettings, at: &DateTime<FixedOffset>) -> Self {
        Self {
            message,
            unit_number: unit.unit_number,
            group: unit.group,
            datetime: epoch_millis(at),
            datetime_human: datetime_human(at),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Delivers envelopes to the collector
pub trait ReplayTransport {
    fn send(&mut self, envelope: Envelope);
}

/// Writes each payload to the log instead of the network
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

impl ReplayTransport for LogTransport {
    fn send(&mut self, envelope: Envelope) {
        match envelope.to_json() {
            Ok(json) => log::info!("Sending message to backend: {}", json),
            Err(e) => log::error!("Failed to encode {} message: {}", envelope.message.kind(), e),
        }
    }
}

/// Decode a payload the way the collector does
///
/// Every `click` or `replay` is kept, including clicks without gains and
/// unit numbers sent as text. Unknown `type` values are logged and ignored
/// rather than rejected.
pub fn decode_collector_message(json: &str) -> Option<Envelope> {
    let value: Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Ignoring unparseable telemetry: {}", e);
            return None;
        }
    };

    match value.get("type").and_then(Value::as_str) {
        Some("click") | Some("replay") => match serde_json::from_value(value) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                log::warn!("Ignoring malformed telemetry: {}", e);
                None
            }
        },
        other => {
            log::warn!("Ignoring telemetry with unknown type {:?}", other);
            None
        }
    }
}
