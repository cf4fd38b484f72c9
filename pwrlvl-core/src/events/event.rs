//! Event records and level tags.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Severity or domain tag of an event. Serialized as the upper-case tag the browser client
/// colours by (`INFO`, `SCAN`, `ROGUEAP`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
    Scan,
    Attack,
    Crack,
    Probe,
    Pmkid,
    Beacon,
    RogueAp,
    Wps,
    Capture,
    NetScan,
    Xp,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "INFO",
            EventLevel::Warn => "WARN",
            EventLevel::Error => "ERROR",
            EventLevel::Scan => "SCAN",
            EventLevel::Attack => "ATTACK",
            EventLevel::Crack => "CRACK",
            EventLevel::Probe => "PROBE",
            EventLevel::Pmkid => "PMKID",
            EventLevel::Beacon => "BEACON",
            EventLevel::RogueAp => "ROGUEAP",
            EventLevel::Wps => "WPS",
            EventLevel::Capture => "CAPTURE",
            EventLevel::NetScan => "NETSCAN",
            EventLevel::Xp => "XP",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Event
///
/// Timestamped progress record. Created by [`crate::EventBus::publish`] and never mutated
/// afterwards; readers only ever receive clones.
///
/// Wire shape: `{"ts": 1700000000.25, "level": "SCAN", "msg": "...", "data": {...}}`,
/// with `data` omitted when there is no payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds since the Unix epoch.
    #[serde(rename = "ts")]
    pub timestamp: f64,
    pub level: EventLevel,
    #[serde(rename = "msg")]
    pub message: String,
    #[serde(rename = "data", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
    /// Position in the bus's publication order. Not part of the wire format.
    #[serde(skip)]
    pub seq: u64,
}

impl Event {
    pub(crate) fn new(seq: u64, level: EventLevel, message: String, payload: Option<Value>) -> Self {
        Self {
            timestamp: now_seconds(),
            level,
            message,
            payload: payload.and_then(into_payload),
            seq,
        }
    }

    /// The event as one JSON object.
    pub fn to_json(&self) -> String {
        // Serializing a struct of strings, numbers and a JSON map cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Non-object payloads are wrapped as `{"value": ...}`; null and empty objects are dropped.
fn into_payload(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        Value::Object(map) => Some(map),
        other => {
            let mut map = Map::new();
            map.insert("value".into(), other);
            Some(map)
        }
    }
}

fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_to_client_shape() {
        let event = Event::new(3, EventLevel::RogueAp, "online".into(), Some(json!({"ip": "192.168.69.1"})));
        let value: Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(value["level"], "ROGUEAP");
        assert_eq!(value["msg"], "online");
        assert_eq!(value["data"]["ip"], "192.168.69.1");
        assert!(value["ts"].as_f64().unwrap() > 1.6e9);
        assert!(value.get("seq").is_none());
    }

    #[test]
    fn omits_empty_payload() {
        let event = Event::new(0, EventLevel::Info, "hello".into(), Some(json!({})));
        let value: Value = serde_json::from_str(&event.to_json()).unwrap();
        assert!(value.get("data").is_none());
    }

    #[test]
    fn wraps_scalar_payload() {
        let event = Event::new(0, EventLevel::Xp, "xp".into(), Some(json!(5)));
        assert_eq!(event.payload.unwrap()["value"], 5);
    }

    #[test]
    fn level_tags_match_serde() {
        for level in [EventLevel::NetScan, EventLevel::RogueAp, EventLevel::Xp, EventLevel::Warn] {
            let tag = serde_json::to_value(level).unwrap();
            assert_eq!(tag, level.as_str());
        }
    }
}
