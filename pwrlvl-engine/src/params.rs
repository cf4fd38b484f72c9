//! Start parameters.
//!
//! Browser forms send numbers both as JSON numbers and as strings, so the typed getters
//! accept either. Every operation normalises its input into a fresh [`Params`] holding
//! only the keys it uses, with defaults filled in; that normalised map is what the state
//! store records.

use serde_json::{Map, Value};

use pwrlvl_config::validation::{validate_filename, validate_interface, validate_mac};

use crate::error::OperationError;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Non-empty text value. Numbers are rendered as text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }

    /// Raw string value with surrounding whitespace kept; empty strings count as absent.
    pub fn raw_text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// Unsigned integer from a number or a numeric string. Absent or empty values yield
    /// `default`; anything else that does not parse is rejected.
    pub fn number_or(&self, key: &str, default: u64) -> Result<u64, OperationError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .ok_or_else(|| invalid(key, &n.to_string())),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(default),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid(key, s)),
            Some(other) => Err(invalid(key, &other.to_string())),
        }
    }

    pub fn interface_or(&self, key: &str, default: &str) -> Result<String, OperationError> {
        let iface = self.text_or(key, default);
        validate_interface(&iface).map_err(|_| invalid(key, &iface))?;
        Ok(iface)
    }

    pub fn required_mac(&self, key: &str) -> Result<String, OperationError> {
        let mac = self
            .text(key)
            .ok_or_else(|| OperationError::InvalidParams(format!("{key} is required")))?;
        validate_mac(&mac).map_err(|_| invalid(key, &mac))?;
        Ok(mac.to_uppercase())
    }

    pub fn required_filename(&self, key: &str) -> Result<String, OperationError> {
        let name = self
            .text(key)
            .ok_or_else(|| OperationError::InvalidParams(format!("{key} is required")))?;
        validate_filename(&name).map_err(|_| invalid(key, &name))?;
        Ok(name)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn invalid(key: &str, value: &str) -> OperationError {
    OperationError::InvalidParams(format!("invalid {key}: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_accept_strings_and_defaults() {
        let params = Params::from_value(json!({"duration": "45", "count": 3, "channel": ""}));
        assert_eq!(params.number_or("duration", 30).unwrap(), 45);
        assert_eq!(params.number_or("count", 0).unwrap(), 3);
        assert_eq!(params.number_or("channel", 6).unwrap(), 6);
        assert_eq!(params.number_or("missing", 7).unwrap(), 7);
        assert!(params.with("duration", "soon").number_or("duration", 30).is_err());
    }

    #[test]
    fn validates_interfaces_and_macs() {
        let params = Params::from_value(json!({
            "iface": "wlan1",
            "bad": "wlan0; reboot",
            "bssid": "aa:bb:cc:dd:ee:ff"
        }));
        assert_eq!(params.interface_or("iface", "wlan0").unwrap(), "wlan1");
        assert_eq!(params.interface_or("other", "wlan0").unwrap(), "wlan0");
        assert!(params.interface_or("bad", "wlan0").is_err());
        assert_eq!(params.required_mac("bssid").unwrap(), "AA:BB:CC:DD:EE:FF");
        assert!(params.required_mac("missing").is_err());
    }

    #[test]
    fn non_object_bodies_are_empty() {
        assert_eq!(Params::from_value(json!([1, 2])), Params::new());
    }
}
