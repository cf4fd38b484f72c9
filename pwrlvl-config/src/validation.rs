//! Custom validation functions for configuration and request parameters.
//!
//! Shared by the config tree and by the engine when it checks start parameters.

use std::net::IpAddr;

use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

lazy_static! {
    static ref INTERFACE_RE: Regex = Regex::new("^[a-zA-Z0-9_.-]+$").unwrap();
    static ref MAC_RE: Regex = Regex::new("^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").unwrap();
    static ref FILENAME_RE: Regex = Regex::new(r"^[\w\-.]+$").unwrap();
}

/// Validate that an interface name follows Linux naming conventions.
pub fn validate_interface(name: &str) -> Result<(), ValidationError> {
    let valid = !name.is_empty() && name.len() <= 15 && INTERFACE_RE.is_match(name);
    if valid && name != "." && name != ".." {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_interface"))
    }
}

/// Validate a colon-separated MAC address such as a BSSID.
pub fn validate_mac(mac: &str) -> Result<(), ValidationError> {
    if MAC_RE.is_match(mac) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_mac"))
    }
}

/// Validate a client-supplied file name: word characters, dash and dot only.
pub fn validate_filename(name: &str) -> Result<(), ValidationError> {
    if FILENAME_RE.is_match(name) && name != "." && name != ".." {
        Ok(())
    } else {
        Err(ValidationError::new("unsafe_filename"))
    }
}

/// Validate the listener bind address.
pub fn validate_bind_addr(addr: &str) -> Result<(), ValidationError> {
    addr.parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_bind_addr"))
}

/// Validate a default log level.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"].contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}
