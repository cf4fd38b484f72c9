//! Recognises recovered secrets in `reaver`/`bully` progress output.

use lazy_static::lazy_static;
use regex::Regex;

use crate::OutputParser;

lazy_static! {
    static ref PIN: Regex = Regex::new(r#"(?i)WPS\s+PIN[:\s]+['"]?(\d{4,8})['"]?"#).unwrap();
    static ref PSK: Regex = Regex::new(r#"(?i)WPA\s+PSK[:\s]+['"]?([^'"]+)['"]?"#).unwrap();
}

/// Secrets found on one output line. Both are `None` for ordinary progress lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WpsFinding {
    pub pin: Option<String>,
    pub psk: Option<String>,
}

impl WpsFinding {
    pub fn is_empty(&self) -> bool {
        self.pin.is_none() && self.psk.is_none()
    }
}

/// Line-at-a-time parser; feed it each line as the tool prints it.
#[derive(Default, Debug, Copy, Clone)]
pub struct WpsLineParser;

impl WpsLineParser {
    pub fn new() -> Self {
        Self
    }
}

impl OutputParser for WpsLineParser {
    type Output = WpsFinding;

    fn parse(&self, line: &str) -> WpsFinding {
        WpsFinding {
            pin: PIN.captures(line).map(|caps| caps[1].to_string()),
            psk: PSK.captures(line).map(|caps| caps[1].trim().to_string()),
        }
    }
}
