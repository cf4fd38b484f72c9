//! Parser for the table printed by `wash -i <iface>`.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::OutputParser;

lazy_static! {
    static ref ROW: Regex = Regex::new(
        r"^([0-9a-fA-F:]{17})\s+(\d+)\s+(-?\d+)\s+([\d.]+)\s+(Yes|No)\s+(\S*)\s*(.*)"
    )
    .unwrap();
}

/// A WPS-enabled access point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WpsAccessPoint {
    pub bssid: String,
    pub channel: String,
    pub power: String,
    pub version: String,
    pub locked: bool,
    pub vendor: String,
    pub essid: String,
}

#[derive(Default, Debug, Copy, Clone)]
pub struct WashParser;

impl WashParser {
    pub fn new() -> Self {
        Self
    }
}

impl OutputParser for WashParser {
    type Output = Vec<WpsAccessPoint>;

    fn parse(&self, raw: &str) -> Vec<WpsAccessPoint> {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("BSSID") && !line.starts_with('-'))
            .filter_map(|line| ROW.captures(line))
            .map(|caps| WpsAccessPoint {
                bssid: caps[1].to_string(),
                channel: caps[2].to_string(),
                power: caps[3].to_string(),
                version: caps[4].to_string(),
                locked: &caps[5] == "Yes",
                vendor: caps[6].to_string(),
                essid: caps[7].trim().to_string(),
            })
            .collect()
    }
}
