//! ## pwrlvl-protocols::airodump
//! Parsers for the `--output-format csv` file written by `airodump-ng`.
//!
//! The file holds two comma-separated tables separated by a blank line: access points
//! first, then stations. Column positions follow the airodump-ng 1.x layout.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::patterns::MAC;
use crate::OutputParser;

/// One row of the access point table. Fields stay textual, exactly as airodump wrote them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AccessPoint {
    pub bssid: String,
    pub essid: String,
    pub channel: String,
    pub power: String,
    pub enc: String,
    pub cipher: String,
    pub auth: String,
    pub beacons: String,
}

/// One row of the station table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Client {
    pub mac: String,
    pub power: String,
    /// `None` when the station is not associated.
    pub bssid: Option<String>,
    /// Probed network names.
    pub ssids: Vec<String>,
    pub last_seen: String,
}

impl Client {
    pub fn is_probing(&self) -> bool {
        !self.ssids.is_empty()
    }
}

/// Splits the file into its blank-line separated tables.
fn sections(raw: &str) -> Vec<Vec<&str>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn columns(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

#[derive(Default, Debug, Copy, Clone)]
pub struct AirodumpApParser;

impl AirodumpApParser {
    pub fn new() -> Self {
        Self
    }
}

impl OutputParser for AirodumpApParser {
    type Output = Vec<AccessPoint>;

    fn parse(&self, raw: &str) -> Vec<AccessPoint> {
        let Some(table) = sections(raw).into_iter().next() else {
            return Vec::new();
        };

        table
            .into_iter()
            .filter_map(|line| {
                let parts = columns(line);
                if parts.len() < 14 || !MAC.is_match(parts[0]) {
                    return None;
                }
                Some(AccessPoint {
                    bssid: parts[0].to_string(),
                    channel: parts[3].to_string(),
                    enc: parts[5].to_string(),
                    cipher: parts[6].to_string(),
                    auth: parts[7].to_string(),
                    power: parts[8].to_string(),
                    beacons: parts[9].to_string(),
                    essid: parts[13].to_string(),
                })
            })
            .collect()
    }
}

#[derive(Default, Debug, Copy, Clone)]
pub struct AirodumpClientParser;

impl AirodumpClientParser {
    pub fn new() -> Self {
        Self
    }
}

impl OutputParser for AirodumpClientParser {
    /// Stations keyed by MAC; a later row for the same MAC replaces the earlier one.
    type Output = BTreeMap<String, Client>;

    fn parse(&self, raw: &str) -> BTreeMap<String, Client> {
        let mut clients = BTreeMap::new();
        let Some(table) = sections(raw).into_iter().nth(1) else {
            return clients;
        };

        for line in table {
            let parts = columns(line);
            if parts.len() < 6 || !MAC.is_match(parts[0]) {
                continue;
            }
            let bssid = match parts[5] {
                "" | "(not associated)" => None,
                other => Some(other.to_string()),
            };
            let ssids = parts[6..]
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();

            let mac = parts[0].to_string();
            clients.insert(
                mac.clone(),
                Client {
                    mac,
                    power: parts[3].to_string(),
                    bssid,
                    ssids,
                    last_seen: parts[2].to_string(),
                },
            );
        }
        clients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CSV: &str = "\r\n\
BSSID, First time seen, Last time seen, channel, Speed, Privacy, Cipher, Authentication, Power, # beacons, # IV, LAN IP, ID-length, ESSID, Key\r\n\
AA:BB:CC:DD:EE:01, 2024-01-01 10:00:00, 2024-01-01 10:00:30,  6,  54, WPA2, CCMP, PSK, -42,      120,        3,   0.  0.  0.  0,   8, HomeNet, \r\n\
AA:BB:CC:DD:EE:02, 2024-01-01 10:00:01, 2024-01-01 10:00:29, 11,  54, OPN,  ,  , -71,       33,        0,   0.  0.  0.  0,   0, , \r\n\
\r\n\
Station MAC, First time seen, Last time seen, Power, # packets, BSSID, Probed ESSIDs\r\n\
11:22:33:44:55:66, 2024-01-01 10:00:02, 2024-01-01 10:00:28, -55,       12, (not associated), CoffeeShop,Airport\r\n\
11:22:33:44:55:77, 2024-01-01 10:00:03, 2024-01-01 10:00:27, -60,        4, AA:BB:CC:DD:EE:01, \r\n";

    #[test]
    fn parses_access_points() {
        let aps = AirodumpApParser::new().parse(CSV);
        assert_eq!(aps.len(), 2);
        assert_eq!(aps[0].bssid, "AA:BB:CC:DD:EE:01");
        assert_eq!(aps[0].channel, "6");
        assert_eq!(aps[0].enc, "WPA2");
        assert_eq!(aps[0].power, "-42");
        assert_eq!(aps[0].beacons, "120");
        assert_eq!(aps[0].essid, "HomeNet");
        assert_eq!(aps[1].essid, "");
    }

    #[test]
    fn parses_clients_and_probes() {
        let clients = AirodumpClientParser::new().parse(CSV);
        assert_eq!(clients.len(), 2);

        let probing = &clients["11:22:33:44:55:66"];
        assert_eq!(probing.bssid, None);
        assert_eq!(probing.ssids, vec!["CoffeeShop", "Airport"]);
        assert!(probing.is_probing());

        let associated = &clients["11:22:33:44:55:77"];
        assert_eq!(associated.bssid.as_deref(), Some("AA:BB:CC:DD:EE:01"));
        assert!(!associated.is_probing());
    }

    #[test]
    fn missing_station_table_yields_no_clients() {
        let ap_only = CSV.split("Station MAC").next().unwrap();
        assert!(AirodumpClientParser::new().parse(ap_only).is_empty());
        assert!(AirodumpApParser::new().parse("").is_empty());
    }

    #[test]
    fn reads_csv_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan-01.csv");
        std::fs::write(&path, CSV).unwrap();
        assert_eq!(AirodumpApParser::new().parse_file(&path).unwrap().len(), 2);
        assert!(AirodumpApParser::new().parse_file(&dir.path().join("missing.csv")).is_err());
    }

    proptest! {
        #[test]
        fn never_panics_on_arbitrary_text(raw in "(?s).{0,512}") {
            let _ = AirodumpApParser::new().parse(&raw);
            let _ = AirodumpClientParser::new().parse(&raw);
        }
    }
}
