//! Parser for the dnsmasq lease file (`<expiry> <mac> <ip> <hostname> <client-id>`).

use serde::Serialize;

use crate::OutputParser;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DhcpLease {
    pub mac: String,
    pub ip: String,
    pub hostname: String,
}

#[derive(Default, Debug, Copy, Clone)]
pub struct LeaseParser;

impl LeaseParser {
    pub fn new() -> Self {
        Self
    }
}

impl OutputParser for LeaseParser {
    type Output = Vec<DhcpLease>;

    fn parse(&self, raw: &str) -> Vec<DhcpLease> {
        raw.lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let _expiry = parts.next()?;
                let mac = parts.next()?;
                let ip = parts.next()?;
                Some(DhcpLease {
                    mac: mac.to_string(),
                    ip: ip.to_string(),
                    hostname: parts.next().unwrap_or_default().to_string(),
                })
            })
            .collect()
    }
}
