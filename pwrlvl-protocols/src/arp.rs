//! Parser for the kernel neighbour table in `/proc/net/arp`.

use std::net::Ipv4Addr;

use crate::OutputParser;

/// Addresses with a completed ARP entry (flags other than `0x0`).
#[derive(Default, Debug, Copy, Clone)]
pub struct ArpTableParser;

impl ArpTableParser {
    pub fn new() -> Self {
        Self
    }
}

impl OutputParser for ArpTableParser {
    type Output = Vec<Ipv4Addr>;

    fn parse(&self, raw: &str) -> Vec<Ipv4Addr> {
        raw.lines()
            .skip(1)
            .filter_map(|line| {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() < 4 || parts[2] == "0x0" {
                    return None;
                }
                parts[0].parse().ok()
            })
            .collect()
    }
}
