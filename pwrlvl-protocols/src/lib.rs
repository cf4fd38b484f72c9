//! # pwrlvl Tool Output Parsers
//!
//! Turns the text and CSV written by external wireless tools into structured records.
//! Every parser implements [`OutputParser`], so routines depend on the interface and
//! not on any one tool's format. Parsing is lenient: lines that do not match are skipped.

use std::fs;
use std::path::Path;

pub mod aircrack;
pub mod airodump;
pub mod arp;
pub mod dnsmasq;
mod error;
pub mod hcxdumptool;
pub mod iw;
pub mod reaver;
pub mod wash;

pub use aircrack::AircrackParser;
pub use airodump::{AccessPoint, AirodumpApParser, AirodumpClientParser, Client};
pub use arp::ArpTableParser;
pub use dnsmasq::{DhcpLease, LeaseParser};
pub use error::ParseError;
pub use hcxdumptool::{HcxStatus, HcxStatusParser};
pub use iw::{IwDevParser, IwScanParser};
pub use reaver::{WpsFinding, WpsLineParser};
pub use wash::{WashParser, WpsAccessPoint};

/// A parser from raw tool output to a structured value.
pub trait OutputParser {
    type Output;

    fn parse(&self, raw: &str) -> Self::Output;

    /// Parses a file the tool wrote. Invalid UTF-8 is replaced, not rejected.
    fn parse_file(&self, path: &Path) -> Result<Self::Output, ParseError> {
        let bytes = fs::read(path).map_err(|source| ParseError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.parse(&String::from_utf8_lossy(&bytes)))
    }
}

pub(crate) mod patterns {
    use lazy_static::lazy_static;
    use regex::Regex;

    lazy_static! {
        pub static ref MAC: Regex = Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}").unwrap();
    }
}
