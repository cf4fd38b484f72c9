//! Extracts the recovered key from `aircrack-ng -w <wordlist>` output.

use lazy_static::lazy_static;
use regex::Regex;

use crate::OutputParser;

lazy_static! {
    static ref KEY_FOUND: Regex = Regex::new(r"KEY FOUND!\s*\[\s*(.+?)\s*\]").unwrap();
}

#[derive(Default, Debug, Copy, Clone)]
pub struct AircrackParser;

impl AircrackParser {
    pub fn new() -> Self {
        Self
    }
}

impl OutputParser for AircrackParser {
    /// The key, or `None` when the wordlist was exhausted.
    type Output = Option<String>;

    fn parse(&self, raw: &str) -> Option<String> {
        KEY_FOUND.captures(raw).map(|caps| caps[1].to_string())
    }
}
