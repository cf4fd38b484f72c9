//! Classifies `hcxdumptool --enable_status` lines.

use crate::OutputParser;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HcxStatus {
    pub line: String,
    /// The line reports a captured PMKID or EAPOL message.
    pub captured: bool,
}

#[derive(Default, Debug, Copy, Clone)]
pub struct HcxStatusParser;

impl HcxStatusParser {
    pub fn new() -> Self {
        Self
    }
}

impl OutputParser for HcxStatusParser {
    /// `None` for blank lines.
    type Output = Option<HcxStatus>;

    fn parse(&self, raw: &str) -> Option<HcxStatus> {
        let line = raw.trim();
        if line.is_empty() {
            return None;
        }
        let lower = line.to_ascii_lowercase();
        Some(HcxStatus {
            line: line.to_string(),
            captured: lower.contains("pmkid") || lower.contains("eapol"),
        })
    }
}
