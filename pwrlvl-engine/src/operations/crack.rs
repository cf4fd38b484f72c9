//! Dictionary attack on a captured handshake with aircrack-ng.

use std::path::Path;
use std::time::{Duration, Instant};

use serde_json::json;

use pwrlvl_core::{EventLevel, LineEvent, ProcessSpec};
use pwrlvl_protocols::{AircrackParser, OutputParser};

use super::path_arg;
use crate::context::OperationContext;
use crate::error::OperationError;
use crate::operation::Operation;
use crate::params::Params;
use crate::progress::Tally;
use crate::settings::EngineSettings;

pub const DEFAULT_WORDLIST: &str = "/usr/share/wordlists/rockyou.txt";
const CRACK_TIMEOUT: Duration = Duration::from_secs(300);

pub struct Crack;

impl Operation for Crack {
    fn name(&self) -> &'static str {
        "crack"
    }

    fn prepare(&self, raw: &Params, _settings: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new()
            .with("file", raw.required_filename("file")?)
            .with("wordlist", raw.text_or("wordlist", DEFAULT_WORDLIST)))
    }

    fn accepted(&self, params: &Params) -> String {
        format!("Cracking {}...", params.text_or("file", ""))
    }

    fn start_event(&self, params: &Params) -> (EventLevel, String) {
        (
            EventLevel::Crack,
            format!("Starting aircrack-ng on {}...", params.text_or("file", "")),
        )
    }

    fn error_label(&self) -> &'static str {
        "Crack"
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError> {
        let file = params.text_or("file", "");
        let wordlist = params.text_or("wordlist", DEFAULT_WORDLIST);

        let capture = ctx.loot().handshake_dir().join(&file);
        if !capture.is_file() {
            return Err(OperationError::ProcessFailure(format!("File not found: {file}")));
        }
        if !Path::new(&wordlist).is_file() {
            return Err(OperationError::ProcessFailure(format!(
                "Wordlist not found: {wordlist}"
            )));
        }
        let aircrack = ctx.require(&["aircrack-ng"])?;

        let capture_arg = path_arg(&capture);
        let handle = ctx.spawn(
            None,
            ProcessSpec::new(aircrack)
                .args(["-w", wordlist.as_str(), capture_arg.as_str()])
                .capture_lines(),
        )?;

        let mut output = String::new();
        let deadline = Instant::now() + CRACK_TIMEOUT;
        if let Some(lines) = handle.take_lines() {
            loop {
                ctx.ensure_running()?;
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    ctx.finish(None);
                    ctx.publish(
                        EventLevel::Crack,
                        format!("Crack timed out ({}s)", CRACK_TIMEOUT.as_secs()),
                    );
                    return Ok(());
                }
                match lines.next_line(remaining.min(ctx.settings().poll_interval)) {
                    LineEvent::Line(line) => {
                        output.push_str(&line);
                        output.push('\n');
                    }
                    LineEvent::Idle => {}
                    LineEvent::Closed => break,
                }
            }
        }
        ctx.finish(None);

        match AircrackParser::new().parse(&output) {
            Some(key) => {
                ctx.set_result(json!({ "file": file, "key": key }));
                ctx.award(200, "password cracked");
                ctx.bump(Tally::Cracks);
                ctx.publish_with(
                    EventLevel::Crack,
                    format!("PASSWORD FOUND: {key}"),
                    json!({ "key": key, "file": file }),
                );
                ctx.loot()
                    .record_cracked(&file, &key)
                    .map_err(|e| OperationError::ProcessFailure(e.to_string()))?;
            }
            None => {
                ctx.set_result(json!({ "file": file, "key": null }));
                ctx.publish(EventLevel::Crack, "Password not in wordlist");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_wordlist() {
        let raw = Params::from_value(json!({"file": "cap_AABB-01.cap"}));
        let params = Crack.prepare(&raw, &EngineSettings::default()).unwrap();
        assert_eq!(params.text("wordlist").as_deref(), Some(DEFAULT_WORDLIST));
        assert_eq!(Crack.accepted(&params), "Cracking cap_AABB-01.cap...");
    }

    #[test]
    fn rejects_path_in_file_name() {
        let raw = Params::from_value(json!({"file": "../../etc/shadow"}));
        assert!(Crack.prepare(&raw, &EngineSettings::default()).is_err());
    }
}
