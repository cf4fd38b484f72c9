//! Access point discovery: airodump-ng CSV polling, or `iw scan` when airodump-ng is missing
//! or produced nothing.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use serde_json::json;

use pwrlvl_core::{EventLevel, ProcessSpec};
use pwrlvl_protocols::{AccessPoint, AirodumpApParser, IwScanParser, OutputParser};

use super::{clear_scratch, csv_path, path_arg};
use crate::context::OperationContext;
use crate::error::OperationError;
use crate::operation::Operation;
use crate::params::Params;
use crate::progress::Tally;
use crate::settings::EngineSettings;

/// Scratch prefix of the airodump-ng CSV dump.
pub const SCAN_PREFIX: &str = "pwrlvl_scan";

const CSV_POLL: Duration = Duration::from_secs(3);
const IW_POLL: Duration = Duration::from_secs(5);

pub struct Scan;

impl Operation for Scan {
    fn name(&self) -> &'static str {
        "scan"
    }

    fn prepare(&self, raw: &Params, settings: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new()
            .with("iface", raw.interface_or("iface", &settings.default_iface)?)
            .with("duration", raw.number_or("duration", 30)?))
    }

    fn accepted(&self, params: &Params) -> String {
        format!("Scan started on {}", params.text_or("iface", ""))
    }

    fn start_event(&self, params: &Params) -> (EventLevel, String) {
        (
            EventLevel::Info,
            format!(
                "Starting WiFi scan on {} for {}s...",
                params.text_or("iface", ""),
                params.text_or("duration", "30")
            ),
        )
    }

    fn error_label(&self) -> &'static str {
        "Scan"
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError> {
        let iface = params.text_or("iface", &ctx.settings().default_iface);
        let duration = Duration::from_secs(params.number_or("duration", 30)?);
        ctx.award(5, "scan started");
        ctx.bump(Tally::Scans);
        ctx.set_field("iface", iface.as_str());

        match ctx.locate(&["airodump-ng"]) {
            Some(airodump) => {
                ctx.publish(EventLevel::Info, format!("Using {}", airodump.display()));
                scan_airodump(ctx, &iface, duration, &airodump)
            }
            None => {
                ctx.publish(
                    EventLevel::Warn,
                    "airodump-ng not found, passive iw scan (no WPA capture)",
                );
                scan_iw(ctx, &iface, duration)
            }
        }
    }
}

fn publish_aps(ctx: &OperationContext, message: String, aps: &[AccessPoint]) {
    ctx.set_result(json!(aps));
    ctx.publish_with(EventLevel::Scan, message, json!({ "aps": aps }));
}

fn scan_airodump(
    ctx: &OperationContext,
    iface: &str,
    duration: Duration,
    airodump: &Path,
) -> Result<(), OperationError> {
    ctx.set_monitor(iface, true);
    ctx.publish(EventLevel::Info, format!("Monitor mode enabled on {iface}"));

    let prefix = ctx.settings().scratch(SCAN_PREFIX);
    clear_scratch(&prefix);
    let csv = csv_path(&prefix);
    let prefix_arg = path_arg(&prefix);

    let spec = ProcessSpec::new(airodump).args([
        "--output-format",
        "csv",
        "--write",
        prefix_arg.as_str(),
        "--write-interval",
        "3",
        iface,
    ]);
    match ctx.spawn(None, spec) {
        Ok(_) => {}
        Err(OperationError::Cancelled) => return Err(OperationError::Cancelled),
        Err(e) => {
            ctx.publish(
                EventLevel::Error,
                format!("airodump-ng launch failed ({}): {e}", airodump.display()),
            );
            ctx.publish(EventLevel::Warn, "Falling back to passive iw scan");
            return scan_iw(ctx, iface, duration);
        }
    }

    let parser = AirodumpApParser::new();
    let deadline = Instant::now() + duration;
    let mut last_count = 0;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || !ctx.sleep(remaining.min(CSV_POLL)) {
            break;
        }
        let Ok(aps) = parser.parse_file(&csv) else {
            continue;
        };
        if aps.len() != last_count {
            if aps.len() > last_count {
                let new_aps = aps.len() - last_count;
                ctx.award(new_aps as u64 * 2, &format!("{new_aps} new APs"));
            }
            last_count = aps.len();
            publish_aps(ctx, format!("Found {} APs", aps.len()), &aps);
        } else {
            ctx.set_result(json!(aps));
        }
    }
    ctx.finish(None);

    match parser.parse_file(&csv) {
        Ok(aps) => {
            publish_aps(ctx, format!("Scan complete: {} APs", aps.len()), &aps);
            Ok(())
        }
        Err(_) => {
            ctx.publish(
                EventLevel::Warn,
                "airodump-ng produced no CSV, trying iw fallback",
            );
            scan_iw(ctx, iface, (duration / 2).max(Duration::from_secs(10)))
        }
    }
}

fn scan_iw(ctx: &OperationContext, iface: &str, duration: Duration) -> Result<(), OperationError> {
    ctx.publish(
        EventLevel::Info,
        format!("iw scan mode on {iface} (passive, no capture)"),
    );
    let parser = IwScanParser::new();
    let mut seen: BTreeMap<String, AccessPoint> = BTreeMap::new();
    let deadline = Instant::now() + duration;

    while Instant::now() < deadline && ctx.is_running() {
        if let Some(out) = ctx.run_short("iw", &["dev", iface, "scan"]) {
            for ap in parser.parse(&out.output) {
                if !ap.bssid.is_empty() {
                    seen.insert(ap.bssid.clone(), ap);
                }
            }
        }
        if !seen.is_empty() {
            let aps: Vec<AccessPoint> = seen.values().cloned().collect();
            publish_aps(ctx, format!("Found {} APs (iw scan)", aps.len()), &aps);
        }
        if !ctx.sleep(IW_POLL) {
            break;
        }
    }

    let aps: Vec<AccessPoint> = seen.into_values().collect();
    publish_aps(ctx, format!("iw scan complete: {} APs", aps.len()), &aps);
    Ok(())
}
