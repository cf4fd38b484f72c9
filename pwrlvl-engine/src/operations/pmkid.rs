//! Clientless PMKID capture with hcxdumptool.

use std::fs;
use std::time::{Duration, Instant};

use serde_json::json;

use pwrlvl_core::{EventLevel, LineEvent, ProcessSpec};
use pwrlvl_protocols::{HcxStatusParser, OutputParser};

use super::{path_arg, unix_seconds};
use crate::context::OperationContext;
use crate::error::OperationError;
use crate::loot::file_name;
use crate::operation::Operation;
use crate::params::Params;
use crate::settings::EngineSettings;

pub struct Pmkid;

impl Operation for Pmkid {
    fn name(&self) -> &'static str {
        "pmkid"
    }

    fn prepare(&self, raw: &Params, settings: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new()
            .with("iface", raw.interface_or("iface", &settings.default_iface)?)
            .with("duration", raw.number_or("duration", 60)?))
    }

    fn accepted(&self, params: &Params) -> String {
        format!("PMKID capture started on {}", params.text_or("iface", ""))
    }

    fn start_event(&self, params: &Params) -> (EventLevel, String) {
        (
            EventLevel::Info,
            format!(
                "PMKID capture on {} for {}s...",
                params.text_or("iface", ""),
                params.text_or("duration", "60")
            ),
        )
    }

    fn error_label(&self) -> &'static str {
        "PMKID"
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError> {
        let iface = params.text_or("iface", &ctx.settings().default_iface);
        let duration = Duration::from_secs(params.number_or("duration", 60)?);
        ctx.award(5, "PMKID capture");

        let hcx = ctx.require(&["hcxdumptool"])?;
        let out_file = ctx
            .loot()
            .handshake_dir()
            .join(format!("pmkid_{}.pcapng", unix_seconds()));

        // hcxdumptool puts the interface into monitor mode itself
        ctx.set_monitor(&iface, false);
        ctx.sleep(Duration::from_millis(500));

        let out_arg = path_arg(&out_file);
        let handle = ctx.spawn(
            None,
            ProcessSpec::new(hcx)
                .args(["-i", iface.as_str(), "-o", out_arg.as_str(), "--enable_status=3"])
                .capture_lines(),
        )?;

        let parser = HcxStatusParser::new();
        let deadline = Instant::now() + duration;
        if let Some(lines) = handle.take_lines() {
            while ctx.is_running() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match lines.next_line(remaining.min(ctx.settings().poll_interval)) {
                    LineEvent::Line(line) => {
                        let Some(status) = parser.parse(&line) else {
                            continue;
                        };
                        ctx.publish(EventLevel::Pmkid, status.line.as_str());
                        if status.captured {
                            ctx.award(75, "PMKID/EAPOL captured");
                        }
                    }
                    LineEvent::Idle => {}
                    LineEvent::Closed => break,
                }
            }
        }
        ctx.finish(None);

        match fs::metadata(&out_file) {
            Ok(meta) => {
                let name = file_name(&out_file);
                ctx.set_result(json!({ "file": name, "size": meta.len() }));
                ctx.publish(
                    EventLevel::Pmkid,
                    format!("Saved: {name} ({} B)", meta.len()),
                );
            }
            Err(_) => ctx.publish(EventLevel::Warn, "No capture file produced"),
        }
        Ok(())
    }
}
