//! Packet capture to the loot directory with tcpdump.

use std::fs;
use std::time::{Duration, Instant};

use serde_json::json;

use pwrlvl_core::{EventLevel, ProcessSpec};

use super::{path_arg, unix_seconds};
use crate::context::OperationContext;
use crate::error::OperationError;
use crate::loot::file_name;
use crate::operation::Operation;
use crate::params::Params;
use crate::settings::EngineSettings;

const WATCH: Duration = Duration::from_secs(1);

pub struct Capture;

impl Operation for Capture {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn prepare(&self, raw: &Params, settings: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new()
            .with("iface", raw.interface_or("iface", &settings.default_iface)?)
            .with("filter", raw.text_or("filter", ""))
            .with("duration", raw.number_or("duration", 60)?))
    }

    fn accepted(&self, params: &Params) -> String {
        format!("Capture started on {}", params.text_or("iface", ""))
    }

    fn start_event(&self, params: &Params) -> (EventLevel, String) {
        (
            EventLevel::Capture,
            format!(
                "Capturing on {} ({}s)...",
                params.text_or("iface", ""),
                params.text_or("duration", "60")
            ),
        )
    }

    fn error_label(&self) -> &'static str {
        "Capture"
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError> {
        let iface = params.text_or("iface", &ctx.settings().default_iface);
        let filter = params.text_or("filter", "");
        let duration = params.number_or("duration", 60)?;
        ctx.award(5, "packet capture");

        let tcpdump = ctx.require(&["tcpdump"])?;
        let out_file = ctx
            .loot()
            .loot_dir()
            .join(format!("cap_{}.pcap", unix_seconds()));
        let out_arg = path_arg(&out_file);

        // the filter is handed to tcpdump word by word, never to a shell
        let spec = ProcessSpec::new(tcpdump)
            .args(["-i", iface.as_str(), "-w", out_arg.as_str(), "-n", "-s", "0"])
            .args(filter.split_whitespace());
        let handle = ctx.spawn(None, spec)?;

        let name = file_name(&out_file);
        ctx.set_result(json!({ "file": name }));
        ctx.publish(EventLevel::Capture, format!("Writing to {name}"));

        let deadline = (duration > 0).then(|| Instant::now() + Duration::from_secs(duration));
        while ctx.sleep(WATCH) {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }
            if !handle.is_running() {
                ctx.publish(EventLevel::Warn, "tcpdump exited early");
                break;
            }
        }
        ctx.finish(None);

        match fs::metadata(&out_file) {
            Ok(meta) => {
                ctx.set_result(json!({ "file": name, "size": meta.len() }));
                ctx.publish(
                    EventLevel::Capture,
                    format!("Saved: {name} ({} B)", meta.len()),
                );
            }
            Err(_) => ctx.publish(EventLevel::Warn, "No capture file created"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_filter_and_zero_duration() {
        let raw = Params::from_value(json!({"filter": "port 80", "duration": 0}));
        let params = Capture.prepare(&raw, &EngineSettings::default()).unwrap();
        assert_eq!(params.text("filter").as_deref(), Some("port 80"));
        assert_eq!(params.number_or("duration", 60).unwrap(), 0);
        assert_eq!(Capture.start_event(&params).1, "Capturing on wlan0 (0s)...");
    }
}
