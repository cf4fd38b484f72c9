//! Probe request sniffer: tracks client stations and the networks they ask for.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::json;

use pwrlvl_core::{EventLevel, ProcessSpec};
use pwrlvl_protocols::{AirodumpClientParser, Client, OutputParser};

use super::{clear_scratch, csv_path, path_arg};
use crate::context::OperationContext;
use crate::error::OperationError;
use crate::operation::Operation;
use crate::params::Params;
use crate::settings::EngineSettings;

/// Scratch prefix of the probe sniffer's CSV dump.
pub const PROBE_PREFIX: &str = "pwrlvl_probe";

const CSV_POLL: Duration = Duration::from_secs(3);

pub struct Probe;

impl Operation for Probe {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn prepare(&self, raw: &Params, settings: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new()
            .with("iface", raw.interface_or("iface", &settings.default_iface)?)
            .with("duration", raw.number_or("duration", 60)?))
    }

    fn accepted(&self, params: &Params) -> String {
        format!("Probe scan started on {}", params.text_or("iface", ""))
    }

    fn start_event(&self, params: &Params) -> (EventLevel, String) {
        (
            EventLevel::Info,
            format!(
                "Probe scan on {} for {}s...",
                params.text_or("iface", ""),
                params.text_or("duration", "60")
            ),
        )
    }

    fn error_label(&self) -> &'static str {
        "Probe scan"
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError> {
        let iface = params.text_or("iface", &ctx.settings().default_iface);
        let duration = Duration::from_secs(params.number_or("duration", 60)?);
        ctx.award(5, "probe scan");

        let airodump = ctx.require(&["airodump-ng"])?;
        ctx.set_monitor(&iface, true);

        let prefix = ctx.settings().scratch(PROBE_PREFIX);
        clear_scratch(&prefix);
        let csv = csv_path(&prefix);
        let prefix_arg = path_arg(&prefix);
        ctx.spawn(
            None,
            ProcessSpec::new(airodump).args([
                "--output-format",
                "csv",
                "--write",
                prefix_arg.as_str(),
                "--write-interval",
                "2",
                iface.as_str(),
            ]),
        )?;

        let parser = AirodumpClientParser::new();
        let deadline = Instant::now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !ctx.sleep(remaining.min(CSV_POLL)) {
                break;
            }
            if let Ok(clients) = parser.parse_file(&csv) {
                ctx.set_result(json!(clients));
                let probing = probing(&clients);
                if !probing.is_empty() {
                    ctx.publish_with(
                        EventLevel::Probe,
                        format!("{} probing devices ({} total)", probing.len(), clients.len()),
                        json!({ "probes": probing }),
                    );
                }
            }
        }
        ctx.finish(None);

        let clients = parser.parse_file(&csv).unwrap_or_default();
        ctx.set_result(json!(clients));
        let probing = probing(&clients);
        ctx.publish_with(
            EventLevel::Probe,
            format!("Done: {} probing, {} total", probing.len(), clients.len()),
            json!({ "probes": probing }),
        );
        if !probing.is_empty() {
            ctx.award(probing.len() as u64, "probe records");
        }
        Ok(())
    }
}

fn probing(clients: &BTreeMap<String, Client>) -> Vec<&Client> {
    clients.values().filter(|c| c.is_probing()).collect()
}
