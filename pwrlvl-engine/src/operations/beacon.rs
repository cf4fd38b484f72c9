//! Beacon flood with mdk4 (or mdk3).

use std::time::Duration;

use pwrlvl_core::{EventLevel, ProcessSpec};

use super::{path_arg, ScratchFile};
use crate::context::OperationContext;
use crate::error::OperationError;
use crate::operation::Operation;
use crate::params::Params;
use crate::settings::EngineSettings;

const WATCH: Duration = Duration::from_secs(1);

pub struct Beacon;

impl Operation for Beacon {
    fn name(&self) -> &'static str {
        "beacon"
    }

    fn prepare(&self, raw: &Params, settings: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new()
            .with("iface", raw.interface_or("iface", &settings.default_iface)?)
            .with("ssids", raw.raw_text("ssids").unwrap_or_default())
            .with("channel", raw.number_or("channel", 6)?))
    }

    fn accepted(&self, params: &Params) -> String {
        format!("Beacon flood started on {}", params.text_or("iface", ""))
    }

    fn start_event(&self, params: &Params) -> (EventLevel, String) {
        (
            EventLevel::Beacon,
            format!(
                "Beacon flood on {} ch{}...",
                params.text_or("iface", ""),
                params.text_or("channel", "6")
            ),
        )
    }

    fn error_label(&self) -> &'static str {
        "Beacon flood"
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError> {
        let iface = params.text_or("iface", &ctx.settings().default_iface);
        let channel = params.number_or("channel", 6)?.to_string();
        let ssids = ssid_list(&params.raw_text("ssids").unwrap_or_default());
        ctx.award(5, "beacon flood");

        let mdk = ctx.require(&["mdk4", "mdk3"])?;
        ctx.set_monitor(&iface, true);

        let mut spec = ProcessSpec::new(mdk).args([iface.as_str(), "b"]);
        let _ssid_file = if ssids.is_empty() {
            None
        } else {
            let file = ScratchFile::write(
                ctx.settings().scratch("pwrlvl_ssids.txt"),
                &format!("{}\n", ssids.join("\n")),
            )?;
            spec = spec.arg("-f").arg(path_arg(file.path()));
            Some(file)
        };
        let handle = ctx.spawn(None, spec.args(["-c", channel.as_str()]))?;

        let count = if ssids.is_empty() {
            "random".to_string()
        } else {
            ssids.len().to_string()
        };
        ctx.publish(
            EventLevel::Beacon,
            format!("Flooding ch{channel} ({count} SSIDs), press STOP"),
        );

        while ctx.sleep(WATCH) {
            if !handle.is_running() {
                ctx.publish(EventLevel::Warn, "mdk exited unexpectedly");
                break;
            }
        }
        ctx.finish(None);
        ctx.publish(EventLevel::Beacon, "Beacon flood stopped");
        Ok(())
    }
}

/// Non-empty, trimmed lines of the submitted SSID list.
fn ssid_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_ssid_list() {
        assert_eq!(ssid_list(" Free WiFi \n\n  Airport\r\n"), vec!["Free WiFi", "Airport"]);
        assert!(ssid_list("\n \n").is_empty());
    }
}
