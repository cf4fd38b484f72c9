//! Interface helpers shared by the wireless operations and the status route.

use std::time::Duration;

use pwrlvl_protocols::{IwDevParser, OutputParser};

use crate::tools::{run_command, ToolLocator};

/// Switches `iface` between monitor and managed mode (down, set type, up). Best effort:
/// missing tools or failing steps are ignored, as the following tool launch reports the
/// real problem.
pub fn set_monitor(tools: &ToolLocator, iface: &str, enable: bool, timeout: Duration) {
    let mode = if enable { "monitor" } else { "managed" };
    run_helper(tools, "ip", &["link", "set", iface, "down"], timeout);
    run_helper(tools, "iw", &[iface, "set", "type", mode], timeout);
    run_helper(tools, "ip", &["link", "set", iface, "up"], timeout);
}

pub fn set_channel(tools: &ToolLocator, iface: &str, channel: u64, timeout: Duration) {
    let channel = channel.to_string();
    run_helper(tools, "iw", &[iface, "set", "channel", &channel], timeout);
}

/// Wireless interface names from `iw dev`, falling back to `iwconfig`.
pub fn list_interfaces(tools: &ToolLocator, timeout: Duration) -> Vec<String> {
    let parser = IwDevParser::new();
    let from_iw = run_helper(tools, "iw", &["dev"], timeout)
        .map(|out| parser.parse(&out))
        .unwrap_or_default();
    if !from_iw.is_empty() {
        return from_iw;
    }
    run_helper(tools, "iwconfig", &[], timeout)
        .map(|out| parser.parse_iwconfig(&out))
        .unwrap_or_default()
}

fn run_helper(tools: &ToolLocator, program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let path = tools.locate(program)?;
    run_command(&path, args, timeout).ok().map(|out| out.output)
}
