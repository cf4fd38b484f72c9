//! In-process TCP connect scan with banner grabbing.
//!
//! A single host is scanned with a pool of workers; a subnet is first narrowed down with the
//! kernel ARP table, falling back to the first few addresses when the table has nothing.

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use ipnetwork::Ipv4Network;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use serde_json::json;

use pwrlvl_core::EventLevel;
use pwrlvl_protocols::{ArpTableParser, OutputParser};

use crate::context::OperationContext;
use crate::error::OperationError;
use crate::operation::Operation;
use crate::params::Params;
use crate::progress::Tally;
use crate::settings::EngineSettings;

const COMMON_PORTS: [(u16, &str); 18] = [
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (3306, "MySQL"),
    (5432, "PostgreSQL"),
    (6379, "Redis"),
    (8080, "HTTP-Alt"),
    (8443, "HTTPS-Alt"),
    (27017, "MongoDB"),
    (5900, "VNC"),
    (3389, "RDP"),
];
const QUICK_PORTS: [u16; 8] = [21, 22, 23, 80, 443, 445, 3306, 8080];

const CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);
const BANNER_TIMEOUT: Duration = Duration::from_secs(3);
const BANNER_BYTES: usize = 256;
const BANNER_CHARS: usize = 120;
const WORKERS: usize = 20;
const FALLBACK_HOSTS: u8 = 9;
const ARP_TABLE: &str = "/proc/net/arp";

lazy_static! {
    static ref HOSTNAME: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.-]{0,252}$").unwrap();
    static ref PORT_RANGE: Regex = Regex::new(r"^(\d{1,5})-(\d{1,5})$").unwrap();
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OpenPort {
    pub port: u16,
    pub service: &'static str,
    pub banner: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HostReport {
    pub host: String,
    pub ports: Vec<OpenPort>,
}

pub struct NetScan;

impl Operation for NetScan {
    fn name(&self) -> &'static str {
        "netscan"
    }

    fn prepare(&self, raw: &Params, _settings: &EngineSettings) -> Result<Params, OperationError> {
        let target = raw
            .text("target")
            .ok_or_else(|| OperationError::InvalidParams("target is required".into()))?;
        let valid_target = if target.contains('/') {
            target.parse::<Ipv4Network>().is_ok()
        } else {
            HOSTNAME.is_match(&target)
        };
        if !valid_target {
            return Err(OperationError::InvalidParams(format!("invalid target: {target}")));
        }
        let ports = raw.text_or("ports", "common");
        port_list(&ports)?;
        Ok(Params::new().with("target", target).with("ports", ports))
    }

    fn accepted(&self, params: &Params) -> String {
        format!("Scanning {}...", params.text_or("target", ""))
    }

    fn start_event(&self, params: &Params) -> (EventLevel, String) {
        (EventLevel::NetScan, self.accepted(params))
    }

    fn error_label(&self) -> &'static str {
        "NetScan"
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError> {
        let target = params.text_or("target", "");
        let ports = port_list(&params.text_or("ports", "common"))?;
        ctx.award(10, "net scan started");

        let results = match target.parse::<Ipv4Network>() {
            Ok(network) if target.contains('/') => {
                let hosts = discover_hosts(network, Path::new(ARP_TABLE));
                ctx.publish(
                    EventLevel::NetScan,
                    format!("Found {} potential hosts, scanning...", hosts.len()),
                );
                let mut results = Vec::new();
                for host in hosts {
                    if !ctx.is_running() {
                        break;
                    }
                    let report = scan_host(ctx, &host.to_string(), IpAddr::V4(host), &ports);
                    if !report.ports.is_empty() {
                        results.push(report);
                    }
                }
                results
            }
            _ => {
                let addr = resolve(&target)?;
                ctx.publish(
                    EventLevel::NetScan,
                    format!("Scanning {} ports on {target}...", ports.len()),
                );
                vec![scan_host(ctx, &target, addr, &ports)]
            }
        };

        ctx.set_result(json!(results));
        ctx.publish_with(
            EventLevel::NetScan,
            "Network scan complete",
            json!({ "results": results }),
        );
        Ok(())
    }
}

/// Ports named by a `common`, `quick` or `lo-hi` selector.
pub fn port_list(selector: &str) -> Result<Vec<u16>, OperationError> {
    match selector {
        "common" => Ok(COMMON_PORTS.iter().map(|(port, _)| *port).collect()),
        "quick" => Ok(QUICK_PORTS.to_vec()),
        range => {
            let invalid = || OperationError::InvalidParams(format!("invalid ports: {range}"));
            let caps = PORT_RANGE.captures(range).ok_or_else(invalid)?;
            let lo: u32 = caps[1].parse().map_err(|_| invalid())?;
            let hi: u32 = caps[2].parse().map_err(|_| invalid())?;
            let (lo, hi) = (lo.max(1), hi.min(u16::MAX as u32));
            if lo > hi {
                return Err(invalid());
            }
            Ok((lo..=hi).filter_map(|port| u16::try_from(port).ok()).collect())
        }
    }
}

pub fn service_name(port: u16) -> &'static str {
    COMMON_PORTS
        .iter()
        .find(|(known, _)| *known == port)
        .map(|(_, name)| *name)
        .unwrap_or("unknown")
}

fn resolve(host: &str) -> Result<IpAddr, OperationError> {
    (host, 0)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|addr| addr.ip())
        .ok_or_else(|| OperationError::ProcessFailure(format!("cannot resolve {host}")))
}

/// Live neighbours inside `network` according to the ARP table, or its first addresses.
fn discover_hosts(network: Ipv4Network, arp_table: &Path) -> Vec<Ipv4Addr> {
    let known: Vec<Ipv4Addr> = ArpTableParser::new()
        .parse_file(arp_table)
        .unwrap_or_default()
        .into_iter()
        .filter(|ip| network.contains(*ip))
        .collect();
    if !known.is_empty() {
        return known;
    }
    let [a, b, c, _] = network.ip().octets();
    (1..=FALLBACK_HOSTS).map(|d| Ipv4Addr::new(a, b, c, d)).collect()
}

fn scan_host(ctx: &OperationContext, host: &str, addr: IpAddr, ports: &[u16]) -> HostReport {
    let next = AtomicUsize::new(0);
    let open = Mutex::new(Vec::new());

    thread::scope(|scope| {
        for _ in 0..WORKERS.min(ports.len()) {
            scope.spawn(|| {
                while ctx.is_running() {
                    let Some(&port) = ports.get(next.fetch_add(1, Ordering::Relaxed)) else {
                        break;
                    };
                    let Some(found) = probe_port(SocketAddr::new(addr, port), host) else {
                        continue;
                    };
                    ctx.award(3, &format!("open port {port}"));
                    ctx.bump(Tally::Ports);
                    ctx.publish_with(
                        EventLevel::NetScan,
                        format!("{host}:{port} [{}] {}", found.service, found.banner),
                        json!({
                            "host": host,
                            "port": port,
                            "service": found.service,
                            "banner": found.banner,
                        }),
                    );
                    open.lock().push(found);
                }
            });
        }
    });

    let mut ports = open.into_inner();
    ports.sort_by_key(|p| p.port);
    HostReport {
        host: host.to_string(),
        ports,
    }
}

fn probe_port(addr: SocketAddr, host: &str) -> Option<OpenPort> {
    TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).ok()?;
    Some(OpenPort {
        port: addr.port(),
        service: service_name(addr.port()),
        banner: grab_banner(addr, host).unwrap_or_default(),
    })
}

/// First bytes a service sends (or answers to a nudge), cut to a display-friendly length.
fn grab_banner(addr: SocketAddr, host: &str) -> Option<String> {
    let mut stream = TcpStream::connect_timeout(&addr, BANNER_TIMEOUT).ok()?;
    stream.set_read_timeout(Some(BANNER_TIMEOUT)).ok()?;
    stream.set_write_timeout(Some(BANNER_TIMEOUT)).ok()?;
    match addr.port() {
        80 | 8080 | 8000 => {
            let request = format!("HEAD / HTTP/1.0\r\nHost: {host}\r\n\r\n");
            stream.write_all(request.as_bytes()).ok()?;
        }
        // these greet first
        21 | 22 | 25 | 110 | 143 => {}
        _ => stream.write_all(b"\r\n").ok()?,
    }
    let mut buf = [0u8; BANNER_BYTES];
    let n = stream.read(&mut buf).ok()?;
    let banner = String::from_utf8_lossy(&buf[..n]);
    Some(banner.trim().chars().take(BANNER_CHARS).collect())
}
