//! Route handlers. Each one turns orchestrator state into a JSON body; none of them
//! blocks on an operation's work.

use std::fs;

use serde_json::{json, Map, Value};
use tracing::warn;

use pwrlvl_engine::operations::{csv_path, PROBE_PREFIX, SCAN_PREFIX};
use pwrlvl_engine::{LootError, OperationError, Orchestrator, Params};
use pwrlvl_protocols::{AirodumpClientParser, OutputParser};

use crate::error::ApiError;
use crate::response::Response;

/// Browser-client start routes and the operation each one starts.
pub const START_ROUTES: [(&str, &str); 11] = [
    ("/api/wifi/scan", "scan"),
    ("/api/wifi/attack", "attack"),
    ("/api/wifi/crack", "crack"),
    ("/api/probe/start", "probe"),
    ("/api/pmkid/start", "pmkid"),
    ("/api/beacon/start", "beacon"),
    ("/api/rogueap/start", "rogueap"),
    ("/api/wps/scan", "wps-scan"),
    ("/api/wps/attack", "wps-attack"),
    ("/api/capture/start", "capture"),
    ("/api/network/scan", "netscan"),
];

pub const STOP_ROUTES: [(&str, &str); 10] = [
    ("/api/wifi/stop_scan", "scan"),
    ("/api/wifi/stop_attack", "attack"),
    ("/api/probe/stop", "probe"),
    ("/api/pmkid/stop", "pmkid"),
    ("/api/beacon/stop", "beacon"),
    ("/api/rogueap/stop", "rogueap"),
    ("/api/wps/stop_scan", "wps-scan"),
    ("/api/wps/stop_attack", "wps-attack"),
    ("/api/capture/stop", "capture"),
    ("/api/network/stop", "netscan"),
];

fn ack(ok: bool, msg: impl Into<String>) -> Value {
    json!({ "ok": ok, "msg": msg.into() })
}

/// Unknown names are a 404; every other refusal is an ordinary `ok:false` answer.
fn control_reply(result: Result<String, OperationError>) -> Response {
    match result {
        Ok(msg) => Response::ok(ack(true, msg)),
        Err(e @ OperationError::UnknownOperation(_)) => {
            Response::json(404, &ack(false, e.to_string()))
        }
        Err(e) => Response::ok(ack(false, e.to_string())),
    }
}

fn name_of(body: &Map<String, Value>) -> String {
    body.get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// `POST /operation/start` with `{name, params}`.
pub fn start_operation(orchestrator: &Orchestrator, body: &Map<String, Value>) -> Response {
    let params = Params::from_value(body.get("params").cloned().unwrap_or(Value::Null));
    control_reply(orchestrator.start(&name_of(body), &params))
}

/// `POST /operation/stop` with `{name}`.
pub fn stop_operation(orchestrator: &Orchestrator, body: &Map<String, Value>) -> Response {
    control_reply(orchestrator.stop(&name_of(body)))
}

/// Start routes take their parameters from the top level of the body.
pub fn start_named(orchestrator: &Orchestrator, name: &str, body: Map<String, Value>) -> Response {
    control_reply(orchestrator.start(name, &Params::from_value(Value::Object(body))))
}

pub fn stop_named(orchestrator: &Orchestrator, name: &str) -> Response {
    control_reply(orchestrator.stop(name))
}

/// `GET /status`: every operation's view.
pub fn status(orchestrator: &Orchestrator) -> Response {
    Response::ok(json!(orchestrator.status()))
}

/// `GET /api/status`: the flat flag set the browser client polls.
pub fn client_status(orchestrator: &Orchestrator) -> Response {
    let view = orchestrator.status();
    let running = |name: &str| view.is_running(name);
    let field = |name: &str, key: &str| {
        view.get(name)
            .and_then(|op| op.fields.get(key).cloned())
            .unwrap_or(Value::Null)
    };
    let progress = orchestrator.progress().load();

    Response::ok(json!({
        "wifi_scanning": running("scan"),
        "wifi_attacking": running("attack"),
        "net_scanning": running("netscan"),
        "attack_bssid": field("attack", "bssid"),
        "attack_iface": field("attack", "iface"),
        "scan_iface": field("scan", "iface"),
        "interfaces": orchestrator.interfaces(),
        "xp": progress.xp,
        "level": progress.level,
        "title": progress.title,
        "xp_next": progress.xp_next,
        "probe_running": running("probe"),
        "pmkid_running": running("pmkid"),
        "beacon_running": running("beacon"),
        "rogueap_running": running("rogueap"),
        "rogueap_ssid": field("rogueap", "ssid"),
        "wps_scanning": running("wps-scan"),
        "wps_attacking": running("wps-attack"),
        "wps_target": field("wps-attack", "target"),
        "capturing": running("capture"),
    }))
}

pub fn xp(orchestrator: &Orchestrator) -> Response {
    Response::ok(json!(orchestrator.progress().load()))
}

pub fn log(orchestrator: &Orchestrator, tail: usize) -> Response {
    Response::ok(json!({ "events": orchestrator.bus().tail(tail) }))
}

/// Last result of `name` as a list; anything else reads as empty.
fn result_list(orchestrator: &Orchestrator, name: &str) -> Value {
    match orchestrator.state().result(name) {
        Some(Value::Array(items)) => Value::Array(items),
        Some(Value::Object(map)) => Value::Array(map.into_values().collect()),
        _ => Value::Array(Vec::new()),
    }
}

/// Read-only routes that report one operation's last result under `key`.
pub fn result_route(path: &str) -> Option<(&'static str, &'static str)> {
    Some(match path {
        "/api/wifi/results" => ("scan", "aps"),
        "/api/probe/results" => ("probe", "clients"),
        "/api/wps/results" => ("wps-scan", "aps"),
        "/api/rogueap/clients" => ("rogueap", "clients"),
        "/api/network/results" => ("netscan", "results"),
        _ => return None,
    })
}

pub fn results(orchestrator: &Orchestrator, name: &str, key: &str) -> Response {
    let mut body = Map::new();
    body.insert(key.to_string(), result_list(orchestrator, name));
    Response::ok(Value::Object(body))
}

/// Live client table from whichever airodump CSV is being written.
pub fn live_clients(orchestrator: &Orchestrator) -> Response {
    let settings = orchestrator.settings();
    let parser = AirodumpClientParser::new();
    let clients = [SCAN_PREFIX, PROBE_PREFIX]
        .iter()
        .map(|prefix| csv_path(&settings.scratch(prefix)))
        .find(|csv| csv.is_file())
        .and_then(|csv| parser.parse_file(&csv).ok())
        .map(|clients| clients.into_values().collect::<Vec<_>>())
        .unwrap_or_default();
    Response::ok(json!({ "clients": clients }))
}

pub fn handshakes(orchestrator: &Orchestrator) -> Response {
    Response::ok(json!({ "files": orchestrator.loot().handshakes() }))
}

pub fn captures(orchestrator: &Orchestrator) -> Response {
    Response::ok(json!({ "files": orchestrator.loot().captures() }))
}

pub fn metrics(orchestrator: &Orchestrator) -> Response {
    let Some(metrics) = orchestrator.metrics() else {
        return Response::error(&ApiError::NotFound);
    };
    let stats = orchestrator.bus().stats();
    metrics.observe_bus(stats.published, stats.dropped);
    match metrics.gather_metrics() {
        Ok(text) => Response::new(200, "text/plain; version=0.0.4", text),
        Err(e) => {
            warn!(error = %e, "Metrics export failed");
            Response::error(&ApiError::Read)
        }
    }
}

/// `GET /api/download/<file>` as an attachment.
pub fn download(orchestrator: &Orchestrator, name: &str) -> Response {
    let path = match orchestrator.loot().resolve_download(name) {
        Ok(path) => path,
        Err(LootError::Forbidden(_)) => return Response::error(&ApiError::Forbidden),
        Err(_) => return Response::error(&ApiError::NotFound),
    };
    match fs::read(&path) {
        Ok(data) => Response::new(200, "application/octet-stream", data).with_header(
            "Content-Disposition",
            &format!("attachment; filename=\"{name}\""),
        ),
        Err(e) => {
            warn!(file = name, error = %e, "Download read failed");
            Response::error(&ApiError::Read)
        }
    }
}

/// `POST /api/wifi/monitor` with `{iface, enable}` (or `{iface, mode}`).
pub fn monitor(orchestrator: &Orchestrator, body: &Map<String, Value>) -> Response {
    let iface = body
        .get("iface")
        .and_then(Value::as_str)
        .unwrap_or(&orchestrator.settings().default_iface)
        .to_string();
    let mode = match (body.get("mode").and_then(Value::as_str), body.get("enable")) {
        (Some(mode), _) => mode.to_string(),
        (None, Some(Value::Bool(false))) => "managed".to_string(),
        (None, _) => "monitor".to_string(),
    };
    match orchestrator.set_monitor(&iface, &mode) {
        Ok(msg) => Response::ok(ack(true, msg)),
        Err(e) => Response::ok(ack(false, e.to_string())),
    }
}

/// `POST /api/loot/convert` with `{file}`.
pub fn convert(orchestrator: &Orchestrator, body: &Map<String, Value>) -> Response {
    let file = body.get("file").and_then(Value::as_str).unwrap_or_default();
    if file.is_empty() {
        return Response::ok(ack(false, "No file specified"));
    }
    match orchestrator.convert(file) {
        Ok(msg) => Response::ok(ack(true, msg)),
        Err(e) => Response::ok(ack(false, e.to_string())),
    }
}
