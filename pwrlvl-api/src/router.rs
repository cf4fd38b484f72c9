//! Static dispatch table from method and path to handler.

use std::sync::Arc;

use pwrlvl_engine::Orchestrator;

use crate::error::ApiError;
use crate::handlers::{self, START_ROUTES, STOP_ROUTES};
use crate::request::Request;
use crate::response::Response;
use crate::static_files::{StaticFiles, SPA_PATHS};

const DOWNLOAD_PREFIX: &str = "/api/download/";

/// What the connection should do next.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    /// Write the response and close.
    Respond(Response),
    /// Hand the connection to the event stream.
    Stream,
}

pub struct Router {
    orchestrator: Arc<Orchestrator>,
    statics: StaticFiles,
    log_tail: usize,
}

impl Router {
    pub fn new(orchestrator: Arc<Orchestrator>, statics: StaticFiles, log_tail: usize) -> Self {
        Self {
            orchestrator,
            statics,
            log_tail,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn route(&self, request: &Request) -> Reply {
        match request.method.as_str() {
            "OPTIONS" => Reply::Respond(Response::preflight()),
            "GET" => self.get(&request.path),
            "POST" => Reply::Respond(self.post(request)),
            _ => Reply::Respond(Response::error(&ApiError::MethodNotAllowed)),
        }
    }

    fn get(&self, path: &str) -> Reply {
        if path == "/events" {
            return Reply::Stream;
        }
        if SPA_PATHS.contains(&path) {
            return Reply::Respond(self.statics.index());
        }

        let orch = self.orchestrator.as_ref();
        let response = match path {
            "/status" => handlers::status(orch),
            "/api/status" => handlers::client_status(orch),
            "/api/xp" => handlers::xp(orch),
            "/api/log" => handlers::log(orch, self.log_tail),
            "/api/handshakes" => handlers::handshakes(orch),
            "/api/captures" => handlers::captures(orch),
            "/api/clients" => handlers::live_clients(orch),
            "/api/metrics" => handlers::metrics(orch),
            _ => {
                if let Some((name, key)) = handlers::result_route(path) {
                    handlers::results(orch, name, key)
                } else if let Some(file) = path.strip_prefix(DOWNLOAD_PREFIX) {
                    handlers::download(orch, file)
                } else {
                    self.statics.serve(path)
                }
            }
        };
        Reply::Respond(response)
    }

    fn post(&self, request: &Request) -> Response {
        let orch = self.orchestrator.as_ref();
        let path = request.path.as_str();
        let body = request.json_body();

        match path {
            "/operation/start" => return handlers::start_operation(orch, &body),
            "/operation/stop" => return handlers::stop_operation(orch, &body),
            "/api/wifi/monitor" => return handlers::monitor(orch, &body),
            "/api/loot/convert" => return handlers::convert(orch, &body),
            _ => {}
        }
        if let Some((_, name)) = START_ROUTES.iter().find(|(route, _)| *route == path) {
            return handlers::start_named(orch, name, body);
        }
        if let Some((_, name)) = STOP_ROUTES.iter().find(|(route, _)| *route == path) {
            return handlers::stop_named(orch, name);
        }
        Response::json(
            404,
            &serde_json::json!({ "ok": false, "msg": "Unknown endpoint" }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pwrlvl_core::EventBus;
    use pwrlvl_engine::EngineSettings;
    use serde_json::Value;
    use std::collections::HashMap;

    fn router(dir: &std::path::Path) -> Router {
        let settings = EngineSettings {
            loot_dir: dir.join("loot"),
            handshake_dir: dir.join("hs"),
            scratch_dir: dir.to_path_buf(),
            search_dirs: Vec::new(),
            ..EngineSettings::default()
        };
        let orchestrator = Orchestrator::with_operations(
            settings,
            EventBus::new(50, 50, 10),
            None,
            pwrlvl_engine::operations::catalog(),
        );
        Router::new(Arc::new(orchestrator), StaticFiles::new(dir.join("web")), 200)
    }

    fn request(method: &str, path: &str, body: &str) -> Request {
        Request {
            method: method.to_string(),
            path: path.to_string(),
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn respond(router: &Router, method: &str, path: &str, body: &str) -> Response {
        match router.route(&request(method, path, body)) {
            Reply::Respond(response) => response,
            Reply::Stream => panic!("unexpected stream for {path}"),
        }
    }

    fn json(response: &Response) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[test]
    fn method_handling() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());
        assert_eq!(respond(&router, "OPTIONS", "/anything", "").status, 204);
        assert_eq!(respond(&router, "DELETE", "/status", "").status, 405);
        assert_eq!(router.route(&request("GET", "/events", "")), Reply::Stream);

        let unknown = respond(&router, "POST", "/api/nope", "{}");
        assert_eq!(unknown.status, 404);
        assert_eq!(json(&unknown), serde_json::json!({"ok": false, "msg": "Unknown endpoint"}));
    }

    #[test]
    fn unknown_operation_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());
        let response = respond(&router, "POST", "/operation/start", r#"{"name":"teleport"}"#);
        assert_eq!(response.status, 404);
        assert_eq!(json(&response)["ok"], false);
    }

    #[test]
    fn stopping_idle_operations_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());
        let response = respond(&router, "POST", "/operation/stop", r#"{"name":"scan"}"#);
        assert_eq!(json(&response), serde_json::json!({"ok": true, "msg": "scan not running"}));
        for (path, _) in STOP_ROUTES {
            assert_eq!(json(&respond(&router, "POST", path, ""))["ok"], true, "{path}");
        }
    }

    #[test]
    fn invalid_parameters_are_refused_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());
        let response = respond(&router, "POST", "/api/wifi/attack", r#"{"bssid":"zz"}"#);
        assert_eq!(response.status, 200);
        assert_eq!(json(&response)["ok"], false);
        assert!(!router.orchestrator().status().is_running("attack"));

        let response = respond(&router, "POST", "/api/loot/convert", "{}");
        assert_eq!(json(&response)["msg"], "No file specified");
    }

    #[test]
    fn read_routes_have_their_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());

        let status = json(&respond(&router, "GET", "/status", ""));
        assert_eq!(status["scan"]["running"], false);
        assert_eq!(status["netscan"]["phase"], "idle");

        let client = json(&respond(&router, "GET", "/api/status", ""));
        assert_eq!(client["wifi_scanning"], false);
        assert_eq!(client["attack_bssid"], Value::Null);
        assert_eq!(client["title"], "APPRENTICE");

        assert_eq!(json(&respond(&router, "GET", "/api/wifi/results", "")), serde_json::json!({"aps": []}));
        assert_eq!(json(&respond(&router, "GET", "/api/clients", "")), serde_json::json!({"clients": []}));
        assert!(json(&respond(&router, "GET", "/api/log", ""))["events"].is_array());
        assert_eq!(respond(&router, "GET", "/api/metrics", "").status, 404);
    }

    #[test]
    fn downloads_are_sandboxed() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());
        std::fs::write(dir.path().join("hs/cap_x-01.cap"), b"pcap").unwrap();

        let ok = respond(&router, "GET", "/api/download/cap_x-01.cap", "");
        assert_eq!(ok.status, 200);
        assert_eq!(ok.body, b"pcap");
        assert!(ok
            .headers
            .contains(&("Content-Disposition".into(), "attachment; filename=\"cap_x-01.cap\"".into())));

        assert_eq!(respond(&router, "GET", "/api/download/..%2Fetc", "").status, 403);
        assert_eq!(respond(&router, "GET", "/api/download/missing.cap", "").status, 404);
    }

    #[test]
    fn spa_paths_serve_index() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path());
        std::fs::create_dir(dir.path().join("web")).unwrap();
        std::fs::write(dir.path().join("web/index.html"), "<h1>pwrlvl</h1>").unwrap();

        for path in SPA_PATHS {
            let response = respond(&router, "GET", path, "");
            assert_eq!(response.status, 200, "{path}");
            assert_eq!(response.body, b"<h1>pwrlvl</h1>");
        }
        assert_eq!(respond(&router, "GET", "/../../etc/passwd", "").status, 403);
    }
}
