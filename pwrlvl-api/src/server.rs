//! ## pwrlvl-api::server
//! Accept loop with one thread per connection.
//!
//! Per connection: read headers and body, dispatch, then either answer and close or hand
//! the socket to the event stream. A request that cannot be parsed drops the connection
//! without an answer. Every write is bounded by the write timeout, so a client that stops
//! reading the event stream is dropped and its subscription released.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use pwrlvl_config::PwrlvlConfig;
use pwrlvl_engine::Orchestrator;

use crate::request::{read_request, Limits};
use crate::router::{Reply, Router};
use crate::sse::stream_events;
use crate::static_files::StaticFiles;

#[derive(Clone, Copy, Debug)]
struct ConnectionSettings {
    limits: Limits,
    read_timeout: Duration,
    write_timeout: Duration,
    keepalive: Duration,
}

pub struct ApiServer {
    listener: TcpListener,
    router: Arc<Router>,
    settings: ConnectionSettings,
}

impl ApiServer {
    /// Binds the listener described by `config.server`.
    pub fn bind(config: &PwrlvlConfig, orchestrator: Arc<Orchestrator>) -> io::Result<Self> {
        let server = &config.server;
        let listener = TcpListener::bind(server.listen_addr())?;
        let router = Router::new(
            orchestrator,
            StaticFiles::new(&server.web_root),
            config.events.log_tail,
        );
        Ok(Self {
            listener,
            router: Arc::new(router),
            settings: ConnectionSettings {
                limits: Limits {
                    max_header_bytes: server.max_header_bytes,
                    max_body_bytes: server.max_body_bytes,
                },
                read_timeout: Duration::from_secs(server.read_timeout_secs),
                write_timeout: Duration::from_secs(server.write_timeout_secs),
                keepalive: Duration::from_secs(server.keepalive_secs),
            },
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop on the calling thread. Only a listener failure returns.
    #[instrument(skip_all)]
    pub fn serve(&self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "Listening");
        for incoming in self.listener.incoming() {
            let stream = match incoming {
                Ok(stream) => stream,
                Err(e) if is_transient(&e) => {
                    debug!(error = %e, "Accept failed");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let router = self.router.clone();
            let settings = self.settings;
            let spawned = thread::Builder::new()
                .name("http-conn".into())
                .spawn(move || handle_connection(stream, &router, settings));
            if let Err(e) = spawned {
                warn!(error = %e, "Could not start connection thread");
            }
        }
        Ok(())
    }

    /// Runs the accept loop on a background thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name("http-accept".into()).spawn(move || {
            if let Err(e) = self.serve() {
                warn!(error = %e, "Listener stopped");
            }
        })
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

#[instrument(skip_all, fields(peer))]
fn handle_connection(mut stream: TcpStream, router: &Router, settings: ConnectionSettings) {
    if let Ok(peer) = stream.peer_addr() {
        tracing::Span::current().record("peer", tracing::field::display(peer));
    }
    if let Err(e) = stream.set_read_timeout(Some(settings.read_timeout)) {
        debug!(error = %e, "Could not set read timeout");
    }
    if let Err(e) = stream.set_write_timeout(Some(settings.write_timeout)) {
        debug!(error = %e, "Could not set write timeout");
    }

    let request = match read_request(&mut stream, settings.limits) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Dropping connection");
            return;
        }
    };
    if let Some(metrics) = router.orchestrator().metrics() {
        metrics.http_requests.inc();
    }
    debug!(method = %request.method, path = %request.path, "Request");

    match router.route(&request) {
        Reply::Respond(response) => {
            if let Err(e) = response.write_to(&mut stream) {
                debug!(error = %e, "Response write failed");
            }
        }
        Reply::Stream => {
            let subscription = router.orchestrator().bus().subscribe();
            if let Err(e) = stream_events(&mut stream, subscription, settings.keepalive) {
                debug!(error = %e, "Event stream closed");
            }
        }
    }
}
