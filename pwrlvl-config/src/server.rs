//! HTTP listener configuration.
//!
//! Protocol limits live here because they bound memory per connection:
//! - header accumulation cap
//! - request body cap
//! - socket read and write timeouts, stream keepalive interval

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Listener and protocol parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_bind")]
    #[validate(custom(function = validation::validate_bind_addr))]
    pub bind: String,

    /// TCP port.
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Directory holding the browser client's static assets.
    #[serde(default = "default_web_root")]
    pub web_root: PathBuf,

    /// Hard cap on bytes accumulated while looking for the header terminator.
    #[serde(default = "default_max_header_bytes")]
    #[validate(range(min = 1024, max = 1_048_576))]
    pub max_header_bytes: usize,

    /// Hard cap on request bodies.
    #[serde(default = "default_max_body_bytes")]
    #[validate(range(min = 1024, max = 67_108_864))]
    pub max_body_bytes: usize,

    /// Socket read timeout while receiving a request (seconds).
    #[serde(default = "default_read_timeout_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub read_timeout_secs: u64,

    /// Socket write timeout. A client that stops reading is dropped after this (seconds).
    #[serde(default = "default_write_timeout_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub write_timeout_secs: u64,

    /// Idle interval after which the event stream writes a keepalive frame (seconds).
    #[serde(default = "default_keepalive_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub keepalive_secs: u64,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    9000
}

fn default_web_root() -> PathBuf {
    PathBuf::from("web")
}

fn default_max_header_bytes() -> usize {
    65536
}

fn default_max_body_bytes() -> usize {
    1_048_576
}

fn default_read_timeout_secs() -> u64 {
    15
}

fn default_write_timeout_secs() -> u64 {
    15
}

fn default_keepalive_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            web_root: default_web_root(),
            max_header_bytes: default_max_header_bytes(),
            max_body_bytes: default_max_body_bytes(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

impl ServerConfig {
    /// `bind:port` in the form accepted by `TcpListener::bind`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
