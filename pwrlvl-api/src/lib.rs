//! # pwrlvl API
//!
//! Hand-framed HTTP/1.1 control surface for the orchestrator: JSON routes for status and
//! start/stop, a server-sent event stream of bus events, loot downloads and the static
//! browser client.

pub mod error;
pub mod handlers;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod sse;
pub mod static_files;

pub use error::{ApiError, ProtocolError};
pub use request::{read_request, Limits, Request};
pub use response::Response;
pub use router::{Reply, Router};
pub use server::ApiServer;
pub use static_files::StaticFiles;
