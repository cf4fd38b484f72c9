//! Per-operation controller.
//!
//! Owns the lifecycle of one catalog entry: the single-flight start gate, the idempotent
//! stop, and the routine boundary where errors and panics are turned into events and the
//! operation is always returned to idle.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use serde_json::json;
use tracing::{error, info, instrument};

use pwrlvl_core::{EventLevel, Phase};
use pwrlvl_telemetry::EventLogger;

use crate::context::{OperationContext, Services};
use crate::error::OperationError;
use crate::operation::Operation;
use crate::params::Params;

pub struct Controller {
    operation: Arc<dyn Operation>,
    services: Arc<Services>,
}

impl Controller {
    pub(crate) fn new(operation: Arc<dyn Operation>, services: Arc<Services>) -> Self {
        Self {
            operation,
            services,
        }
    }

    pub fn name(&self) -> &'static str {
        self.operation.name()
    }

    /// Validates `raw`, atomically claims the operation and launches its routine.
    /// Returns the acknowledgement message without waiting for the routine.
    #[instrument(skip_all, fields(operation = self.name()))]
    pub fn start(&self, raw: &Params) -> Result<String, OperationError> {
        let name = self.name();
        let params = self.operation.prepare(raw, &self.services.settings)?;

        if let Err(e) = self.services.state.begin(name, params.as_map().clone()) {
            EventLogger::log_action("start", name, "already running");
            return Err(e.into());
        }

        let ack = self.operation.accepted(&params);
        let operation = self.operation.clone();
        let ctx = OperationContext::new(name, self.services.clone());
        let services = self.services.clone();

        let spawned = thread::Builder::new()
            .name(format!("op-{name}"))
            .spawn(move || run_routine(operation.as_ref(), &ctx, &params, &services));

        if let Err(e) = spawned {
            error!(error = %e, "Failed to launch routine thread");
            self.services.state.complete(name);
            return Err(OperationError::Io(e));
        }

        if let Some(metrics) = &self.services.metrics {
            metrics.operations_started.inc();
        }
        EventLogger::log_action("start", name, "accepted");
        Ok(ack)
    }

    /// Requests a stop. Returns `false`, changing nothing, when the operation was not
    /// running. Otherwise clears the running flag and terminates the operation's processes
    /// before returning.
    #[instrument(skip_all, fields(operation = self.name()))]
    pub fn stop(&self) -> Result<bool, OperationError> {
        let name = self.name();
        if !self.services.state.request_stop(name)? {
            EventLogger::log_action("stop", name, "not running");
            return Ok(false);
        }

        let outcomes = self
            .services
            .registry
            .terminate_operation(name, self.services.settings.grace);
        self.services.record_terminations(&outcomes);
        EventLogger::log_action("stop", name, "stopping");
        Ok(true)
    }
}

fn run_routine(
    operation: &dyn Operation,
    ctx: &OperationContext,
    params: &Params,
    services: &Services,
) {
    let name = operation.name();
    let (level, message) = operation.start_event(params);
    ctx.publish(level, message);

    let result = panic::catch_unwind(AssertUnwindSafe(|| operation.run(ctx, params)));
    let failure = match result {
        Ok(Ok(())) | Ok(Err(OperationError::Cancelled)) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(payload) => Some(format!("panic: {}", panic_message(payload.as_ref()))),
    };

    if let Some(reason) = &failure {
        ctx.publish(
            EventLevel::Error,
            format!("{} error: {reason}", operation.error_label()),
        );
        if let Some(metrics) = &services.metrics {
            metrics.operations_failed.inc();
        }
    }

    let stopped = services.state.phase(name) == Some(Phase::Stopping);
    let outcomes = services.registry.terminate_operation(name, services.settings.grace);
    services.record_terminations(&outcomes);
    services.state.complete(name);

    let outcome = match (&failure, stopped) {
        (Some(_), _) => "failed",
        (None, true) => "stopped",
        (None, false) => "completed",
    };
    info!(operation = name, outcome, "Routine finished");
    ctx.publish_with(
        EventLevel::Info,
        format!("{name} finished ({outcome})"),
        json!({"operation": name, "outcome": outcome}),
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
