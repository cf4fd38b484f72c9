//! The interface every catalog entry implements.

use pwrlvl_core::EventLevel;

use crate::context::OperationContext;
use crate::error::OperationError;
use crate::params::Params;
use crate::settings::EngineSettings;

/// A named, independently startable background job.
///
/// The controller calls [`Operation::prepare`] on the request thread, then runs
/// [`Operation::run`] on a dedicated thread. `run` should poll
/// [`OperationContext::is_running`] between blocking steps and return promptly once it
/// turns false; the processes it spawned through the context are terminated by the
/// controller regardless of how `run` ends.
pub trait Operation: Send + Sync {
    fn name(&self) -> &'static str;

    /// Validates the caller's parameters and returns the normalised set, defaults filled in.
    fn prepare(&self, raw: &Params, settings: &EngineSettings) -> Result<Params, OperationError>;

    /// Message acknowledging an accepted start.
    fn accepted(&self, params: &Params) -> String {
        let _ = params;
        format!("{} started", self.name())
    }

    /// First event of every run.
    fn start_event(&self, params: &Params) -> (EventLevel, String);

    /// Prefix for the error event published when the routine fails.
    fn error_label(&self) -> &'static str {
        "Operation"
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError>;
}
