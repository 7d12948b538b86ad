//! Recovery of handler failures.
//!
//! Handlers are plain synchronous callbacks, so each one is run on the blocking pool and its failure (a panic) is
//! observed through the resulting `JoinError`, the same way a supervisor observes a panicked worker.
//!
//! Only completion handlers are recovered. A failing completion handler is converted into an error signal when an
//! error handler is registered, or into a finally signal when only a finally handler is registered. Error and
//! finally handlers are never recovered: recovering them would let a failing error handler re-trigger error handling
//! forever. Their failures are recorded, logged, and then resumed so the dispatch task unwinds.

use std::{any::Any, panic::resume_unwind, sync::Arc};

use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use super::Shared;
use crate::{
    error::{HandlerFailure, SignalKind},
    event::Payload,
};

/// The outcome of running a handler.
pub(super) enum Outcome {
    /// The handler returned normally.
    Finished,

    /// The handler panicked.
    Panicked(Box<dyn Any + Send>),

    /// The handler never ran to completion because the runtime is shutting down.
    Cancelled,
}

/// Runs `handler` on the blocking pool of `runtime` and waits for it to finish.
pub(super) async fn invoke<F>(runtime: &Handle, handler: F) -> Outcome
where
    F: FnOnce() + Send + 'static,
{
    match runtime.spawn_blocking(handler).await {
        Ok(()) => Outcome::Finished,
        Err(e) if e.is_panic() => Outcome::Panicked(e.into_panic()),
        Err(_) => Outcome::Cancelled,
    }
}

/// Routes a failed completion handler to the error or finally handler.
pub(super) fn recover(shared: &Arc<Shared>, panic: Box<dyn Any + Send>) {
    let failure = Payload::from_panic(panic);
    let handlers = shared.handlers();

    if handlers.has_error() {
        warn!(future_id = shared.id, ?failure, "Complete handler failed, routing failure to error handler.");
        if let Err(e) = shared.signal_error(failure) {
            shared.mode.apply_detached(shared.id, e);
        }
    } else if handlers.has_finally() {
        warn!(future_id = shared.id, ?failure, "Complete handler failed, routing to finally handler.");
        if let Err(e) = shared.signal_finally() {
            shared.mode.apply_detached(shared.id, e);
        }
    } else {
        debug!(future_id = shared.id, ?failure, "Complete handler failed with nowhere to route the failure. Dropping.");
    }
}

/// Records an unrecovered handler failure and resumes unwinding.
pub(super) fn propagate(shared: &Shared, signal: SignalKind, panic: Box<dyn Any + Send>) -> ! {
    let failure = HandlerFailure {
        signal,
        message: panic_message(panic.as_ref()),
    };
    error!(future_id = shared.id, %signal, "Handler failed without recovery: {}", failure);

    shared.push_failure(failure);
    resume_unwind(panic)
}

fn panic_message(panic: &(dyn Any + Send)) -> Option<String> {
    if let Some(message) = panic.downcast_ref::<String>() {
        return Some(message.clone());
    }

    if let Some(message) = panic.downcast_ref::<&'static str>() {
        return Some((*message).to_string());
    }

    panic.downcast_ref::<Payload>().and_then(|p| p.as_str()).map(str::to_string)
}
