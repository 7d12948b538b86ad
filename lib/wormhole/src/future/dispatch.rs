use std::sync::Arc;

use tracing::debug;

use super::{
    handlers::{FinallyHandler, PayloadHandler},
    recovery::{self, Outcome},
    Shared,
};
use crate::{
    error::SignalKind,
    event::{Event, Payload},
};

/// Runs the completion handler under recovery, records the completion, and then fires the finally handler if one is
/// registered.
///
/// A failed completion is handed to [`recovery::recover`] and never recorded.
pub(super) async fn complete(shared: Arc<Shared>, handler: PayloadHandler, payload: Payload) {
    let permit = shared.acquire_dispatch_permit().await;
    let handler_payload = payload.clone();
    let outcome = recovery::invoke(&shared.runtime, move || handler(handler_payload)).await;
    drop(permit);

    match outcome {
        Outcome::Finished => {
            shared.deliver(Event::complete(payload)).await;

            if shared.handlers().has_finally() {
                if let Err(e) = shared.signal_finally() {
                    shared.mode.apply_detached(shared.id, e);
                }
            }
        }
        Outcome::Panicked(panic) => recovery::recover(&shared, panic),
        Outcome::Cancelled => debug!("Complete handler cancelled before finishing."),
    }
}

/// Runs the error handler without recovery, records the error, and then triggers the finally path.
pub(super) async fn error(shared: Arc<Shared>, handler: PayloadHandler, payload: Payload) {
    let permit = shared.acquire_dispatch_permit().await;
    let handler_payload = payload.clone();
    let outcome = recovery::invoke(&shared.runtime, move || handler(handler_payload)).await;
    drop(permit);

    match outcome {
        Outcome::Finished => {}
        Outcome::Panicked(panic) => recovery::propagate(&shared, SignalKind::Error, panic),
        Outcome::Cancelled => {
            debug!("Error handler cancelled before finishing.");
            return;
        }
    }

    shared.deliver(Event::error(payload)).await;

    if let Err(e) = shared.signal_finally() {
        shared.mode.apply_detached(shared.id, e);
    }
}

/// Runs the finally handler without recovery.
pub(super) async fn finally(shared: Arc<Shared>, handler: FinallyHandler) {
    let permit = shared.acquire_dispatch_permit().await;
    let outcome = recovery::invoke(&shared.runtime, move || handler()).await;
    drop(permit);

    match outcome {
        Outcome::Finished => {}
        Outcome::Panicked(panic) => recovery::propagate(&shared, SignalKind::Finally, panic),
        Outcome::Cancelled => debug!("Finally handler cancelled before finishing."),
    }
}
