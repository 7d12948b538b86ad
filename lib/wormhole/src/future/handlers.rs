use std::sync::Arc;

use crate::event::Payload;

/// A handler for completion or error signals.
pub(super) type PayloadHandler = Arc<dyn Fn(Payload) + Send + Sync>;

/// A handler for finally signals.
pub(super) type FinallyHandler = Arc<dyn Fn() + Send + Sync>;

/// Registered handler slots.
///
/// Each slot holds at most one handler, and registering again replaces it.
#[derive(Clone, Default)]
pub(super) struct Handlers {
    on_complete: Option<PayloadHandler>,
    on_error: Option<PayloadHandler>,
    on_finally: Option<FinallyHandler>,
}

impl Handlers {
    pub fn set_complete(&mut self, handler: PayloadHandler) {
        self.on_complete = Some(handler);
    }

    pub fn set_error(&mut self, handler: PayloadHandler) {
        self.on_error = Some(handler);
    }

    pub fn set_finally(&mut self, handler: FinallyHandler) {
        self.on_finally = Some(handler);
    }

    pub fn on_complete(&self) -> Option<PayloadHandler> {
        self.on_complete.clone()
    }

    pub fn on_error(&self) -> Option<PayloadHandler> {
        self.on_error.clone()
    }

    pub fn on_finally(&self) -> Option<FinallyHandler> {
        self.on_finally.clone()
    }

    pub fn has_error(&self) -> bool {
        self.on_error.is_some()
    }

    pub fn has_finally(&self) -> bool {
        self.on_finally.is_some()
    }
}
