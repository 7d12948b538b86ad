//! The future core.
//!
//! A [`FutureHandle`] owns a set of handler slots, a timeline of recorded events, and a recorder task that is the
//! only writer of that timeline. Signalling a future spawns a dispatch task which runs the matching handler and then
//! hands an [`Event`] to the recorder.
//!
//! # Signals
//!
//! - [`signal_complete`][FutureHandle::signal_complete] runs the completion handler under recovery (see below),
//!   records a [`Complete`][crate::EventKind::Complete] event, and then runs the finally handler if one is registered.
//! - [`signal_error`][FutureHandle::signal_error] runs the error handler, records an
//!   [`Error`][crate::EventKind::Error] event, and then runs the finally handler.
//!
//! Finally signals are never recorded. Signals race with each other: the timeline reflects the order in which the
//! recorder received events, but each signal's handler always runs before its own event is recorded.
//!
//! # Recovery
//!
//! If the completion handler panics, the panic is converted into a [`Payload`] and routed to the error handler, or
//! to the finally handler if no error handler is registered. Error and finally handlers are never recovered: their
//! failures are logged, reported by [`settle`][FutureHandle::settle], and left to unwind their dispatch task.
//!
//! # Misuse
//!
//! Signalling a destroyed future, or signalling a kind with no registered handler, is misuse. What happens then is
//! governed by the future's [`Mode`].
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use wormhole::{FutureHandle, Mode};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let future = FutureHandle::new(Mode::Hawking);
//!
//! let seen2 = Arc::clone(&seen);
//! future
//!     .register_complete(move |payload| seen2.lock().unwrap().push(payload.as_str().unwrap().to_string()))
//!     .unwrap();
//!
//! future.signal_complete("hello").unwrap();
//! future.settle().await.unwrap();
//!
//! assert_eq!(future.signal_count(), 1);
//! assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
//! # }
//! ```

use std::{
    fmt,
    mem,
    sync::{
        atomic::{AtomicUsize, Ordering::Relaxed},
        Arc, Mutex, PoisonError, RwLock,
    },
};

use tokio::{
    runtime::Handle,
    sync::{mpsc, OwnedSemaphorePermit, Semaphore},
};
use tokio_util::task::TaskTracker;
use tracing::{debug, debug_span, Instrument as _};

use crate::{
    config::FutureConfiguration,
    error::{FutureError, HandlerFailure, SettleError, SignalKind},
    event::{Event, Payload},
    gate::Gate,
    mode::Mode,
};

mod dispatch;

mod handlers;
use self::handlers::Handlers;

mod recorder;
use self::recorder::{Record, Recorder, SharedTimeline, ShutdownHandle, Timeline};

mod recovery;

static GLOBAL_FUTURE_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

enum Lifecycle {
    Active {
        records_tx: mpsc::Sender<Record>,
        shutdown: ShutdownHandle,
    },
    Destroyed,
}

/// State shared between a future's handles and its dispatch tasks.
pub(crate) struct Shared {
    id: usize,
    mode: Mode,
    runtime: Handle,
    lifecycle: RwLock<Lifecycle>,
    handlers: RwLock<Handlers>,
    timeline: SharedTimeline,
    gate: Gate,
    dispatches: TaskTracker,
    dispatch_permits: Arc<Semaphore>,
    failures: Mutex<Vec<HandlerFailure>>,
    settle_lock: tokio::sync::Mutex<()>,
}

impl Shared {
    fn handlers(&self) -> Handlers {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn is_destroyed(&self) -> bool {
        matches!(
            *self.lifecycle.read().unwrap_or_else(PoisonError::into_inner),
            Lifecycle::Destroyed
        )
    }

    /// Runs `f` while holding the lifecycle lock, if the future is still active.
    fn if_active<F, T>(&self, f: F) -> Result<T, FutureError>
    where
        F: FnOnce() -> T,
    {
        let lifecycle = self.lifecycle.read().unwrap_or_else(PoisonError::into_inner);
        match *lifecycle {
            Lifecycle::Active { .. } => Ok(f()),
            Lifecycle::Destroyed => Err(FutureError::Destroyed),
        }
    }

    /// Checks that the future is active and that a handler is registered for `signal`, returning the handler.
    fn admit<H, F>(&self, signal: SignalKind, select: F) -> Result<H, FutureError>
    where
        F: FnOnce(&Handlers) -> Option<H>,
    {
        if self.is_destroyed() {
            return Err(FutureError::Destroyed);
        }

        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        select(&handlers).ok_or(FutureError::NoHandler { signal })
    }

    fn spawn_dispatch<F>(&self, signal: SignalKind, dispatch: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(future_id = self.id, %signal, "Spawning dispatch task.");
        let span = debug_span!("dispatch", future_id = self.id, %signal);
        self.dispatches.spawn_on(dispatch.instrument(span), &self.runtime);
    }

    fn signal_complete(self: &Arc<Self>, payload: Payload) -> Result<(), FutureError> {
        let handler = self.admit(SignalKind::Complete, Handlers::on_complete)?;
        self.spawn_dispatch(
            SignalKind::Complete,
            dispatch::complete(Arc::clone(self), handler, payload),
        );
        Ok(())
    }

    fn signal_error(self: &Arc<Self>, payload: Payload) -> Result<(), FutureError> {
        let handler = self.admit(SignalKind::Error, Handlers::on_error)?;
        self.spawn_dispatch(SignalKind::Error, dispatch::error(Arc::clone(self), handler, payload));
        Ok(())
    }

    fn signal_finally(self: &Arc<Self>) -> Result<(), FutureError> {
        let handler = self.admit(SignalKind::Finally, Handlers::on_finally)?;
        self.spawn_dispatch(SignalKind::Finally, dispatch::finally(Arc::clone(self), handler));
        Ok(())
    }

    async fn acquire_dispatch_permit(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.dispatch_permits).acquire_owned().await.ok()
    }

    /// Hands `event` to the recorder and waits until it has been recorded.
    ///
    /// Returns immediately if the future has been destroyed, or is destroyed while waiting.
    async fn deliver(&self, event: Event) {
        let kind = event.kind();
        let maybe_records_tx = {
            let lifecycle = self.lifecycle.read().unwrap_or_else(PoisonError::into_inner);
            match &*lifecycle {
                Lifecycle::Active { records_tx, .. } => Some(records_tx.clone()),
                Lifecycle::Destroyed => None,
            }
        };

        let Some(records_tx) = maybe_records_tx else {
            debug!(future_id = self.id, %kind, "Future destroyed before event could be delivered.");
            return;
        };

        let (record, recorded) = Record::new(event);
        if records_tx.send(record).await.is_err() || recorded.await.is_err() {
            debug!(future_id = self.id, %kind, "Recorder stopped before event could be recorded.");
        }
    }

    fn push_failure(&self, failure: HandlerFailure) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure);
    }
}

/// A handle to a future.
///
/// Handles are cheap to clone, and all clones refer to the same future. The recorder task stops when the future is
/// destroyed or when the last handle is dropped.
///
/// A handler that captures a handle to its own future keeps that future alive until it is destroyed.
///
/// See the [module-level documentation](self) for more information.
#[derive(Clone)]
pub struct FutureHandle {
    inner: Arc<Shared>,
}

impl FutureHandle {
    /// Creates a new future with the given mode and default settings.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new(mode: Mode) -> Self {
        Self::from_configuration(&FutureConfiguration::from(mode))
    }

    /// Creates a new future from the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn from_configuration(config: &FutureConfiguration) -> Self {
        Self::from_configuration_on(config, Handle::current())
    }

    /// Creates a new future from the given configuration, running its tasks on `runtime`.
    pub fn from_configuration_on(config: &FutureConfiguration, runtime: Handle) -> Self {
        let id = GLOBAL_FUTURE_ID_COUNTER.fetch_add(1, Relaxed);
        let timeline = SharedTimeline::default();
        let (records_tx, shutdown) = Recorder::spawn(id, timeline.clone(), config.recorder_buffer(), &runtime);

        debug!(future_id = id, mode = %config.mode(), "Created future.");

        Self {
            inner: Arc::new(Shared {
                id,
                mode: config.mode(),
                runtime,
                lifecycle: RwLock::new(Lifecycle::Active { records_tx, shutdown }),
                handlers: RwLock::new(Handlers::default()),
                timeline,
                gate: Gate::new(),
                dispatches: TaskTracker::new(),
                dispatch_permits: Arc::new(Semaphore::new(config.max_concurrent_dispatches())),
                failures: Mutex::new(Vec::new()),
                settle_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Returns the unique identifier of this future.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Returns the misuse mode of this future.
    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// Returns `true` if this future has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Registers the handler to run when the future completes.
    ///
    /// Replaces any previously registered completion handler.
    ///
    /// # Errors
    ///
    /// If the future has been destroyed, and the mode is [`Mode::Hawking`], an error is returned.
    pub fn register_complete<F>(&self, handler: F) -> Result<(), FutureError>
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.register(|handlers| handlers.set_complete(Arc::new(handler)))
    }

    /// Registers the handler to run when the future fails.
    ///
    /// Replaces any previously registered error handler.
    ///
    /// # Errors
    ///
    /// If the future has been destroyed, and the mode is [`Mode::Hawking`], an error is returned.
    pub fn register_error<F>(&self, handler: F) -> Result<(), FutureError>
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.register(|handlers| handlers.set_error(Arc::new(handler)))
    }

    /// Registers the handler to run after the future completes or fails.
    ///
    /// Replaces any previously registered finally handler.
    ///
    /// # Errors
    ///
    /// If the future has been destroyed, and the mode is [`Mode::Hawking`], an error is returned.
    pub fn register_finally<F>(&self, handler: F) -> Result<(), FutureError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(|handlers| handlers.set_finally(Arc::new(handler)))
    }

    fn register<F>(&self, f: F) -> Result<(), FutureError>
    where
        F: FnOnce(&mut Handlers),
    {
        // Holding the lifecycle lock keeps `destroy` from clearing the slots underneath us.
        let result = self.inner.if_active(|| {
            let mut handlers = self.inner.handlers.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut handlers);
        });

        result.or_else(|e| self.apply_mode(e))
    }

    /// Signals that the future has completed with `payload`.
    ///
    /// The completion handler runs asynchronously; this call returns as soon as it has been scheduled.
    ///
    /// # Errors
    ///
    /// If the future has been destroyed, or no completion handler is registered, and the mode is [`Mode::Hawking`],
    /// an error is returned.
    pub fn signal_complete<P: Into<Payload>>(&self, payload: P) -> Result<(), FutureError> {
        self.inner
            .signal_complete(payload.into())
            .or_else(|e| self.apply_mode(e))
    }

    /// Signals that the future has failed with `payload`.
    ///
    /// The error handler runs asynchronously; this call returns as soon as it has been scheduled.
    ///
    /// # Errors
    ///
    /// If the future has been destroyed, or no error handler is registered, and the mode is [`Mode::Hawking`], an
    /// error is returned.
    pub fn signal_error<P: Into<Payload>>(&self, payload: P) -> Result<(), FutureError> {
        self.inner
            .signal_error(payload.into())
            .or_else(|e| self.apply_mode(e))
    }

    /// Returns a snapshot of the events recorded in the current timeline.
    pub fn events(&self) -> Vec<Event> {
        self.inner.timeline.with(|timeline| timeline.events())
    }

    /// Returns the number of events recorded in the current timeline.
    ///
    /// Events recorded before the last call to [`alter`][Self::alter] are not counted.
    pub fn signal_count(&self) -> usize {
        self.inner.timeline.with(|timeline| timeline.signal_count())
    }

    /// Branches off to a new timeline.
    ///
    /// All recorded events are discarded and the signal count is reset. Handlers, the mode, and the recorder are
    /// kept, so the future can be signalled again immediately. Events from signals that are still in flight land in
    /// the new timeline.
    ///
    /// # Errors
    ///
    /// If the future has been destroyed, and the mode is [`Mode::Hawking`], an error is returned.
    pub fn alter(&self) -> Result<(), FutureError> {
        let result = self.inner.if_active(|| self.inner.timeline.with(Timeline::clear));
        if result.is_ok() {
            debug!(future_id = self.inner.id, "Altered timeline.");
        }

        result.or_else(|e| self.apply_mode(e))
    }

    /// Destroys the future.
    ///
    /// The recorder stops permanently, all handlers and events are discarded, and any caller blocked on this future's
    /// gate is released. Only the mode survives: every later operation on the future is treated as misuse of a
    /// destroyed future. Dispatch tasks that are still in flight finish their handler but their events are lost.
    ///
    /// # Errors
    ///
    /// If the future was already destroyed, and the mode is [`Mode::Hawking`], an error is returned.
    #[doc(alias = "black_hole")]
    pub fn destroy(&self) -> Result<(), FutureError> {
        let previous = {
            let mut lifecycle = self.inner.lifecycle.write().unwrap_or_else(PoisonError::into_inner);
            mem::replace(&mut *lifecycle, Lifecycle::Destroyed)
        };

        match previous {
            Lifecycle::Active { records_tx, shutdown } => {
                shutdown.trigger();
                drop(records_tx);
            }
            Lifecycle::Destroyed => return self.apply_mode(FutureError::Destroyed),
        }

        // Handlers may hold handles to this future, so they're dropped outside of the lock.
        let handlers = mem::take(&mut *self.inner.handlers.write().unwrap_or_else(PoisonError::into_inner));
        drop(handlers);

        // Sealing keeps a record the recorder already accepted from landing after the clear.
        self.inner.timeline.with(Timeline::seal);
        self.inner.gate.open();

        debug!(future_id = self.inner.id, "Destroyed future.");
        Ok(())
    }

    /// Waits for all dispatch tasks spawned so far to finish.
    ///
    /// This includes the error and finally tasks that they go on to spawn, so once this returns, every signal issued
    /// before the call has either been recorded or been dropped.
    ///
    /// # Errors
    ///
    /// If any error or finally handler failed since the last call to `settle`, an error listing the failures is
    /// returned.
    pub async fn settle(&self) -> Result<(), SettleError> {
        let _guard = self.inner.settle_lock.lock().await;

        self.inner.dispatches.close();
        self.inner.dispatches.wait().await;
        self.inner.dispatches.reopen();

        let failures = mem::take(&mut *self.inner.failures.lock().unwrap_or_else(PoisonError::into_inner));
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SettleError::Unrecovered { failures })
        }
    }

    /// Runs `f` against the gate while the future is known to be active.
    ///
    /// The policy is not applied to the returned error.
    pub(crate) fn with_gate<F, T>(&self, f: F) -> Result<T, FutureError>
    where
        F: FnOnce(&Gate) -> T,
    {
        self.inner.if_active(|| f(&self.inner.gate))
    }

    /// Applies this future's mode to a misuse error.
    pub(crate) fn apply_mode(&self, err: FutureError) -> Result<(), FutureError> {
        self.inner.mode.apply(self.inner.id, err)
    }
}

impl Default for FutureHandle {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

impl fmt::Debug for FutureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureHandle")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("destroyed", &self.is_destroyed())
            .field("signal_count", &self.signal_count())
            .finish()
    }
}
