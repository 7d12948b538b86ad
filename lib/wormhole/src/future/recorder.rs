use std::sync::{Arc, Mutex, PoisonError};

use tokio::{
    runtime::Handle,
    select,
    sync::{mpsc, oneshot},
};
use tracing::{debug, debug_span, trace, Instrument as _};

use crate::event::Event;

/// The event log of a future, along with its signal count.
///
/// Both are only ever changed together, under the same lock, so the count always matches the log length. A sealed
/// timeline stays empty: pushes are ignored.
#[derive(Default)]
pub(super) struct Timeline {
    events: Vec<Event>,
    signal_count: usize,
    sealed: bool,
}

impl Timeline {
    /// Appends `event`, returning `false` if the timeline is sealed.
    fn push(&mut self, event: Event) -> bool {
        if self.sealed {
            return false;
        }

        self.events.push(event);
        self.signal_count += 1;
        true
    }

    pub fn clear(&mut self) {
        self.events = Vec::new();
        self.signal_count = 0;
    }

    /// Clears the timeline and rejects every later push.
    pub fn seal(&mut self) {
        self.clear();
        self.sealed = true;
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.clone()
    }

    pub fn signal_count(&self) -> usize {
        self.signal_count
    }
}

/// A shared, lockable timeline.
#[derive(Clone, Default)]
pub(super) struct SharedTimeline(Arc<Mutex<Timeline>>);

impl SharedTimeline {
    pub fn with<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut Timeline) -> T,
    {
        let mut timeline = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut timeline)
    }
}

/// An event submitted to the recorder.
pub(super) struct Record {
    event: Event,
    recorded: oneshot::Sender<()>,
}

impl Record {
    /// Creates a new `Record` for `event`, along with a receiver that resolves once the event has been recorded.
    ///
    /// If the recorder stops before consuming the record, the receiver resolves with an error.
    pub fn new(event: Event) -> (Self, oneshot::Receiver<()>) {
        let (recorded, recorded_rx) = oneshot::channel();
        (Self { event, recorded }, recorded_rx)
    }
}

/// A termination signal for the recorder.
struct RecorderShutdown {
    shutdown_rx: Option<oneshot::Receiver<()>>,
}

/// A handle to terminate the recorder.
pub(super) struct ShutdownHandle {
    shutdown_tx: oneshot::Sender<()>,
}

impl RecorderShutdown {
    /// Creates a new `RecorderShutdown` and `ShutdownHandle` pair.
    ///
    /// When `ShutdownHandle` is triggered, or dropped, `RecorderShutdown` will resolve.
    fn paired() -> (Self, ShutdownHandle) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let shutdown = Self {
            shutdown_rx: Some(shutdown_rx),
        };

        (shutdown, ShutdownHandle { shutdown_tx })
    }

    /// Waits for the termination signal.
    ///
    /// The receiver is polled in place, so a call that is dropped before the signal arrives leaves it intact for the
    /// next call. Once the signal has been received, all subsequent calls return immediately.
    async fn wait_for_shutdown(&mut self) {
        if let Some(shutdown_rx) = self.shutdown_rx.as_mut() {
            let _ = shutdown_rx.await;
            self.shutdown_rx = None;
        }
    }
}

impl ShutdownHandle {
    /// Triggers the recorder to stop.
    pub fn trigger(self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// The single consumer of events for a future.
pub(super) struct Recorder {
    future_id: usize,
    timeline: SharedTimeline,
    records_rx: mpsc::Receiver<Record>,
    shutdown: RecorderShutdown,
}

impl Recorder {
    /// Spawns a recorder for the given timeline on `runtime`.
    ///
    /// Returns the sender used to submit records, and the handle used to terminate the recorder.
    pub fn spawn(
        future_id: usize, timeline: SharedTimeline, buffer: usize, runtime: &Handle,
    ) -> (mpsc::Sender<Record>, ShutdownHandle) {
        let (records_tx, records_rx) = mpsc::channel(buffer);
        let (shutdown, shutdown_handle) = RecorderShutdown::paired();

        let recorder = Self {
            future_id,
            timeline,
            records_rx,
            shutdown,
        };

        let span = debug_span!("recorder", future_id);
        runtime.spawn(recorder.run().instrument(span));

        (records_tx, shutdown_handle)
    }

    async fn run(mut self) {
        debug!("Recorder started.");

        loop {
            select! {
                // Termination takes priority over any records still queued.
                biased;

                _ = self.shutdown.wait_for_shutdown() => {
                    debug!("Recorder received termination signal.");
                    break;
                },
                maybe_record = self.records_rx.recv() => match maybe_record {
                    Some(record) => self.record(record),
                    None => {
                        debug!("All record senders dropped.");
                        break;
                    }
                },
            }
        }

        // Dropping the receiver here fails any submission still waiting on us.
        debug!(future_id = self.future_id, "Recorder stopped.");
    }

    fn record(&self, record: Record) {
        let Record { event, recorded } = record;
        trace!(kind = %event.kind(), "Recording event.");

        if self.timeline.with(|timeline| timeline.push(event)) {
            let _ = recorded.send(());
        } else {
            debug!(future_id = self.future_id, "Timeline sealed. Dropping event.");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::event::Payload;

    async fn submit(records_tx: &mpsc::Sender<Record>, event: Event) -> bool {
        let (record, recorded) = Record::new(event);
        if records_tx.send(record).await.is_err() {
            return false;
        }
        recorded.await.is_ok()
    }

    #[tokio::test]
    async fn records_in_delivery_order() {
        let timeline = SharedTimeline::default();
        let (records_tx, _shutdown) = Recorder::spawn(0, timeline.clone(), 4, &Handle::current());

        for i in 0..10u32 {
            assert!(submit(&records_tx, Event::complete(Payload::new(i))).await);
        }

        let payloads = timeline.with(|t| {
            t.events()
                .iter()
                .map(|e| *e.payload().downcast_ref::<u32>().unwrap())
                .collect::<Vec<_>>()
        });
        similar_asserts::assert_eq!(payloads, (0..10).collect::<Vec<_>>());
        assert_eq!(timeline.with(|t| t.signal_count()), 10);
    }

    #[tokio::test]
    async fn clear_resets_count() {
        let timeline = SharedTimeline::default();
        let (records_tx, _shutdown) = Recorder::spawn(0, timeline.clone(), 1, &Handle::current());

        assert!(submit(&records_tx, Event::error(Payload::from("bad"))).await);
        timeline.with(Timeline::clear);
        assert!(timeline.with(|t| t.events().is_empty()));
        assert_eq!(timeline.with(|t| t.signal_count()), 0);

        assert!(submit(&records_tx, Event::complete(Payload::from("good"))).await);
        assert_eq!(timeline.with(|t| t.signal_count()), 1);
    }

    #[tokio::test]
    async fn records_survive_pending_shutdown_polls() {
        let timeline = SharedTimeline::default();
        let (records_tx, shutdown) = Recorder::spawn(0, timeline.clone(), 1, &Handle::current());

        // Every record wins the select against the pending termination signal, which must stay armed.
        for i in 0..3u32 {
            assert!(submit(&records_tx, Event::complete(Payload::new(i))).await);
            tokio::task::yield_now().await;
        }
        assert_eq!(timeline.with(|t| t.signal_count()), 3);

        shutdown.trigger();
        let closed = timeout(Duration::from_secs(2), records_tx.closed()).await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn sealed_timeline_rejects_records() {
        let timeline = SharedTimeline::default();
        let (records_tx, _shutdown) = Recorder::spawn(0, timeline.clone(), 1, &Handle::current());

        assert!(submit(&records_tx, Event::complete(Payload::from("before"))).await);
        timeline.with(Timeline::seal);
        assert_eq!(timeline.with(|t| t.signal_count()), 0);

        assert!(!submit(&records_tx, Event::complete(Payload::from("after"))).await);
        assert!(timeline.with(|t| t.events().is_empty()));
        assert_eq!(timeline.with(|t| t.signal_count()), 0);
    }

    #[tokio::test]
    async fn submissions_fail_fast_after_termination() {
        let timeline = SharedTimeline::default();
        let (records_tx, shutdown) = Recorder::spawn(0, timeline.clone(), 1, &Handle::current());
        shutdown.trigger();

        // The recorder exits and drops its receiver, so delivery must not hang.
        let delivered = timeout(Duration::from_secs(2), async {
            loop {
                if !submit(&records_tx, Event::complete(Payload::new(()))).await {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await;

        assert!(delivered.is_ok(), "delivery should fail fast once the recorder has stopped");
    }

    #[tokio::test]
    async fn recorder_stops_when_handle_dropped() {
        let timeline = SharedTimeline::default();
        let (records_tx, shutdown) = Recorder::spawn(0, timeline, 1, &Handle::current());
        drop(shutdown);

        let closed = timeout(Duration::from_secs(2), records_tx.closed()).await;
        assert!(closed.is_ok());
    }
}
