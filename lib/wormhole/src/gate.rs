//! Blocking gate.
//!
//! Every future carries a gate which lets a caller stall until some other party releases it. The gate has nothing to
//! do with signals or the recorder: it is a coordinate that [`block`] moves onto the Schwarzschild radius and
//! [`unblock`] moves back out to the Einstein radius. A blocked caller resumes as soon as the coordinate leaves the
//! Schwarzschild radius.
//!
//! A call to `block` always closes the gate before waiting, so it only returns after an `unblock` that happens after
//! it. Releasing an already open gate does nothing.
//!
//! # Example
//!
//! ```
//! use wormhole::{gate, FutureHandle, Mode};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let future = FutureHandle::new(Mode::Einstein);
//!
//! let releaser = future.clone();
//! future
//!     .register_complete(move |_| {
//!         gate::unblock(&releaser).unwrap();
//!     })
//!     .unwrap();
//!
//! let signaller = future.clone();
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//!     signaller.signal_complete("done").unwrap();
//! });
//!
//! gate::block_async(&future).await.unwrap();
//! # }
//! ```

use tokio::sync::watch;
use tracing::debug;

use crate::{error::FutureError, future::FutureHandle};

/// A point in space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Radius {
    /// X coordinate.
    pub x: f64,

    /// Y coordinate.
    pub y: f64,

    /// Z coordinate.
    pub z: f64,
}

impl Radius {
    /// The radius at which a gate blocks.
    pub const SCHWARZSCHILD: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    /// The radius at which a gate is open.
    pub const EINSTEIN: Self = Self { x: 1.0, y: 1.0, z: 1.0 };
}

/// The gate of a single future.
pub(crate) struct Gate {
    radius: watch::Sender<Radius>,
}

impl Gate {
    pub fn new() -> Self {
        let (radius, _) = watch::channel(Radius::EINSTEIN);
        Self { radius }
    }

    /// Closes the gate, returning a receiver to wait on until it opens again.
    fn close(&self) -> watch::Receiver<Radius> {
        self.radius.send_replace(Radius::SCHWARZSCHILD);
        self.radius.subscribe()
    }

    /// Opens the gate, releasing every waiter.
    pub fn open(&self) {
        self.radius.send_replace(Radius::EINSTEIN);
    }

    /// Returns the current radius.
    fn radius(&self) -> Radius {
        *self.radius.borrow()
    }

    async fn wait(mut radius_rx: watch::Receiver<Radius>) {
        // The sender lives as long as the gate, so an error only means nobody can open it anymore.
        let _ = radius_rx.wait_for(|radius| *radius != Radius::SCHWARZSCHILD).await;
    }
}

/// Blocks the current thread until [`unblock`] is called on `future`.
///
/// This parks the calling thread. From an asynchronous context, use [`block_async`] instead.
///
/// # Errors
///
/// If `future` has been destroyed, and its mode is [`Mode::Hawking`][crate::Mode::Hawking], an error is returned.
/// Under [`Mode::Einstein`][crate::Mode::Einstein], blocking a destroyed future returns immediately.
#[doc(alias = "schwarzschild")]
pub fn block(future: &FutureHandle) -> Result<(), FutureError> {
    match future.with_gate(Gate::close) {
        Ok(radius_rx) => {
            debug!(future_id = future.id(), "Blocking thread on gate.");
            futures::executor::block_on(Gate::wait(radius_rx));
            Ok(())
        }
        Err(e) => future.apply_mode(e),
    }
}

/// Waits until [`unblock`] is called on `future`.
///
/// # Errors
///
/// If `future` has been destroyed, and its mode is [`Mode::Hawking`][crate::Mode::Hawking], an error is returned.
/// Under [`Mode::Einstein`][crate::Mode::Einstein], blocking a destroyed future returns immediately.
pub async fn block_async(future: &FutureHandle) -> Result<(), FutureError> {
    match future.with_gate(Gate::close) {
        Ok(radius_rx) => {
            debug!(future_id = future.id(), "Waiting on gate.");
            Gate::wait(radius_rx).await;
            Ok(())
        }
        Err(e) => future.apply_mode(e),
    }
}

/// Releases every caller blocked on `future`.
///
/// Does nothing if nobody is blocked.
///
/// # Errors
///
/// If `future` has been destroyed, and its mode is [`Mode::Hawking`][crate::Mode::Hawking], an error is returned.
#[doc(alias = "openheimer")]
pub fn unblock(future: &FutureHandle) -> Result<(), FutureError> {
    match future.with_gate(Gate::open) {
        Ok(()) => Ok(()),
        Err(e) => future.apply_mode(e),
    }
}

/// Returns the current gate coordinate of `future`.
///
/// Destroyed futures always report [`Radius::EINSTEIN`].
pub fn radius(future: &FutureHandle) -> Radius {
    future.with_gate(Gate::radius).unwrap_or(Radius::EINSTEIN)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{task::spawn_blocking, time::timeout};
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::Mode;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn block_waits_for_unblock() {
        let future = FutureHandle::new(Mode::Einstein);

        let blocked = future.clone();
        let mut handle = spawn_blocking(move || block(&blocked));

        // Still blocked with nobody releasing it.
        assert!(timeout(Duration::from_millis(100), &mut handle).await.is_err());
        assert_eq!(radius(&future), Radius::SCHWARZSCHILD);

        assert_ok!(unblock(&future));
        let result = timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert_ok!(result);
        assert_eq!(radius(&future), Radius::EINSTEIN);
    }

    #[tokio::test]
    async fn double_unblock_does_not_preopen() {
        let future = FutureHandle::new(Mode::Hawking);

        assert_ok!(unblock(&future));
        assert_ok!(unblock(&future));

        let blocked = future.clone();
        let mut wait = Box::pin(async move { block_async(&blocked).await });
        assert!(timeout(Duration::from_millis(100), &mut wait).await.is_err());

        assert_ok!(unblock(&future));
        let result = timeout(Duration::from_secs(2), wait).await.unwrap();
        assert_ok!(result);
    }

    #[tokio::test]
    async fn unblock_releases_every_waiter() {
        let future = FutureHandle::new(Mode::Einstein);

        let waiters = (0..3)
            .map(|_| {
                let future = future.clone();
                tokio::spawn(async move { block_async(&future).await })
            })
            .collect::<Vec<_>>();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_ok!(unblock(&future));

        for waiter in waiters {
            let result = timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
            assert_ok!(result);
        }
    }

    #[tokio::test]
    async fn destroy_releases_waiters() {
        let future = FutureHandle::new(Mode::Einstein);

        let blocked = future.clone();
        let waiter = tokio::spawn(async move { block_async(&blocked).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_ok!(future.destroy());
        let result = timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
        assert_ok!(result);
    }

    #[tokio::test]
    async fn destroyed_future_does_not_block() {
        let einstein = FutureHandle::new(Mode::Einstein);
        assert_ok!(einstein.destroy());
        assert_ok!(timeout(Duration::from_secs(1), block_async(&einstein)).await.unwrap());
        assert_ok!(unblock(&einstein));

        let hawking = FutureHandle::new(Mode::Hawking);
        assert_ok!(hawking.destroy());
        assert_eq!(block_async(&hawking).await, Err(FutureError::Destroyed));
        assert_err!(unblock(&hawking));
        assert_eq!(radius(&hawking), Radius::EINSTEIN);
    }
}
