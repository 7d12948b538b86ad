//! Callback-driven futures with a recorded event timeline.
//!
//! A [`FutureHandle`] represents an outcome that will be delivered at some point by whoever holds the handle. Parties
//! interested in that outcome register handlers for completion, failure, and cleanup; parties producing it signal the
//! future from any task or thread. Every delivered outcome is recorded, in the order it arrived, on the future's
//! timeline.
//!
//! - [`future`]: the future itself, its signals, timeline, and lifecycle
//! - [`gate`]: a block/unblock pair for stalling a caller until someone releases it
//! - [`config`]: configuration, including loading from the environment
//!
//! Futures run their tasks on a Tokio runtime, which must be available when they are created.
#![deny(missing_docs)]

pub mod config;
pub use self::config::{ConfigurationError, FutureConfiguration};

mod error;
pub use self::error::{FutureError, HandlerFailure, SettleError, SignalKind};

mod event;
pub use self::event::{Event, EventKind, Payload};

pub mod future;
pub use self::future::FutureHandle;

pub mod gate;

mod mode;
pub use self::mode::Mode;
