use std::fmt;

use snafu::Snafu;

/// Signal kinds.
///
/// Used to describe which handler slot an operation targeted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// A completion signal.
    Complete,

    /// An error signal.
    Error,

    /// A finally signal.
    Finally,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => f.write_str("SignalComplete"),
            Self::Error => f.write_str("SignalError"),
            Self::Finally => f.write_str("SignalFinally"),
        }
    }
}

/// Future errors.
///
/// Both variants represent misuse of a future. Whether they reach the caller depends on the future's
/// [`Mode`][crate::Mode].
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(context(suffix(false)))]
pub enum FutureError {
    /// The future has been destroyed.
    #[snafu(display("future is destroyed"))]
    Destroyed,

    /// No handler is registered for the requested signal.
    #[snafu(display("no function registered for future event [{}]", signal))]
    NoHandler {
        /// The signal that had no handler.
        signal: SignalKind,
    },
}

/// A handler failure that was not recovered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerFailure {
    /// The signal whose handler failed.
    pub signal: SignalKind,

    /// The panic message, if it carried one.
    pub message: Option<String>,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "[{}] handler failed: {}", self.signal, message),
            None => write!(f, "[{}] handler failed", self.signal),
        }
    }
}

/// Settle errors.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum SettleError {
    /// One or more error or finally handlers failed while the future was settling.
    #[snafu(display("{} handler(s) failed without recovery", failures.len()))]
    Unrecovered {
        /// The failures, in the order they were observed.
        failures: Vec<HandlerFailure>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misuse_messages() {
        assert_eq!(FutureError::Destroyed.to_string(), "future is destroyed");
        assert_eq!(
            FutureError::NoHandler {
                signal: SignalKind::Complete
            }
            .to_string(),
            "no function registered for future event [SignalComplete]"
        );
        assert_eq!(
            FutureError::NoHandler {
                signal: SignalKind::Finally
            }
            .to_string(),
            "no function registered for future event [SignalFinally]"
        );
    }

    #[test]
    fn unrecovered_display() {
        let err = SettleError::Unrecovered {
            failures: vec![HandlerFailure {
                signal: SignalKind::Error,
                message: Some("nope".into()),
            }],
        };
        assert_eq!(err.to_string(), "1 handler(s) failed without recovery");
    }
}
