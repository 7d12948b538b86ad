use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::FutureError;

/// Misuse policy for a future.
///
/// Misuse covers operating on a destroyed future and signalling a kind that has no registered handler. Handler
/// failures are not misuse and are not affected by the mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Misuse is logged and the operation becomes a no-op.
    #[default]
    Einstein,

    /// Misuse aborts the operation, returning the error to the caller.
    Hawking,
}

impl Mode {
    /// Returns the integer value of the mode.
    pub const fn as_int(&self) -> u8 {
        match self {
            Self::Einstein => 0,
            Self::Hawking => 1,
        }
    }

    /// Applies this policy to a misuse error.
    ///
    /// Under `Einstein` the error is logged and swallowed. Under `Hawking` it is returned.
    pub(crate) fn apply(&self, future_id: usize, err: FutureError) -> Result<(), FutureError> {
        match self {
            Self::Einstein => {
                warn!(future_id, "{}", err);
                Ok(())
            }
            Self::Hawking => Err(err),
        }
    }

    /// Applies this policy where no caller is waiting on the outcome.
    pub(crate) fn apply_detached(&self, future_id: usize, err: FutureError) {
        match self {
            Self::Einstein => warn!(future_id, "{}", err),
            Self::Hawking => error!(future_id, "{}", err),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Einstein => f.write_str("einstein"),
            Self::Hawking => f.write_str("hawking"),
        }
    }
}
