//! Future configuration.

use figment::{
    error::Kind,
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::mode::Mode;

const DEFAULT_RECORDER_BUFFER: usize = 64;
const DEFAULT_MAX_CONCURRENT_DISPATCHES: usize = 1024;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// Field's data type was not the expected data type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Name of the invalid field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to load configuration: {}", source))]
    Generic {
        /// Error source.
        source: figment::Error,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        match e.kind {
            Kind::InvalidType(actual_ty, expected_ty) => Self::InvalidFieldType {
                field: e.path.join("."),
                expected_ty,
                actual_ty: actual_ty.to_string(),
            },
            _ => Self::Generic { source: e },
        }
    }
}

/// Configuration for a [`FutureHandle`][crate::FutureHandle].
///
/// # Environment
///
/// When loaded via [`from_environment`][Self::from_environment], each field maps to an upper-cased variable under
/// the given prefix. With a prefix of `WORMHOLE`:
///
/// - `WORMHOLE_MODE`: `einstein` or `hawking`
/// - `WORMHOLE_RECORDER_BUFFER`: capacity of the channel feeding the recorder
/// - `WORMHOLE_MAX_CONCURRENT_DISPATCHES`: how many handlers may run at once
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct FutureConfiguration {
    mode: Mode,
    recorder_buffer: usize,
    max_concurrent_dispatches: usize,
}

impl FutureConfiguration {
    /// Loads the configuration from environment variables with the given prefix, falling back to defaults.
    ///
    /// A trailing underscore is added to the prefix if missing.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, or a variable holds a value of the wrong type, an error is returned.
    pub fn from_environment(prefix: &str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = if prefix.ends_with('_') {
            prefix.to_uppercase()
        } else {
            format!("{}_", prefix.to_uppercase())
        };

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(&prefix))
            .extract()?;

        Ok(config.normalized())
    }

    /// Sets the misuse mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the capacity of the recorder channel.
    ///
    /// Clamped to at least one.
    pub fn with_recorder_buffer(mut self, recorder_buffer: usize) -> Self {
        self.recorder_buffer = recorder_buffer.max(1);
        self
    }

    /// Sets the maximum number of handlers that may execute concurrently.
    ///
    /// Clamped to at least one.
    pub fn with_max_concurrent_dispatches(mut self, max_concurrent_dispatches: usize) -> Self {
        self.max_concurrent_dispatches = max_concurrent_dispatches.max(1);
        self
    }

    /// Returns the misuse mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns the capacity of the recorder channel.
    pub fn recorder_buffer(&self) -> usize {
        self.recorder_buffer
    }

    /// Returns the maximum number of handlers that may execute concurrently.
    pub fn max_concurrent_dispatches(&self) -> usize {
        self.max_concurrent_dispatches
    }

    fn normalized(self) -> Self {
        let recorder_buffer = self.recorder_buffer;
        let max_concurrent_dispatches = self.max_concurrent_dispatches;
        self.with_recorder_buffer(recorder_buffer)
            .with_max_concurrent_dispatches(max_concurrent_dispatches)
    }
}

impl Default for FutureConfiguration {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            recorder_buffer: DEFAULT_RECORDER_BUFFER,
            max_concurrent_dispatches: DEFAULT_MAX_CONCURRENT_DISPATCHES,
        }
    }
}

impl From<Mode> for FutureConfiguration {
    fn from(mode: Mode) -> Self {
        Self::default().with_mode(mode)
    }
}
