//! Error handling for the AdaptivePow miner core
//!
//! Error kinds for device setup, dataset generation, and batch dispatch with
//! proper context and recovery information.

use thiserror::Error;

/// Result type alias for miner core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the miner core
#[derive(Error, Debug)]
pub enum Error {
    /// Requested device id does not exist
    #[error("no such device: {device}")]
    NoSuchDevice { device: u32 },

    /// Device context creation failed
    #[error("device init failed: {message}")]
    DeviceInitFailed { message: String },

    /// Kernel compilation failed; carries the build log
    #[error("kernel build failed:\n{log}")]
    KernelBuildFailed { log: String },

    /// Dataset allocation failed
    #[error("out of memory: {bytes} bytes requested")]
    OutOfMemory { bytes: u64 },

    /// A job was submitted before the DAG for the current epoch was built
    #[error("dataset not ready")]
    DatasetNotReady,

    /// A kernel dispatch failed
    #[error("dispatch failed during {stage}")]
    DispatchFailed { stage: String },

    /// Mining job validation errors
    #[error("invalid job: {message}")]
    InvalidJob { message: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Config { message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Cancellation of async operations
    #[error("operation was cancelled: {operation}")]
    Cancelled { operation: String },
}

impl Error {
    /// Create a device init error
    pub fn device_init(message: impl Into<String>) -> Self {
        Self::DeviceInitFailed {
            message: message.into(),
        }
    }

    /// Create a kernel build error from a build log
    pub fn kernel_build(log: impl Into<String>) -> Self {
        Self::KernelBuildFailed { log: log.into() }
    }

    /// Create an out-of-memory error for a failed allocation
    pub fn out_of_memory(bytes: u64) -> Self {
        Self::OutOfMemory { bytes }
    }

    /// Create a dispatch error for a named pipeline stage
    pub fn dispatch(stage: impl Into<String>) -> Self {
        Self::DispatchFailed {
            stage: stage.into(),
        }
    }

    /// Create an invalid job error
    pub fn invalid_job(message: impl Into<String>) -> Self {
        Self::InvalidJob {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Whether the device context survives this error.
    ///
    /// Only `DatasetNotReady` is recoverable (by running DAG generation);
    /// every other error tears the device context down.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::DatasetNotReady)
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::NoSuchDevice { .. } => "no_such_device",
            Error::DeviceInitFailed { .. } => "device_init_failed",
            Error::KernelBuildFailed { .. } => "kernel_build_failed",
            Error::OutOfMemory { .. } => "out_of_memory",
            Error::DatasetNotReady => "dataset_not_ready",
            Error::DispatchFailed { .. } => "dispatch_failed",
            Error::InvalidJob { .. } => "invalid_job",
            Error::Config { .. } => "config",
            Error::Io(_) => "io",
            Error::Yaml(_) => "yaml",
            Error::Cancelled { .. } => "cancelled",
        }
    }
}
