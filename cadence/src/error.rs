//! Error types for hotplug operations

use thiserror::Error;

/// Hotplug error types
#[derive(Debug, Error)]
pub enum HotplugError {
    /// Malformed or out-of-range value written to a tunable
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No tunable with this name
    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    /// Tunable cannot be written
    #[error("attribute is read-only: {0}")]
    ReadOnly(&'static str),

    /// Core has no frequency scaling policy (usually just went offline)
    #[error("cpu{0} has no frequency policy")]
    NoPolicy(usize),

    /// Core refused a power state change
    #[error("failed to change power state of cpu{core}: {source}")]
    CoreControl {
        core: usize,
        #[source]
        source: std::io::Error,
    },

    /// Controller could not be started
    #[error("controller startup failed: {0}")]
    Startup(String),
}

/// Result type for hotplug operations
pub type Result<T> = std::result::Result<T, HotplugError>;

impl HotplugError {
    /// Shorthand for an invalid-argument error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Check if the caller supplied bad input (as opposed to a system failure)
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::UnknownAttribute(_) | Self::ReadOnly(_)
        )
    }
}
