use crate::capability::Capability;

/// All errors that can occur within the engine.
///
/// One error type across the workspace keeps propagation simple: host
/// executors, the grid device, and the dispatch layer all speak it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The executor declares no native support for the requested operation.
    #[error("executor does not provide {0} bulk dispatch")]
    Unsupported(Capability),

    /// A partition requires more groups than the executor reports legal.
    /// There is no fallback to a smaller group size or multiple launches.
    #[error("partition exceeds device capacity: {needed} groups needed, {available} available")]
    Configuration { needed: usize, available: usize },

    /// The device work queue rejected or failed a launch or query.
    #[error("{op} failed with code {code}: {detail}")]
    Launch {
        op: &'static str,
        code: i32,
        detail: String,
    },

    /// A lane body panicked on the host path. Captured once and re-raised
    /// when the caller observes the operation's result.
    #[error("lane panicked: {0}")]
    Lane(String),

    /// A lane faulted on the hardware path. Recorded in the device and
    /// surfaced at the next host-side check, never through a future's value.
    #[error("device fault: {0}")]
    DeviceFault(String),

    /// No device is registered under the given ordinal.
    #[error("no device registered with ordinal {0}")]
    NoSuchDevice(usize),

    /// The promise side of a future was dropped before resolving it.
    #[error("promise dropped before completion")]
    BrokenPromise,

    /// Catch-all for errors with no dedicated variant.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Build a [`Error::Msg`] from anything printable.
    pub fn msg(msg: impl Into<String>) -> Self {
        Error::Msg(msg.into())
    }

    /// Convert a caught panic payload into a [`Error::Lane`].
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        Error::Lane(panic_message(payload.as_ref()))
    }
}

/// Extract a printable message from a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
