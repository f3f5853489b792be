//! Error types for context setup and submission

use crate::task::ContextId;

/// Errors reported by the registry, contexts and executors.
///
/// Queue overflow is also a contract violation: [`TaskContext::execute`]
/// panics on it, `try_execute` hands it back for callers that retry.
///
/// [`TaskContext::execute`]: crate::TaskContext::execute
#[derive(Debug, thiserror::Error)]
pub enum AsyncError {
    #[error("runnable queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("executor shut down")]
    ShutDown,

    #[error("context {0} out of range")]
    InvalidContext(ContextId),

    #[error("context {0} configured more than once")]
    DuplicateContext(ContextId),

    #[error("context {0} is not in the expected lifecycle state")]
    InvalidState(ContextId),

    #[error("registry not initialized")]
    NotInitialized,

    #[error("registry already initialized")]
    AlreadyInitialized,

    #[cfg(feature = "std")]
    #[error("failed to spawn thread for context {context}")]
    Spawn {
        context: ContextId,
        #[source]
        source: std::io::Error,
    },
}
