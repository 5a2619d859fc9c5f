//! Error types shared by every perfscope component.
//!
//! Recording-path misuse is fatal: the public recording entry points turn a
//! [`PerfError`] into a panic after logging it. Internals
//! return `Result` so the failing invariant can be tested directly.

use thiserror::Error;

/// A specific misuse of the recording protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Violation {
    /// A point id of 0 was passed where a registered point is required.
    #[error("invalid point id 0")]
    InvalidPoint,
    /// `exit` was called without any open scope.
    #[error("exit without a matching open scope")]
    UnmatchedExit,
    /// `exit` was called for a point that is neither the innermost open scope
    /// nor a `child` level just closed with `exit_single`.
    #[error("exit does not match the innermost open scope")]
    MismatchedExit,
    /// A scope node already owns a gpu-time child.
    #[error("scope already has a gpu_time child")]
    DuplicateGpuChild,
    /// A gpu-time child was requested for a point other than its scope's.
    #[error("gpu_time child point differs from its scope point")]
    ForeignGpuChild,
    /// A child node was requested under a node that is not a scope.
    #[error("only scope nodes can have children")]
    NonScopeParent,
    /// A scope end did not match the innermost scope while mapping samples.
    #[error("scope_end does not match the innermost scope_begin")]
    UnbalancedSamples,
    /// A frame boundary was reached while scopes were still open.
    #[error("scopes still open at frame boundary")]
    OpenScopesAtFrameEnd,
    /// `pause` was called on a paused recorder.
    #[error("pause called on a paused recorder")]
    AlreadyPaused,
    /// `resume` was called on a running recorder.
    #[error("resume called on a running recorder")]
    NotPaused,
    /// `pause_gpu` was called while GPU profiling was already paused.
    #[error("pause_gpu called while gpu profiling is paused")]
    GpuAlreadyPaused,
    /// `resume_gpu` was called while GPU profiling was running.
    #[error("resume_gpu called while gpu profiling is running")]
    GpuNotPaused,
}

/// Errors produced by perfscope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PerfError {
    /// The recording protocol was broken; continuing would corrupt the stream or the tree.
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] Violation),
    /// A 16-bit id space ran out.
    #[error("capacity exceeded: too many {what} (limit {limit})")]
    CapacityExceeded {
        /// Which id space overflowed.
        what: &'static str,
        /// The maximum number of ids in that space.
        limit: usize,
    },
    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used throughout the crate.
pub type PerfResult<T> = Result<T, PerfError>;

/// Aborts recording on a non-recoverable error.
#[cold]
#[track_caller]
pub(crate) fn fatal(err: PerfError) -> ! {
    tracing::error!("perfscope: {err}");
    panic!("perfscope: {err}");
}

/// Unwraps a recording-path result, failing fast on error.
#[inline]
#[track_caller]
pub(crate) fn ensure<T>(result: PerfResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => fatal(err),
    }
}
