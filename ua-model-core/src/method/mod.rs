//! Method calls: argument validation, queueing on the worker pool and
//! completion callbacks.

pub mod coerce;
mod dispatcher;
mod pool;

pub use dispatcher::{CallTicket, MethodDispatcher};
pub use pool::{Job, JobQueue, JobRejected, WorkerPool, WorkerPoolConfig};

use opcua::types::{NodeId, StatusCode, Variant};
use std::time::Duration;
use thiserror::Error;
use ua_model_error::ModelError;
use uuid::Uuid;

/// Call context handed through from the protocol layer to method bodies.
#[derive(Debug, Clone, Default)]
pub struct ServiceContext {
    pub session_id: Option<NodeId>,
    pub request_handle: u32,
    pub diagnostics_mask: u32,
    pub timeout: Option<Duration>,
}

/// What a method body returns.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodOutcome {
    pub status: StatusCode,
    pub output_arguments: Vec<Variant>,
}

impl MethodOutcome {
    pub fn good(output_arguments: Vec<Variant>) -> Self {
        Self {
            status: StatusCode::Good,
            output_arguments,
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            output_arguments: Vec::new(),
        }
    }
}

/// Lifecycle of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Validating,
    Queued,
    Executing,
    Completed,
    Failed(StatusCode),
}

impl CallState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Completed | CallState::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct CallRequest {
    pub object_id: NodeId,
    pub method_id: NodeId,
    pub input_arguments: Vec<Variant>,
}

/// Result delivered to the caller's callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub status: StatusCode,
    pub output_arguments: Vec<Variant>,
    pub input_argument_results: Vec<StatusCode>,
    pub diagnostics: Vec<String>,
}

/// Completion sink supplied with each call.
pub trait MethodManagerCallback: Send + Sync + 'static {
    fn on_call_complete(&self, job_id: Uuid, context: &ServiceContext, result: CallResult);
}

/// Failures reported synchronously, before or at enqueue time.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    #[error("object {0} not found")]
    UnknownObject(NodeId),
    #[error("method {method} is not implemented by {object}")]
    UnknownMethod { object: NodeId, method: NodeId },
    #[error("expected {expected} input arguments, got {actual}")]
    ArgumentsMissing { expected: usize, actual: usize },
    #[error("expected {expected} input arguments, got {actual}")]
    TooManyArguments { expected: usize, actual: usize },
    #[error("input argument coercion failed: {status}")]
    ArgumentCoercionFailed {
        status: StatusCode,
        input_argument_results: Vec<StatusCode>,
    },
    #[error("job submission failed: {0}")]
    JobSubmissionFailed(#[from] JobRejected),
    #[error("call did not complete within {0:?}")]
    Timeout(Duration),
}

impl CallError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CallError::UnknownObject(_) => StatusCode::BadNodeIdUnknown,
            CallError::UnknownMethod { .. } => StatusCode::BadInvalidArgument,
            CallError::ArgumentsMissing { .. } => StatusCode::BadArgumentsMissing,
            CallError::TooManyArguments { .. } => StatusCode::BadTooManyArguments,
            CallError::ArgumentCoercionFailed { status, .. } => *status,
            CallError::JobSubmissionFailed(rejected) => rejected.status_code(),
            CallError::Timeout(_) => StatusCode::BadTimeout,
        }
    }

    /// Per-argument results. Only coercion failures carry them.
    pub fn input_argument_results(&self) -> &[StatusCode] {
        match self {
            CallError::ArgumentCoercionFailed {
                input_argument_results,
                ..
            } => input_argument_results,
            _ => &[],
        }
    }
}

/// Status a method body reports for a failed address-space access.
pub fn error_status(err: &ModelError) -> StatusCode {
    match err {
        ModelError::AccessDenied(_) => StatusCode::BadNotWritable,
        ModelError::NodeNotFound(_) => StatusCode::BadNodeIdUnknown,
        ModelError::TypeMismatch(_) => StatusCode::BadTypeMismatch,
        _ => StatusCode::BadInternalError,
    }
}
