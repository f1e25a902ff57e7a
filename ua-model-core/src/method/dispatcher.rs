use super::{
    coerce::coerce_arguments, CallError, CallRequest, CallResult, CallState, JobQueue,
    MethodManagerCallback, ServiceContext,
};
use crate::address_space::AddressSpace;
use futures::FutureExt;
use opcua::types::{NodeId, StatusCode};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};
use uuid::Uuid;

/// Handle to an accepted call.
#[derive(Debug, Clone)]
pub struct CallTicket {
    pub job_id: Uuid,
    state: watch::Receiver<CallState>,
}

impl CallTicket {
    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    /// Wait until the call reaches a terminal state.
    pub async fn finished(&mut self) -> CallState {
        match self.state.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            // The job was dropped without finishing.
            Err(_) => CallState::Failed(StatusCode::BadShutdown),
        }
    }
}

struct CallTracker {
    job_id: Uuid,
    object_id: NodeId,
    method_id: NodeId,
    tx: watch::Sender<CallState>,
}

impl CallTracker {
    fn set(&self, state: CallState) {
        debug!(
            job_id = %self.job_id,
            object = %self.object_id,
            method = %self.method_id,
            state = ?state,
            "Method call state changed"
        );
        self.tx.send_replace(state);
    }

    fn fail(&self, err: CallError) -> CallError {
        warn!(
            job_id = %self.job_id,
            object = %self.object_id,
            method = %self.method_id,
            error = %err,
            "Method call rejected"
        );
        self.set(CallState::Failed(err.status_code()));
        err
    }
}

/// Validates calls and runs them on a job queue.
///
/// `begin_call` covers Idle through Queued synchronously. Execution and the
/// completion callback happen on a pool worker. Failed calls are never
/// retried.
pub struct MethodDispatcher {
    space: Arc<AddressSpace>,
    queue: Arc<dyn JobQueue>,
}

impl MethodDispatcher {
    pub fn new(space: Arc<AddressSpace>, queue: Arc<dyn JobQueue>) -> Self {
        Self { space, queue }
    }

    pub fn begin_call(
        &self,
        context: ServiceContext,
        request: CallRequest,
        callback: Arc<dyn MethodManagerCallback>,
    ) -> Result<CallTicket, CallError> {
        let (tx, rx) = watch::channel(CallState::Idle);
        let tracker = Arc::new(CallTracker {
            job_id: Uuid::new_v4(),
            object_id: request.object_id.clone(),
            method_id: request.method_id.clone(),
            tx,
        });
        tracker.set(CallState::Validating);

        let Some(object) = self.space.object(&request.object_id) else {
            return Err(tracker.fail(CallError::UnknownObject(request.object_id)));
        };
        let Some(method) = object.resolve_method(&request.method_id) else {
            return Err(tracker.fail(CallError::UnknownMethod {
                object: request.object_id,
                method: request.method_id,
            }));
        };
        let arguments = match coerce_arguments(&request.input_arguments, &method.input) {
            Ok(arguments) => arguments,
            Err(err) => return Err(tracker.fail(err)),
        };

        tracker.set(CallState::Queued);
        let job_id = tracker.job_id;
        let job_tracker = Arc::clone(&tracker);
        let job = async move {
            job_tracker.set(CallState::Executing);
            let outcome = object.call_method(&context, &method, &arguments).await;
            let good = outcome.status.is_good();
            job_tracker.set(if good {
                CallState::Completed
            } else {
                CallState::Failed(outcome.status)
            });

            let mut diagnostics = Vec::new();
            if !good && context.diagnostics_mask != 0 {
                diagnostics.push(format!("{} returned {}", method.name(), outcome.status));
            }
            callback.on_call_complete(
                job_id,
                &context,
                CallResult {
                    status: outcome.status,
                    output_arguments: if good {
                        outcome.output_arguments
                    } else {
                        Vec::new()
                    },
                    input_argument_results: vec![StatusCode::Good; arguments.len()],
                    diagnostics,
                },
            );
        }
        .boxed();

        if let Err(rejected) = self.queue.add_job(job) {
            return Err(tracker.fail(CallError::JobSubmissionFailed(rejected)));
        }
        Ok(CallTicket { job_id, state: rx })
    }

    /// Run a call to completion and return its result.
    pub async fn call(
        &self,
        context: ServiceContext,
        request: CallRequest,
    ) -> Result<CallResult, CallError> {
        let (tx, rx) = oneshot::channel();
        let timeout = context.timeout;
        self.begin_call(context, request, Arc::new(Completion(Mutex::new(Some(tx)))))?;
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| CallError::Timeout(limit))?,
            None => rx.await,
        };
        Ok(result.unwrap_or_else(|_| CallResult {
            status: StatusCode::BadShutdown,
            output_arguments: Vec::new(),
            input_argument_results: Vec::new(),
            diagnostics: Vec::new(),
        }))
    }
}

struct Completion(Mutex<Option<oneshot::Sender<CallResult>>>);

impl MethodManagerCallback for Completion {
    fn on_call_complete(&self, _job_id: Uuid, _context: &ServiceContext, result: CallResult) {
        if let Some(tx) = self.0.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = tx.send(result);
        }
    }
}
