use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::{
    materialize::Materializer,
    pipeline::Pipeline,
    types::{DeliveredResult, Submission},
};

/// Fixed notice for infrastructural failures the submitter cannot act on.
const INTERNAL_FAILURE_NOTICE: &str = "internal error, please resubmit";

/// Concurrency-bounded façade over the pipeline.
///
/// Runs are independent: each submission gets its own pipeline run with no
/// shared mutable state, so a stalled run cannot block others beyond the
/// permit it holds. `run` never fails; every outcome is a deliverable value.
pub struct ExecService {
    pipeline: Pipeline,
    materializer: Materializer,
    semaphore: Arc<Semaphore>,
}

impl ExecService {
    pub fn new(max_concurrent_runs: usize, pipeline: Pipeline, materializer: Materializer) -> Self {
        Self {
            pipeline,
            materializer,
            semaphore: Arc::new(Semaphore::new(max_concurrent_runs)),
        }
    }

    pub async fn run(&self, submission: Submission) -> DeliveredResult {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("execution semaphore closed");
                return DeliveredResult::Inline(INTERNAL_FAILURE_NOTICE.to_string());
            }
        };

        debug!(submitter = %submission.submitter, "accepted submission");
        let result = self.pipeline.run(&submission).await;

        match self.materializer.materialize(&submission, &result).await {
            Ok(delivered) => {
                info!(submitter = %submission.submitter, status = ?result.status, "run completed");
                delivered
            }
            Err(err) => {
                error!(error = %err, "failed to materialize result");
                DeliveredResult::Inline(INTERNAL_FAILURE_NOTICE.to_string())
            }
        }
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}
