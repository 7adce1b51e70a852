use std::time::Instant;

use tokio::time;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    compiler::{WasmCompiler, DEFAULT_COMPILER},
    error::Error,
    sandbox::WasmSandbox,
    types::{ExecutionResult, ResourceBudget, Submission},
    Result,
};

/// Resource governor: wraps the compilation stage and the sandbox for one
/// submission under a single wall-clock deadline, independent of and stacked
/// on top of the per-stage timeout and the sandbox's fuel/memory ceilings.
///
/// `run` always yields a result value: compile failures short-circuit
/// execution, the deadline backstops any toolchain hang the inner timeouts
/// miss, and internal errors are downgraded to `ExitStatus::Errored`.
pub struct Pipeline {
    compiler: WasmCompiler,
    sandbox: WasmSandbox,
    budget: ResourceBudget,
}

impl Pipeline {
    pub fn new(budget: ResourceBudget) -> Result<Self> {
        let compiler = WasmCompiler::new(DEFAULT_COMPILER, budget.compile_timeout);
        Self::with_compiler(compiler, budget)
    }

    pub fn with_compiler(compiler: WasmCompiler, budget: ResourceBudget) -> Result<Self> {
        Ok(Self {
            compiler,
            sandbox: WasmSandbox::new()?,
            budget,
        })
    }

    /// Run one submission end to end.
    ///
    /// The deadline releases whatever the interrupted stage holds before
    /// `run` returns: a cancelled compile kills the compiler process and
    /// removes its working area with the dropped future, and the sandbox
    /// enforces the remaining deadline from inside the guest, so its store
    /// and captured streams are dropped before the execution stage yields
    /// `TimedOut`. Nothing from the run remains reachable afterwards.
    pub async fn run(&self, submission: &Submission) -> ExecutionResult {
        let run_id = Uuid::new_v4();
        debug!(%run_id, submitter = %submission.submitter, "starting pipeline run");
        let started = Instant::now();

        let compile = self.compiler.compile(&submission.source);
        let artifact = match time::timeout(self.budget.wall_clock, compile).await {
            Err(_) => {
                warn!(%run_id, deadline = ?self.budget.wall_clock, "wall-clock deadline elapsed");
                return ExecutionResult::timed_out();
            }
            Ok(Err(Error::Compile { diagnostics })) => {
                return ExecutionResult::compile_failed(diagnostics)
            }
            Ok(Err(Error::CompileTimeout(_))) => return ExecutionResult::compile_timed_out(),
            Ok(Err(err)) => return ExecutionResult::errored(err.to_string()),
            Ok(Ok(artifact)) => artifact,
        };

        let remaining = self.budget.wall_clock.saturating_sub(started.elapsed());
        let result = match self.sandbox.execute(artifact, &self.budget, remaining).await {
            Ok(result) => result,
            Err(err) => ExecutionResult::errored(err.to_string()),
        };
        debug!(%run_id, status = ?result.status, "pipeline run finished");
        result
    }
}
