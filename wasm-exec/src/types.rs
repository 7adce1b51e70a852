use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message shown for wall-clock and compile timeouts. The cause is
/// infrastructural, so submitters get a fixed notice rather than internals.
pub const TIMED_OUT_NOTICE: &str = "⏰😮‍💨";

/// One untrusted code submission.
///
/// Owned by exactly one pipeline run and dropped when the run completes;
/// the source text is never retained.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Source text to compile and execute.
    pub source: String,
    /// Opaque submitter reference, used only for logging.
    pub submitter: String,
}

impl Submission {
    pub fn new(source: impl Into<String>, submitter: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            submitter: submitter.into(),
        }
    }
}

/// Sandbox-loadable binary produced by the compilation stage.
///
/// Consumed once by the sandbox; compiler diagnostics travel on the error
/// side of `compile`, never in here.
#[derive(Debug, Clone)]
pub struct CompilationArtifact {
    pub wasm: Vec<u8>,
}

/// Resource ceilings for one pipeline run, fixed at run start and never
/// renegotiated.
#[derive(Debug, Clone)]
pub struct ResourceBudget {
    /// Overall wall-clock deadline for compile + execute.
    pub wall_clock: Duration,
    /// Timeout for the compiler invocation alone.
    pub compile_timeout: Duration,
    /// Deterministic instruction budget for the sandbox.
    pub fuel: u64,
    /// Cap on the guest's linear memory, in bytes.
    pub memory_bytes: usize,
}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self {
            wall_clock: Duration::from_secs(120),
            compile_timeout: Duration::from_secs(300),
            fuel: 10_000_000_000,
            memory_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Why a sandboxed program was trapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrapCause {
    FuelExhausted,
    MemoryExceeded,
    IllegalOperation,
    ExplicitAbort,
}

/// How a pipeline run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Normal exit, status 0.
    Success,
    /// Normal exit with a non-zero status the program reported itself.
    NonZeroExit(i32),
    /// Abnormal termination inside the sandbox.
    Trapped(TrapCause),
    /// The compiler rejected the source; diagnostics are in `stderr`.
    CompileFailed,
    /// The compiler invocation exceeded its own timeout.
    CompileTimedOut,
    /// The overall wall-clock deadline elapsed.
    TimedOut,
    /// An internal failure, downgraded to a result by the governor.
    Errored,
}

/// Captured output of one run. Both streams are always fully captured;
/// `visible` selects the one shown to the submitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
}

impl ExecutionResult {
    /// Visible-output policy: a clean exit shows stdout; everything else
    /// (non-zero exit, trap, compile failure, timeout, internal error)
    /// shows stderr, on the assumption that errors are reported there.
    pub fn visible(&self) -> &str {
        match self.status {
            ExitStatus::Success => &self.stdout,
            _ => &self.stderr,
        }
    }

    pub fn compile_failed(diagnostics: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: diagnostics,
            status: ExitStatus::CompileFailed,
        }
    }

    pub fn compile_timed_out() -> Self {
        Self {
            stdout: String::new(),
            stderr: TIMED_OUT_NOTICE.to_string(),
            status: ExitStatus::CompileTimedOut,
        }
    }

    /// Partial output captured before the deadline is discarded, not returned.
    pub fn timed_out() -> Self {
        Self {
            stdout: String::new(),
            stderr: TIMED_OUT_NOTICE.to_string(),
            status: ExitStatus::TimedOut,
        }
    }

    pub fn errored(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
            status: ExitStatus::Errored,
        }
    }
}

/// Caller-facing payload: small outputs inline, large ones as a reference
/// into content-addressed storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveredResult {
    Inline(String),
    Stored { url: String },
}

impl DeliveredResult {
    /// The text to hand to the delivery collaborator.
    pub fn as_text(&self) -> &str {
        match self {
            DeliveredResult::Inline(text) => text,
            DeliveredResult::Stored { url } => url,
        }
    }
}
