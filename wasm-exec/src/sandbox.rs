use std::thread;
use std::time::Duration;

use tokio::task;
use tracing::debug;
use wasmtime::{Config, Engine, Linker, Module, ResourceLimiter, Store, Trap};
use wasmtime_wasi::p2::pipe::MemoryOutputPipe;
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::{I32Exit, WasiCtxBuilder};

use crate::{
    error::Error,
    types::{CompilationArtifact, ExecutionResult, ExitStatus, ResourceBudget, TrapCause},
    Result,
};

/// WASI command entry point exported by the artifacts we produce.
pub const DEFAULT_ENTRY_POINT: &str = "_start";

/// Caps on the captured stream sinks. Writes past the cap fail inside the
/// guest, so capture is truncated at the cap: anything the program emits
/// beyond it never reaches delivery, and the host never buffers more than
/// this per run.
const STDOUT_CAPACITY: usize = 1024 * 1024;
const STDERR_CAPACITY: usize = 256 * 1024;

const MAX_TABLE_ELEMENTS: usize = 100_000;

/// Granularity of the wall-clock deadline enforced through epochs. A guest
/// overruns its deadline by at most one tick before trapping.
const EPOCH_TICK: Duration = Duration::from_millis(50);

/// Per-run store state: the WASI context plus the memory ceiling.
///
/// `memory_exceeded` records that the limiter denied a growth, so the
/// resulting trap can be attributed to the memory budget rather than lumped
/// in with other abnormal terminations.
struct RunState {
    wasi: WasiP1Ctx,
    memory_limit: usize,
    memory_exceeded: bool,
}

impl ResourceLimiter for RunState {
    fn memory_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        if desired > self.memory_limit {
            self.memory_exceeded = true;
            // Returning an error traps the guest instead of letting the
            // allocation fail soft; the host process never allocates it.
            return Err(wasmtime::Error::msg(format!(
                "linear memory limit of {} bytes exceeded",
                self.memory_limit
            )));
        }
        Ok(true)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        Ok(desired <= MAX_TABLE_ELEMENTS)
    }
}

/// Execution sandbox: one wasmtime instance per invocation, a restricted
/// WASI surface exposing only two write-only stream sinks, and deterministic
/// fuel/memory ceilings.
///
/// The `Engine` is shared across runs (it holds only compiled-code caches);
/// every `Store`, instance, and WASI context is per-run and dropped with it.
/// A background ticker advances the engine epoch so each store can carry a
/// wall-clock deadline the guest cannot outrun: when the deadline ticks
/// elapse the guest traps, the blocking task finishes, and the run's VM is
/// gone by the time `execute` returns.
pub struct WasmSandbox {
    engine: Engine,
    entry_point: String,
}

impl WasmSandbox {
    pub fn new() -> Result<Self> {
        let mut config = Config::new();
        config.consume_fuel(true);
        config.epoch_interruption(true);
        let engine = Engine::new(&config).map_err(|e| Error::Sandbox(e.to_string()))?;

        // The ticker holds only a weak handle; it winds down once the last
        // engine clone is dropped.
        let ticker = engine.weak();
        thread::spawn(move || loop {
            thread::sleep(EPOCH_TICK);
            match ticker.upgrade() {
                Some(engine) => engine.increment_epoch(),
                None => break,
            }
        });

        Ok(Self {
            engine,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
        })
    }

    pub fn with_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    /// Run the artifact under the given budget and wall-clock deadline,
    /// capturing both streams for the full duration regardless of how the
    /// program terminates.
    ///
    /// Program misbehavior (non-zero exit, trap of any cause, deadline
    /// overrun) is a normal `ExecutionResult`; `Err` is reserved for
    /// host-side failures. The returned future resolves only after the
    /// blocking task has released the store, so no VM from the run remains
    /// live afterwards.
    pub async fn execute(
        &self,
        artifact: CompilationArtifact,
        budget: &ResourceBudget,
        deadline: Duration,
    ) -> Result<ExecutionResult> {
        let engine = self.engine.clone();
        let entry_point = self.entry_point.clone();
        let budget = budget.clone();

        // Wasmtime execution is synchronous; keep it off the async workers.
        task::spawn_blocking(move || {
            run_module(&engine, &entry_point, &artifact.wasm, &budget, deadline)
        })
        .await
        .map_err(|e| Error::Sandbox(format!("execution task failed: {e}")))?
    }
}

fn run_module(
    engine: &Engine,
    entry_point: &str,
    wasm: &[u8],
    budget: &ResourceBudget,
    deadline: Duration,
) -> Result<ExecutionResult> {
    let module = Module::new(engine, wasm)
        .map_err(|e| Error::Sandbox(format!("failed to load artifact: {e}")))?;

    let stdout = MemoryOutputPipe::new(STDOUT_CAPACITY);
    let stderr = MemoryOutputPipe::new(STDERR_CAPACITY);

    // No preopened dirs, no network, no env, no args, no stdin: the two
    // stream sinks are the entire system interface.
    let wasi = WasiCtxBuilder::new()
        .stdout(stdout.clone())
        .stderr(stderr.clone())
        .build_p1();

    let mut store = Store::new(
        engine,
        RunState {
            wasi,
            memory_limit: budget.memory_bytes,
            memory_exceeded: false,
        },
    );
    store.limiter(|state| state as &mut dyn ResourceLimiter);
    store
        .set_fuel(budget.fuel)
        .map_err(|e| Error::Sandbox(e.to_string()))?;

    // At least one tick, so a deadline shorter than the tick still traps on
    // the next epoch advance rather than never.
    let ticks = (deadline.as_millis() as u64 / EPOCH_TICK.as_millis() as u64).max(1);
    store.set_epoch_deadline(ticks);

    let mut linker = Linker::new(engine);
    preview1::add_to_linker_sync(&mut linker, |state: &mut RunState| &mut state.wasi)
        .map_err(|e| Error::Sandbox(e.to_string()))?;

    let status = match linker.instantiate(&mut store, &module) {
        Ok(instance) => {
            let start = instance
                .get_typed_func::<(), ()>(&mut store, entry_point)
                .map_err(|e| Error::Sandbox(format!("missing entry point {entry_point:?}: {e}")))?;
            match start.call(&mut store, ()) {
                Ok(()) => ExitStatus::Success,
                Err(trap) => classify(store.data(), &trap),
            }
        }
        // An artifact whose initial memory already exceeds the cap traps
        // during instantiation.
        Err(e) if store.data().memory_exceeded => {
            debug!(error = %e, "instantiation exceeded memory budget");
            ExitStatus::Trapped(TrapCause::MemoryExceeded)
        }
        Err(e) => return Err(Error::Sandbox(format!("instantiation failed: {e}"))),
    };

    drop(store);

    Ok(ExecutionResult {
        stdout: String::from_utf8_lossy(&stdout.contents()).into_owned(),
        stderr: String::from_utf8_lossy(&stderr.contents()).into_owned(),
        status,
    })
}

fn classify(state: &RunState, trap: &wasmtime::Error) -> ExitStatus {
    if let Some(exit) = trap.downcast_ref::<I32Exit>() {
        return match exit.0 {
            0 => ExitStatus::Success,
            code => ExitStatus::NonZeroExit(code),
        };
    }

    let cause = if state.memory_exceeded {
        TrapCause::MemoryExceeded
    } else {
        match trap.downcast_ref::<Trap>() {
            Some(Trap::OutOfFuel) => TrapCause::FuelExhausted,
            Some(Trap::Interrupt) => return ExitStatus::TimedOut,
            Some(Trap::UnreachableCodeReached) => TrapCause::ExplicitAbort,
            _ => TrapCause::IllegalOperation,
        }
    };
    ExitStatus::Trapped(cause)
}
