//! # wasm-exec
//!
//! A compile-and-execute pipeline for untrusted code submissions: source
//! text is compiled with an external ahead-of-time compiler to a WASI
//! binary, run in a per-submission wasmtime sandbox with fuel and memory
//! ceilings under a wall-clock deadline, and the captured output is
//! returned inline or offloaded to content-addressed object storage.

mod compiler;
mod error;
mod materialize;
mod pipeline;
mod sandbox;
mod service;
mod storage;
mod types;

#[cfg(test)]
mod tests;

pub use compiler::{WasmCompiler, DEFAULT_COMPILER};
pub use error::Error;
pub use materialize::{storage_key, Materializer, DEFAULT_SIZE_THRESHOLD};
pub use pipeline::Pipeline;
pub use sandbox::{WasmSandbox, DEFAULT_ENTRY_POINT};
pub use service::ExecService;
pub use storage::{HttpObjectStore, MemoryObjectStore, ObjectStore};
pub use types::{
    CompilationArtifact, DeliveredResult, ExecutionResult, ExitStatus, ResourceBudget, Submission,
    TrapCause, TIMED_OUT_NOTICE,
};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;
