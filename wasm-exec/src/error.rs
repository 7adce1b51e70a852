use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Compiler not found: {0}")]
    CompilerMissing(String),

    #[error("Compilation failed: {diagnostics}")]
    Compile { diagnostics: String },

    #[error("Compilation timed out after {0:?}")]
    CompileTimeout(Duration),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
