use std::time::Duration;
use tempfile::TempDir;
use tokio::{fs, process::Command, time};
use tracing::debug;
use which::which;

use crate::{error::Error, types::CompilationArtifact, Result};

/// Default ahead-of-time compiler program.
pub const DEFAULT_COMPILER: &str = "em++";

const SOURCE_FILE: &str = "main.cpp";
const ARTIFACT_FILE: &str = "a.out.wasm";

/// Flag set passed to every invocation. Submissions control only the body
/// of `main.cpp`, never the build configuration.
const FIXED_FLAGS: &[&str] = &[
    "-O3",
    "-flto",
    "-s",
    "ENVIRONMENT=node",
    "-s",
    "WASM=1",
    "-s",
    "PURE_WASI=1",
    SOURCE_FILE,
];

/// Compilation stage: turns source text into a sandbox-loadable wasm binary
/// by invoking an external ahead-of-time compiler in a fresh working area.
///
/// This stage knows nothing about sandboxing; it only produces artifacts.
pub struct WasmCompiler {
    program: String,
    timeout: Duration,
}

impl WasmCompiler {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Verify the configured compiler is on `PATH`.
    pub fn check_tools(&self) -> Result<()> {
        which(&self.program).map_err(|_| Error::CompilerMissing(self.program.clone()))?;
        Ok(())
    }

    /// Compile `source` to a wasm artifact.
    ///
    /// The working area is a fresh temporary directory per invocation, never
    /// reused across submissions, and removed on every exit path when the
    /// `TempDir` drops. The compiler process is killed if the future is
    /// dropped or the timeout fires.
    pub async fn compile(&self, source: &str) -> Result<CompilationArtifact> {
        let workdir = TempDir::new()?;
        fs::write(workdir.path().join(SOURCE_FILE), source).await?;

        let mut command = Command::new(&self.program);
        command
            .args(FIXED_FLAGS)
            .current_dir(workdir.path())
            .kill_on_drop(true);

        let output = time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| Error::CompileTimeout(self.timeout))??;

        if !output.status.success() {
            return Err(Error::Compile {
                diagnostics: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        // Read the artifact fully into memory before the workdir is torn down.
        let wasm = fs::read(workdir.path().join(ARTIFACT_FILE)).await?;
        debug!(bytes = wasm.len(), "compiled submission to wasm");

        Ok(CompilationArtifact { wasm })
    }
}
