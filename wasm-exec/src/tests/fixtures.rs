//! Hand-written WASI modules and stub compiler scripts so the pipeline is
//! testable without an Emscripten toolchain on the host.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{CompilationArtifact, ResourceBudget};

/// Prints "hello" to stdout and exits cleanly.
pub const HELLO_WAT: &str = r#"(module
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "hello")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 16))
    (i32.store (i32.const 4) (i32.const 5))
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))))
"#;

/// Writes "boom" to stderr, then exits with status 3.
pub const EXIT_THREE_WAT: &str = r#"(module
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "boom")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 16))
    (i32.store (i32.const 4) (i32.const 4))
    (drop (call $fd_write (i32.const 2) (i32.const 0) (i32.const 1) (i32.const 8)))
    (call $proc_exit (i32.const 3))))
"#;

/// Spins forever; terminated only by the fuel ceiling or the deadline.
pub const SPIN_WAT: &str = r#"(module
  (func (export "_start")
    (loop $spin (br $spin))))
"#;

/// Writes 512 chunks of 4096 bytes to stdout, twice the capture cap.
pub const FLOOD_WAT: &str = r#"(module
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (local $i i32)
    (i32.store (i32.const 0) (i32.const 16))
    (i32.store (i32.const 4) (i32.const 4096))
    (block $done
      (loop $write
        (br_if $done (i32.ge_u (local.get $i) (i32.const 512)))
        (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $write)))))
"#;

/// Hits an explicit abort (unreachable) immediately.
pub const ABORT_WAT: &str = r#"(module
  (func (export "_start") unreachable))
"#;

/// Writes "grow" to stderr, then grows linear memory until the ceiling traps it.
pub const GROW_FOREVER_WAT: &str = r#"(module
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "grow")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 16))
    (i32.store (i32.const 4) (i32.const 4))
    (drop (call $fd_write (i32.const 2) (i32.const 0) (i32.const 1) (i32.const 8)))
    (loop $grow
      (drop (memory.grow (i32.const 1)))
      (br $grow))))
"#;

pub fn artifact(wat: &str) -> CompilationArtifact {
    CompilationArtifact {
        wasm: wat::parse_str(wat).expect("fixture WAT must assemble"),
    }
}

/// Small ceilings so misbehaving fixtures terminate quickly.
pub fn tight_budget() -> ResourceBudget {
    ResourceBudget {
        wall_clock: Duration::from_secs(10),
        compile_timeout: Duration::from_secs(10),
        fuel: 1_000_000,
        memory_bytes: 128 * 1024,
    }
}

/// Drop a fake compiler script into `dir` and return its path. The script
/// receives the real fixed flag set and runs in the submission's fresh
/// working area, so `a.out.wasm` lands where the stage expects it.
pub fn stub_compiler(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-emcc");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Stub that "compiles" every submission to the given prebuilt module.
pub fn stub_compiler_emitting(dir: &Path, wat: &str) -> PathBuf {
    let wasm_path = dir.join("fixture.wasm");
    std::fs::write(&wasm_path, wat::parse_str(wat).unwrap()).unwrap();
    stub_compiler(dir, &format!("cp \"{}\" a.out.wasm", wasm_path.display()))
}
