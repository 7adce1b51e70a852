use std::time::{Duration, Instant};

use crate::sandbox::WasmSandbox;
use crate::tests::fixtures::{
    artifact, tight_budget, ABORT_WAT, EXIT_THREE_WAT, FLOOD_WAT, GROW_FOREVER_WAT, HELLO_WAT,
    SPIN_WAT,
};
use crate::types::{ExecutionResult, ExitStatus, TrapCause};
use crate::Result;

async fn run(sandbox: &WasmSandbox, wat: &str) -> Result<ExecutionResult> {
    let budget = tight_budget();
    sandbox
        .execute(artifact(wat), &budget, budget.wall_clock)
        .await
}

#[tokio::test]
async fn clean_exit_captures_stdout() -> Result<()> {
    let sandbox = WasmSandbox::new()?;
    let result = run(&sandbox, HELLO_WAT).await?;

    assert_eq!(result.status, ExitStatus::Success);
    assert_eq!(result.stdout, "hello");
    assert!(result.stderr.is_empty());
    assert_eq!(result.visible(), "hello");
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_makes_stderr_visible() -> Result<()> {
    let sandbox = WasmSandbox::new()?;
    let result = run(&sandbox, EXIT_THREE_WAT).await?;

    assert_eq!(result.status, ExitStatus::NonZeroExit(3));
    assert_eq!(result.stderr, "boom");
    assert_eq!(result.visible(), "boom");
    Ok(())
}

#[tokio::test]
async fn infinite_loop_exhausts_fuel() -> Result<()> {
    let sandbox = WasmSandbox::new()?;
    let result = run(&sandbox, SPIN_WAT).await?;

    assert_eq!(result.status, ExitStatus::Trapped(TrapCause::FuelExhausted));
    Ok(())
}

#[tokio::test]
async fn deadline_interrupts_a_fuel_rich_guest() -> Result<()> {
    let sandbox = WasmSandbox::new()?;
    let budget = crate::types::ResourceBudget {
        fuel: 8_000_000_000,
        ..tight_budget()
    };

    let started = Instant::now();
    let result = sandbox
        .execute(artifact(SPIN_WAT), &budget, Duration::from_millis(200))
        .await?;

    assert_eq!(result.status, ExitStatus::TimedOut);
    // The guest traps within a tick of the deadline; nowhere near the
    // seconds the fuel ceiling alone would allow.
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "deadline took {:?}",
        started.elapsed()
    );
    Ok(())
}

#[tokio::test]
async fn unreachable_is_an_explicit_abort() -> Result<()> {
    let sandbox = WasmSandbox::new()?;
    let result = run(&sandbox, ABORT_WAT).await?;

    assert_eq!(result.status, ExitStatus::Trapped(TrapCause::ExplicitAbort));
    Ok(())
}

#[tokio::test]
async fn over_allocation_traps_with_stderr_up_to_the_trap() -> Result<()> {
    let sandbox = WasmSandbox::new()?;
    let result = run(&sandbox, GROW_FOREVER_WAT).await?;

    assert_eq!(result.status, ExitStatus::Trapped(TrapCause::MemoryExceeded));
    assert_eq!(result.stderr, "grow");
    assert_eq!(result.visible(), "grow");
    Ok(())
}

#[tokio::test]
async fn output_capture_stops_at_the_sink_cap() -> Result<()> {
    let sandbox = WasmSandbox::new()?;
    let result = run(&sandbox, FLOOD_WAT).await?;

    // The program attempts 2 MiB of stdout; writes past the 1 MiB cap fail
    // inside the guest and the capture holds exactly the cap.
    assert_eq!(result.status, ExitStatus::Success);
    assert_eq!(result.stdout.len(), 1024 * 1024);
    Ok(())
}

#[tokio::test]
async fn runs_share_no_state() -> Result<()> {
    let sandbox = WasmSandbox::new()?;

    let first = run(&sandbox, HELLO_WAT).await?;
    let second = run(&sandbox, HELLO_WAT).await?;

    assert_eq!(first.stdout, "hello");
    assert_eq!(second.stdout, "hello");
    assert_eq!(first.status, ExitStatus::Success);
    assert_eq!(second.status, ExitStatus::Success);
    Ok(())
}
