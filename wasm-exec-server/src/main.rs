use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wasm_exec::{
    ExecService, HttpObjectStore, Materializer, Pipeline, ResourceBudget, WasmCompiler,
};
use wasm_exec_server::{create_app, run_server, Delivery};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to listen on
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// Maximum number of concurrent pipeline runs
    #[arg(short, long, default_value = "10")]
    max_concurrent: usize,

    /// Wall-clock deadline per run, in seconds
    #[arg(long, default_value = "120")]
    wall_clock: u64,

    /// Compiler invocation timeout, in seconds
    #[arg(long, default_value = "300")]
    compile_timeout: u64,

    /// Sandbox instruction budget
    #[arg(long, default_value = "10000000000")]
    fuel: u64,

    /// Sandbox linear memory limit in bytes
    #[arg(long, default_value = "16777216")] // 16MiB
    memory_limit: usize,

    /// Largest output delivered inline, in bytes
    #[arg(long, default_value = "128")]
    size_threshold: usize,

    /// Object-storage bucket for oversized outputs
    #[arg(long)]
    bucket: String,

    /// Ahead-of-time compiler program
    #[arg(long, default_value = wasm_exec::DEFAULT_COMPILER)]
    compiler: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let token = std::env::var("TELEGRAM_TOKEN").context("TELEGRAM_TOKEN is not set")?;
    let secret = std::env::var("WEBHOOK_SECRET").context("WEBHOOK_SECRET is not set")?;

    let budget = ResourceBudget {
        wall_clock: Duration::from_secs(args.wall_clock),
        compile_timeout: Duration::from_secs(args.compile_timeout),
        fuel: args.fuel,
        memory_bytes: args.memory_limit,
    };

    let compiler = WasmCompiler::new(args.compiler, budget.compile_timeout);
    if let Err(err) = compiler.check_tools() {
        warn!(error = %err, "compiler missing; every submission will fail until it is installed");
    }
    let pipeline = Pipeline::with_compiler(compiler, budget)?;

    let store =
        HttpObjectStore::new(args.bucket).with_token(std::env::var("STORAGE_TOKEN").ok());
    let materializer = Materializer::new(Arc::new(store), args.size_threshold);
    let service = ExecService::new(args.max_concurrent, pipeline, materializer);

    let app = create_app(service, Delivery::new(token), secret);
    run_server(app, args.addr).await?;
    Ok(())
}
