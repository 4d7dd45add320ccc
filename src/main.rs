use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use wasmtime::{Engine, Instance, Module, Store};
use wasmtime_wasi::{ambient_authority, Dir, WasiCtx, WasiCtxBuilder};

use wasmrun::runtime::base::StoreState;
use wasmrun::runtime::gas::GasMeter;
use wasmrun::runtime::{invoke, shim};
use wasmrun::utils::value::fmt_vals;

const EXAMPLES: &str = "\
Examples:
  wasmrun fib32.wasm 32                         run a single exported function
  wasmrun -i swap_i64 swap.wasm 10 12           invoke with a multivalue result
  wasmrun hello-wasi.wasm                       wasi_snapshot_preview1 support
  wasmrun hello-unstable.wasm                   wasi_unstable compatibility layer
  wasmrun --trace hello-wasi.wasm               trace imported function calls
  wasmrun --gas-limit 500000000 cm.metered.wasm gas metering";

/// Run a WebAssembly module.
#[derive(Debug, Parser)]
#[command(name = "wasmrun", version, after_help = EXAMPLES)]
struct Args {
    /// Function to execute
    #[arg(short, long, value_name = "NAME")]
    invoke: Option<String>,

    /// Execution timeout (ms)
    #[arg(short, long, value_name = "MS")]
    timeout: Option<u64>,

    /// Trace imported function calls
    #[arg(long)]
    trace: bool,

    /// Gas limit for the metering import
    #[arg(long, value_name = "GAS", default_value_t = 100_000.0)]
    gas_limit: f64,

    /// Module to run (.wasm, or .wat via the engine's text support)
    file: PathBuf,

    /// Arguments for the invoked function (or the WASI program)
    args: Vec<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(exitcode) => process::exit(exitcode),
        Err(err) => {
            log::error!("{err:#}");
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> anyhow::Result<i32> {
    let binary = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let mut config = wasmtime::Config::new();
    if args.timeout.is_some() {
        config.epoch_interruption(true);
    }
    let engine = Engine::new(&config)?;
    let module = Module::new(&engine, &binary).context("failed to compile module")?;

    let state = StoreState::new(build_wasi_ctx(args)?, GasMeter::new(args.gas_limit));
    let mut store = Store::new(&engine, state);

    if let Some(timeout) = args.timeout {
        store.set_epoch_deadline(1);
        let engine = engine.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(timeout));
            engine.increment_epoch();
        });
    }

    let (linker, generation) = shim::assemble(&engine, &mut store, &module, args.trace)?;
    let instance = linker.instantiate(&mut store, &module)?;

    let exported = invoke::exported_funcs(&module);
    let target = args.invoke.clone().or_else(|| {
        // A bare library module with a single export runs it implicitly.
        generation
            .is_none()
            .then(|| invoke::auto_target(&exported).map(str::to_string))
            .flatten()
    });

    let exitcode = match target {
        Some(target) => {
            log::info!("Running {target}({})...", args.args.join(","));
            let results = invoke::invoke(&mut store, &instance, &module, &target, &args.args)?;
            log::info!("Result: {}", fmt_vals(&results));
            0
        }
        None => run_start(&mut store, &instance)?,
    };

    let gas_used = store.data().gas.used();
    if gas_used > 0.0 {
        log::info!("Gas used: {gas_used:.4}");
    }

    Ok(exitcode)
}

/// Runs the start routine and folds a WASI exit back into a process code.
fn run_start(store: &mut Store<StoreState>, instance: &Instance) -> anyhow::Result<i32> {
    let start = instance
        .get_typed_func::<(), ()>(&mut *store, "_start")
        .context("module has no _start entrypoint and no function was selected to invoke")?;

    match start.call(&mut *store, ()) {
        Ok(()) => Ok(0),
        Err(err) => match err.downcast::<wasmtime_wasi::I32Exit>() {
            Ok(exit) => {
                if exit.0 != 0 {
                    log::info!("Exit code: {}", exit.0);
                }
                Ok(exit.0)
            }
            Err(err) => Err(err),
        },
    }
}

fn build_wasi_ctx(args: &Args) -> anyhow::Result<WasiCtx> {
    let mut builder = WasiCtxBuilder::new();
    builder.inherit_stdio();

    let mut guest_args = vec![args.file.display().to_string()];
    guest_args.extend(args.args.iter().cloned());
    builder.args(&guest_args)?;

    for guest_path in ["/", "."] {
        let dir = Dir::open_ambient_dir(".", ambient_authority())
            .context("failed to open the current directory for preopening")?;
        builder.preopened_dir(dir, guest_path)?;
    }

    Ok(builder.build())
}
