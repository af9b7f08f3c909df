//! hdlcov: dependency closures and sandboxed coverage for HDL datasets
//!
//! ## Usage
//!
//! ```bash
//! hdlcov resolve -d modules.jsonl -r top            # Print the closure of `top`
//! hdlcov run -d modules.jsonl -r top -w runs/top    # Simulate one unit
//! hdlcov batch -d modules.jsonl -o runs -j 16       # Simulate every module
//! hdlcov parse runs/top/obj_dir/coverage.log        # Extract counters
//! ```

use clap::Parser;
use hdlcov_cli::{handlers, Cli, CliConfig, CliResult, Commands, Verbosity};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = build_config(&cli);
    init_tracing(config.verbosity);

    match cli.command {
        Commands::Resolve(args) => handlers::execute_resolve(&config, &args),
        Commands::Run(args) => handlers::execute_run(&config, &args),
        Commands::Batch(args) => handlers::execute_batch(&config, &args),
        Commands::Parse(args) => handlers::execute_parse(&config, &args),
        Commands::InitEnv => handlers::execute_init_env(&config),
        Commands::Config(args) => handlers::execute_config(&config, &args),
        Commands::Check(args) => handlers::execute_check(&config, &args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.verbose, cli.quiet))
        .with_color(cli.color.clone().into())
        .with_sandbox_config(cli.config.as_ref().map(|p| p.to_string_lossy().into_owned()))
}

/// Log to stderr; `RUST_LOG` overrides the level picked by `-v`/`-q`.
/// Targets are shown at debug level only.
fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity.is_debug())
        .try_init();
}
