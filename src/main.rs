//! batch-orchestrator entry point.
//!
//! ## CLI Subcommands
//!
//! - `batch-orchestrator simulate` - Run a simulated bursty workload (default)
//! - `batch-orchestrator config show|defaults|validate` - Inspect configuration
//! - `batch-orchestrator version` - Print version

use std::process::ExitCode;

use batch_orchestrator::cli::{config_cmd, simulate_cmd};
use batch_orchestrator::telemetry::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("simulate");
    let rest = args.get(2..).unwrap_or(&[]);

    match command {
        "simulate" => {
            if let Err(e) = init_logging(&LogConfig::from_env()) {
                eprintln!("Logging setup failed: {}", e);
                return ExitCode::from(2u8);
            }
            let code = simulate_cmd::run(rest).await;
            ExitCode::from(code as u8)
        }
        "config" => {
            let subcommand = rest.first().map(|s| s.as_str()).unwrap_or("show");
            let sub_args = rest.get(1..).unwrap_or(&[]);
            match subcommand {
                "show" => ExitCode::from(config_cmd::run_show(sub_args) as u8),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(config_cmd::run_validate(sub_args) as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = rest.first() {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("batch-orchestrator {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "batch-orchestrator v{}

USAGE:
    batch-orchestrator [COMMAND] [OPTIONS]

COMMANDS:
    simulate     Drive a simulated workload and print a JSON summary (default)
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    batch-orchestrator simulate --items 500 --burst 100
    batch-orchestrator simulate --failure-rate 0.1
    batch-orchestrator config show --json
    batch-orchestrator config validate --file orchestrator.toml

ENVIRONMENT:
    ORCH_QUEUE_CAPACITY       Queue capacity (default: 256)
    ORCH_MAX_BATCH_SIZE       Items per batch (default: 8)
    ORCH_MAX_WORKERS          Worker ceiling (default: CPU count)
    ORCH_BACKLOG_FACTOR       Backlog per worker that triggers scale-up (default: 2.0)
    ORCH_STABILIZATION_MS     Cooldown between scale-ups (default: 5000)
    ORCH_CONTROL_INTERVAL_MS  Control loop tick (default: 50)
    ORCH_SCALE_DOWN_MS        Drained time before scale-down (default: 0)
    ORCH_DEPTH_HISTORY        Depth samples kept (default: 32)
    ORCH_LOG_FORMAT           json or pretty (default: json)
    ORCH_LOG_LEVEL / RUST_LOG Log filter
    ORCH_LOG_FILE             Write logs to this file instead of stderr

EXIT CODES:
    0  Success
    1  Failure / warnings found
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "simulate" => {
            eprintln!(
                "batch-orchestrator simulate - Run a simulated workload

USAGE:
    batch-orchestrator simulate [OPTIONS]

OPTIONS:
    --items N           Total items to submit (default: 200)
    --burst N           Items per burst (default: 50)
    --pause-ms MS       Pause between bursts (default: 200)
    --retries N         Retries per item while the queue is full (default: 3)
    --base-ms MS        Simulated fixed cost per batch (default: 5)
    --per-item-ms MS    Simulated cost per item (default: 10)
    --failure-rate P    Probability a batch fails, 0 to 1 (default: 0)
    --file PATH         Load orchestrator config from a TOML file

DESCRIPTION:
    Starts an orchestrator with a simulated executor, submits bursts of
    items, waits for their results, shuts down, and prints a JSON summary
    including scaling behaviour and collected metrics.
"
            );
        }
        "config" => {
            eprintln!(
                "batch-orchestrator config - Inspect configuration

USAGE:
    batch-orchestrator config <SUBCOMMAND> [OPTIONS]

SUBCOMMANDS:
    show       Print the effective configuration (env or --file)
    defaults   Print built-in defaults
    validate   Check configuration and report warnings

OPTIONS:
    --file PATH  Read a TOML file instead of ORCH_* variables
    --json       Print as JSON (show only)

EXIT CODES (validate):
    0  Valid
    1  Valid with warnings
    2  Invalid
"
            );
        }
        _ => {
            eprintln!("No detailed help for '{}'", command);
            print_usage();
        }
    }
}
