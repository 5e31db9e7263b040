//! Config CLI subcommands: show, defaults, validate.
//!
//! These read configuration from `ORCH_*` environment variables, or from a
//! TOML file passed with `--file`, without starting an orchestrator.

use crate::config::{EffectiveConfig, OrchestratorConfig};

use super::resolve_config;

/// Print effective config to stdout. Returns the process exit code.
pub fn run_show(args: &[String]) -> i32 {
    match resolve_config(args) {
        Ok(cfg) => {
            print_config(&cfg.effective_config(), args.iter().any(|a| a == "--json"));
            0
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            2
        }
    }
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    print_config(&OrchestratorConfig::default().effective_config(), false);
}

/// Validate configuration and flag settings that are legal but suspicious.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if invalid.
pub fn run_validate(args: &[String]) -> i32 {
    let cfg = match resolve_config(args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return 2;
        }
    };
    if let Err(e) = cfg.validate() {
        eprintln!("ERROR: {e}");
        return 2;
    }

    let warnings = warnings(&cfg);
    for w in &warnings {
        eprintln!("WARNING: {w}");
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn warnings(cfg: &OrchestratorConfig) -> Vec<String> {
    let mut out = Vec::new();
    if cfg.max_batch_size > cfg.queue_capacity {
        out.push(format!(
            "max_batch_size ({}) exceeds queue_capacity ({}); batches can never be full",
            cfg.max_batch_size, cfg.queue_capacity
        ));
    }
    if !cfg.stabilization_window.is_zero() && cfg.stabilization_window < cfg.control_interval {
        out.push(format!(
            "stabilization_window ({:?}) is shorter than control_interval ({:?}); cooldown has no effect",
            cfg.stabilization_window, cfg.control_interval
        ));
    }
    // Growing from `n` to `n + 1` workers needs depth > n * factor, and depth
    // never exceeds queue_capacity.
    let reachable = (cfg.queue_capacity as f64 / cfg.backlog_threshold_factor).ceil() as usize;
    if reachable < cfg.max_workers {
        out.push(format!(
            "queue_capacity ({}) can only drive scale-up to {} of {} max_workers",
            cfg.queue_capacity, reachable, cfg.max_workers
        ));
    }
    out
}

fn print_config(cfg: &EffectiveConfig, json: bool) {
    if json {
        match serde_json::to_string_pretty(cfg) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("ERROR: {e}"),
        }
        return;
    }
    println!("ORCH_QUEUE_CAPACITY={}", cfg.queue_capacity);
    println!("ORCH_MAX_BATCH_SIZE={}", cfg.max_batch_size);
    println!("ORCH_MAX_WORKERS={}", cfg.max_workers);
    println!("ORCH_BACKLOG_FACTOR={}", cfg.backlog_threshold_factor);
    println!("ORCH_STABILIZATION_MS={}", cfg.stabilization_window_ms);
    println!("ORCH_CONTROL_INTERVAL_MS={}", cfg.control_interval_ms);
    println!("ORCH_SCALE_DOWN_MS={}", cfg.scale_down_window_ms);
    println!("ORCH_DEPTH_HISTORY={}", cfg.depth_history_len);
}
