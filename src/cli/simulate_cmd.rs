//! `simulate` subcommand: push a bursty synthetic workload through an
//! orchestrator backed by [`SimulatedExecutor`] and print a JSON summary.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::OrchestratorConfig;
use crate::executor::{SimulatedExecutor, SimulatedExecutorConfig};
use crate::orchestrator::{Orchestrator, OrchestratorError};
use crate::scheduler::{QueueError, WorkItem};
use crate::sink::CollectingSink;
use crate::telemetry::MetricsSnapshot;

use super::{flag_value, resolve_config};

/// Workload shape for a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub items: usize,
    pub burst_size: usize,
    pub burst_pause: Duration,
    /// Attempts per item after the first `Full` rejection.
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Upper bound on how long to wait for accepted items to finish.
    pub result_timeout: Duration,
    pub executor: SimulatedExecutorConfig,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            items: 200,
            burst_size: 50,
            burst_pause: Duration::from_millis(200),
            max_retries: 3,
            retry_backoff: Duration::from_millis(20),
            result_timeout: Duration::from_secs(60),
            executor: SimulatedExecutorConfig::default(),
        }
    }
}

/// Printed at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub submitted: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub completed: usize,
    pub failed: usize,
    pub undelivered: usize,
    pub peak_workers: usize,
    pub final_workers: usize,
    pub elapsed_ms: u64,
    pub metrics: MetricsSnapshot,
}

/// Parse `simulate` flags on top of `SimulationOptions::default()`.
pub fn parse_options(args: &[String]) -> Result<SimulationOptions, String> {
    let mut opts = SimulationOptions::default();
    if let Some(v) = flag_value(args, "--items") {
        opts.items = parse_flag(v, "--items")?;
    }
    if let Some(v) = flag_value(args, "--burst") {
        opts.burst_size = parse_flag::<usize>(v, "--burst")?.max(1);
    }
    if let Some(v) = flag_value(args, "--pause-ms") {
        opts.burst_pause = Duration::from_millis(parse_flag(v, "--pause-ms")?);
    }
    if let Some(v) = flag_value(args, "--retries") {
        opts.max_retries = parse_flag(v, "--retries")?;
    }
    if let Some(v) = flag_value(args, "--base-ms") {
        opts.executor.base_latency = Duration::from_millis(parse_flag(v, "--base-ms")?);
    }
    if let Some(v) = flag_value(args, "--per-item-ms") {
        opts.executor.per_item_latency = Duration::from_millis(parse_flag(v, "--per-item-ms")?);
    }
    if let Some(v) = flag_value(args, "--failure-rate") {
        let rate: f64 = parse_flag(v, "--failure-rate")?;
        if !(0.0..=1.0).contains(&rate) {
            return Err(format!("--failure-rate must be within [0, 1], got {rate}"));
        }
        opts.executor.failure_rate = rate;
    }
    Ok(opts)
}

fn parse_flag<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid value for {flag}: {value}"))
}

/// Entry point for `batch-orchestrator simulate`. Returns the exit code.
pub async fn run(args: &[String]) -> i32 {
    let config = match resolve_config(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return 2;
        }
    };
    let options = match parse_options(args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return 2;
        }
    };

    match run_simulation(config, options).await {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => {
                println!("{json}");
                0
            }
            Err(e) => {
                eprintln!("ERROR: {e}");
                1
            }
        },
        Err(e) => {
            eprintln!("ERROR: {e}");
            1
        }
    }
}

/// Run one simulated workload to completion.
pub async fn run_simulation(
    config: OrchestratorConfig,
    options: SimulationOptions,
) -> Result<SimulationSummary, OrchestratorError> {
    let sink = CollectingSink::new();
    let executor = Arc::new(SimulatedExecutor::new(options.executor.clone()));
    let orchestrator = Orchestrator::start(config, executor, sink.clone())?;
    let started = Instant::now();

    let mut accepted = 0;
    let mut rejected = 0;
    let mut peak_workers = orchestrator.pool_snapshot().active;

    let mut submitted = 0;
    while submitted < options.items {
        let burst = options.burst_size.min(options.items - submitted);
        for n in submitted..submitted + burst {
            if submit_with_retry(&orchestrator, WorkItem::new(format!("req-{n}")), &options).await {
                accepted += 1;
            } else {
                rejected += 1;
            }
        }
        submitted += burst;
        peak_workers = peak_workers.max(orchestrator.pool_snapshot().active);
        tracing::debug!(submitted, accepted, rejected, "burst submitted");
        tokio::time::sleep(options.burst_pause).await;
        peak_workers = peak_workers.max(orchestrator.pool_snapshot().active);
    }

    wait_for_results(
        &orchestrator,
        &sink,
        accepted,
        options.result_timeout,
        &mut peak_workers,
        tokio::signal::ctrl_c,
    )
    .await;

    let final_workers = orchestrator.pool_snapshot().active;
    let report = orchestrator.shutdown().await;
    let results = sink.results();
    let completed = results.iter().filter(|r| r.is_success()).count();

    Ok(SimulationSummary {
        submitted,
        accepted,
        rejected,
        completed,
        failed: results.len() - completed,
        undelivered: report.undelivered.len(),
        peak_workers,
        final_workers,
        elapsed_ms: started.elapsed().as_millis() as u64,
        metrics: orchestrator.metrics_snapshot(),
    })
}

/// How the wait for results ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Complete,
    TimedOut,
    Interrupted,
}

/// Wait until `expected` results arrive, `timeout` passes, or `interrupt`
/// resolves. Samples the pool size into `peak_workers` while waiting.
///
/// If `interrupt` fails, it is not polled again for the rest of the wait.
async fn wait_for_results<F, Fut>(
    orchestrator: &Orchestrator,
    sink: &CollectingSink,
    expected: usize,
    timeout: Duration,
    peak_workers: &mut usize,
    mut interrupt: F,
) -> WaitOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut listen_for_interrupt = true;
    loop {
        tokio::select! {
            () = sink.wait_for(expected) => return WaitOutcome::Complete,
            () = &mut deadline => {
                tracing::warn!(received = sink.len(), expected, "timed out waiting for results");
                return WaitOutcome::TimedOut;
            }
            signal = interrupt(), if listen_for_interrupt => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "failed to listen for ctrl-c; interrupts disabled for this run");
                    listen_for_interrupt = false;
                    continue;
                }
                tracing::warn!(received = sink.len(), expected, "interrupted, shutting down");
                return WaitOutcome::Interrupted;
            }
            () = tokio::time::sleep(Duration::from_millis(25)) => {
                *peak_workers = (*peak_workers).max(orchestrator.pool_snapshot().active);
            }
        }
    }
}

/// Submit `item`, backing off linearly while the queue is full.
async fn submit_with_retry(orchestrator: &Orchestrator, mut item: WorkItem, options: &SimulationOptions) -> bool {
    let mut attempt = 0;
    loop {
        match orchestrator.submit(item) {
            Ok(_) => return true,
            Err(QueueError::Full { item: returned, .. }) if attempt < options.max_retries => {
                attempt += 1;
                item = returned;
                tokio::time::sleep(options.retry_backoff * attempt).await;
            }
            Err(e) => {
                tracing::debug!(error = %e, attempt, "item dropped");
                return false;
            }
        }
    }
}
