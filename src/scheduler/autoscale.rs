//! Heuristic autoscaling.
//!
//! Once per control cycle the policy looks at queue depth and pool
//! utilization and answers grow, shrink, or hold. Rules, in order:
//!
//! 1. Scale up when `depth > active * backlog_threshold_factor`, the pool is
//!    below its ceiling, and the stabilization window since the last scale-up
//!    has elapsed.
//! 2. Scale down when the queue is empty, every worker is idle, more than one
//!    worker is active, and the system has been drained for at least
//!    `scale_down_window` (zero by default).
//! 3. Otherwise hold.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::pool::PoolSnapshot;

/// Tuning knobs for [`AutoscalePolicy`].
#[derive(Debug, Clone)]
pub struct AutoscaleConfig {
    pub backlog_threshold_factor: f64,
    /// Minimum time between two scale-ups.
    pub stabilization_window: Duration,
    /// Minimum time the system must stay drained before a scale-down.
    pub scale_down_window: Duration,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            backlog_threshold_factor: 2.0,
            stabilization_window: Duration::from_secs(5),
            scale_down_window: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDecision {
    ScaleUp,
    ScaleDown,
    Hold,
}

/// Live inputs sampled at the start of a control cycle.
#[derive(Debug, Clone, Copy)]
pub struct ScalingSignals {
    pub queue_depth: usize,
    pub pool: PoolSnapshot,
}

/// Bounded ring buffer of recent queue depths.
#[derive(Debug, Clone)]
pub struct DepthHistory {
    samples: VecDeque<usize>,
    capacity: usize,
}

impl DepthHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, depth: usize) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(depth);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<usize> {
        self.samples.back().copied()
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<usize>() as f64 / self.samples.len() as f64
    }

    pub fn peak(&self) -> usize {
        self.samples.iter().copied().max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.samples.iter().copied()
    }
}

/// Scaling state owned by the orchestrator.
///
/// `active_workers` always stays within `1..=max_workers`; it only changes
/// through [`record_scale_up`](Self::record_scale_up) and
/// [`record_scale_down`](Self::record_scale_down).
#[derive(Debug, Clone)]
pub struct PoolState {
    active_workers: usize,
    max_workers: usize,
    depth_history: DepthHistory,
    last_scale_up: Option<Instant>,
    /// Start of the current fully-drained stretch, if any.
    drained_since: Option<Instant>,
}

impl PoolState {
    pub fn new(max_workers: usize, history_len: usize) -> Self {
        Self {
            active_workers: 1,
            max_workers: max_workers.max(1),
            depth_history: DepthHistory::new(history_len),
            last_scale_up: None,
            drained_since: None,
        }
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn depth_history(&self) -> &DepthHistory {
        &self.depth_history
    }

    pub fn last_scale_up(&self) -> Option<Instant> {
        self.last_scale_up
    }

    pub fn average_depth(&self) -> f64 {
        self.depth_history.average()
    }

    pub fn peak_depth(&self) -> usize {
        self.depth_history.peak()
    }

    pub fn record_scale_up(&mut self, now: Instant) {
        self.active_workers = (self.active_workers + 1).min(self.max_workers);
        self.last_scale_up = Some(now);
    }

    pub fn record_scale_down(&mut self) {
        self.active_workers = self.active_workers.saturating_sub(1).max(1);
    }

    /// Re-align the worker count with the pool after a scale attempt.
    pub fn sync_active(&mut self, active: usize) {
        self.active_workers = active.clamp(1, self.max_workers);
    }

    fn observe(&mut self, signals: &ScalingSignals, now: Instant) {
        self.depth_history.push(signals.queue_depth);
        if signals.queue_depth == 0 && signals.pool.all_idle() {
            self.drained_since.get_or_insert(now);
        } else {
            self.drained_since = None;
        }
    }
}

/// Deterministic grow/shrink/hold heuristic.
#[derive(Debug, Clone)]
pub struct AutoscalePolicy {
    config: AutoscaleConfig,
}

impl AutoscalePolicy {
    pub fn new(config: AutoscaleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AutoscaleConfig {
        &self.config
    }

    /// Record the signals into `state` and decide.
    ///
    /// Does not change the worker count; the caller applies the decision and
    /// then calls `record_scale_up`/`record_scale_down` on success.
    pub fn evaluate(&self, state: &mut PoolState, signals: ScalingSignals, now: Instant) -> ScaleDecision {
        state.observe(&signals, now);
        let active = state.active_workers;

        let backlog = signals.queue_depth as f64 > active as f64 * self.config.backlog_threshold_factor;
        let cooled_down = state
            .last_scale_up
            .map_or(true, |at| now.saturating_duration_since(at) >= self.config.stabilization_window);
        if backlog && active < state.max_workers && cooled_down {
            return ScaleDecision::ScaleUp;
        }

        let drained_long_enough = state
            .drained_since
            .map_or(false, |at| now.saturating_duration_since(at) >= self.config.scale_down_window);
        if signals.queue_depth == 0 && signals.pool.all_idle() && active > 1 && drained_long_enough {
            return ScaleDecision::ScaleDown;
        }

        ScaleDecision::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(factor: f64, window: Duration) -> AutoscalePolicy {
        AutoscalePolicy::new(AutoscaleConfig {
            backlog_threshold_factor: factor,
            stabilization_window: window,
            scale_down_window: Duration::ZERO,
        })
    }

    fn signals(depth: usize, active: usize, busy: usize, max: usize) -> ScalingSignals {
        ScalingSignals { queue_depth: depth, pool: PoolSnapshot { active, busy, max } }
    }

    #[test]
    fn backlog_above_threshold_scales_up() {
        let p = policy(2.0, Duration::from_secs(5));
        let mut state = PoolState::new(3, 8);
        let decision = p.evaluate(&mut state, signals(3, 1, 1, 3), Instant::now());
        assert_eq!(decision, ScaleDecision::ScaleUp);
    }

    #[test]
    fn backlog_at_threshold_holds() {
        let p = policy(2.0, Duration::ZERO);
        let mut state = PoolState::new(3, 8);
        let decision = p.evaluate(&mut state, signals(2, 1, 1, 3), Instant::now());
        assert_eq!(decision, ScaleDecision::Hold);
    }

    #[test]
    fn cooldown_blocks_consecutive_scale_ups() {
        let p = policy(1.0, Duration::from_secs(10));
        let mut state = PoolState::new(4, 8);
        let t0 = Instant::now();

        assert_eq!(p.evaluate(&mut state, signals(10, 1, 1, 4), t0), ScaleDecision::ScaleUp);
        state.record_scale_up(t0);

        let soon = t0 + Duration::from_secs(1);
        assert_eq!(p.evaluate(&mut state, signals(10, 2, 2, 4), soon), ScaleDecision::Hold);

        let later = t0 + Duration::from_secs(10);
        assert_eq!(p.evaluate(&mut state, signals(10, 2, 2, 4), later), ScaleDecision::ScaleUp);
    }

    #[test]
    fn never_scales_past_max() {
        let p = policy(1.0, Duration::ZERO);
        let mut state = PoolState::new(1, 8);
        assert_eq!(p.evaluate(&mut state, signals(100, 1, 1, 1), Instant::now()), ScaleDecision::Hold);
    }

    #[test]
    fn drained_idle_pool_scales_down() {
        let p = policy(2.0, Duration::ZERO);
        let mut state = PoolState::new(3, 8);
        state.sync_active(2);
        assert_eq!(p.evaluate(&mut state, signals(0, 2, 0, 3), Instant::now()), ScaleDecision::ScaleDown);
    }

    #[test]
    fn busy_workers_with_empty_queue_hold() {
        let p = policy(2.0, Duration::ZERO);
        let mut state = PoolState::new(3, 8);
        state.sync_active(2);
        assert_eq!(p.evaluate(&mut state, signals(0, 2, 2, 3), Instant::now()), ScaleDecision::Hold);
    }

    #[test]
    fn single_worker_never_scales_down() {
        let p = policy(2.0, Duration::ZERO);
        let mut state = PoolState::new(3, 8);
        for _ in 0..5 {
            assert_eq!(p.evaluate(&mut state, signals(0, 1, 0, 3), Instant::now()), ScaleDecision::Hold);
            state.record_scale_down();
        }
        assert_eq!(state.active_workers(), 1);
    }

    #[test]
    fn scale_down_window_requires_sustained_drain() {
        let p = AutoscalePolicy::new(AutoscaleConfig {
            backlog_threshold_factor: 2.0,
            stabilization_window: Duration::ZERO,
            scale_down_window: Duration::from_secs(3),
        });
        let mut state = PoolState::new(3, 8);
        state.sync_active(2);
        let t0 = Instant::now();

        assert_eq!(p.evaluate(&mut state, signals(0, 2, 0, 3), t0), ScaleDecision::Hold);
        let t1 = t0 + Duration::from_secs(2);
        assert_eq!(p.evaluate(&mut state, signals(0, 2, 0, 3), t1), ScaleDecision::Hold);
        let t2 = t0 + Duration::from_secs(3);
        assert_eq!(p.evaluate(&mut state, signals(0, 2, 0, 3), t2), ScaleDecision::ScaleDown);

        // Any activity restarts the drained stretch.
        let t3 = t2 + Duration::from_secs(1);
        p.evaluate(&mut state, signals(0, 2, 1, 3), t3);
        let t4 = t3 + Duration::from_secs(1);
        assert_eq!(p.evaluate(&mut state, signals(0, 2, 0, 3), t4), ScaleDecision::Hold);
    }

    #[test]
    fn active_workers_stay_in_bounds() {
        let mut state = PoolState::new(2, 8);
        let now = Instant::now();
        for _ in 0..5 {
            state.record_scale_up(now);
        }
        assert_eq!(state.active_workers(), 2);
        for _ in 0..5 {
            state.record_scale_down();
        }
        assert_eq!(state.active_workers(), 1);
        state.sync_active(0);
        assert_eq!(state.active_workers(), 1);
    }

    #[test]
    fn depth_history_is_bounded() {
        let mut history = DepthHistory::new(3);
        for d in [1, 5, 2, 8] {
            history.push(d);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![5, 2, 8]);
        assert_eq!(history.peak(), 8);
        assert_eq!(history.latest(), Some(8));
        assert!((history.average() - 5.0).abs() < f64::EPSILON);
    }
}
