//! Process-wide admission control and telemetry for LLM work.
//!
//! One [`ResourceMonitor`] is shared (behind `Arc`) by every agent run. It
//! gates LLM calls against a concurrency ceiling, tracks message and error
//! rates over a sliding one-minute window, and raises deduplicated alerts
//! from a background sweep.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::limits::{ResourceError, ResourceLimits, ResourceLimitsUpdate};
use super::metrics::{Alert, AlertLevel, ResourceMetrics, ResourceReport};

const RATE_WINDOW: Duration = Duration::from_secs(60);
const ALERT_DEDUP_WINDOW: Duration = Duration::from_secs(60);
const ALERT_RETENTION: Duration = Duration::from_secs(60 * 60);
const ALERT_CHECK_INTERVAL: Duration = Duration::from_secs(10);
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

const RESPONSE_SAMPLES_MAX: usize = 100;
const RESPONSE_SAMPLES_KEEP: usize = 50;

const WARNING_RATIO: f64 = 0.8;
const CRITICAL_RATIO: f64 = 0.9;
const STRESS_ERRORS_PER_MINUTE: usize = 10;

#[derive(Debug, Clone)]
struct StoredAlert {
    alert: Alert,
    raised_at: Instant,
}

#[derive(Debug, Default)]
struct MonitorState {
    limits: ResourceLimits,
    active_calls: HashMap<String, Instant>,
    queued_messages: usize,
    message_times: VecDeque<Instant>,
    error_times: VecDeque<Instant>,
    response_times_ms: Vec<u64>,
    cache_hits: u64,
    cache_misses: u64,
    alerts: Vec<StoredAlert>,
    last_alert_at: HashMap<String, Instant>,
}

impl MonitorState {
    fn prune_windows(&mut self, now: Instant) {
        while self
            .message_times
            .front()
            .is_some_and(|t| now.duration_since(*t) > RATE_WINDOW)
        {
            self.message_times.pop_front();
        }
        while self
            .error_times
            .front()
            .is_some_and(|t| now.duration_since(*t) > RATE_WINDOW)
        {
            self.error_times.pop_front();
        }
    }

    fn record_error(&mut self, now: Instant) {
        self.error_times.push_back(now);
    }

    fn record_response_time(&mut self, ms: u64) {
        self.response_times_ms.push(ms);
        if self.response_times_ms.len() > RESPONSE_SAMPLES_MAX {
            let drop = self.response_times_ms.len() - RESPONSE_SAMPLES_KEEP;
            self.response_times_ms.drain(..drop);
        }
    }

    /// Record an alert unless the same metric alerted within the dedup window.
    fn raise_alert(
        &mut self,
        now: Instant,
        level: AlertLevel,
        metric: &str,
        value: f64,
        threshold: f64,
        message: String,
    ) -> bool {
        if let Some(last) = self.last_alert_at.get(metric)
            && now.duration_since(*last) < ALERT_DEDUP_WINDOW
        {
            return false;
        }
        match level {
            AlertLevel::Critical => warn!(metric, value, threshold, "{}", message),
            AlertLevel::Warning => info!(metric, value, threshold, "{}", message),
        }
        self.last_alert_at.insert(metric.to_string(), now);
        self.alerts.push(StoredAlert {
            alert: Alert {
                level,
                metric: metric.to_string(),
                message,
                value,
                threshold,
                timestamp: Utc::now(),
            },
            raised_at: now,
        });
        true
    }

    fn metrics(&mut self, now: Instant) -> ResourceMetrics {
        self.prune_windows(now);
        let active = self.active_calls.len();
        let average_response_time_ms = if self.response_times_ms.is_empty() {
            0.0
        } else {
            self.response_times_ms.iter().sum::<u64>() as f64 / self.response_times_ms.len() as f64
        };
        let cache_total = self.cache_hits + self.cache_misses;
        let cache_hit_rate = if cache_total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / cache_total as f64 * 100.0
        };

        ResourceMetrics {
            timestamp: Utc::now(),
            active_llm_calls: active,
            queued_messages: self.queued_messages,
            memory_usage_mb: resident_memory_mb().unwrap_or(0.0),
            cpu_usage_percent: percent(active as f64, self.limits.max_concurrent_llm_calls as f64),
            messages_per_minute: self.message_times.len(),
            errors_per_minute: self.error_times.len(),
            average_response_time_ms,
            cache_hit_rate,
        }
    }
}

fn percent(value: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        0.0
    } else {
        value / limit * 100.0
    }
}

/// Resident set size of this process from `/proc/self/statm`.
fn resident_memory_mb() -> Option<f64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some((resident_pages * 4096) as f64 / (1024.0 * 1024.0))
}

pub struct ResourceMonitor {
    state: Mutex<MonitorState>,
    call_timeouts: DashMap<String, AbortHandle>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl ResourceMonitor {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            state: Mutex::new(MonitorState {
                limits,
                ..Default::default()
            }),
            call_timeouts: DashMap::new(),
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the alert sweep and the prune timer. Calling twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut timers = self.timers.lock();
        if !timers.is_empty() {
            return;
        }

        let weak = Arc::downgrade(self);
        timers.push(tokio::spawn(run_every(ALERT_CHECK_INTERVAL, weak, |m| {
            m.check_alerts();
        })));

        let weak = Arc::downgrade(self);
        timers.push(tokio::spawn(run_every(PRUNE_INTERVAL, weak, |m| m.prune())));
        debug!("Resource monitor timers started");
    }

    /// Stop the timers and cancel every outstanding per-call timeout.
    pub fn destroy(&self) {
        for timer in self.timers.lock().drain(..) {
            timer.abort();
        }
        let ids: Vec<String> = self.call_timeouts.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, handle)) = self.call_timeouts.remove(&id) {
                handle.abort();
            }
        }
        debug!("Resource monitor destroyed");
    }

    pub fn limits(&self) -> ResourceLimits {
        self.state.lock().limits.clone()
    }

    pub fn update_limits(&self, update: ResourceLimitsUpdate) {
        let mut state = self.state.lock();
        state.limits.apply(&update);
        info!(limits = ?state.limits, "Resource limits updated");
    }

    /// Whether another LLM call may start now. Records a critical alert on refusal.
    pub fn can_make_llm_call(&self) -> bool {
        let mut state = self.state.lock();
        Self::admit_llm_call(&mut state).is_ok()
    }

    fn admit_llm_call(state: &mut MonitorState) -> Result<(), ResourceError> {
        let active = state.active_calls.len();
        let limit = state.limits.max_concurrent_llm_calls;
        if active < limit {
            return Ok(());
        }
        state.raise_alert(
            Instant::now(),
            AlertLevel::Critical,
            "llm_calls",
            active as f64,
            limit as f64,
            format!("LLM call rejected: {} of {} slots in use", active, limit),
        );
        Err(ResourceError::ConcurrentCallsExceeded { limit, active })
    }

    /// Reserve an LLM call slot and arm its timeout.
    pub fn track_llm_call_start(self: &Arc<Self>) -> Result<String, ResourceError> {
        let call_id = Uuid::new_v4().to_string();
        let timeout = {
            let mut state = self.state.lock();
            Self::admit_llm_call(&mut state)?;
            state.active_calls.insert(call_id.clone(), Instant::now());
            state.limits.llm_call_timeout()
        };

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let weak = Arc::downgrade(self);
            let id = call_id.clone();
            let handle = runtime.spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(monitor) = weak.upgrade() {
                    warn!(call_id = %id, timeout_ms = timeout.as_millis() as u64, "LLM call timed out");
                    monitor.track_llm_call_complete(&id, true, Some(timeout.as_millis() as u64));
                }
            });
            self.call_timeouts.insert(call_id.clone(), handle.abort_handle());
            // A zero timeout can fire on another worker before the insert above.
            if !self.state.lock().active_calls.contains_key(&call_id) {
                self.call_timeouts.remove(&call_id);
            }
        }

        debug!(call_id = %call_id, "LLM call started");
        Ok(call_id)
    }

    /// Release an LLM call slot. Returns false for unknown or already-released
    /// ids, which leave the metrics untouched.
    pub fn track_llm_call_complete(
        &self,
        call_id: &str,
        is_timeout: bool,
        response_time_ms: Option<u64>,
    ) -> bool {
        let now = Instant::now();
        let released = {
            let mut state = self.state.lock();
            match state.active_calls.remove(call_id) {
                Some(started) => {
                    let elapsed = response_time_ms
                        .unwrap_or_else(|| now.duration_since(started).as_millis() as u64);
                    state.record_response_time(elapsed);
                    if is_timeout {
                        state.record_error(now);
                    }
                    true
                }
                None => false,
            }
        };

        // Removed after the slot so a racing start never keeps a stale handle.
        if let Some((_, handle)) = self.call_timeouts.remove(call_id)
            && !is_timeout
        {
            handle.abort();
        }
        released
    }

    pub fn active_llm_calls(&self) -> usize {
        self.state.lock().active_calls.len()
    }

    pub fn can_queue_message(&self) -> bool {
        self.check_queue(&mut self.state.lock(), Instant::now()).is_ok()
    }

    fn check_queue(&self, state: &mut MonitorState, now: Instant) -> Result<(), ResourceError> {
        state.prune_windows(now);
        let limits = &state.limits;
        if state.queued_messages >= limits.max_queued_messages {
            return Err(ResourceError::QueueFull {
                limit: limits.max_queued_messages,
                queued: state.queued_messages,
            });
        }
        if state.message_times.len() >= limits.max_messages_per_minute {
            return Err(ResourceError::MessageRateExceeded {
                limit: limits.max_messages_per_minute,
                per_minute: state.message_times.len(),
            });
        }
        Ok(())
    }

    /// Count one incoming message against the queue and the rate window.
    pub fn track_message(&self) -> Result<(), ResourceError> {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.check_queue(&mut state, now)?;
        state.queued_messages += 1;
        state.message_times.push_back(now);
        Ok(())
    }

    /// Mark one queued message as handled.
    pub fn release_message(&self) {
        let mut state = self.state.lock();
        state.queued_messages = state.queued_messages.saturating_sub(1);
    }

    pub fn track_error(&self, label: &str) {
        debug!(label, "Error tracked");
        self.state.lock().record_error(Instant::now());
    }

    pub fn track_cache_hit(&self, hit: bool) {
        let mut state = self.state.lock();
        if hit {
            state.cache_hits += 1;
        } else {
            state.cache_misses += 1;
        }
    }

    pub fn current_metrics(&self) -> ResourceMetrics {
        self.state.lock().metrics(Instant::now())
    }

    pub fn is_system_under_stress(&self) -> bool {
        let mut state = self.state.lock();
        let metrics = state.metrics(Instant::now());
        is_under_stress(&metrics, &state.limits)
    }

    /// Snapshot metrics and raise warning/critical alerts per metric.
    /// Returns how many new alerts were recorded.
    pub fn check_alerts(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let metrics = state.metrics(now);
        let limits = state.limits.clone();

        let checks = [
            (
                "llm_calls",
                metrics.active_llm_calls as f64,
                limits.max_concurrent_llm_calls as f64,
            ),
            (
                "queued_messages",
                metrics.queued_messages as f64,
                limits.max_queued_messages as f64,
            ),
            (
                "message_rate",
                metrics.messages_per_minute as f64,
                limits.max_messages_per_minute as f64,
            ),
            (
                "memory",
                metrics.memory_usage_mb,
                limits.max_memory_mb as f64,
            ),
            ("cpu", metrics.cpu_usage_percent, limits.max_cpu_percent),
        ];

        let mut raised = 0;
        for (metric, value, limit) in checks {
            if limit <= 0.0 {
                continue;
            }
            let ratio = value / limit;
            let level = if ratio >= CRITICAL_RATIO {
                AlertLevel::Critical
            } else if ratio >= WARNING_RATIO {
                AlertLevel::Warning
            } else {
                continue;
            };
            let message = format!(
                "{} at {:.0}% of limit ({:.1} / {:.1})",
                metric,
                ratio * 100.0,
                value,
                limit
            );
            if state.raise_alert(now, level, metric, value, limit, message) {
                raised += 1;
            }
        }

        if metrics.errors_per_minute > STRESS_ERRORS_PER_MINUTE {
            let message = format!("{} errors in the last minute", metrics.errors_per_minute);
            if state.raise_alert(
                now,
                AlertLevel::Warning,
                "error_rate",
                metrics.errors_per_minute as f64,
                STRESS_ERRORS_PER_MINUTE as f64,
                message,
            ) {
                raised += 1;
            }
        }
        raised
    }

    /// Drop alerts older than an hour and window entries older than a minute.
    pub fn prune(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state
            .alerts
            .retain(|a| now.duration_since(a.raised_at) <= ALERT_RETENTION);
        state
            .last_alert_at
            .retain(|_, at| now.duration_since(*at) <= ALERT_RETENTION);
        state.prune_windows(now);
    }

    pub fn recent_alerts(&self) -> Vec<Alert> {
        self.state
            .lock()
            .alerts
            .iter()
            .map(|a| a.alert.clone())
            .collect()
    }

    pub fn resource_report(&self) -> ResourceReport {
        let mut state = self.state.lock();
        let metrics = state.metrics(Instant::now());
        let under_stress = is_under_stress(&metrics, &state.limits);
        ResourceReport {
            under_stress,
            limits: state.limits.clone(),
            recent_alerts: state.alerts.iter().map(|a| a.alert.clone()).collect(),
            metrics,
        }
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new(ResourceLimits::default())
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn is_under_stress(metrics: &ResourceMetrics, limits: &ResourceLimits) -> bool {
    let at_least = |value: f64, limit: f64, ratio: f64| limit > 0.0 && value / limit >= ratio;

    at_least(
        metrics.active_llm_calls as f64,
        limits.max_concurrent_llm_calls as f64,
        WARNING_RATIO,
    ) || at_least(
        metrics.queued_messages as f64,
        limits.max_queued_messages as f64,
        WARNING_RATIO,
    ) || at_least(
        metrics.messages_per_minute as f64,
        limits.max_messages_per_minute as f64,
        CRITICAL_RATIO,
    ) || at_least(
        metrics.memory_usage_mb,
        limits.max_memory_mb as f64,
        CRITICAL_RATIO,
    ) || at_least(
        metrics.cpu_usage_percent,
        limits.max_cpu_percent,
        CRITICAL_RATIO,
    ) || metrics.errors_per_minute > STRESS_ERRORS_PER_MINUTE
}

async fn run_every(
    period: Duration,
    monitor: Weak<ResourceMonitor>,
    tick: impl Fn(&ResourceMonitor) + Send + 'static,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(monitor) = monitor.upgrade() else {
            break;
        };
        tick(&monitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_with(update: ResourceLimitsUpdate) -> Arc<ResourceMonitor> {
        let monitor = Arc::new(ResourceMonitor::default());
        monitor.update_limits(update);
        monitor
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let monitor = monitor_with(ResourceLimitsUpdate {
            max_concurrent_llm_calls: Some(2),
            ..Default::default()
        });

        let first = monitor.track_llm_call_start().unwrap();
        let _second = monitor.track_llm_call_start().unwrap();
        let err = monitor.track_llm_call_start().unwrap_err();
        assert_eq!(
            err,
            ResourceError::ConcurrentCallsExceeded {
                limit: 2,
                active: 2
            }
        );
        assert!(!monitor.can_make_llm_call());

        monitor.track_llm_call_complete(&first, false, Some(120));
        assert!(monitor.can_make_llm_call());
        assert!(monitor.track_llm_call_start().is_ok());
    }

    #[tokio::test]
    async fn test_complete_is_counted_once_per_call() {
        let monitor = Arc::new(ResourceMonitor::default());
        let a = monitor.track_llm_call_start().unwrap();
        let _b = monitor.track_llm_call_start().unwrap();

        assert!(monitor.track_llm_call_complete(&a, false, Some(10)));
        assert!(!monitor.track_llm_call_complete(&a, false, Some(10)));
        assert!(!monitor.track_llm_call_complete("unknown", false, None));
        assert_eq!(monitor.active_llm_calls(), 1);
        assert_eq!(monitor.state.lock().response_times_ms.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_completion_after_timeout_is_ignored() {
        let monitor = monitor_with(ResourceLimitsUpdate {
            llm_call_timeout_ms: Some(1_000),
            ..Default::default()
        });
        let id = monitor.track_llm_call_start().unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(monitor.active_llm_calls(), 0);

        assert!(!monitor.track_llm_call_complete(&id, false, Some(2_000)));
        assert_eq!(monitor.current_metrics().errors_per_minute, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_zero_timeout_leaves_no_stale_handle() {
        let monitor = monitor_with(ResourceLimitsUpdate {
            llm_call_timeout_ms: Some(0),
            ..Default::default()
        });
        for _ in 0..5 {
            monitor.track_llm_call_start().unwrap();
        }

        for _ in 0..100 {
            if monitor.active_llm_calls() == 0 && monitor.call_timeouts.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(monitor.active_llm_calls(), 0);
        assert!(monitor.call_timeouts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_releases_slot() {
        let monitor = monitor_with(ResourceLimitsUpdate {
            llm_call_timeout_ms: Some(30_000),
            ..Default::default()
        });

        monitor.track_llm_call_start().unwrap();
        assert_eq!(monitor.active_llm_calls(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(monitor.active_llm_calls(), 0);
        assert_eq!(monitor.current_metrics().errors_per_minute, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_call_does_not_time_out() {
        let monitor = Arc::new(ResourceMonitor::default());
        let id = monitor.track_llm_call_start().unwrap();
        monitor.track_llm_call_complete(&id, false, Some(50));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(monitor.current_metrics().errors_per_minute, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_dedup_within_window() {
        let monitor = monitor_with(ResourceLimitsUpdate {
            max_concurrent_llm_calls: Some(1),
            llm_call_timeout_ms: Some(3_600_000),
            ..Default::default()
        });
        let _held = monitor.track_llm_call_start().unwrap();

        assert!(!monitor.can_make_llm_call());
        assert!(!monitor.can_make_llm_call());
        assert_eq!(monitor.recent_alerts().len(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!monitor.can_make_llm_call());

        let alerts = monitor.recent_alerts();
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.level == AlertLevel::Critical));
    }

    #[tokio::test]
    async fn test_check_alerts_levels() {
        let monitor = monitor_with(ResourceLimitsUpdate {
            max_concurrent_llm_calls: Some(10),
            max_memory_mb: Some(u64::MAX),
            ..Default::default()
        });
        for _ in 0..8 {
            monitor.track_llm_call_start().unwrap();
        }

        assert_eq!(monitor.check_alerts(), 2);
        let alerts = monitor.recent_alerts();
        let llm = alerts.iter().find(|a| a.metric == "llm_calls").unwrap();
        assert_eq!(llm.level, AlertLevel::Warning);
        // cpu approximation follows llm utilization: 80% of an 80% ceiling
        let cpu = alerts.iter().find(|a| a.metric == "cpu").unwrap();
        assert_eq!(cpu.level, AlertLevel::Critical);

        assert_eq!(monitor.check_alerts(), 0);
        assert!(monitor.is_system_under_stress());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_raise_and_prune_alerts() {
        let monitor = monitor_with(ResourceLimitsUpdate {
            max_concurrent_llm_calls: Some(10),
            max_memory_mb: Some(u64::MAX),
            llm_call_timeout_ms: Some(3_600_000),
            ..Default::default()
        });
        monitor.start();
        let held: Vec<String> = (0..9)
            .map(|_| monitor.track_llm_call_start().unwrap())
            .collect();
        assert!(monitor.recent_alerts().is_empty());

        tokio::time::sleep(Duration::from_secs(11)).await;
        let alerts = monitor.recent_alerts();
        assert!(alerts.iter().any(|a| a.metric == "llm_calls"));

        for id in &held {
            monitor.track_llm_call_complete(id, false, Some(100));
        }
        tokio::time::sleep(Duration::from_secs(3_700)).await;

        assert!(monitor.recent_alerts().is_empty());
        assert!(monitor.state.lock().last_alert_at.is_empty());
        monitor.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_queue_and_rate() {
        let monitor = monitor_with(ResourceLimitsUpdate {
            max_queued_messages: Some(2),
            max_messages_per_minute: Some(3),
            ..Default::default()
        });

        monitor.track_message().unwrap();
        monitor.track_message().unwrap();
        assert!(matches!(
            monitor.track_message(),
            Err(ResourceError::QueueFull { .. })
        ));

        monitor.release_message();
        monitor.track_message().unwrap();
        monitor.release_message();
        assert!(matches!(
            monitor.track_message(),
            Err(ResourceError::MessageRateExceeded { .. })
        ));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(monitor.can_queue_message());
    }

    #[tokio::test]
    async fn test_response_time_ring_is_trimmed() {
        let monitor = Arc::new(ResourceMonitor::default());
        for i in 0..101u64 {
            let id = monitor.track_llm_call_start().unwrap();
            monitor.track_llm_call_complete(&id, false, Some(i));
        }
        let state = monitor.state.lock();
        assert_eq!(state.response_times_ms.len(), RESPONSE_SAMPLES_KEEP);
        assert_eq!(state.response_times_ms[0], 51);
    }

    #[tokio::test]
    async fn test_cache_hit_rate_and_report() {
        let monitor = Arc::new(ResourceMonitor::default());
        monitor.track_cache_hit(true);
        monitor.track_cache_hit(true);
        monitor.track_cache_hit(false);
        monitor.track_cache_hit(true);

        let report = monitor.resource_report();
        assert_eq!(report.metrics.cache_hit_rate, 75.0);
        assert!(!report.under_stress);
        assert_eq!(report.limits, ResourceLimits::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_cancels_outstanding_timeouts() {
        let monitor = Arc::new(ResourceMonitor::default());
        monitor.start();
        monitor.track_llm_call_start().unwrap();
        monitor.destroy();

        tokio::time::sleep(Duration::from_secs(120)).await;
        // Timeout never fired, so the slot is still held and no error was recorded.
        assert_eq!(monitor.active_llm_calls(), 1);
        assert_eq!(monitor.current_metrics().errors_per_minute, 0);
    }
}
