//! Metrics: counters/gauges/histograms, exported as a flat `key value` text
//! file refreshed on a timer. Plain `AtomicU64`/`RwLock` counters, no
//! metrics crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::time::Duration;
use tracing::warn;

const HISTOGRAM_CAPACITY: usize = 256;

struct Histogram {
    samples: RwLock<VecDeque<u64>>,
}

impl Histogram {
    fn new() -> Self {
        Self {
            samples: RwLock::new(VecDeque::with_capacity(HISTOGRAM_CAPACITY)),
        }
    }

    fn record(&self, value_ms: u64) {
        let mut samples = self.samples.write().unwrap();
        if samples.len() >= HISTOGRAM_CAPACITY {
            samples.pop_front();
        }
        samples.push_back(value_ms);
    }

    fn percentile(&self, p: f64) -> u64 {
        let samples = self.samples.read().unwrap();
        if samples.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[idx]
    }
}

/// Process-lifetime metrics registry.
pub struct Metrics {
    opportunities_scanned_total: AtomicU64,
    opportunities_executed_total: AtomicU64,
    opportunities_failed_total: AtomicU64,
    total_profit_usd_cents: AtomicU64,
    daily_profit_usd_cents: AtomicU64,
    hourly_profit_usd_cents: AtomicU64,
    rpc_requests_total: AtomicU64,
    rpc_errors_total: AtomicU64,
    gas_price_gwei_x1000: AtomicU64,
    scan_cycle_time_ms: Histogram,
    opportunity_execution_time_ms: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            opportunities_scanned_total: AtomicU64::new(0),
            opportunities_executed_total: AtomicU64::new(0),
            opportunities_failed_total: AtomicU64::new(0),
            total_profit_usd_cents: AtomicU64::new(0),
            daily_profit_usd_cents: AtomicU64::new(0),
            hourly_profit_usd_cents: AtomicU64::new(0),
            rpc_requests_total: AtomicU64::new(0),
            rpc_errors_total: AtomicU64::new(0),
            gas_price_gwei_x1000: AtomicU64::new(0),
            scan_cycle_time_ms: Histogram::new(),
            opportunity_execution_time_ms: Histogram::new(),
        }
    }

    pub fn record_scan(&self, found: u64, cycle_time_ms: u64) {
        self.opportunities_scanned_total.fetch_add(found, Ordering::Relaxed);
        self.scan_cycle_time_ms.record(cycle_time_ms);
    }

    pub fn record_execution(&self, success: bool, profit_usd: f64, execution_time_ms: u64) {
        if success {
            self.opportunities_executed_total.fetch_add(1, Ordering::Relaxed);
            let cents = (profit_usd * 100.0).round() as u64;
            self.total_profit_usd_cents.fetch_add(cents, Ordering::Relaxed);
            self.daily_profit_usd_cents.fetch_add(cents, Ordering::Relaxed);
            self.hourly_profit_usd_cents.fetch_add(cents, Ordering::Relaxed);
        } else {
            self.opportunities_failed_total.fetch_add(1, Ordering::Relaxed);
        }
        self.opportunity_execution_time_ms.record(execution_time_ms);
    }

    pub fn record_rpc_call(&self, success: bool) {
        self.rpc_requests_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.rpc_errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_gas_price_gwei(&self, gwei: f64) {
        self.gas_price_gwei_x1000
            .store((gwei * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn reset_hourly(&self) {
        self.hourly_profit_usd_cents.store(0, Ordering::Relaxed);
    }

    pub fn reset_daily(&self) {
        self.daily_profit_usd_cents.store(0, Ordering::Relaxed);
    }

    /// Render the current snapshot as `key value` lines using the
    /// documented metric names.
    pub fn render(&self) -> String {
        format!(
            "opportunities_scanned_total {}\n\
             opportunities_executed_total {}\n\
             opportunities_failed_total {}\n\
             total_profit_usd {:.2}\n\
             daily_profit_usd {:.2}\n\
             hourly_profit_usd {:.2}\n\
             rpc_requests_total {}\n\
             rpc_errors_total {}\n\
             gas_price_gwei {:.3}\n\
             scan_cycle_time_ms_p50 {}\n\
             scan_cycle_time_ms_p99 {}\n\
             opportunity_execution_time_ms_p50 {}\n\
             opportunity_execution_time_ms_p99 {}\n",
            self.opportunities_scanned_total.load(Ordering::Relaxed),
            self.opportunities_executed_total.load(Ordering::Relaxed),
            self.opportunities_failed_total.load(Ordering::Relaxed),
            self.total_profit_usd_cents.load(Ordering::Relaxed) as f64 / 100.0,
            self.daily_profit_usd_cents.load(Ordering::Relaxed) as f64 / 100.0,
            self.hourly_profit_usd_cents.load(Ordering::Relaxed) as f64 / 100.0,
            self.rpc_requests_total.load(Ordering::Relaxed),
            self.rpc_errors_total.load(Ordering::Relaxed),
            self.gas_price_gwei_x1000.load(Ordering::Relaxed) as f64 / 1000.0,
            self.scan_cycle_time_ms.percentile(0.5),
            self.scan_cycle_time_ms.percentile(0.99),
            self.opportunity_execution_time_ms.percentile(0.5),
            self.opportunity_execution_time_ms.percentile(0.99),
        )
    }

    /// Refresh the metrics text file every 30s. Intended to be spawned as
    /// one of the long-lived cooperative tasks.
    pub async fn run_exporter(&self, path: impl AsRef<std::path::Path>) {
        let path = path.as_ref();
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            if let Err(e) = tokio::fs::write(path, self.render()).await {
                warn!(error = %e, "failed to write metrics file");
            }
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_contains_all_documented_keys() {
        let metrics = Metrics::new();
        metrics.record_scan(5, 120);
        metrics.record_execution(true, 12.34, 400);
        metrics.record_rpc_call(true);
        metrics.set_gas_price_gwei(0.05);
        let rendered = metrics.render();
        for key in [
            "opportunities_scanned_total",
            "opportunities_executed_total",
            "opportunities_failed_total",
            "total_profit_usd",
            "daily_profit_usd",
            "hourly_profit_usd",
            "rpc_requests_total",
            "rpc_errors_total",
            "gas_price_gwei",
            "scan_cycle_time_ms_p50",
            "opportunity_execution_time_ms_p50",
        ] {
            assert!(rendered.contains(key), "missing key {key}");
        }
    }

    #[test]
    fn hourly_reset_does_not_touch_total() {
        let metrics = Metrics::new();
        metrics.record_execution(true, 100.0, 10);
        metrics.reset_hourly();
        assert_eq!(metrics.hourly_profit_usd_cents.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.total_profit_usd_cents.load(Ordering::Relaxed), 10_000);
    }
}
