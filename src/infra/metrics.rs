//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that resets anything (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Cycle latency bucket boundaries (milliseconds)
/// Buckets: ≤5, ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, >2560
const BUCKET_BOUNDS: [u64; 10] = [5, 10, 20, 40, 80, 160, 320, 640, 1280, 2560];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile).ceil() as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [5, 10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Monitor cycles completed (monotonic)
    cycles_total: AtomicU64,
    /// Cycles since last report (reset on report)
    cycles_since_report: AtomicU64,
    /// Sum of cycle durations in ms (reset on report)
    cycle_latency_sum_ms: AtomicU64,
    /// Max cycle duration in ms (reset on report)
    cycle_latency_max_ms: AtomicU64,
    /// Cycle duration histogram (reset on report)
    cycle_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Camera captures that produced no frame (monotonic)
    cameras_unavailable_total: AtomicU64,
    /// Regions dropped for falling outside the frame (monotonic)
    regions_discarded_total: AtomicU64,
    /// Aggregations that had to clamp an over-count (monotonic)
    anomalies_total: AtomicU64,
    /// Store reads that failed or found a corrupt record (monotonic)
    store_read_failures_total: AtomicU64,
    /// Store writes that failed (monotonic)
    store_write_failures_total: AtomicU64,
    /// Change publications by the broadcaster (monotonic)
    broadcasts_total: AtomicU64,
    /// Messages dropped because a subscriber queue was full (monotonic)
    subscriber_drops_total: AtomicU64,
    /// Currently registered subscribers
    subscribers: AtomicU64,
    /// Latest persisted reading (gauges)
    total_spaces: AtomicU64,
    free_spaces: AtomicU64,
    occupied_spaces: AtomicU64,
    /// f64 bit pattern of the latest probability
    probability_bits: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            cycles_since_report: AtomicU64::new(0),
            cycle_latency_sum_ms: AtomicU64::new(0),
            cycle_latency_max_ms: AtomicU64::new(0),
            cycle_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            cameras_unavailable_total: AtomicU64::new(0),
            regions_discarded_total: AtomicU64::new(0),
            anomalies_total: AtomicU64::new(0),
            store_read_failures_total: AtomicU64::new(0),
            store_write_failures_total: AtomicU64::new(0),
            broadcasts_total: AtomicU64::new(0),
            subscriber_drops_total: AtomicU64::new(0),
            subscribers: AtomicU64::new(0),
            total_spaces: AtomicU64::new(0),
            free_spaces: AtomicU64::new(0),
            occupied_spaces: AtomicU64::new(0),
            probability_bits: AtomicU64::new(0f64.to_bits()),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    /// Record a completed monitor cycle with its duration
    #[inline]
    pub fn record_cycle(&self, latency_ms: u64) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.cycles_since_report.fetch_add(1, Ordering::Relaxed);
        self.cycle_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.cycle_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.cycle_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_camera_unavailable(&self) {
        self.cameras_unavailable_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_regions_discarded(&self, count: u64) {
        self.regions_discarded_total.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_anomaly(&self) {
        self.anomalies_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_store_read_failure(&self) {
        self.store_read_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_store_write_failure(&self) {
        self.store_write_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_broadcast(&self) {
        self.broadcasts_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_subscriber_drop(&self) {
        self.subscriber_drops_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_subscribers(&self, count: u64) {
        self.subscribers.store(count, Ordering::Relaxed);
    }

    /// Publish the latest persisted reading as gauges
    pub fn set_reading(&self, total: u32, free: u32, occupied: u32, probability: f64) {
        self.total_spaces.store(total as u64, Ordering::Relaxed);
        self.free_spaces.store(free as u64, Ordering::Relaxed);
        self.occupied_spaces.store(occupied as u64, Ordering::Relaxed);
        self.probability_bits.store(probability.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn cycles_total(&self) -> u64 {
        self.cycles_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn broadcasts_total(&self) -> u64 {
        self.broadcasts_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn subscribers(&self) -> u64 {
        self.subscribers.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let cycles_count = self.cycles_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.cycle_latency_sum_ms.swap(0, Ordering::Relaxed);
        let max_latency = self.cycle_latency_max_ms.swap(0, Ordering::Relaxed);
        let cycle_buckets = swap_buckets(&self.cycle_latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        self.summarize(cycles_count, latency_sum, max_latency, cycle_buckets, elapsed.as_secs_f64())
    }

    /// Same figures as [`Metrics::report`] for the current window, without resetting it
    pub fn peek(&self) -> MetricsSummary {
        let cycles_count = self.cycles_since_report.load(Ordering::Relaxed);
        let latency_sum = self.cycle_latency_sum_ms.load(Ordering::Relaxed);
        let max_latency = self.cycle_latency_max_ms.load(Ordering::Relaxed);
        let cycle_buckets = load_buckets(&self.cycle_latency_buckets);
        let elapsed = self.last_report_time.lock().elapsed();

        self.summarize(cycles_count, latency_sum, max_latency, cycle_buckets, elapsed.as_secs_f64())
    }

    fn summarize(
        &self,
        cycles_count: u64,
        latency_sum: u64,
        max_latency: u64,
        cycle_buckets: [u64; NUM_BUCKETS],
        elapsed_secs: f64,
    ) -> MetricsSummary {
        let cycles_per_sec =
            if elapsed_secs > 0.0 { cycles_count as f64 / elapsed_secs } else { 0.0 };

        let avg_latency = if cycles_count > 0 { latency_sum / cycles_count } else { 0 };

        MetricsSummary {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycles_per_sec,
            cycle_avg_ms: avg_latency,
            cycle_max_ms: max_latency,
            cycle_p99_ms: percentile_from_buckets(&cycle_buckets, 0.99),
            cycle_buckets,
            cameras_unavailable_total: self.cameras_unavailable_total.load(Ordering::Relaxed),
            regions_discarded_total: self.regions_discarded_total.load(Ordering::Relaxed),
            anomalies_total: self.anomalies_total.load(Ordering::Relaxed),
            store_read_failures_total: self.store_read_failures_total.load(Ordering::Relaxed),
            store_write_failures_total: self.store_write_failures_total.load(Ordering::Relaxed),
            broadcasts_total: self.broadcasts_total.load(Ordering::Relaxed),
            subscriber_drops_total: self.subscriber_drops_total.load(Ordering::Relaxed),
            subscribers: self.subscribers.load(Ordering::Relaxed),
            total_spaces: self.total_spaces.load(Ordering::Relaxed),
            free_spaces: self.free_spaces.load(Ordering::Relaxed),
            occupied_spaces: self.occupied_spaces.load(Ordering::Relaxed),
            probability: f64::from_bits(self.probability_bits.load(Ordering::Relaxed)),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for exposition)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub cycles_total: u64,
    pub cycles_per_sec: f64,
    pub cycle_avg_ms: u64,
    pub cycle_max_ms: u64,
    pub cycle_p99_ms: u64,
    /// Cycle duration histogram buckets (ms)
    pub cycle_buckets: [u64; NUM_BUCKETS],
    pub cameras_unavailable_total: u64,
    pub regions_discarded_total: u64,
    pub anomalies_total: u64,
    pub store_read_failures_total: u64,
    pub store_write_failures_total: u64,
    pub broadcasts_total: u64,
    pub subscriber_drops_total: u64,
    pub subscribers: u64,
    pub total_spaces: u64,
    pub free_spaces: u64,
    pub occupied_spaces: u64,
    pub probability: f64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            cycles_total = %self.cycles_total,
            cycles_per_sec = format!("{:.2}", self.cycles_per_sec),
            cycle_avg_ms = %self.cycle_avg_ms,
            cycle_max_ms = %self.cycle_max_ms,
            cycle_p99_ms = %self.cycle_p99_ms,
            cameras_unavailable = %self.cameras_unavailable_total,
            regions_discarded = %self.regions_discarded_total,
            broadcasts = %self.broadcasts_total,
            subscribers = %self.subscribers,
            free = %self.free_spaces,
            occupied = %self.occupied_spaces,
            probability = format!("{:.2}", self.probability),
            "metrics"
        );
    }
}
