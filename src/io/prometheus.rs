//! Prometheus text exposition of the lot metrics
//!
//! Served by the gateway at /metrics.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use std::fmt::Write;

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a gauge metric with f64 value
fn write_gauge_f64(output: &mut String, name: &str, help: &str, site: &str, val: f64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val:.2}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
///
/// Reads the current window without resetting it, so scraping does not disturb
/// the periodic log report.
pub fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.peek();
    let mut output = String::with_capacity(4096);

    write_cycle_metrics(&mut output, site_id, &summary);
    write_condition_metrics(&mut output, site_id, &summary);
    write_delivery_metrics(&mut output, site_id, &summary);
    write_reading_metrics(&mut output, site_id, &summary);

    output
}

fn write_cycle_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "lotwatch_cycles_total",
        "Total monitor cycles completed",
        MetricType::Counter,
        site,
        summary.cycles_total,
    );
    write_histogram(
        output,
        "lotwatch_cycle_duration_ms",
        "Monitor cycle duration in milliseconds",
        site,
        &summary.cycle_buckets,
        summary.cycle_avg_ms,
    );
    write_metric(
        output,
        "lotwatch_cycle_duration_p99_ms",
        "99th percentile monitor cycle duration",
        MetricType::Gauge,
        site,
        summary.cycle_p99_ms,
    );
}

fn write_condition_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "lotwatch_cameras_unavailable_total",
        "Camera captures that produced no frame",
        MetricType::Counter,
        site,
        summary.cameras_unavailable_total,
    );
    write_metric(
        output,
        "lotwatch_regions_discarded_total",
        "Regions skipped for not fitting the frame",
        MetricType::Counter,
        site,
        summary.regions_discarded_total,
    );
    write_metric(
        output,
        "lotwatch_anomalies_total",
        "Aggregations clamped for exceeding capacity",
        MetricType::Counter,
        site,
        summary.anomalies_total,
    );
    write_metric(
        output,
        "lotwatch_store_read_failures_total",
        "Store reads that failed or found a corrupt record",
        MetricType::Counter,
        site,
        summary.store_read_failures_total,
    );
    write_metric(
        output,
        "lotwatch_store_write_failures_total",
        "Store writes that failed",
        MetricType::Counter,
        site,
        summary.store_write_failures_total,
    );
}

fn write_delivery_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "lotwatch_broadcasts_total",
        "Change updates published to subscribers",
        MetricType::Counter,
        site,
        summary.broadcasts_total,
    );
    write_metric(
        output,
        "lotwatch_subscriber_drops_total",
        "Messages dropped on full subscriber queues",
        MetricType::Counter,
        site,
        summary.subscriber_drops_total,
    );
    write_metric(
        output,
        "lotwatch_subscribers",
        "Currently connected subscribers",
        MetricType::Gauge,
        site,
        summary.subscribers,
    );
}

fn write_reading_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "lotwatch_total_spaces",
        "Configured lot capacity",
        MetricType::Gauge,
        site,
        summary.total_spaces,
    );
    write_metric(
        output,
        "lotwatch_free_spaces",
        "Free spaces in the latest saved reading",
        MetricType::Gauge,
        site,
        summary.free_spaces,
    );
    write_metric(
        output,
        "lotwatch_occupied_spaces",
        "Occupied spaces in the latest saved reading",
        MetricType::Gauge,
        site,
        summary.occupied_spaces,
    );
    write_gauge_f64(
        output,
        "lotwatch_probability",
        "Availability probability of the latest saved reading",
        site,
        summary.probability,
    );
}
