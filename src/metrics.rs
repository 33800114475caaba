// SPDX-License-Identifier: Apache-2.0

//! Lightweight in-memory migration metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct MigrationMetrics {
    total: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    rows_extracted: AtomicU64,
    rows_loaded: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
}

static MIGRATION_METRICS: OnceLock<MigrationMetrics> = OnceLock::new();

fn metrics() -> &'static MigrationMetrics {
    MIGRATION_METRICS.get_or_init(MigrationMetrics::default)
}

pub fn record_migration(duration_ms: u64, rows_extracted: u64, rows_loaded: u64, success: bool) {
    let metrics = metrics();
    metrics.total.fetch_add(1, Ordering::Relaxed);
    if !success {
        metrics.failed.fetch_add(1, Ordering::Relaxed);
    }
    metrics
        .rows_extracted
        .fetch_add(rows_extracted, Ordering::Relaxed);
    metrics.rows_loaded.fetch_add(rows_loaded, Ordering::Relaxed);
    metrics
        .duration_total_ms
        .fetch_add(duration_ms, Ordering::Relaxed);
    metrics
        .duration_max_ms
        .fetch_max(duration_ms, Ordering::Relaxed);
}

pub fn record_timeout() {
    metrics().timeouts.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Serialize)]
pub struct MigrationMetricsSnapshot {
    pub total: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub rows_extracted: u64,
    pub rows_loaded: u64,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<u64>,
}

pub fn snapshot() -> MigrationMetricsSnapshot {
    let metrics = metrics();
    let total = metrics.total.load(Ordering::Relaxed);
    let duration_total = metrics.duration_total_ms.load(Ordering::Relaxed);
    let max_ms = metrics.duration_max_ms.load(Ordering::Relaxed);

    let avg_ms = if total > 0 {
        Some(duration_total as f64 / total as f64)
    } else {
        None
    };

    MigrationMetricsSnapshot {
        total,
        failed: metrics.failed.load(Ordering::Relaxed),
        timeouts: metrics.timeouts.load(Ordering::Relaxed),
        rows_extracted: metrics.rows_extracted.load(Ordering::Relaxed),
        rows_loaded: metrics.rows_loaded.load(Ordering::Relaxed),
        avg_ms,
        max_ms: if max_ms > 0 { Some(max_ms) } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_flow() {
        // Other tests record concurrently, so compare lower bounds.
        let initial = snapshot();

        record_migration(100, 5, 5, true);
        let s1 = snapshot();
        assert!(s1.total > initial.total);
        assert!(s1.rows_loaded >= initial.rows_loaded + 5);

        record_migration(50, 5, 2, false);
        let s2 = snapshot();
        assert!(s2.failed > initial.failed);

        record_timeout();
        assert!(snapshot().timeouts > initial.timeouts);

        record_migration(99_999, 0, 0, true);
        assert!(snapshot().max_ms.unwrap() >= 99_999);
    }
}
