// SPDX-License-Identifier: Apache-2.0

//! Bounded in-memory store of recent migration statistics.

use std::collections::VecDeque;

use parking_lot::Mutex;
use polystore_core::{MigrationMonitor, MigrationStatistics};
use tracing::debug;

const DEFAULT_CAPACITY: usize = 256;

pub struct MigrationStatsStore {
    capacity: usize,
    records: Mutex<VecDeque<MigrationStatistics>>,
}

impl MigrationStatsStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Most recent records first.
    pub fn recent(&self, limit: usize) -> Vec<MigrationStatistics> {
        self.records.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for MigrationStatsStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MigrationMonitor for MigrationStatsStore {
    fn record_migration(&self, stats: MigrationStatistics) {
        debug!(
            migration_id = %stats.migration_id,
            rows_extracted = stats.rows_extracted,
            rows_loaded = stats.rows_loaded,
            "Recorded migration statistics"
        );
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use polystore_core::DataFormat;
    use uuid::Uuid;

    fn stats(rows: u64) -> MigrationStatistics {
        let now = Utc::now();
        MigrationStatistics {
            migration_id: Uuid::new_v4(),
            source: "src".into(),
            destination: "dst".into(),
            source_object: "a".into(),
            destination_object: "b".into(),
            start_time: now,
            end_time: now,
            rows_extracted: rows,
            rows_loaded: rows,
            bytes_transferred: 0,
            format: DataFormat::Csv,
            migrator: "memory->memory".into(),
        }
    }

    #[test]
    fn test_store_evicts_oldest() {
        let store = MigrationStatsStore::new(2);
        assert!(store.is_empty());
        for rows in 1..=3 {
            store.record_migration(stats(rows));
        }
        assert_eq!(store.len(), 2);
        let recent: Vec<u64> = store.recent(10).iter().map(|s| s.rows_loaded).collect();
        assert_eq!(recent, vec![3, 2]);
    }
}
