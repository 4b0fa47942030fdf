//! Running statistics across task executions.
//!
//! One collector is constructed at service start and injected into every
//! engine that should contribute to it. Concurrent runs update it through
//! an async `RwLock`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::models::{FinalReport, ReportStatus};

/// Snapshot of the statistics collected so far.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Runs recorded.
    pub total: u64,
    /// Runs that completed.
    pub succeeded: u64,
    /// Runs that aborted or were cancelled.
    pub failed: u64,
    /// Moving average of run time in milliseconds.
    pub avg_execution_time_ms: f64,
}

impl ExecutionStats {
    /// Fold one run into the figures.
    pub fn record(&mut self, status: ReportStatus, execution_time_ms: u64) {
        self.total += 1;
        match status {
            ReportStatus::Success => self.succeeded += 1,
            ReportStatus::Error | ReportStatus::Cancelled => self.failed += 1,
        }
        let n = self.total as f64;
        self.avg_execution_time_ms += (execution_time_ms as f64 - self.avg_execution_time_ms) / n;
    }

    /// Share of runs that completed, 0.0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

/// Shared handle to a set of [`ExecutionStats`].
#[derive(Debug, Clone)]
pub struct StatsCollector {
    stats: Arc<RwLock<ExecutionStats>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(RwLock::new(ExecutionStats::default())),
        }
    }

    /// Record a finished run.
    pub async fn record(&self, report: &FinalReport) {
        let mut stats = self.stats.write().await;
        stats.record(report.status, report.execution_time_ms);
    }

    /// Current figures.
    pub async fn snapshot(&self) -> ExecutionStats {
        *self.stats.read().await
    }

    /// Clear all figures.
    pub async fn reset(&self) {
        *self.stats.write().await = ExecutionStats::default();
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
