//! Metrics for relayed sessions and prompt optimization

use crate::optimization::OptimizationStats;
use crate::relay::Termination;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Counters accumulated across sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayMetrics {
    pub sessions: u64,
    /// Ended with `[DONE]` after some content
    pub completed: u64,
    /// Upstream closed or stalled after sending some content
    pub partial: u64,
    /// Upstream ended before sending anything
    pub empty: u64,
    /// Non-2xx upstream status
    pub rejected: u64,
    /// Configuration, transport or I/O failures
    pub failed: u64,
    /// Consumer went away or the overall deadline passed
    pub cancelled: u64,
    pub streamed_chars: u64,
    pub prompt_tokens_before: u64,
    pub prompt_tokens_after: u64,
    pub tokens_saved: u64,
    pub optimizations: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session(&mut self, termination: &Termination, had_content: bool, streamed_chars: usize) {
        self.sessions += 1;
        self.streamed_chars += streamed_chars as u64;

        match termination {
            Termination::Done if had_content => self.completed += 1,
            Termination::Closed | Termination::Stalled if had_content => self.partial += 1,
            Termination::Done | Termination::Closed | Termination::Stalled => self.empty += 1,
            Termination::Rejected { .. } => self.rejected += 1,
            Termination::Failed(_) => self.failed += 1,
            Termination::Disconnected | Termination::DeadlineExceeded => self.cancelled += 1,
        }
    }

    pub fn record_optimization(&mut self, stats: &OptimizationStats) {
        self.optimizations += 1;
        self.prompt_tokens_before += stats.original_tokens as u64;
        self.prompt_tokens_after += stats.optimized_tokens as u64;
        self.tokens_saved += stats.tokens_saved as u64;
    }

    /// Share of sessions that left a usable answer
    pub fn success_rate(&self) -> f64 {
        if self.sessions == 0 {
            return 0.0;
        }
        (self.completed + self.partial) as f64 / self.sessions as f64
    }

    /// Optimized prompt size relative to the raw messages
    pub fn compression_ratio(&self) -> f64 {
        if self.prompt_tokens_before == 0 {
            return 1.0;
        }
        self.prompt_tokens_after as f64 / self.prompt_tokens_before as f64
    }
}

/// Thread-safe metrics tracker
#[derive(Clone, Default)]
pub struct MetricsTracker {
    inner: Arc<Mutex<RelayMetrics>>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session(&self, termination: &Termination, had_content: bool, streamed_chars: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.record_session(termination, had_content, streamed_chars);
        }
    }

    pub fn record_optimization(&self, stats: &OptimizationStats) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.record_optimization(stats);
        }
    }

    pub fn get_metrics(&self) -> RelayMetrics {
        self.inner
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> MetricsSummary {
        let metrics = self.get_metrics();
        MetricsSummary {
            sessions: metrics.sessions,
            completed: metrics.completed,
            partial: metrics.partial,
            errors: metrics.empty + metrics.rejected + metrics.failed,
            cancelled: metrics.cancelled,
            success_rate: metrics.success_rate(),
            streamed_chars: metrics.streamed_chars,
            tokens_saved: metrics.tokens_saved,
            compression_ratio: metrics.compression_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub sessions: u64,
    pub completed: u64,
    pub partial: u64,
    pub errors: u64,
    pub cancelled: u64,
    pub success_rate: f64,
    pub streamed_chars: u64,
    pub tokens_saved: u64,
    pub compression_ratio: f64,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Relay Metrics Summary ===")?;
        writeln!(f, "Sessions: {}", self.sessions)?;
        writeln!(
            f,
            "Completed: {} (partial: {})",
            self.completed, self.partial
        )?;
        writeln!(f, "Errors: {}", self.errors)?;
        writeln!(f, "Cancelled: {}", self.cancelled)?;
        writeln!(f, "Success rate: {:.1}%", self.success_rate * 100.0)?;
        writeln!(f, "Characters streamed: {}", self.streamed_chars)?;
        writeln!(f, "Prompt tokens saved: {}", self.tokens_saved)?;
        writeln!(f, "Compression ratio: {:.2}%", self.compression_ratio * 100.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_are_bucketed() {
        let tracker = MetricsTracker::new();
        tracker.record_session(&Termination::Done, true, 11);
        tracker.record_session(&Termination::Stalled, true, 4);
        tracker.record_session(&Termination::Closed, false, 0);
        tracker.record_session(&Termination::Rejected { status: 500, body: String::new() }, false, 0);
        tracker.record_session(&Termination::Disconnected, true, 3);

        let metrics = tracker.get_metrics();
        assert_eq!(metrics.sessions, 5);
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.partial, 1);
        assert_eq!(metrics.empty, 1);
        assert_eq!(metrics.rejected, 1);
        assert_eq!(metrics.cancelled, 1);
        assert_eq!(metrics.streamed_chars, 18);
        assert!((metrics.success_rate() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_optimization_savings() {
        let tracker = MetricsTracker::new();
        tracker.record_optimization(&OptimizationStats::new(200, 150));
        tracker.record_optimization(&OptimizationStats::new(100, 50));

        let summary = tracker.summary();
        assert_eq!(summary.tokens_saved, 100);
        assert!((summary.compression_ratio - 200.0 / 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_display() {
        let tracker = MetricsTracker::new();
        tracker.record_session(&Termination::Failed("boom".into()), false, 0);
        let text = tracker.summary().to_string();
        assert!(text.contains("Sessions: 1"));
        assert!(text.contains("Errors: 1"));
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = RelayMetrics::new();
        assert_eq!(metrics.success_rate(), 0.0);
        assert_eq!(metrics.compression_ratio(), 1.0);
    }
}
