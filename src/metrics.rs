//! # Metrics
//!
//! Aggregate counters maintained by [`crate::simulator::Simulator`] as it
//! runs, plus an optional per-message latency distribution recorded with
//! [`hdrhistogram`] the way a throughput/latency benchmark would. Per
//! component numbers (channel occupancy, link utilization, PE busy ratio)
//! live on the components themselves and are pulled in by
//! [`crate::display`] and the CLI's channel summary table, not duplicated
//! here.

use hdrhistogram::Histogram;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Default)]
pub struct Metrics {
    pub ticks: u64,
    pub messages_delivered: u64,
    pub bytes_transferred: u64,
    latency_ticks: Option<Histogram<u64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub min_ticks: u64,
    pub max_ticks: u64,
    pub mean_ticks: f64,
    pub p50_ticks: u64,
    pub p99_ticks: u64,
}

impl Metrics {
    /// Enable end-to-end latency tracking (ticks from `created_at` to
    /// delivery). 3 significant figures, matching the precision the crate
    /// uses everywhere else it reaches for an HDR histogram.
    pub fn with_latency_tracking() -> Self {
        Self {
            latency_ticks: Histogram::new(3).ok(),
            ..Default::default()
        }
    }

    pub fn record_latency(&mut self, ticks: u64) {
        if let Some(h) = &mut self.latency_ticks {
            let _ = h.record(ticks);
        }
    }

    pub fn latency_summary(&self) -> Option<LatencySummary> {
        let h = self.latency_ticks.as_ref()?;
        if h.len() == 0 {
            return None;
        }
        Some(LatencySummary {
            samples: h.len(),
            min_ticks: h.min(),
            max_ticks: h.max(),
            mean_ticks: h.mean(),
            p50_ticks: h.value_at_quantile(0.50),
            p99_ticks: h.value_at_quantile(0.99),
        })
    }

    pub fn summary(&self) -> serde_json::Value {
        let mut value = json!({
            "ticks": self.ticks,
            "messages_delivered": self.messages_delivered,
            "bytes_transferred": self.bytes_transferred,
        });
        if let Some(latency) = self.latency_summary() {
            value["latency_ticks"] = serde_json::to_value(latency).unwrap_or_default();
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_omits_latency_when_untracked() {
        let mut m = Metrics::default();
        m.ticks = 10;
        m.messages_delivered = 3;
        m.bytes_transferred = 256;
        let summary = m.summary();
        assert_eq!(summary["ticks"], 10);
        assert!(summary.get("latency_ticks").is_none());
    }

    #[test]
    fn latency_summary_reports_samples() {
        let mut m = Metrics::with_latency_tracking();
        m.record_latency(5);
        m.record_latency(7);
        m.record_latency(9);
        let summary = m.latency_summary().unwrap();
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.min_ticks, 5);
        assert_eq!(summary.max_ticks, 9);
    }
}
