//! Z-score anomaly detection over stored metric history.

use super::metrics_store::MetricsStore;
use crate::models::{AnomalyResult, MetricPoint};
use anyhow::Result;
use std::sync::Arc;

/// Detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyConfig {
    pub z_threshold: f64,
    pub window_hours: u32,
    pub min_samples: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            z_threshold: 3.0,
            window_hours: 24,
            min_samples: 10,
        }
    }
}

/// Stateless detector; all history comes from the store.
#[derive(Clone)]
pub struct AnomalyDetector {
    store: Arc<dyn MetricsStore>,
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(store: Arc<dyn MetricsStore>, config: AnomalyConfig) -> Self {
        Self { store, config }
    }

    /// Compare `current_value` against the recent baseline of `metric`.
    ///
    /// Returns `None` while the baseline has fewer than `min_samples`
    /// points or has zero spread.
    pub async fn check(
        &self,
        device: &str,
        metric: &str,
        current_value: f64,
        unit: &str,
    ) -> Result<Option<AnomalyResult>> {
        let points = self
            .store
            .query(device, metric, self.config.window_hours)
            .await?;
        if points.len() < self.config.min_samples || points.is_empty() {
            return Ok(None);
        }

        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let Some((mean, stddev)) = mean_stddev(&values) else {
            return Ok(None);
        };
        if stddev == 0.0 {
            return Ok(None);
        }

        let z_score = (current_value - mean).abs() / stddev;
        if z_score < self.config.z_threshold {
            return Ok(None);
        }

        Ok(Some(AnomalyResult {
            metric: metric.to_string(),
            value: current_value,
            mean,
            stddev,
            z_score,
            unit: unit.to_string(),
        }))
    }

    /// Check every point, keeping flagged ones in input order.
    pub async fn check_many(&self, device: &str, points: &[MetricPoint]) -> Result<Vec<AnomalyResult>> {
        let mut flagged = Vec::new();
        for point in points {
            if let Some(result) = self
                .check(device, &point.metric, point.value, &point.unit)
                .await?
            {
                flagged.push(result);
            }
        }
        Ok(flagged)
    }
}

/// Sample mean and population standard deviation.
pub fn mean_stddev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}
