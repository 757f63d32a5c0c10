//! Temporal anomaly batching.
//!
//! Anomalies are grouped per device over a window that restarts on every
//! submit, so categories firing close together end up in one batch and
//! one investigation. A batch is dispatched only after a quiet period of
//! `window` with no new submits for that device.

use crate::models::AnomalyResult;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// One category's anomalies within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyEntry {
    pub category: String,
    pub anomalies: Vec<AnomalyResult>,
    pub raw_data: String,
}

/// All entries collected for a device during one window.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyBatch {
    pub device: String,
    pub entries: Vec<AnomalyEntry>,
}

impl AnomalyBatch {
    /// Entry categories in submission order.
    pub fn categories(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.category.clone()).collect()
    }
}

/// Receives flushed batches.
pub type BatchCallback = Arc<dyn Fn(AnomalyBatch) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Default)]
struct Pending {
    batches: HashMap<String, AnomalyBatch>,
    timers: HashMap<String, JoinHandle<()>>,
}

struct Inner {
    window: Duration,
    pending: Mutex<Pending>,
    callback: RwLock<Option<BatchCallback>>,
}

/// Per-device anomaly batcher with resettable flush timers.
#[derive(Clone)]
pub struct AnomalyAccumulator {
    inner: Arc<Inner>,
}

impl AnomalyAccumulator {
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                window,
                pending: Mutex::new(Pending::default()),
                callback: RwLock::new(None),
            }),
        }
    }

    /// Register the batch handler, replacing any previous one.
    pub fn set_callback(&self, callback: BatchCallback) {
        if let Ok(mut slot) = self.inner.callback.write() {
            *slot = Some(callback);
        }
    }

    /// Number of devices with a batch awaiting dispatch.
    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.batches.len()
    }

    /// Append anomalies to the device's batch and restart its window.
    pub async fn submit(&self, device: &str, category: &str, anomalies: Vec<AnomalyResult>, raw_data: String) {
        let entry = AnomalyEntry {
            category: category.to_string(),
            anomalies,
            raw_data,
        };

        let mut pending = self.inner.pending.lock().await;
        pending
            .batches
            .entry(device.to_string())
            .or_insert_with(|| AnomalyBatch {
                device: device.to_string(),
                entries: Vec::new(),
            })
            .entries
            .push(entry);

        if let Some(previous) = pending.timers.remove(device) {
            previous.abort();
        }

        let inner = Arc::clone(&self.inner);
        let device_key = device.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;
            Inner::flush(&inner, &device_key, false).await;
        });
        pending.timers.insert(device.to_string(), timer);
        debug!("Queued {} anomalies for {} (window restarted)", category, device);
    }

    /// Dispatch every pending batch without waiting for timers.
    pub async fn flush_all(&self) {
        let devices: Vec<String> = {
            let pending = self.inner.pending.lock().await;
            pending.batches.keys().cloned().collect()
        };
        for device in devices {
            Inner::flush(&self.inner, &device, true).await;
        }
    }

    /// Cancel all timers, wait for them to end, then flush what is left.
    pub async fn stop(&self) {
        let timers: Vec<JoinHandle<()>> = {
            let mut pending = self.inner.pending.lock().await;
            pending.timers.drain().map(|(_, handle)| handle).collect()
        };

        for timer in timers {
            timer.abort();
            if let Err(e) = timer.await {
                if !e.is_cancelled() {
                    error!("Accumulator timer ended abnormally: {}", e);
                }
            }
        }

        self.flush_all().await;
    }
}

impl Inner {
    async fn flush(inner: &Arc<Inner>, device: &str, abort_timer: bool) {
        let batch = {
            let mut pending = inner.pending.lock().await;
            let timer = pending.timers.remove(device);
            if abort_timer {
                if let Some(timer) = timer {
                    timer.abort();
                }
            }
            pending.batches.remove(device)
        };

        let Some(batch) = batch.filter(|b| !b.entries.is_empty()) else {
            return;
        };

        let callback = inner.callback.read().ok().and_then(|slot| slot.clone());
        let Some(callback) = callback else {
            warn!("Accumulator flushed {} but no callback is registered", device);
            return;
        };

        if let Err(e) = callback(batch).await {
            error!("Accumulator callback failed for {}: {:#}", device, e);
        }
    }
}
