//! Periodic health-check scheduling.
//!
//! One task per `(device, category)` pair. Each task waits a
//! deterministic jitter before its first run so that devices do not all
//! fire at once, then alternates between running the check callback and
//! sleeping for the category interval.

use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Invoked as `(category, device)` on every scheduled run.
pub type CheckCallback = Arc<dyn Fn(String, String) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Upper bound on the start-up jitter, in seconds.
const MAX_JITTER_SECS: u64 = 30;

/// Deterministic start-up delay for a check loop.
pub fn jitter_secs(category: &str, device: &str, interval: u64) -> u64 {
    let digest = Sha256::digest(format!("{}-{}", category, device).as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes) % MAX_JITTER_SECS.min(interval).max(1)
}

/// Category intervals shared with running loops.
#[derive(Clone)]
struct Intervals {
    defaults: Arc<RwLock<BTreeMap<String, u64>>>,
    device_overrides: Arc<HashMap<String, BTreeMap<String, u64>>>,
}

impl Intervals {
    fn resolve(&self, category: &str, device: &str) -> Option<u64> {
        if let Some(secs) = self
            .device_overrides
            .get(device)
            .and_then(|o| o.get(category))
        {
            return Some(*secs);
        }
        self.defaults
            .read()
            .ok()
            .and_then(|d| d.get(category).copied())
    }
}

/// Drives the check callback for every device and category.
pub struct Scheduler {
    intervals: Intervals,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// `intervals` maps category to seconds; `device_overrides` replaces
    /// entries of that map for individual devices.
    pub fn new(intervals: BTreeMap<String, u64>, device_overrides: HashMap<String, BTreeMap<String, u64>>) -> Self {
        Self {
            intervals: Intervals {
                defaults: Arc::new(RwLock::new(intervals)),
                device_overrides: Arc::new(device_overrides),
            },
            tasks: Vec::new(),
        }
    }

    /// Spawn one loop per device and scheduled category.
    pub fn start(&mut self, devices: &[String], callback: CheckCallback) {
        let categories: Vec<String> = self
            .intervals
            .defaults
            .read()
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default();

        for device in devices {
            for category in &categories {
                let intervals = self.intervals.clone();
                let callback = Arc::clone(&callback);
                let (category, device) = (category.clone(), device.clone());
                self.tasks.push(tokio::spawn(async move {
                    run_loop(category, device, intervals, callback).await;
                }));
            }
        }
        info!("Scheduler started: {} check loops", self.tasks.len());
    }

    /// Cancel every loop and wait until all of them have ended.
    pub async fn stop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Check loop ended abnormally: {}", e);
                }
            }
        }
        info!("Scheduler stopped");
    }

    /// Change a category's interval; running loops pick it up after their current sleep.
    pub fn update_interval(&self, category: &str, secs: u64) {
        if let Ok(mut defaults) = self.intervals.defaults.write() {
            defaults.insert(category.to_string(), secs);
        }
    }

    /// Effective interval for a device and category.
    pub fn interval_for(&self, category: &str, device: &str) -> Option<u64> {
        self.intervals.resolve(category, device)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }
}

async fn run_loop(category: String, device: String, intervals: Intervals, callback: CheckCallback) {
    let Some(first) = intervals.resolve(&category, &device) else {
        return;
    };
    let jitter = jitter_secs(&category, &device, first);
    tokio::time::sleep(Duration::from_secs(jitter)).await;

    loop {
        debug!("Running scheduled check: {} on {}", category, device);
        if let Err(e) = callback(category.clone(), device.clone()).await {
            error!("Scheduled check {}/{} failed: {:#}", category, device, e);
        }

        let interval = intervals.resolve(&category, &device).unwrap_or(first).max(1);
        tokio::time::sleep(Duration::from_secs(interval)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(fail: bool) -> (CheckCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let callback: CheckCallback = Arc::new(move |_category: String, _device: String| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                if fail {
                    anyhow::bail!("device unreachable");
                }
                Ok(())
            }
            .boxed()
        });
        (callback, count)
    }

    fn single(category: &str, secs: u64) -> BTreeMap<String, u64> {
        BTreeMap::from([(category.to_string(), secs)])
    }

    async fn sleep_secs(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[test]
    fn test_jitter_is_deterministic_and_bounded() {
        let a = jitter_secs("chassis", "r1", 300);
        assert_eq!(a, jitter_secs("chassis", "r1", 300));
        assert!(a < 30);
        assert!(jitter_secs("chassis", "r1", 7) < 7);
        assert_eq!(jitter_secs("chassis", "r1", 0), 0);
    }

    #[test]
    fn test_device_override_wins() {
        let overrides = HashMap::from([("r2".to_string(), single("chassis", 60))]);
        let scheduler = Scheduler::new(single("chassis", 300), overrides);
        assert_eq!(scheduler.interval_for("chassis", "r1"), Some(300));
        assert_eq!(scheduler.interval_for("chassis", "r2"), Some(60));
        scheduler.update_interval("chassis", 120);
        assert_eq!(scheduler.interval_for("chassis", "r1"), Some(120));
        assert_eq!(scheduler.interval_for("chassis", "r2"), Some(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_every_interval() {
        let mut scheduler = Scheduler::new(single("chassis", 60), HashMap::new());
        let (callback, count) = counting(false);
        let jitter = jitter_secs("chassis", "r1", 60);

        scheduler.start(&["r1".to_string()], callback);
        assert_eq!(scheduler.task_count(), 1);

        sleep_secs(jitter + 1).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        sleep_secs(60).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_loop_per_device_and_category() {
        let intervals = BTreeMap::from([("chassis".to_string(), 60), ("routing".to_string(), 60)]);
        let mut scheduler = Scheduler::new(intervals, HashMap::new());
        let (callback, count) = counting(false);

        scheduler.start(&["r1".to_string(), "r2".to_string()], callback);
        assert_eq!(scheduler.task_count(), 4);

        sleep_secs(31).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_callback_keeps_running() {
        let mut scheduler = Scheduler::new(single("chassis", 10), HashMap::new());
        let (callback, count) = counting(true);

        scheduler.start(&["r1".to_string()], callback);
        sleep_secs(35).await;
        assert!(count.load(Ordering::SeqCst) >= 3);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_leaves_no_running_task() {
        let mut scheduler = Scheduler::new(single("chassis", 10), HashMap::new());
        let (callback, count) = counting(false);

        scheduler.start(&["r1".to_string()], callback);
        sleep_secs(15).await;
        scheduler.stop().await;

        assert_eq!(scheduler.task_count(), 0);
        assert!(!scheduler.is_running());
        let after_stop = count.load(Ordering::SeqCst);
        sleep_secs(100).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_interval_applies_to_next_sleep() {
        let mut scheduler = Scheduler::new(single("chassis", 100), HashMap::new());
        let (callback, count) = counting(false);
        let jitter = jitter_secs("chassis", "r1", 100);

        scheduler.start(&["r1".to_string()], callback);
        sleep_secs(jitter + 1).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        scheduler.update_interval("chassis", 10);

        // The sleep already in progress still lasts 100s.
        sleep_secs(98).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        sleep_secs(2).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        sleep_secs(10).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        scheduler.stop().await;
    }
}
