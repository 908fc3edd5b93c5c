//! Delta-based CPU utilization per target.
//!
//! CPU% for one node = ((user₂+sys₂) − (user₁+sys₁)) / (uptime₂ − uptime₁) × 100,
//! clamped to `[0, 100]`. The target figure is the unclamped sum over its
//! nodes, so a three-shard cluster can legitimately report 150%.
//!
//! The first poll of a target only records a baseline and yields `None`.
//! Baselines live in a [`CpuTracker`] owned by whoever drives the polls. Each
//! target has its own slot lock, so polls of one target run one at a time
//! while different targets never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RawMutex};
use parking_lot::lock_api::ArcMutexGuard;

use crate::node::NodeInfo;

/// CPU counters of one node at one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuSample {
    /// `host:port` node id.
    pub node: String,
    pub cpu_sys: f64,
    pub cpu_user: f64,
    pub up_time: f64,
}

impl CpuSample {
    /// Extract counters from parsed status; `None` when any of them is
    /// missing or not a number.
    pub fn from_info(info: &NodeInfo) -> Option<Self> {
        let num = |section: &str, field: &str| -> Option<f64> {
            info.get(section, field)?
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
        };
        Some(Self {
            node: info.address.id(),
            cpu_sys: num("cpu", "used_cpu_sys")?,
            cpu_user: num("cpu", "used_cpu_user")?,
            up_time: num("server", "uptime_in_seconds")?,
        })
    }

    /// Utilization since `previous`, in percent of one core.
    ///
    /// Zero when uptime did not advance (restart, duplicate or reordered
    /// poll).
    pub fn usage_since(&self, previous: &CpuSample) -> f64 {
        if previous.up_time >= self.up_time {
            return 0.0;
        }
        let current = self.cpu_user + self.cpu_sys;
        let before = previous.cpu_user + previous.cpu_sys;
        let usage = (current - before) / (self.up_time - previous.up_time) * 100.0;
        usage.clamp(0.0, 100.0)
    }
}

/// Last sample set of one target plus the time it was stored.
#[derive(Debug)]
pub struct TargetBaseline {
    samples: Option<HashMap<String, CpuSample>>,
    last_poll: Instant,
}

impl TargetBaseline {
    fn new() -> Self {
        Self {
            samples: None,
            last_poll: Instant::now(),
        }
    }

    /// Stored sample for a node id, if any.
    pub fn sample(&self, node: &str) -> Option<&CpuSample> {
        self.samples.as_ref()?.get(node)
    }

    pub fn has_baseline(&self) -> bool {
        self.samples.is_some()
    }

    /// Apply one poll and return the summed utilization, `None` on the
    /// first poll.
    ///
    /// The baseline is replaced wholesale: nodes absent from `current` drop
    /// out of it.
    pub fn update(&mut self, current: Vec<CpuSample>) -> Option<f64> {
        let total = self.samples.as_ref().map(|previous| {
            current
                .iter()
                .map(|sample| {
                    previous
                        .get(&sample.node)
                        .map_or(0.0, |prev| sample.usage_since(prev))
                })
                .sum::<f64>()
        });

        self.samples = Some(
            current
                .into_iter()
                .map(|sample| (sample.node.clone(), sample))
                .collect(),
        );
        self.last_poll = Instant::now();
        total
    }
}

/// Exclusive hold on one target's baseline.
///
/// Obtained from [`CpuTracker::lock_target`]; other polls of the same target
/// block until the guard is dropped.
pub struct TargetGuard {
    guard: ArcMutexGuard<RawMutex, TargetBaseline>,
}

impl TargetGuard {
    pub fn update(&mut self, current: Vec<CpuSample>) -> Option<f64> {
        self.guard.update(current)
    }

    pub fn baseline(&self) -> &TargetBaseline {
        &self.guard
    }
}

/// Injectable store of CPU baselines keyed by target id.
#[derive(Debug, Default)]
pub struct CpuTracker {
    slots: Mutex<HashMap<String, Arc<Mutex<TargetBaseline>>>>,
    idle_ttl: Option<Duration>,
}

impl CpuTracker {
    /// Tracker without idle eviction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker whose [`evict_idle`](Self::evict_idle) drops targets not polled
    /// for `ttl`.
    pub fn with_idle_ttl(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            idle_ttl: Some(ttl),
        }
    }

    pub fn idle_ttl(&self) -> Option<Duration> {
        self.idle_ttl
    }

    /// Lock the slot of `target_id`, creating it on first use.
    ///
    /// The returned guard always belongs to the slot currently stored for
    /// the target, so two polls of one target never run side by side.
    pub fn lock_target(&self, target_id: &str) -> TargetGuard {
        loop {
            let slot = Arc::clone(
                self.slots
                    .lock()
                    .entry(target_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(TargetBaseline::new()))),
            );
            let guard = slot.lock_arc();
            // Removed or evicted while we waited: the slot is orphaned.
            let current = self
                .slots
                .lock()
                .get(target_id)
                .is_some_and(|s| Arc::ptr_eq(s, &slot));
            if current {
                return TargetGuard { guard };
            }
            log::debug!("{target_id}: baseline slot replaced while waiting, retrying");
        }
    }

    /// Record `samples` for `target_id` and return the summed utilization.
    pub fn update(&self, target_id: &str, samples: Vec<CpuSample>) -> Option<f64> {
        self.lock_target(target_id).update(samples)
    }

    /// Forget a target, e.g. when it is deleted. Returns whether it existed.
    pub fn remove(&self, target_id: &str) -> bool {
        self.slots.lock().remove(target_id).is_some()
    }

    /// Drop slots idle for at least the configured TTL. Slots currently
    /// locked by a poll are kept. Returns the number of slots removed.
    pub fn evict_idle(&self) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| {
            let Some(baseline) = slot.try_lock() else {
                return true;
            };
            baseline.last_poll.elapsed() < ttl
        });
        let removed = before - slots.len();
        if removed > 0 {
            log::info!("evicted {removed} idle CPU baseline(s)");
        }
        removed
    }

    /// Number of targets with a slot.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Whether a baseline is stored for `target_id`.
    pub fn has_baseline(&self, target_id: &str) -> bool {
        let Some(slot) = self.slots.lock().get(target_id).cloned() else {
            return false;
        };
        let baseline = slot.lock();
        baseline.has_baseline()
    }
}
