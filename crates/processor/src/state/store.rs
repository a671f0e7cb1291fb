//! Per-shard window state
//!
//! Accumulators are keyed by device and window start. A timer index keyed by
//! window start lets the firing pass visit due windows in ascending start
//! order without scanning every device.

use crate::window::{WindowBounds, WindowInstance};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::trace;

/// In-memory window state owned by a single shard worker
#[derive(Debug)]
pub struct WindowStateStore<A> {
    window_size: i64,
    windows: HashMap<String, BTreeMap<i64, A>>,
    timers: BTreeMap<i64, BTreeSet<String>>,
    open_windows: usize,
}

impl<A> WindowStateStore<A> {
    /// Create an empty store for windows of the given size in millis
    pub fn new(window_size: i64) -> Self {
        Self {
            window_size,
            windows: HashMap::new(),
            timers: BTreeMap::new(),
            open_windows: 0,
        }
    }

    /// Look up the accumulator of a window, creating it if absent
    ///
    /// The boolean is true when the accumulator was created by this call.
    pub fn get_or_create(
        &mut self,
        instance: &WindowInstance,
        init: impl FnOnce() -> A,
    ) -> (&mut A, bool) {
        let start = instance.start();
        let per_device = self
            .windows
            .entry(instance.device_id.clone())
            .or_default();

        let created = !per_device.contains_key(&start);
        if created {
            self.timers
                .entry(start)
                .or_default()
                .insert(instance.device_id.clone());
            self.open_windows += 1;
            trace!(window = %instance, "Opened window");
        }

        (per_device.entry(start).or_insert_with(init), created)
    }

    /// Get the accumulator of a window, if open
    pub fn get(&self, instance: &WindowInstance) -> Option<&A> {
        self.windows
            .get(&instance.device_id)
            .and_then(|per_device| per_device.get(&instance.start()))
    }

    /// Remove every window whose start is at most `max_start`
    ///
    /// Windows are returned in ascending start order; windows sharing a start
    /// are ordered by device id.
    pub fn drain_until(&mut self, max_start: i64) -> Vec<(WindowInstance, A)> {
        let due = match max_start.checked_add(1) {
            Some(boundary) => {
                let later = self.timers.split_off(&boundary);
                std::mem::replace(&mut self.timers, later)
            }
            None => std::mem::take(&mut self.timers),
        };
        self.take_windows(due)
    }

    /// Remove every open window
    pub fn drain_all(&mut self) -> Vec<(WindowInstance, A)> {
        let due = std::mem::take(&mut self.timers);
        self.take_windows(due)
    }

    fn take_windows(&mut self, due: BTreeMap<i64, BTreeSet<String>>) -> Vec<(WindowInstance, A)> {
        let mut drained = Vec::new();
        for (start, devices) in due {
            let end = start.saturating_add(self.window_size);
            for device_id in devices {
                let Some(per_device) = self.windows.get_mut(&device_id) else {
                    continue;
                };
                if let Some(accumulator) = per_device.remove(&start) {
                    if per_device.is_empty() {
                        self.windows.remove(&device_id);
                    }
                    self.open_windows -= 1;
                    drained.push((
                        WindowInstance::new(device_id, WindowBounds { start, end }),
                        accumulator,
                    ));
                }
            }
        }
        drained
    }

    /// Earliest open window start
    pub fn earliest_start(&self) -> Option<i64> {
        self.timers.keys().next().copied()
    }

    /// Number of open windows across all devices
    pub fn open_windows(&self) -> usize {
        self.open_windows
    }

    /// Number of devices with at least one open window
    pub fn device_count(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open_windows == 0
    }

    /// Drop all state
    pub fn clear(&mut self) {
        self.windows.clear();
        self.timers.clear();
        self.open_windows = 0;
    }
}
