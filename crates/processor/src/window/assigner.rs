//! Window assigners
//!
//! Maps event timestamps to the windows that contain them.

use super::types::{WindowBounds, WindowInstance};
use crate::config::WindowConfig;
use crate::error::{WindowError, WindowResult};
use cpu_p95_types::CpuSample;
use std::fmt;
use std::time::Duration;

/// Trait for assigning events to windows
pub trait WindowAssigner: Send + Sync + fmt::Debug {
    /// Assign a timestamp to every window containing it, ascending by start
    fn assign_windows(&self, timestamp: i64) -> WindowResult<Vec<WindowBounds>>;

    /// Get the maximum number of windows an event can be assigned to
    fn max_windows_per_event(&self) -> usize {
        1
    }
}

/// Sliding window assigner
///
/// Creates fixed-size, overlapping windows whose starts are aligned to
/// multiples of the slide (plus an optional offset) since the epoch.
///
/// # Example
/// ```text
/// Window size: 30 seconds, Slide: 5 seconds
/// Event at 12s -> Windows [-15, 15), [-10, 20), [-5, 25), [0, 30), [5, 35), [10, 40)
/// ```
#[derive(Debug, Clone)]
pub struct SlidingWindowAssigner {
    /// Size of each window in millis
    size: i64,
    /// Slide interval between windows in millis
    slide: i64,
    /// Offset for window alignment in millis
    offset: i64,
}

impl SlidingWindowAssigner {
    /// Create a new sliding window assigner
    pub fn new(size: Duration, slide: Duration) -> WindowResult<Self> {
        let size = to_millis(size);
        let slide = to_millis(slide);

        if size <= 0 {
            return Err(WindowError::InvalidWindowSize { size });
        }
        if slide <= 0 || slide > size {
            return Err(WindowError::InvalidSlideSize {
                slide,
                window: size,
            });
        }

        Ok(Self {
            size,
            slide,
            offset: 0,
        })
    }

    /// Create a sliding window assigner with an offset in [0, slide)
    pub fn with_offset(mut self, offset: Duration) -> WindowResult<Self> {
        let offset = to_millis(offset);
        if offset >= self.slide {
            return Err(WindowError::InvalidOffset {
                offset,
                slide: self.slide,
            });
        }
        self.offset = offset;
        Ok(self)
    }

    /// Build an assigner from the window configuration
    pub fn from_config(config: &WindowConfig) -> WindowResult<Self> {
        Self::new(config.size(), config.slide())?
            .with_offset(Duration::from_millis(config.offset_ms))
    }

    /// Window size in millis
    pub fn size_millis(&self) -> i64 {
        self.size
    }

    /// Slide in millis
    pub fn slide_millis(&self) -> i64 {
        self.slide
    }

    /// Assign a sample to all window instances of its device
    pub fn assign(&self, sample: &CpuSample) -> WindowResult<Vec<WindowInstance>> {
        Ok(self
            .assign_windows(sample.event_time)?
            .into_iter()
            .map(|bounds| WindowInstance::new(sample.device_id.clone(), bounds))
            .collect())
    }

    /// Start of the latest window containing the timestamp
    fn last_start(&self, timestamp: i64) -> WindowResult<i64> {
        let shifted = timestamp
            .checked_sub(self.offset)
            .ok_or_else(|| overflow(timestamp, "offset subtraction"))?;
        timestamp
            .checked_sub(shifted.rem_euclid(self.slide))
            .ok_or_else(|| overflow(timestamp, "window alignment"))
    }
}

impl WindowAssigner for SlidingWindowAssigner {
    fn assign_windows(&self, timestamp: i64) -> WindowResult<Vec<WindowBounds>> {
        let mut start = self.last_start(timestamp)?;
        let mut windows = Vec::with_capacity(self.max_windows_per_event());

        loop {
            let end = start
                .checked_add(self.size)
                .ok_or_else(|| overflow(timestamp, "window end"))?;
            if end <= timestamp {
                break;
            }
            windows.push(WindowBounds::new(start, end));

            start = match start.checked_sub(self.slide) {
                Some(previous) => previous,
                None => break,
            };
        }

        windows.reverse();
        Ok(windows)
    }

    fn max_windows_per_event(&self) -> usize {
        let count = (self.size + self.slide - 1) / self.slide;
        usize::try_from(count).unwrap_or(usize::MAX)
    }
}

fn to_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn overflow(timestamp: i64, operation: &str) -> WindowError {
    WindowError::AssignmentFailed {
        timestamp,
        reason: format!("arithmetic overflow in {}", operation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_assigner() -> SlidingWindowAssigner {
        SlidingWindowAssigner::new(Duration::from_secs(30), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_sliding_window_assignment() {
        let assigner =
            SlidingWindowAssigner::new(Duration::from_millis(10), Duration::from_millis(5))
                .unwrap();

        // Event at 7 -> Windows [0, 10), [5, 15)
        let windows = assigner.assign_windows(7).unwrap();
        assert_eq!(
            windows,
            vec![WindowBounds::new(0, 10), WindowBounds::new(5, 15)]
        );

        // Event at 10 -> Windows [5, 15), [10, 20)
        let windows = assigner.assign_windows(10).unwrap();
        assert_eq!(
            windows,
            vec![WindowBounds::new(5, 15), WindowBounds::new(10, 20)]
        );
    }

    #[test]
    fn test_default_assigns_six_windows() {
        let assigner = default_assigner();
        assert_eq!(assigner.max_windows_per_event(), 6);

        for ts in [0, 1, 4_999, 5_000, 12_345, 1_692_617_400_000, -7_000] {
            let windows = assigner.assign_windows(ts).unwrap();
            assert_eq!(windows.len(), 6, "timestamp {}", ts);
            for window in &windows {
                assert!(window.contains(ts));
                assert_eq!(window.duration_millis(), 30_000);
                assert_eq!(window.start.rem_euclid(5_000), 0);
            }
            assert!(windows.windows(2).all(|w| w[0].start + 5_000 == w[1].start));
        }
    }

    #[test]
    fn test_negative_timestamps_align_to_epoch() {
        let assigner = default_assigner();
        let windows = assigner.assign_windows(-1).unwrap();
        assert_eq!(windows.last().unwrap().start, -5_000);
        assert_eq!(windows.first().unwrap().start, -30_000);
    }

    #[test]
    fn test_offset() {
        let assigner =
            SlidingWindowAssigner::new(Duration::from_millis(10), Duration::from_millis(5))
                .unwrap()
                .with_offset(Duration::from_millis(2))
                .unwrap();

        let windows = assigner.assign_windows(7).unwrap();
        assert_eq!(
            windows,
            vec![WindowBounds::new(2, 12), WindowBounds::new(7, 17)]
        );
    }

    #[test]
    fn test_non_divisible_slide() {
        let assigner =
            SlidingWindowAssigner::new(Duration::from_millis(10), Duration::from_millis(4))
                .unwrap();
        assert_eq!(assigner.max_windows_per_event(), 3);

        // Starts 0, 4, 8 contain 9; start 8 is the last
        let windows = assigner.assign_windows(9).unwrap();
        assert_eq!(windows.len(), 3);

        // Starts 4, 8 contain 11
        let windows = assigner.assign_windows(11).unwrap();
        assert_eq!(windows.len(), 2);
        assert!(windows.iter().all(|w| w.contains(11)));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            SlidingWindowAssigner::new(Duration::ZERO, Duration::from_secs(1)),
            Err(WindowError::InvalidWindowSize { .. })
        ));
        assert!(matches!(
            SlidingWindowAssigner::new(Duration::from_secs(5), Duration::from_secs(10)),
            Err(WindowError::InvalidSlideSize { .. })
        ));
        assert!(matches!(
            default_assigner().with_offset(Duration::from_secs(5)),
            Err(WindowError::InvalidOffset { .. })
        ));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let assigner = default_assigner();
        assert!(matches!(
            assigner.assign_windows(i64::MAX),
            Err(WindowError::AssignmentFailed { .. })
        ));
    }

    #[test]
    fn test_assign_sample() {
        let assigner = default_assigner();
        let sample = CpuSample::new("d1", 12_000, 50.0);
        let instances = assigner.assign(&sample).unwrap();

        assert_eq!(instances.len(), 6);
        assert!(instances.iter().all(|i| i.device_id == "d1"));
        assert_eq!(instances[0].start(), -15_000);
        assert_eq!(instances[5].start(), 10_000);
    }
}
