//! Window assignment and percentile semantics through the public API

use cpu_p95_types::CpuSample;
use processor::aggregation::{percentile, Percentile};
use processor::config::{Interpolation, WindowConfig};
use processor::state::WindowStateStore;
use processor::window::{SlidingWindowAssigner, WindowAssigner, WindowBounds};
use std::time::Duration;

// ============================================================================
// Window assignment
// ============================================================================

mod assignment_tests {
    use super::*;

    fn default_assigner() -> SlidingWindowAssigner {
        SlidingWindowAssigner::from_config(&WindowConfig::default()).unwrap()
    }

    #[test]
    fn test_every_window_contains_the_sample() {
        let assigner = default_assigner();
        for ts in [-61_234, -1, 0, 1, 4_999, 5_000, 12_345, 1_700_000_001_234] {
            let windows = assigner.assign_windows(ts).unwrap();
            assert_eq!(windows.len(), 6, "timestamp {}", ts);
            for window in &windows {
                assert!(window.contains(ts), "{} not in {}", ts, window);
                assert_eq!(window.duration_millis(), 30_000);
                assert_eq!(window.start.rem_euclid(5_000), 0);
            }
        }
    }

    #[test]
    fn test_windows_are_ascending_and_distinct() {
        let windows = default_assigner().assign_windows(12_000).unwrap();
        let starts: Vec<i64> = windows.iter().map(|w| w.start).collect();
        assert_eq!(
            starts,
            vec![-15_000, -10_000, -5_000, 0, 5_000, 10_000]
        );
    }

    #[test]
    fn test_boundary_sample_belongs_to_next_window() {
        let windows = default_assigner().assign_windows(30_000).unwrap();
        assert!(!windows.contains(&WindowBounds::new(0, 30_000)));
        assert!(windows.contains(&WindowBounds::new(5_000, 35_000)));
        assert!(windows.contains(&WindowBounds::new(30_000, 60_000)));
    }

    #[test]
    fn test_non_dividing_slide_yields_partial_count() {
        let assigner =
            SlidingWindowAssigner::new(Duration::from_secs(10), Duration::from_secs(3)).unwrap();
        assert_eq!(assigner.max_windows_per_event(), 4);

        let counts: Vec<usize> = (0..3_000)
            .step_by(500)
            .map(|ts| assigner.assign_windows(ts).unwrap().len())
            .collect();
        assert!(counts.iter().all(|c| *c == 3 || *c == 4));
        assert!(counts.contains(&3));
        assert!(counts.contains(&4));
    }

    #[test]
    fn test_assign_tags_windows_with_device() {
        let windows = default_assigner()
            .assign(&CpuSample::new("host-7", 1_000, 12.5))
            .unwrap();
        assert!(windows.iter().all(|w| w.device_id == "host-7"));
    }

    #[test]
    fn test_extreme_timestamp_is_rejected() {
        let assigner = default_assigner();
        assert!(assigner.assign_windows(i64::MAX).is_err());
        assert!(assigner.assign_windows(i64::MIN).is_err());
    }
}

// ============================================================================
// Percentile estimator
// ============================================================================

mod percentile_tests {
    use super::*;

    /// 5, 10, ..., 100
    fn ramp() -> Vec<f64> {
        (1..=20).map(|i| f64::from(i * 5)).collect()
    }

    #[test]
    fn test_golden_value_legacy() {
        let p95 = Percentile::p95().evaluate(&ramp());
        assert!((p95 - 99.75).abs() < 1e-9);
    }

    #[test]
    fn test_golden_value_r7() {
        let p95 = Percentile::p95()
            .with_interpolation(Interpolation::R7)
            .evaluate(&ramp());
        assert!((p95 - 95.25).abs() < 1e-9);
    }

    #[test]
    fn test_small_sets() {
        assert_eq!(percentile(&[42.0], 95.0).unwrap(), 42.0);
        assert_eq!(percentile(&[60.0, 75.5, 90.0], 95.0).unwrap(), 90.0);
        assert_eq!(percentile(&[10.0, 10.0, 10.0, 10.0], 95.0).unwrap(), 10.0);
    }

    #[test]
    fn test_input_order_is_irrelevant() {
        let mut shuffled = ramp();
        shuffled.reverse();
        shuffled.swap(3, 17);
        assert_eq!(
            Percentile::p95().evaluate(&shuffled),
            Percentile::p95().evaluate(&ramp())
        );
    }

    #[test]
    fn test_invalid_quantile() {
        assert!(percentile(&[1.0], 0.0).is_err());
        assert!(percentile(&[1.0], 100.5).is_err());
        assert!(percentile(&[1.0], f64::NAN).is_err());
    }
}

// ============================================================================
// Window state store
// ============================================================================

mod store_tests {
    use super::*;
    use processor::window::WindowInstance;

    #[test]
    fn test_drain_until_returns_due_windows_in_start_order() {
        let mut store: WindowStateStore<Vec<f64>> = WindowStateStore::new(30_000);
        for start in [10_000, 0, 5_000] {
            for device in ["b", "a"] {
                let window = WindowInstance::new(device, WindowBounds::new(start, start + 30_000));
                let (acc, _) = store.get_or_create(&window, Vec::new);
                acc.push(1.0);
            }
        }
        assert_eq!(store.open_windows(), 6);

        let due = store.drain_until(5_000);
        let starts: Vec<i64> = due.iter().map(|(w, _)| w.start()).collect();
        assert_eq!(starts.len(), 4);
        assert!(starts.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(store.open_windows(), 2);
        assert_eq!(store.earliest_start(), Some(10_000));
    }
}
