//! Frame timing
//!
//! [`PerformanceMonitor`] keeps a ring buffer of recent frame intervals and
//! periodically folds it into [`FrameMetrics`], the averaged numbers the
//! side panel prints. Frames are measured from one presented frame to the
//! next so the figure includes vsync waits, the same way ImGui's own
//! framerate counter behaves.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Averaged frame statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMetrics {
    pub fps: f32,
    /// Average frame time in milliseconds
    pub frame_time_ms: f32,
    pub min_frame_time_ms: f32,
    pub max_frame_time_ms: f32,
}

impl Default for FrameMetrics {
    fn default() -> Self {
        Self {
            fps: 0.0,
            frame_time_ms: 0.0,
            min_frame_time_ms: 0.0,
            max_frame_time_ms: 0.0,
        }
    }
}

pub struct PerformanceMonitor {
    frame_times: VecDeque<Duration>,
    max_samples: usize,
    last_frame: Option<Instant>,
    last_update: Option<Instant>,
    update_interval: Duration,
    metrics: FrameMetrics,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        // ~2 seconds at 60fps, refreshed 10 times per second
        Self::with_config(120, Duration::from_millis(100))
    }

    pub fn with_config(max_samples: usize, update_interval: Duration) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            frame_times: VecDeque::with_capacity(max_samples),
            max_samples,
            last_frame: None,
            last_update: None,
            update_interval,
            metrics: FrameMetrics::default(),
        }
    }

    /// Marks a frame boundary
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Marks a frame boundary at `now`. The first call only starts the clock.
    pub fn tick_at(&mut self, now: Instant) {
        if let Some(previous) = self.last_frame.replace(now) {
            self.add_frame_time(now.saturating_duration_since(previous));
        }

        let due = match self.last_update {
            Some(last) => now.saturating_duration_since(last) >= self.update_interval,
            None => true,
        };
        if due && !self.frame_times.is_empty() {
            self.update_metrics();
            self.last_update = Some(now);
        }
    }

    fn add_frame_time(&mut self, frame_time: Duration) {
        if self.frame_times.len() >= self.max_samples {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(frame_time);
    }

    fn update_metrics(&mut self) {
        let total: Duration = self.frame_times.iter().sum();
        let average_ms = total.as_secs_f32() * 1000.0 / self.frame_times.len() as f32;

        self.metrics.frame_time_ms = average_ms;
        self.metrics.fps = if average_ms > 0.0 {
            1000.0 / average_ms
        } else {
            0.0
        };
        if let (Some(min), Some(max)) = (self.frame_times.iter().min(), self.frame_times.iter().max()) {
            self.metrics.min_frame_time_ms = min.as_secs_f32() * 1000.0;
            self.metrics.max_frame_time_ms = max.as_secs_f32() * 1000.0;
        }
    }

    pub fn metrics(&self) -> FrameMetrics {
        self.metrics
    }

    /// Recent frame times in milliseconds, oldest first
    pub fn frame_time_history(&self) -> Vec<f32> {
        self.frame_times
            .iter()
            .map(|d| d.as_secs_f32() * 1000.0)
            .collect()
    }

    pub fn reset(&mut self) {
        self.frame_times.clear();
        self.metrics = FrameMetrics::default();
        self.last_frame = None;
        self.last_update = None;
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_tick_only_starts_clock() {
        let mut monitor = PerformanceMonitor::with_config(8, Duration::ZERO);
        monitor.tick_at(Instant::now());
        assert!(monitor.frame_time_history().is_empty());
        assert_eq!(monitor.metrics(), FrameMetrics::default());
    }

    #[test]
    fn test_average_over_intervals() {
        let mut monitor = PerformanceMonitor::with_config(8, Duration::ZERO);
        let start = Instant::now();
        monitor.tick_at(start);
        monitor.tick_at(start + ms(10));
        monitor.tick_at(start + ms(40));

        let metrics = monitor.metrics();
        assert!((metrics.frame_time_ms - 20.0).abs() < 1e-3);
        assert!((metrics.fps - 50.0).abs() < 1e-2);
        assert!((metrics.min_frame_time_ms - 10.0).abs() < 1e-3);
        assert!((metrics.max_frame_time_ms - 30.0).abs() < 1e-3);
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let mut monitor = PerformanceMonitor::with_config(2, Duration::ZERO);
        let start = Instant::now();
        monitor.tick_at(start);
        monitor.tick_at(start + ms(100));
        monitor.tick_at(start + ms(110));
        monitor.tick_at(start + ms(120));

        let history = monitor.frame_time_history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|t| (t - 10.0).abs() < 1e-3));
    }

    #[test]
    fn test_metrics_refresh_on_interval() {
        let mut monitor = PerformanceMonitor::with_config(16, ms(100));
        let start = Instant::now();
        monitor.tick_at(start);
        monitor.tick_at(start + ms(10));
        let first = monitor.metrics().frame_time_ms;
        assert!((first - 10.0).abs() < 1e-3);

        // Within the interval the published numbers stay put
        monitor.tick_at(start + ms(60));
        assert_eq!(monitor.metrics().frame_time_ms, first);

        monitor.tick_at(start + ms(200));
        assert!(monitor.metrics().frame_time_ms > first);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut monitor = PerformanceMonitor::with_config(4, Duration::ZERO);
        let start = Instant::now();
        monitor.tick_at(start);
        monitor.tick_at(start + ms(16));
        monitor.reset();
        assert!(monitor.frame_time_history().is_empty());
        assert_eq!(monitor.metrics(), FrameMetrics::default());
    }
}
