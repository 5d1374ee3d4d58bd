use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default sliding window for transfer rate calculation.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default number of retained rate samples.
const DEFAULT_MAX_SAMPLES: usize = 100;

/// Byte accounting for a single file being written.
///
/// The declared size is only an estimate supplied by the file source, so
/// the reported percentage is clamped to 100 and never drives flow control.
pub struct FileProgress {
    declared_size: u64,
    transferred: u64,
    last_percent: Option<u8>,
    speed: SpeedCalculator,
}

impl FileProgress {
    pub fn new(declared_size: u64) -> Self {
        Self {
            declared_size,
            transferred: 0,
            last_percent: None,
            speed: SpeedCalculator::new(None, None),
        }
    }

    /// Records `bytes` more written.
    ///
    /// Returns the new whole percentage when it differs from the last one
    /// reported, `None` otherwise.
    pub fn record(&mut self, bytes: u64) -> Option<u8> {
        self.transferred += bytes;
        self.speed.add_sample(bytes);

        let percent = self.percent();
        if self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(percent)
    }

    /// Total bytes written so far.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Declared size this progress is measured against.
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    /// Whole percentage written, rounded and bounded to 100.
    ///
    /// A zero declared size reads as complete.
    pub fn percent(&self) -> u8 {
        if self.declared_size == 0 {
            return 100;
        }
        let ratio = self.transferred as f64 / self.declared_size as f64;
        (ratio * 100.0).round().min(100.0) as u8
    }

    /// Current transfer rate in bytes/second.
    pub fn bytes_per_second(&self) -> f64 {
        self.speed.bytes_per_second()
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

/// Transfer rate over a sliding window of samples.
pub struct SpeedCalculator {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    max_samples: usize,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window`: time window for the rate (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            window: window.unwrap_or(DEFAULT_WINDOW),
            max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(2),
        }
    }

    /// Records `bytes` transferred at the current instant.
    pub fn add_sample(&mut self, bytes: u64) {
        self.add_sample_at(Instant::now(), bytes);
    }

    fn add_sample_at(&mut self, at: Instant, bytes: u64) {
        self.samples.push_back((at, bytes));

        while let Some(&(oldest, _)) = self.samples.front() {
            if at.duration_since(oldest) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Average rate in bytes/second within the window.
    ///
    /// Returns 0.0 until two samples with distinct timestamps exist.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(&(first, _)), Some(&(last, _))) = (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        let elapsed = last.duration_since(first);
        if self.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }

        let total: u64 = self.samples.iter().map(|&(_, bytes)| bytes).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to move `remaining_bytes` at the current rate.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    /// Clears all recorded samples.
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_to_whole_numbers() {
        let mut progress = FileProgress::new(3);
        assert_eq!(progress.record(1), Some(33));
        assert_eq!(progress.record(1), Some(67));
        assert_eq!(progress.record(1), Some(100));
        assert_eq!(progress.transferred(), 3);
    }

    #[test]
    fn percent_is_bounded_when_size_is_underdeclared() {
        let mut progress = FileProgress::new(10);
        progress.record(25);
        assert_eq!(progress.percent(), 100);
        assert_eq!(progress.transferred(), 25);
    }

    #[test]
    fn zero_declared_size_reads_complete() {
        let mut progress = FileProgress::new(0);
        assert_eq!(progress.percent(), 100);
        assert_eq!(progress.record(5), Some(100));
    }

    #[test]
    fn record_only_reports_changes() {
        let mut progress = FileProgress::new(1000);
        assert_eq!(progress.record(1), Some(0));
        assert_eq!(progress.record(1), None);
        assert_eq!(progress.record(498), Some(50));
    }

    #[test]
    fn speed_needs_two_samples() {
        let mut calc = SpeedCalculator::new(None, None);
        assert_eq!(calc.bytes_per_second(), 0.0);
        calc.add_sample(100);
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert!(calc.eta(1000).is_none());
    }

    #[test]
    fn speed_over_known_interval() {
        let mut calc = SpeedCalculator::new(Some(Duration::from_secs(10)), None);
        let start = Instant::now();
        calc.add_sample_at(start, 500);
        calc.add_sample_at(start + Duration::from_secs(1), 500);

        assert_eq!(calc.bytes_per_second(), 1000.0);
        assert_eq!(calc.eta(2000), Some(Duration::from_secs(2)));
    }

    #[test]
    fn speed_drops_samples_outside_window() {
        let mut calc = SpeedCalculator::new(Some(Duration::from_secs(1)), None);
        let start = Instant::now();
        calc.add_sample_at(start, 1_000_000);
        calc.add_sample_at(start + Duration::from_secs(5), 10);
        calc.add_sample_at(start + Duration::from_secs(6), 10);

        assert_eq!(calc.samples.len(), 2);
        assert_eq!(calc.bytes_per_second(), 20.0);
    }

    #[test]
    fn speed_caps_sample_count() {
        let mut calc = SpeedCalculator::new(Some(Duration::from_secs(60)), Some(5));
        for i in 0..20 {
            calc.add_sample(i * 10);
        }
        assert!(calc.samples.len() <= 5);
    }

    #[test]
    fn speed_reset() {
        let mut calc = SpeedCalculator::new(None, None);
        calc.add_sample(100);
        calc.add_sample(200);
        calc.reset();
        assert_eq!(calc.bytes_per_second(), 0.0);
    }
}
