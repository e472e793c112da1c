//! Adaptive probe timeout
//!
//! Keeps a small ring of recent response latencies and sizes the next probe
//! deadline from their outlier-trimmed mean.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Minimum number of samples before outliers are trimmed.
const OUTLIER_MIN_SAMPLES: usize = 4;

/// Samples farther than this many standard deviations are outliers.
const OUTLIER_SIGMAS: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct DeadlineSettings {
    pub base_timeout: Duration,
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    pub multiplier: f64,
    pub window: usize,
}

impl Default for DeadlineSettings {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_millis(6000),
            min_timeout: Duration::from_millis(4000),
            max_timeout: Duration::from_millis(12000),
            multiplier: 2.5,
            window: 10,
        }
    }
}

/// Owns the timeout for one session of checks. Shared by every probe in the
/// session; never persisted.
#[derive(Debug)]
pub struct DeadlineController {
    settings: DeadlineSettings,
    samples: Mutex<VecDeque<u64>>,
}

impl Default for DeadlineController {
    fn default() -> Self {
        Self::new(DeadlineSettings::default())
    }
}

impl DeadlineController {
    pub fn new(settings: DeadlineSettings) -> Self {
        let window = settings.window.max(1);
        Self {
            settings: DeadlineSettings { window, ..settings },
            samples: Mutex::new(VecDeque::with_capacity(window)),
        }
    }

    pub fn settings(&self) -> &DeadlineSettings {
        &self.settings
    }

    /// Record an observed latency, evicting the oldest sample when full.
    pub fn record_latency(&self, latency_ms: u64) {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.len() >= self.settings.window {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
        debug!("Recorded latency sample {}ms ({} held)", latency_ms, samples.len());
    }

    /// Clear all samples, e.g. when the network context changes.
    pub fn reset(&self) {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        debug!("Latency window reset");
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Mean of the held samples after outlier removal, `None` without samples.
    pub fn trimmed_mean(&self) -> Option<f64> {
        let samples: Vec<f64> = self
            .samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|&ms| ms as f64)
            .collect();

        trimmed_mean(&samples)
    }

    /// Timeout for the next probe.
    pub fn current_timeout(&self) -> Duration {
        let Some(mean) = self.trimmed_mean() else {
            return self.settings.base_timeout;
        };

        let scaled = mean * self.settings.multiplier;
        if !scaled.is_finite() || scaled < 0.0 {
            return self.settings.base_timeout;
        }

        let min = self.settings.min_timeout.as_millis() as f64;
        let max = self.settings.max_timeout.as_millis() as f64;
        Duration::from_millis(scaled.clamp(min, max).round() as u64)
    }
}

/// Arithmetic mean after dropping outliers.
///
/// A sample is an outlier when it lies more than two standard deviations from
/// the mean of the *other* samples. Trimming only starts at four samples.
///
/// When the other samples are all identical their deviation is zero, so any
/// sample that differs from them is dropped: in `[100, 100, 100, 101]` the
/// `101` goes. The mean moves by less than the dropped difference, so the
/// resulting timeout is unaffected in practice. A window where every sample
/// is equal keeps all of them.
pub fn trimmed_mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    if samples.len() < OUTLIER_MIN_SAMPLES {
        return finite(mean(samples));
    }

    let kept: Vec<f64> = samples
        .iter()
        .enumerate()
        .filter(|(index, value)| {
            let others: Vec<f64> = samples
                .iter()
                .enumerate()
                .filter(|(other, _)| other != index)
                .map(|(_, v)| *v)
                .collect();
            let center = mean(&others);
            let spread = std_dev(&others, center);
            (*value - center).abs() <= OUTLIER_SIGMAS * spread
        })
        .map(|(_, value)| *value)
        .collect();

    if kept.is_empty() {
        return finite(mean(samples));
    }

    finite(mean(&kept))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
