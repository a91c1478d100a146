//! C1 — Calibration Module (spec §4.1).
//!
//! Owns nothing but the bias estimate's lifecycle: the initial
//! stationary-window collection, the per-axis median that seeds it, and
//! the slow operating-time nudge toward the observed residual during
//! confirmed stationary intervals. The Fusion Core (C4) decides *when*
//! a stationary interval is confirmed; this module only reacts to that
//! decision.

use std::collections::VecDeque;

use crate::config::SfeConfig;
use crate::types::Bias;

pub struct Calibrator {
    window_start_t_ms: Option<f64>,
    window_samples: Vec<(f64, f64, f64)>,
    calibrated: bool,
    recent_residuals: VecDeque<(f64, f64, f64)>,
    window_s: f64,
    min_samples: usize,
    blend: f64,
    recent_cap: usize,
}

impl Calibrator {
    pub fn new(config: &SfeConfig) -> Self {
        Self {
            window_start_t_ms: None,
            window_samples: Vec::new(),
            calibrated: false,
            recent_residuals: VecDeque::new(),
            window_s: config.calibration_window_s,
            min_samples: config.calibration_min_samples,
            blend: config.calibration_blend,
            recent_cap: config.calibration_recent_samples,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Marks calibration complete without collecting samples — used by the
    /// moving-start path (spec §4.3), which skips C1 entirely.
    pub fn mark_calibrated(&mut self) {
        self.calibrated = true;
    }

    /// Feed one gravity-compensated sample into the initial calibration
    /// window. Returns `Some(bias)` the instant the window closes (at least
    /// `calibration_window_s` elapsed since the first sample), whether or
    /// not enough samples arrived — per spec §4.1, too few samples still
    /// marks the engine calibrated, just without moving `Bias`.
    pub fn feed_initial(&mut self, ax: f64, ay: f64, az: f64, t_ms: f64, prior: Bias) -> Option<Bias> {
        if self.calibrated {
            return None;
        }
        let start = *self.window_start_t_ms.get_or_insert(t_ms);
        self.window_samples.push((ax, ay, az));

        if (t_ms - start) / 1000.0 < self.window_s {
            return None;
        }

        self.calibrated = true;
        if self.window_samples.len() >= self.min_samples {
            Some(Bias {
                x: median(self.window_samples.iter().map(|s| s.0)),
                y: median(self.window_samples.iter().map(|s| s.1)),
                z: median(self.window_samples.iter().map(|s| s.2)),
            })
        } else {
            Some(prior)
        }
    }

    /// Accumulate a residual (gravity-compensated sample minus current bias)
    /// observed during a confirmed stationary interval, for the slow
    /// operating-time re-calibration nudge of spec §4.1.
    pub fn observe_stationary_residual(&mut self, residual: (f64, f64, f64)) {
        self.recent_residuals.push_back(residual);
        while self.recent_residuals.len() > self.recent_cap {
            self.recent_residuals.pop_front();
        }
    }

    /// Nudges `bias` toward the mean of the last ≤20 stationary residuals.
    /// Called by the Fusion Core whenever the hard zero-anchor conditions
    /// hold (spec §4.4 step 4).
    pub fn recalibrate(&self, bias: &mut Bias) {
        if self.recent_residuals.is_empty() {
            return;
        }
        let n = self.recent_residuals.len() as f64;
        let (sx, sy, sz) = self.recent_residuals.iter().fold((0.0, 0.0, 0.0), |acc, r| {
            (acc.0 + r.0, acc.1 + r.1, acc.2 + r.2)
        });
        bias.x += self.blend * (sx / n);
        bias.y += self.blend * (sy / n);
        bias.z += self.blend * (sz / n);
    }
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = v.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        v[n / 2]
    } else {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_is_per_axis() {
        assert_eq!(median([1.0, 3.0, 2.0].into_iter()), 2.0);
        assert_eq!(median([1.0, 2.0, 3.0, 4.0].into_iter()), 2.5);
    }

    #[test]
    fn initial_calibration_sets_bias_from_median_after_window() {
        let cfg = SfeConfig::default();
        let mut cal = Calibrator::new(&cfg);
        let mut result = None;
        for i in 0..15 {
            let t = i as f64 * 200.0; // 200ms apart, window is 3s
            result = cal.feed_initial(0.1, -0.1, 9.9, t, Bias::default());
        }
        assert!(cal.is_calibrated());
        let bias = result.expect("window should have closed");
        assert!((bias.x - 0.1).abs() < 1e-9);
        assert!((bias.z - 9.9).abs() < 1e-9);
    }

    #[test]
    fn too_few_samples_keeps_prior_bias_but_still_calibrates() {
        let cfg = SfeConfig::default();
        let mut cal = Calibrator::new(&cfg);
        let prior = Bias { x: 1.0, y: 2.0, z: 3.0 };
        // Only two samples spanning the whole window.
        cal.feed_initial(9.0, 9.0, 9.0, 0.0, prior);
        let result = cal.feed_initial(9.0, 9.0, 9.0, 3100.0, prior);
        assert!(cal.is_calibrated());
        let bias = result.expect("window should have closed");
        assert_eq!(bias.x, prior.x);
    }

    #[test]
    fn recalibrate_nudges_by_blend_times_mean_residual() {
        let cfg = SfeConfig::default();
        let mut cal = Calibrator::new(&cfg);
        for _ in 0..5 {
            cal.observe_stationary_residual((1.0, 0.0, 0.0));
        }
        let mut bias = Bias::default();
        cal.recalibrate(&mut bias);
        assert!((bias.x - 0.1).abs() < 1e-9); // blend 0.1 * mean residual 1.0
    }
}
