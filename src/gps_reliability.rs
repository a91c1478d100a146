//! C3 — GPS Reliability Estimator (spec §4.3).
//!
//! Scores each incoming GPS fix against a sliding window of recent fixes
//! and, before the run is marked started, buffers fixes to decide whether
//! the user was already moving when tracking began.

use std::collections::VecDeque;

use crate::config::SfeConfig;
use crate::types::GpsFix;

struct WindowEntry {
    speed: Option<f64>,
    accuracy_m: f64,
    t_ms: f64,
}

pub struct GpsReliability {
    window: VecDeque<WindowEntry>,
    window_cap: usize,
    last_fix_t_ms: Option<f64>,
    score: f64,
    consecutive_zero: u32,
}

impl GpsReliability {
    pub fn new(config: &SfeConfig) -> Self {
        Self {
            window: VecDeque::new(),
            window_cap: config.gps_reliability_window,
            last_fix_t_ms: None,
            score: 0.3,
            consecutive_zero: 0,
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    /// Count of consecutive fixes with `speed_m_s < 0.3`, used by the Fusion
    /// Core's soft zero anchor (spec §4.4 step 7). A position-only fix
    /// (`speed_m_s == None`) leaves the streak unchanged.
    pub fn consecutive_near_zero(&self) -> u32 {
        self.consecutive_zero
    }

    pub fn last_fix_age_s(&self, now_ms: f64) -> Option<f64> {
        self.last_fix_t_ms.map(|t| (now_ms - t) / 1000.0)
    }

    /// `reliable` per spec §4.3: has a fix, newest fix younger than the
    /// configured max age, and `score > gps_reliable_min_score`.
    pub fn is_reliable(&self, now_ms: f64, config: &SfeConfig) -> bool {
        match self.last_fix_age_s(now_ms) {
            Some(age) => age < config.gps_reliable_max_age_s && self.score > config.gps_reliable_min_score,
            None => false,
        }
    }

    /// Updates the sliding window and recomputes `score`. Returns the new
    /// score.
    pub fn on_fix(&mut self, fix: &GpsFix) -> f64 {
        let dt = self.last_fix_t_ms.map(|t| (fix.t_ms - t) / 1000.0);

        if let Some(v) = fix.speed_m_s {
            if v < 0.3 {
                self.consecutive_zero += 1;
            } else {
                self.consecutive_zero = 0;
            }
        }

        self.window.push_back(WindowEntry {
            speed: fix.speed_m_s,
            accuracy_m: fix.accuracy_m,
            t_ms: fix.t_ms,
        });
        while self.window.len() > self.window_cap {
            self.window.pop_front();
        }
        self.last_fix_t_ms = Some(fix.t_ms);

        if self.window.len() < 2 {
            self.score = 0.3;
            return self.score;
        }

        let mut r = 1.0_f64;

        let mean_accuracy: f64 =
            self.window.iter().map(|e| e.accuracy_m).sum::<f64>() / self.window.len() as f64;
        if mean_accuracy > 50.0 {
            r *= 0.3;
        } else if mean_accuracy > 20.0 {
            r *= 0.7;
        } else if mean_accuracy > 10.0 {
            r *= 0.9;
        }

        if self.window.len() >= 3 {
            let speeds: Vec<f64> = self.window.iter().filter_map(|e| e.speed).collect();
            if speeds.len() >= 2 {
                let max_jump = speeds
                    .windows(2)
                    .map(|w| (w[1] - w[0]).abs())
                    .fold(0.0_f64, f64::max);
                if max_jump > 5.0 {
                    r *= 0.5;
                } else if max_jump > 3.0 {
                    r *= 0.7;
                }
            }
        }

        if let Some(dt) = dt {
            if dt > 3.0 {
                r *= 0.5;
            } else if dt > 2.0 {
                r *= 0.7;
            }
        }

        self.score = r.clamp(0.1, 1.0);
        self.score
    }
}

/// Runs once at the start of a run to decide between a stationary start
/// (normal C1 calibration) and a moving start (spec §4.3), which seeds
/// `v_fused`/`v_accel`/`sigma` directly from the early GPS fixes and skips
/// calibration entirely.
pub struct MovingStartDetector {
    fixes: Vec<GpsFix>,
    first_fix_t_ms: Option<f64>,
    fixes_needed: usize,
    window_s: f64,
    max_accuracy_m: f64,
    speed_threshold: f64,
}

pub enum StartDecision {
    Pending,
    Stationary,
    Moving { mean_speed_m_s: f64, mean_accuracy_m: f64 },
}

impl MovingStartDetector {
    pub fn new(config: &SfeConfig) -> Self {
        Self {
            fixes: Vec::new(),
            first_fix_t_ms: None,
            fixes_needed: config.moving_start_fixes,
            window_s: config.moving_start_window_s,
            max_accuracy_m: config.moving_start_max_accuracy_m,
            speed_threshold: config.moving_start_speed_threshold,
        }
    }

    pub fn on_fix(&mut self, fix: GpsFix) -> StartDecision {
        self.first_fix_t_ms.get_or_insert(fix.t_ms);
        self.fixes.push(fix);
        self.evaluate()
    }

    fn evaluate(&self) -> StartDecision {
        let elapsed_s = self
            .first_fix_t_ms
            .map(|t0| (self.fixes.last().unwrap().t_ms - t0) / 1000.0)
            .unwrap_or(0.0);

        if self.fixes.len() < self.fixes_needed && elapsed_s < self.window_s {
            return StartDecision::Pending;
        }

        let accurate: Vec<&GpsFix> = self
            .fixes
            .iter()
            .filter(|f| f.accuracy_m < self.max_accuracy_m)
            .collect();
        if accurate.is_empty() {
            return StartDecision::Stationary;
        }

        let speeds: Vec<f64> = accurate.iter().filter_map(|f| f.speed_m_s).collect();
        if speeds.is_empty() {
            return StartDecision::Stationary;
        }
        let mean_speed = speeds.iter().sum::<f64>() / speeds.len() as f64;
        if mean_speed > self.speed_threshold {
            let mean_accuracy =
                accurate.iter().map(|f| f.accuracy_m).sum::<f64>() / accurate.len() as f64;
            StartDecision::Moving { mean_speed_m_s: mean_speed, mean_accuracy_m: mean_accuracy }
        } else {
            StartDecision::Stationary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_two_fixes_forces_low_score() {
        let cfg = SfeConfig::default();
        let mut r = GpsReliability::new(&cfg);
        let score = r.on_fix(&GpsFix::new(0.0, 0.0, Some(10.0), Some(5.0), 0.0));
        assert_eq!(score, 0.3);
    }

    #[test]
    fn poor_accuracy_degrades_score() {
        let cfg = SfeConfig::default();
        let mut r = GpsReliability::new(&cfg);
        r.on_fix(&GpsFix::new(0.0, 0.0, Some(10.0), Some(60.0), 0.0));
        let score = r.on_fix(&GpsFix::new(0.0, 0.0, Some(10.0), Some(60.0), 500.0));
        assert!((score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn staleness_degrades_score() {
        let cfg = SfeConfig::default();
        let mut r = GpsReliability::new(&cfg);
        r.on_fix(&GpsFix::new(0.0, 0.0, Some(10.0), Some(5.0), 0.0));
        r.on_fix(&GpsFix::new(0.0, 0.0, Some(10.0), Some(5.0), 500.0));
        let score = r.on_fix(&GpsFix::new(0.0, 0.0, Some(10.0), Some(5.0), 4500.0));
        assert!(score <= 0.5 + 1e-9);
    }

    #[test]
    fn moving_start_detected_from_three_accurate_fast_fixes() {
        let cfg = SfeConfig::default();
        let mut d = MovingStartDetector::new(&cfg);
        assert!(matches!(d.on_fix(GpsFix::new(0.0, 0.0, Some(15.0), Some(8.0), 0.0)), StartDecision::Pending));
        assert!(matches!(d.on_fix(GpsFix::new(0.0, 0.0, Some(15.0), Some(8.0), 500.0)), StartDecision::Pending));
        match d.on_fix(GpsFix::new(0.0, 0.0, Some(15.0), Some(8.0), 1000.0)) {
            StartDecision::Moving { mean_speed_m_s, .. } => {
                assert!((mean_speed_m_s - 15.0).abs() < 1e-9);
            }
            _ => panic!("expected moving start"),
        }
    }

    #[test]
    fn consecutive_near_zero_streak_resets_on_motion() {
        let cfg = SfeConfig::default();
        let mut r = GpsReliability::new(&cfg);
        r.on_fix(&GpsFix::new(0.0, 0.0, Some(0.1), Some(5.0), 0.0));
        r.on_fix(&GpsFix::new(0.0, 0.0, Some(0.1), Some(5.0), 500.0));
        assert_eq!(r.consecutive_near_zero(), 2);
        r.on_fix(&GpsFix::new(0.0, 0.0, Some(5.0), Some(5.0), 1000.0));
        assert_eq!(r.consecutive_near_zero(), 0);
    }

    #[test]
    fn stationary_start_when_fixes_are_slow() {
        let cfg = SfeConfig::default();
        let mut d = MovingStartDetector::new(&cfg);
        d.on_fix(GpsFix::new(0.0, 0.0, Some(0.1), Some(5.0), 0.0));
        d.on_fix(GpsFix::new(0.0, 0.0, Some(0.1), Some(5.0), 500.0));
        let decision = d.on_fix(GpsFix::new(0.0, 0.0, Some(0.1), Some(5.0), 1000.0));
        assert!(matches!(decision, StartDecision::Stationary));
    }
}
