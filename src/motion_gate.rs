//! C2 — Filter & Motion Gate (spec §4.2).
//!
//! Converts a bias-corrected accelerometer sample into a scalar magnitude,
//! rejects impulsive noise, trims and smooths the magnitude, and classifies
//! moving/stationary with the sticky anti-bounce rule. Consumed by C4 on
//! every tick.

use std::collections::VecDeque;

use nalgebra::Vector3;

use crate::config::SfeConfig;

const RING_CAPACITY: usize = 20;
const TRIM_WINDOW: usize = 10;
const TRIM_MIN: usize = 5;
const STATIONARY_STREAK_TARGET: u32 = 50;

pub struct MotionGate {
    ring: VecDeque<f64>,
    last_accepted: f64,
    moving: bool,
    stationary_streak: u32,
    motion_threshold: f64,
    noise_threshold: f64,
}

impl MotionGate {
    pub fn new(config: &SfeConfig) -> Self {
        Self {
            ring: VecDeque::with_capacity(RING_CAPACITY),
            last_accepted: 0.0,
            moving: false,
            stationary_streak: 0,
            motion_threshold: config.motion_threshold,
            noise_threshold: config.noise_threshold,
        }
    }

    pub fn moving(&self) -> bool {
        self.moving
    }

    /// Push a bias-corrected sample's magnitude through the gate, returning
    /// the filtered magnitude for this tick. Updates the sticky motion
    /// classification in place.
    pub fn process(&mut self, ax: f64, ay: f64, az: f64) -> f64 {
        let m = Vector3::new(ax, ay, az).norm();

        let accepted = if m > 5.0 * self.noise_threshold {
            self.last_accepted
        } else {
            m
        };
        self.last_accepted = accepted;

        self.ring.push_back(accepted);
        while self.ring.len() > RING_CAPACITY {
            self.ring.pop_front();
        }

        let filtered = self.trimmed_mean();
        self.update_motion_state(filtered);
        filtered
    }

    fn trimmed_mean(&self) -> f64 {
        let n = self.ring.len();
        if n < TRIM_MIN {
            return *self.ring.back().unwrap_or(&0.0);
        }
        let take = TRIM_WINDOW.min(n);
        let mut recent: Vec<f64> = self.ring.iter().rev().take(take).copied().collect();
        recent.sort_by(|a, b| a.partial_cmp(b).unwrap());

        // 5%-trimmed mean: drop the top and bottom 5% (rounded down), which
        // for window sizes under 20 means "drop nothing" unless the window
        // is large enough that 5% rounds to at least one element.
        let trim = ((recent.len() as f64) * 0.05).floor() as usize;
        let slice = &recent[trim..recent.len() - trim];
        slice.iter().sum::<f64>() / slice.len() as f64
    }

    fn update_motion_state(&mut self, filtered: f64) {
        let tau = self.motion_threshold;
        if !self.moving {
            if filtered > 2.0 * tau {
                self.moving = true;
                self.stationary_streak = 0;
            }
        } else {
            if filtered < 0.5 * tau {
                self.stationary_streak += 1;
            } else {
                self.stationary_streak = 0;
            }
            if filtered < 0.3 * tau && self.stationary_streak >= STATIONARY_STREAK_TARGET {
                self.moving = false;
                self.stationary_streak = 0;
            }
        }
    }
}
