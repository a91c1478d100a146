//! C4 — Fusion Core (spec §4.4).
//!
//! Owns `FusedState` exclusively. Two entry points drive it: an
//! accelerometer tick (dead reckoning, gap detection, zero anchors,
//! distance reconciliation, display smoothing) and a GPS fix (a scalar
//! Kalman-style correction). Everything here is plain arithmetic over
//! `FusedState`; the motion classification and GPS reliability score are
//! computed upstream by C2/C3 and handed in as arguments.

use std::collections::VecDeque;

use crate::config::SfeConfig;
use crate::types::{FusedState, GpsFix};

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const DISPLAY_RING_CAPACITY: usize = 5;
const DISPLAY_RING_MIN: usize = 3;

/// What the Fusion Core did on this accelerometer tick, so the engine can
/// drive C1's stationary-residual feed without the Fusion Core needing to
/// know about `Calibrator` or `Bias`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AccelTickOutcome {
    /// `dt` exceeded `dt_gap`; this tick was discarded, no integration ran.
    pub gap: bool,
    /// The hard zero-anchor (step 4) fired on this tick.
    pub hard_zero: bool,
}

pub struct FusionCore {
    config: SfeConfig,
    state: FusedState,
    last_tick_t_ms: Option<f64>,
    last_gps_fusion_t_ms: Option<f64>,
    last_gps_fix: Option<GpsFix>,
    display_ring: VecDeque<f64>,
    reconciliation_elapsed_s: f64,
}

impl FusionCore {
    pub fn new(config: &SfeConfig) -> Self {
        Self {
            config: config.clone(),
            state: FusedState::new(),
            last_tick_t_ms: None,
            last_gps_fusion_t_ms: None,
            last_gps_fix: None,
            display_ring: VecDeque::with_capacity(DISPLAY_RING_CAPACITY),
            reconciliation_elapsed_s: 0.0,
        }
    }

    pub fn state(&self) -> &FusedState {
        &self.state
    }

    /// The display-smoothed speed (spec §4.4 step 9): median of the last
    /// up-to-5 fused speeds once at least 3 are buffered, else the raw
    /// `v_fused`.
    pub fn display_speed(&self) -> f64 {
        if self.display_ring.len() < DISPLAY_RING_MIN {
            return self.state.v_fused;
        }
        let mut sorted: Vec<f64> = self.display_ring.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let n = sorted.len();
        if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        }
    }

    pub fn reset(&mut self) {
        self.state = FusedState::new();
        self.last_tick_t_ms = None;
        self.last_gps_fusion_t_ms = None;
        self.last_gps_fix = None;
        self.display_ring.clear();
        self.reconciliation_elapsed_s = 0.0;
    }

    /// Seeds the state for a moving start (spec §4.3): no dead-reckoning
    /// history to re-anchor from, so `v_fused`/`v_accel` start at the GPS
    /// mean speed and `σ` starts proportional to fix accuracy.
    pub fn seed_moving_start(&mut self, mean_speed_m_s: f64, sigma: f64) {
        self.state.v_fused = mean_speed_m_s;
        self.state.v_accel = mean_speed_m_s;
        self.state.sigma = sigma;
        self.state.clamp_invariants();
    }

    fn last_v_gps(&self) -> Option<f64> {
        self.last_gps_fix.and_then(|f| f.speed_m_s)
    }

    fn force_zero(&mut self) {
        self.state.v_fused = 0.0;
        self.state.v_accel = 0.0;
    }

    /// Drives steps 1–12 of spec §4.4 on one accelerometer sample, given
    /// the filtered magnitude and motion classification already computed by
    /// C2, and the GPS reliability verdict already computed by C3.
    pub fn on_accel_tick(
        &mut self,
        filtered: f64,
        moving: bool,
        t_ms: f64,
        gps_reliable: bool,
        gps_r: f64,
        consecutive_near_zero_gps: u32,
    ) -> AccelTickOutcome {
        let dt_raw = self.last_tick_t_ms.map(|last| (t_ms - last) / 1000.0).unwrap_or(0.0);
        self.last_tick_t_ms = Some(t_ms);

        // Step 1: gap detection.
        if dt_raw > self.config.dt_gap {
            let v_gps = if gps_reliable { self.last_v_gps().unwrap_or(0.0) } else { 0.0 };
            self.state.v_accel = v_gps;
            self.state.v_fused = v_gps;
            self.display_ring.clear();
            self.state.sigma = 5.0;
            self.state.clamp_invariants();
            return AccelTickOutcome { gap: true, hard_zero: false };
        }

        // Step 2: clamp dt for numerical stability.
        let dt = dt_raw.min(self.config.dt_cap).max(0.0);

        // Step 3: stationary accounting.
        if !moving && filtered < self.config.motion_threshold {
            self.state.stationary_duration += dt;
        } else {
            self.state.stationary_duration = 0.0;
        }

        // Step 4: forced zero (hard anchor).
        let gps_confirms_stopped = !gps_reliable || self.last_v_gps().map_or(true, |v| v < 0.5);
        if self.state.stationary_duration > self.config.stationary_forced_zero_s && gps_confirms_stopped {
            self.state.v_fused = 0.0;
            self.state.v_accel = 0.0;
            self.state.sigma = 0.5;
            return AccelTickOutcome { gap: false, hard_zero: true };
        }

        // Step 5: accelerometer integration.
        if moving && filtered > self.config.motion_threshold {
            self.state.v_accel += filtered * dt;
            self.state.sigma += self.config.drift_rate * dt;
        }

        // Step 6: primary estimate.
        let v_gps = self.last_v_gps();
        if gps_reliable {
            let v_gps = v_gps.unwrap_or(0.0);
            let w_gps = (0.5 + 0.3 * gps_r).min(0.8);
            self.state.v_fused = w_gps * v_gps + (1.0 - w_gps) * self.state.v_accel;
            if (self.state.v_accel - v_gps).abs() > 2.0 {
                self.state.v_accel = 0.7 * self.state.v_accel + 0.3 * v_gps;
            }
        } else {
            self.state.v_fused = self.state.v_accel;
            if !moving || filtered < 0.5 * self.config.motion_threshold {
                // 0.98 is a per-second decay factor; compound it over `dt` so the
                // decay rate stays the same regardless of the accelerometer's
                // sampling rate.
                self.state.v_fused *= 0.98_f64.powf(dt);
                self.state.v_accel = self.state.v_fused;
            }
        }

        // Step 7: soft zero anchors.
        if gps_reliable
            && v_gps.map_or(false, |v| v < 0.3)
            && consecutive_near_zero_gps >= self.config.consecutive_zero_gps
        {
            self.force_zero();
        }
        if !moving && self.state.v_fused < 2.0 {
            let gps_says_stopped = gps_reliable && v_gps.map_or(false, |v| v < 1.0);
            if gps_says_stopped || self.state.v_fused < self.config.tilt_reject_v {
                self.force_zero();
            }
        }

        // Step 8: distance reconciliation, every `distance_reconciliation_interval_s`.
        self.reconciliation_elapsed_s += dt;
        if self.reconciliation_elapsed_s >= self.config.distance_reconciliation_interval_s {
            self.reconciliation_elapsed_s = 0.0;
            if self.state.distance_accel > 5.0 && self.state.distance_gps > 0.0 {
                let relative_error =
                    (self.state.distance_accel - self.state.distance_gps).abs() / self.state.distance_accel;
                if relative_error > self.config.distance_reconciliation_threshold && gps_reliable {
                    let factor = self.state.distance_gps / self.state.distance_accel;
                    self.state.distance_accel = self.state.distance_gps;
                    if !(0.8..=1.2).contains(&factor) {
                        let snapped = v_gps.unwrap_or(0.0);
                        self.state.v_fused = snapped;
                        self.state.v_accel = snapped;
                    }
                }
            }
        }

        // Step 9: display smoothing (read-side only).
        self.display_ring.push_back(self.state.v_fused);
        while self.display_ring.len() > DISPLAY_RING_CAPACITY {
            self.display_ring.pop_front();
        }

        // Step 10: sanity cap.
        if self.state.v_fused.abs() > self.config.v_max {
            self.state.v_fused = if gps_reliable { v_gps.unwrap_or(0.0) } else { 0.0 };
        }

        // Step 11: distance integration.
        if self.state.v_fused > 0.5 {
            self.state.distance_accel += self.state.v_fused * dt;
        }

        self.state.clamp_invariants();
        AccelTickOutcome { gap: false, hard_zero: false }
    }

    /// Drives the scalar Kalman-style update of spec §4.4 "Update on GPS
    /// fix", plus `distance_gps` accumulation via Haversine.
    pub fn on_gps_fix(&mut self, fix: &GpsFix, reliability: f64, consecutive_near_zero_gps: u32) {
        if let Some(prev) = self.last_gps_fix {
            let delta = haversine_m(prev.lat, prev.lon, fix.lat, fix.lon);
            if delta < self.config.distance_outlier_cap_m {
                self.state.distance_gps += delta;
            }
        }

        if let Some(v_gps) = fix.speed_m_s {
            let sigma_gps = (fix.accuracy_m * 0.05).max(0.5) / reliability;
            let dt_since_fusion = self
                .last_gps_fusion_t_ms
                .map(|last| (fix.t_ms - last) / 1000.0)
                .unwrap_or(0.0)
                .max(0.0);
            self.state.sigma += self.config.drift_rate * dt_since_fusion;

            let k = self.state.sigma / (self.state.sigma + sigma_gps).max(0.1);
            self.state.v_fused += k * (v_gps - self.state.v_fused);
            self.state.sigma = (1.0 - k) * self.state.sigma;

            // Re-anchor the dead-reckoning integrator to the corrected estimate.
            self.state.v_accel = self.state.v_fused;

            self.last_gps_fusion_t_ms = Some(fix.t_ms);

            if v_gps < 0.3 && consecutive_near_zero_gps >= self.config.consecutive_zero_gps {
                self.state.v_fused = 0.0;
                self.state.v_accel = 0.0;
                self.state.sigma = 0.5;
            }
        }

        self.state.clamp_invariants();
        self.last_gps_fix = Some(*fix);
    }
}

fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}
