//! Every tunable named in spec §6, collected into one struct so the CLI
//! can load overrides from JSON instead of each module hard-coding its own
//! constant (teacher pattern: `FusionConfig` in `sensor_fusion.rs`).

use serde::{Deserialize, Serialize};

use crate::error::SfeError;

/// A configured speed-threshold target for C5 (spec §4.5), e.g. 0→60 mph.
/// `from_m_s` is consulted (REDESIGN FLAG, adopted per spec §9): the
/// checkpoint only fires once the engine has observed `v_fused` below
/// `from_m_s` at some point during the run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SpeedTarget {
    pub id: u32,
    pub from_m_s: f64,
    pub to_m_s: f64,
}

/// A configured distance milestone for C5 (spec §4.5), e.g. ¼ mile.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DistanceTarget {
    pub id: u32,
    pub meters: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SfeConfig {
    // ── Motion gate (C2) ──
    pub motion_threshold: f64,
    pub noise_threshold: f64,

    // ── Uncertainty (C4) ──
    pub drift_rate: f64,
    pub sigma_min: f64,
    pub start_sigma_stationary: f64,

    // ── Gap / sanity (C4) ──
    pub dt_gap: f64,
    pub dt_cap: f64,
    pub v_max: f64,

    // ── GPS reliability (C3) ──
    pub gps_reliability_window: usize,
    pub gps_reliable_max_age_s: f64,
    pub gps_reliable_min_score: f64,

    // ── Zero anchors (C4) ──
    pub stationary_forced_zero_s: f64,
    pub consecutive_zero_gps: u32,
    pub tilt_reject_v: f64,

    // ── Distance reconciliation (C4) ──
    pub distance_reconciliation_interval_s: f64,
    pub distance_reconciliation_threshold: f64,
    pub distance_outlier_cap_m: f64,

    // ── Calibration (C1) ──
    pub calibration_window_s: f64,
    pub calibration_min_samples: usize,
    pub calibration_blend: f64,
    pub calibration_recent_samples: usize,

    // ── Moving-start detection (C3) ──
    pub moving_start_fixes: usize,
    pub moving_start_window_s: f64,
    pub moving_start_max_accuracy_m: f64,
    pub moving_start_speed_threshold: f64,

    // ── Event detection (C5) ──
    pub launch_window_s: f64,
    pub launch_recent_samples: usize,
    pub launch_recent_filtered_threshold: f64,
    pub launch_speed_threshold: f64,
    pub launch_sustained_window_s: f64,
    pub launch_sustained_min_samples: usize,
    pub launch_sustained_ratio: f64,
    pub launch_sustained_filtered_threshold: f64,
    pub speed_targets: Vec<SpeedTarget>,
    pub distance_targets: Vec<DistanceTarget>,
}

impl Default for SfeConfig {
    fn default() -> Self {
        Self {
            motion_threshold: 0.5,
            noise_threshold: 2.0,

            drift_rate: 0.5,
            sigma_min: 0.1,
            start_sigma_stationary: 10.0,

            dt_gap: 0.5,
            dt_cap: 0.1,
            v_max: 100.0,

            gps_reliability_window: 10,
            gps_reliable_max_age_s: 2.0,
            gps_reliable_min_score: 0.3,

            stationary_forced_zero_s: 3.0,
            consecutive_zero_gps: 3,
            tilt_reject_v: 0.89,

            distance_reconciliation_interval_s: 2.0,
            distance_reconciliation_threshold: 0.2,
            distance_outlier_cap_m: 100.0,

            calibration_window_s: 3.0,
            calibration_min_samples: 10,
            calibration_blend: 0.1,
            calibration_recent_samples: 20,

            moving_start_fixes: 3,
            moving_start_window_s: 2.0,
            moving_start_max_accuracy_m: 30.0,
            moving_start_speed_threshold: 2.0,

            launch_window_s: 2.0,
            launch_recent_samples: 10,
            launch_recent_filtered_threshold: 1.5,
            launch_speed_threshold: 2.0,
            launch_sustained_window_s: 0.5,
            launch_sustained_min_samples: 25,
            launch_sustained_ratio: 0.8,
            launch_sustained_filtered_threshold: 1.0,

            // 0-60 mph and 60-100 mph, in m/s (spec §4.5, §9 "fromSpeed").
            speed_targets: vec![
                SpeedTarget { id: 0, from_m_s: 0.0, to_m_s: 26.822 },
                SpeedTarget { id: 1, from_m_s: 26.822, to_m_s: 44.704 },
            ],
            // 1/8 mile, 1/4 mile, 1 km, 1 mile.
            distance_targets: vec![
                DistanceTarget { id: 0, meters: 201.168 },
                DistanceTarget { id: 1, meters: 402.336 },
                DistanceTarget { id: 2, meters: 1000.0 },
                DistanceTarget { id: 3, meters: 1609.344 },
            ],
        }
    }
}

impl SfeConfig {
    /// Rejects configs with nonsensical tunables (negative thresholds,
    /// zero windows) before the engine is built from them. The engine's
    /// own sensor-input handling never fails (spec §7); this is the one
    /// place a bad `SfeConfig` can be caught early.
    pub fn validate(&self) -> Result<(), SfeError> {
        let checks: &[(bool, &str)] = &[
            (self.motion_threshold > 0.0, "motion_threshold must be > 0"),
            (self.noise_threshold > 0.0, "noise_threshold must be > 0"),
            (self.drift_rate >= 0.0, "drift_rate must be >= 0"),
            (self.sigma_min > 0.0, "sigma_min must be > 0"),
            (self.dt_gap > 0.0, "dt_gap must be > 0"),
            (self.dt_cap > 0.0, "dt_cap must be > 0"),
            (self.v_max > 0.0, "v_max must be > 0"),
            (self.gps_reliability_window > 0, "gps_reliability_window must be > 0"),
            (self.gps_reliable_max_age_s > 0.0, "gps_reliable_max_age_s must be > 0"),
            (self.stationary_forced_zero_s > 0.0, "stationary_forced_zero_s must be > 0"),
            (self.consecutive_zero_gps > 0, "consecutive_zero_gps must be > 0"),
            (self.calibration_window_s > 0.0, "calibration_window_s must be > 0"),
            (self.calibration_min_samples > 0, "calibration_min_samples must be > 0"),
            (self.moving_start_fixes > 0, "moving_start_fixes must be > 0"),
            (self.launch_window_s > 0.0, "launch_window_s must be > 0"),
            (self.launch_recent_samples > 0, "launch_recent_samples must be > 0"),
            (self.launch_sustained_min_samples > 0, "launch_sustained_min_samples must be > 0"),
            (
                (0.0..=1.0).contains(&self.launch_sustained_ratio),
                "launch_sustained_ratio must be in [0, 1]",
            ),
        ];
        for (ok, msg) in checks {
            if !ok {
                return Err(SfeError::InvalidConfig(msg.to_string()));
            }
        }
        for t in &self.speed_targets {
            if t.to_m_s <= t.from_m_s {
                return Err(SfeError::InvalidConfig(format!(
                    "speed_targets[{}]: to_m_s must be > from_m_s",
                    t.id
                )));
            }
        }
        for t in &self.distance_targets {
            if t.meters <= 0.0 {
                return Err(SfeError::InvalidConfig(format!(
                    "distance_targets[{}]: meters must be > 0",
                    t.id
                )));
            }
        }
        Ok(())
    }
}
