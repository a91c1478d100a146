//! Wire and in-memory data model shared by every SFE component (spec §3).

use serde::{Deserialize, Serialize};

/// Raw accelerometer sample as delivered by the host sensor API.
///
/// `linear` distinguishes hardware linear acceleration (gravity already
/// removed by the platform) from the raw including-gravity path, where
/// gravity is approximated by subtracting 9.81 from `az` — tilt-sensitive,
/// per spec §3.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AccelSample {
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub t_ms: f64,
    pub linear: bool,
}

impl AccelSample {
    pub fn new(ax: f64, ay: f64, az: f64, t_ms: f64, linear: bool) -> Self {
        Self { ax, ay, az, t_ms, linear }
    }

    /// Gravity-compensated vector, per the tagged-variant branch of spec §9.
    pub fn gravity_compensated(&self) -> (f64, f64, f64) {
        if self.linear {
            (self.ax, self.ay, self.az)
        } else {
            (self.ax, self.ay, self.az - 9.81)
        }
    }
}

/// GPS fix as delivered by the host location provider.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    /// Instantaneous ground speed in m/s. Negative values are discarded by
    /// the caller before construction (see `GpsFix::new`).
    pub speed_m_s: Option<f64>,
    pub accuracy_m: f64,
    pub t_ms: f64,
}

impl GpsFix {
    /// `accuracy_m` defaults to 20 when the caller passes `None`; a negative
    /// `speed_m_s` is treated as absent (position-only fix), per spec §3 and
    /// the error table in spec §7.
    pub fn new(lat: f64, lon: f64, speed_m_s: Option<f64>, accuracy_m: Option<f64>, t_ms: f64) -> Self {
        let speed_m_s = speed_m_s.filter(|s| *s >= 0.0);
        Self {
            lat,
            lon,
            speed_m_s,
            accuracy_m: accuracy_m.unwrap_or(20.0),
            t_ms,
        }
    }
}

/// Per-axis accelerometer bias, refined by the Calibration Module (C1).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Bias {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Bias {
    pub fn apply(&self, ax: f64, ay: f64, az: f64) -> (f64, f64, f64) {
        (ax - self.x, ay - self.y, az - self.z)
    }
}

/// The central fused estimate, owned exclusively by the Fusion Core (C4).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FusedState {
    pub v_fused: f64,
    pub v_accel: f64,
    pub sigma: f64,
    pub distance_accel: f64,
    pub distance_gps: f64,
    pub moving: bool,
    pub stationary_duration: f64,
}

impl FusedState {
    pub const V_MAX: f64 = 100.0;
    pub const SIGMA_MIN: f64 = 0.1;

    pub fn new() -> Self {
        Self {
            v_fused: 0.0,
            v_accel: 0.0,
            sigma: 10.0,
            distance_accel: 0.0,
            distance_gps: 0.0,
            moving: false,
            stationary_duration: 0.0,
        }
    }

    /// Enforces invariants 1 and 2 of spec §3. Called at the end of every
    /// tick and fix update so no intermediate step needs to repeat the
    /// clamp itself.
    pub fn clamp_invariants(&mut self) {
        if self.sigma < Self::SIGMA_MIN {
            self.sigma = Self::SIGMA_MIN;
        }
        if self.v_fused < 0.0 {
            self.v_fused = 0.0;
        }
    }
}

impl Default for FusedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot exposed to the display/persistence collaborators (spec §6
/// "Outputs"). `speed_m_s` is the display-smoothed `v_fused`, not the raw
/// value — see `fusion::FusionCore::display_speed`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub speed_m_s: f64,
    pub distance_m: f64,
    pub moving: bool,
    pub launched: bool,
    pub calibrated: bool,
    pub gps_reliable: bool,
    pub gps_reliability_score: f64,
    pub sigma: f64,
}

/// Asynchronous events emitted at most once each per run (spec §6 "Events").
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Event {
    LaunchDetected { t_since_run_start_s: f64 },
    SpeedCheckpoint { id: u32, t_since_event_basis_s: f64 },
    DistanceMilestone { id: u32, t_since_event_basis_s: f64, speed_at_crossing_m_s: f64 },
}
