//! `SensorFusionEngine` — the public facade composing C1–C5 (spec §6).
//!
//! Owns every substructure exclusively, per spec §5 "Shared resource
//! policy": no other module ever mutates `Bias`, `FusedState`, the motion
//! gate, or the GPS history. Display/persistence collaborators only ever
//! see `EngineSnapshot` and the `Event`s returned from `push_accel`/
//! `push_gps`.

use log::{debug, info, warn};

use crate::calibration::Calibrator;
use crate::config::SfeConfig;
use crate::events::EventDetector;
use crate::fusion::FusionCore;
use crate::gps_reliability::{GpsReliability, MovingStartDetector, StartDecision};
use crate::motion_gate::MotionGate;
use crate::types::{Bias, EngineSnapshot, Event, GpsFix};

struct BufferedAccel {
    ax: f64,
    ay: f64,
    az: f64,
    t_ms: f64,
    linear: bool,
}

/// Startup is a brief window, bounded by `MovingStartDetector`, during
/// which the engine withholds accelerometer ticks from the Fusion Core
/// while it waits to learn whether the user was already moving (spec
/// §4.3). Once resolved, every buffered sample is replayed through the
/// normal tick path and the engine never re-enters this state until the
/// next `start_run`.
enum Startup {
    AwaitingDecision { detector: MovingStartDetector, buffered: Vec<BufferedAccel>, first_accel_t_ms: Option<f64> },
    Complete,
}

pub struct SensorFusionEngine {
    config: SfeConfig,
    bias: Bias,
    calibrator: Calibrator,
    motion_gate: MotionGate,
    gps_reliability: GpsReliability,
    fusion: FusionCore,
    events: EventDetector,
    startup: Startup,
    running: bool,
    run_start_t_ms: f64,
    last_t_ms: f64,
}

impl SensorFusionEngine {
    pub fn new(config: SfeConfig) -> Self {
        let calibrator = Calibrator::new(&config);
        let motion_gate = MotionGate::new(&config);
        let gps_reliability = GpsReliability::new(&config);
        let fusion = FusionCore::new(&config);
        let events = EventDetector::new(&config);
        Self {
            bias: Bias::default(),
            calibrator,
            motion_gate,
            gps_reliability,
            fusion,
            events,
            startup: Startup::Complete,
            running: false,
            run_start_t_ms: 0.0,
            last_t_ms: 0.0,
            config,
        }
    }

    /// Begins a new run. The engine withholds fusion updates until the
    /// GPS-based moving-start test of spec §4.3 resolves (or a GPS-less
    /// timeout equal to `moving_start_window_s` elapses with no fixes at
    /// all, in which case it falls back to a stationary start).
    pub fn start_run(&mut self, now_ms: f64) {
        info!("run started at t={now_ms}");
        self.running = true;
        self.run_start_t_ms = now_ms;
        self.last_t_ms = now_ms;
        self.fusion.reset();
        self.events.start_run(now_ms);
        self.startup = Startup::AwaitingDecision {
            detector: MovingStartDetector::new(&self.config),
            buffered: Vec::new(),
            first_accel_t_ms: None,
        };
    }

    pub fn stop_run(&mut self, now_ms: f64) {
        info!("run stopped at t={now_ms}");
        self.running = false;
    }

    /// Full reset to construction-time state (spec §8 round-trip property).
    pub fn reset(&mut self) {
        let config = self.config.clone();
        *self = Self::new(config);
    }

    pub fn push_accel(&mut self, ax: f64, ay: f64, az: f64, t_ms: f64, linear: bool) -> Vec<Event> {
        if !self.running {
            return Vec::new();
        }
        self.last_t_ms = t_ms;

        if matches!(self.startup, Startup::Complete) {
            return self.process_accel_tick(ax, ay, az, t_ms, linear);
        }

        let mut fall_back_to_stationary = false;
        if let Startup::AwaitingDecision { buffered, first_accel_t_ms, .. } = &mut self.startup {
            first_accel_t_ms.get_or_insert(t_ms);
            buffered.push(BufferedAccel { ax, ay, az, t_ms, linear });

            let elapsed_s = (t_ms - first_accel_t_ms.unwrap()) / 1000.0;
            if elapsed_s >= self.config.moving_start_window_s && self.gps_reliability.last_fix_age_s(t_ms).is_none() {
                fall_back_to_stationary = true;
            }
        }

        if fall_back_to_stationary {
            debug!("no GPS fixes observed during startup window, falling back to stationary start");
            self.finish_startup(StartDecision::Stationary);
        }
        Vec::new()
    }

    pub fn push_gps(&mut self, lat: f64, lon: f64, speed_m_s: Option<f64>, accuracy_m: f64, t_ms: f64) -> Vec<Event> {
        if !self.running {
            return Vec::new();
        }
        self.last_t_ms = t_ms;
        let fix = GpsFix::new(lat, lon, speed_m_s, Some(accuracy_m), t_ms);
        if speed_m_s.map_or(false, |s| s < 0.0) {
            warn!("discarding negative GPS speed field, treating fix as position-only");
        }

        let mut resolved_decision = None;
        if let Startup::AwaitingDecision { detector, .. } = &mut self.startup {
            let decision = detector.on_fix(fix);
            if !matches!(decision, StartDecision::Pending) {
                resolved_decision = Some(decision);
            }
        }
        if let Some(decision) = resolved_decision {
            self.finish_startup(decision);
        }

        let score = self.gps_reliability.on_fix(&fix);
        let consecutive_near_zero = self.gps_reliability.consecutive_near_zero();

        if matches!(self.startup, Startup::Complete) {
            self.fusion.on_gps_fix(&fix, score, consecutive_near_zero);
        }
        Vec::new()
    }

    fn finish_startup(&mut self, decision: StartDecision) {
        let buffered = match std::mem::replace(&mut self.startup, Startup::Complete) {
            Startup::AwaitingDecision { buffered, .. } => buffered,
            Startup::Complete => return,
        };

        match decision {
            StartDecision::Moving { mean_speed_m_s, mean_accuracy_m } => {
                info!("moving start detected at mean speed {mean_speed_m_s:.1} m/s, skipping calibration");
                self.calibrator.mark_calibrated();
                self.fusion.seed_moving_start(mean_speed_m_s, 0.1 * mean_accuracy_m);
            }
            StartDecision::Stationary | StartDecision::Pending => {
                debug!("stationary start, beginning initial calibration window");
            }
        }

        for sample in buffered {
            self.process_accel_tick(sample.ax, sample.ay, sample.az, sample.t_ms, sample.linear);
        }
    }

    fn process_accel_tick(&mut self, ax: f64, ay: f64, az: f64, t_ms: f64, linear: bool) -> Vec<Event> {
        let (gx, gy, gz) = if linear { (ax, ay, az) } else { (ax, ay, az - 9.81) };
        let (bx, by, bz) = self.bias.apply(gx, gy, gz);

        if !self.calibrator.is_calibrated() {
            if let Some(bias) = self.calibrator.feed_initial(gx, gy, gz, t_ms, self.bias) {
                self.bias = bias;
                info!("initial calibration complete: bias=({:.3}, {:.3}, {:.3})", bias.x, bias.y, bias.z);
            }
        }

        let filtered = self.motion_gate.process(bx, by, bz);
        let moving = self.motion_gate.moving();

        if !moving && filtered < self.config.motion_threshold {
            self.calibrator.observe_stationary_residual((bx, by, bz));
        }

        let gps_reliable = self.gps_reliability.is_reliable(t_ms, &self.config);
        let gps_r = self.gps_reliability.score();
        let consecutive_near_zero = self.gps_reliability.consecutive_near_zero();

        let outcome = self.fusion.on_accel_tick(filtered, moving, t_ms, gps_reliable, gps_r, consecutive_near_zero);
        if outcome.gap {
            debug!("accelerometer gap > {}s, tick discarded and re-anchored", self.config.dt_gap);
        }
        if outcome.hard_zero {
            debug!("hard zero anchor fired, nudging bias toward stationary residual");
            self.calibrator.recalibrate(&mut self.bias);
        }

        self.events.on_accel_tick(filtered, moving, t_ms, self.fusion.state().v_fused, self.fusion.state().distance_accel)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.fusion.state();
        EngineSnapshot {
            speed_m_s: self.fusion.display_speed(),
            distance_m: state.distance_accel,
            moving: self.motion_gate.moving(),
            launched: self.events.launched(),
            calibrated: self.calibrator.is_calibrated(),
            gps_reliable: self.gps_reliability.is_reliable(self.last_t_ms, &self.config),
            gps_reliability_score: self.gps_reliability.score(),
            sigma: state.sigma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_phone_reports_zero_speed_and_distance() {
        let mut engine = SensorFusionEngine::new(SfeConfig::default());
        engine.start_run(0.0);
        let mut t = 0.0;
        for _ in 0..500 {
            engine.push_accel(0.05, 0.0, 0.05, t, true);
            t += 10.0;
        }
        let snap = engine.snapshot();
        assert_eq!(snap.speed_m_s, 0.0);
        assert_eq!(snap.distance_m, 0.0);
    }

    #[test]
    fn reset_matches_fresh_construction() {
        let mut engine = SensorFusionEngine::new(SfeConfig::default());
        engine.start_run(0.0);
        engine.push_accel(5.0, 0.0, 0.0, 0.0, true);
        engine.reset();
        let after_reset = engine.snapshot();

        let fresh = SensorFusionEngine::new(SfeConfig::default());
        let fresh_snap = fresh.snapshot();
        assert_eq!(after_reset.speed_m_s, fresh_snap.speed_m_s);
        assert_eq!(after_reset.distance_m, fresh_snap.distance_m);
        assert_eq!(after_reset.calibrated, fresh_snap.calibrated);
    }

    #[test]
    fn moving_start_skips_calibration_and_seeds_speed() {
        let mut engine = SensorFusionEngine::new(SfeConfig::default());
        engine.start_run(0.0);
        engine.push_gps(0.0, 0.0, Some(15.0), 8.0, 0.0);
        engine.push_gps(0.0, 0.001, Some(15.0), 8.0, 500.0);
        engine.push_gps(0.0, 0.002, Some(15.0), 8.0, 1000.0);

        let snap = engine.snapshot();
        assert!(snap.calibrated);
        assert!((snap.speed_m_s - 15.0).abs() < 2.0);
    }

    #[test]
    fn inputs_are_ignored_before_start_run() {
        let mut engine = SensorFusionEngine::new(SfeConfig::default());
        let events = engine.push_accel(5.0, 0.0, 0.0, 0.0, true);
        assert!(events.is_empty());
        assert_eq!(engine.snapshot().speed_m_s, 0.0);
    }
}
