//! C5 — Event Detector (spec §4.5).
//!
//! Runs on the fused signal only, downstream of everything else: launch
//! detection, speed-threshold checkpoints, and distance milestones. Each
//! event fires at most once per run.

use std::collections::VecDeque;

use crate::config::SfeConfig;
use crate::types::Event;

struct LaunchSample {
    filtered: f64,
    moving: bool,
    t_ms: f64,
}

struct CheckpointState {
    id: u32,
    from_m_s: f64,
    to_m_s: f64,
    seen_below_from: bool,
    achieved: bool,
}

struct MilestoneState {
    id: u32,
    meters: f64,
    crossed: bool,
}

pub struct EventDetector {
    window_s: f64,
    recent_samples: usize,
    recent_filtered_threshold: f64,
    speed_threshold: f64,
    sustained_window_s: f64,
    sustained_min_samples: usize,
    sustained_ratio: f64,
    sustained_filtered_threshold: f64,

    buffer: VecDeque<LaunchSample>,
    launched: bool,
    launch_time_ms: Option<f64>,
    run_start_t_ms: f64,

    checkpoints: Vec<CheckpointState>,
    milestones: Vec<MilestoneState>,
}

impl EventDetector {
    pub fn new(config: &SfeConfig) -> Self {
        Self {
            window_s: config.launch_window_s,
            recent_samples: config.launch_recent_samples,
            recent_filtered_threshold: config.launch_recent_filtered_threshold,
            speed_threshold: config.launch_speed_threshold,
            sustained_window_s: config.launch_sustained_window_s,
            sustained_min_samples: config.launch_sustained_min_samples,
            sustained_ratio: config.launch_sustained_ratio,
            sustained_filtered_threshold: config.launch_sustained_filtered_threshold,

            buffer: VecDeque::new(),
            launched: false,
            launch_time_ms: None,
            run_start_t_ms: 0.0,

            checkpoints: config
                .speed_targets
                .iter()
                .map(|t| CheckpointState {
                    id: t.id,
                    from_m_s: t.from_m_s,
                    to_m_s: t.to_m_s,
                    seen_below_from: false,
                    achieved: false,
                })
                .collect(),
            milestones: config
                .distance_targets
                .iter()
                .map(|t| MilestoneState { id: t.id, meters: t.meters, crossed: false })
                .collect(),
        }
    }

    pub fn launched(&self) -> bool {
        self.launched
    }

    /// Resets all per-run state (launch buffer, achieved flags, crossed
    /// flags) and records the new basis for elapsed-time-since-run-start.
    pub fn start_run(&mut self, now_ms: f64) {
        self.buffer.clear();
        self.launched = false;
        self.launch_time_ms = None;
        self.run_start_t_ms = now_ms;
        for c in &mut self.checkpoints {
            c.seen_below_from = false;
            c.achieved = false;
        }
        for m in &mut self.milestones {
            m.crossed = false;
        }
    }

    fn event_time_s(&self, now_ms: f64) -> f64 {
        let basis = self.launch_time_ms.unwrap_or(self.run_start_t_ms);
        (now_ms - basis) / 1000.0
    }

    /// Drives launch detection, speed-checkpoint evaluation, and
    /// distance-milestone evaluation for one accelerometer tick, in that
    /// order (milestones/checkpoints may fire on the same tick launch does,
    /// since the elapsed-time basis switches within the tick — spec §4.5
    /// "Time basis for events").
    pub fn on_accel_tick(
        &mut self,
        filtered: f64,
        moving: bool,
        t_ms: f64,
        v_fused: f64,
        distance_accel: f64,
    ) -> Vec<Event> {
        let mut events = Vec::new();

        self.buffer.push_back(LaunchSample { filtered, moving, t_ms });
        while let Some(front) = self.buffer.front() {
            if (t_ms - front.t_ms) / 1000.0 > self.window_s {
                self.buffer.pop_front();
            } else {
                break;
            }
        }

        if !self.launched && self.check_launch(v_fused) {
            self.launched = true;
            self.launch_time_ms = Some(t_ms);
            events.push(Event::LaunchDetected { t_since_run_start_s: (t_ms - self.run_start_t_ms) / 1000.0 });
        }

        self.evaluate_checkpoints(v_fused, t_ms, &mut events);
        self.evaluate_milestones(distance_accel, v_fused, t_ms, &mut events);

        events
    }

    fn check_launch(&self, v_fused: f64) -> bool {
        if v_fused <= self.speed_threshold {
            return false;
        }

        let recent: Vec<&LaunchSample> = self.buffer.iter().rev().take(self.recent_samples).collect();
        if recent.len() < self.recent_samples {
            return false;
        }
        if !recent.iter().all(|s| s.filtered > self.recent_filtered_threshold && s.moving) {
            return false;
        }

        let now_ms = self.buffer.back().map(|s| s.t_ms).unwrap_or(0.0);
        let sustained: Vec<&LaunchSample> = self
            .buffer
            .iter()
            .filter(|s| (now_ms - s.t_ms) / 1000.0 <= self.sustained_window_s)
            .collect();
        if sustained.len() < self.sustained_min_samples {
            return false;
        }
        let satisfying = sustained
            .iter()
            .filter(|s| s.filtered > self.sustained_filtered_threshold && s.moving)
            .count();
        (satisfying as f64 / sustained.len() as f64) >= self.sustained_ratio
    }

    fn evaluate_checkpoints(&mut self, v_fused: f64, t_ms: f64, events: &mut Vec<Event>) {
        for c in &mut self.checkpoints {
            if v_fused <= c.from_m_s {
                c.seen_below_from = true;
            }
            if !c.achieved && c.seen_below_from && v_fused >= c.to_m_s {
                c.achieved = true;
                events.push(Event::SpeedCheckpoint { id: c.id, t_since_event_basis_s: self.event_time_s(t_ms) });
            }
        }
    }

    fn evaluate_milestones(&mut self, distance_accel: f64, v_fused: f64, t_ms: f64, events: &mut Vec<Event>) {
        for m in &mut self.milestones {
            if !m.crossed && distance_accel >= m.meters {
                m.crossed = true;
                events.push(Event::DistanceMilestone {
                    id: m.id,
                    t_since_event_basis_s: self.event_time_s(t_ms),
                    speed_at_crossing_m_s: v_fused,
                });
            }
        }
    }
}
