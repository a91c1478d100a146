//! Sensor Fusion Engine — estimates a moving vehicle's ground speed,
//! cumulative distance, and acceleration-interval event times from a
//! phone-grade accelerometer and an intermittent GPS feed.
//!
//! `engine::SensorFusionEngine` is the only type other crates or binaries
//! should depend on; everything else is an internal component (C1–C5).

pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fusion;
pub mod gps_reliability;
pub mod motion_gate;
pub mod types;

pub use config::SfeConfig;
pub use engine::SensorFusionEngine;
pub use error::SfeError;
pub use types::{AccelSample, Bias, EngineSnapshot, Event, FusedState, GpsFix};
