//! Library-level error type. The engine's sensor-input handling never
//! fails (spec §7 — every adverse input is absorbed), so this only covers
//! the ambient layers around it: config validation and trace loading.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SfeError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to parse trace file: {0}")]
    TraceParse(String),
}
