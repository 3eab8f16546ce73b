//! Silent Loop: bounded draft -> validate -> fix -> commit iteration with
//! stall and oscillation detection

mod config;
mod engine;
mod metrics;

pub use config::LoopConfig;
pub use engine::{LoopResult, LoopStatus, Patch, SilentLoop};
pub use metrics::{ERROR_WINDOW, LoopIteration, VelocityMetrics};
