//! Render timing collaborators and aggregate statistics.
//!
//! Telemetry only observes. Swapping or removing a sink never changes a
//! rendered pixel.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Receives per-stage timings from the engine.
pub trait Telemetry: Send + Sync {
    /// `stage` is one of `color_response`, `grain`, `halation` or `total`.
    fn record(&self, stage: &str, elapsed: Duration);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn record(&self, _stage: &str, _elapsed: Duration) {}
}

/// Emits each timing as a `tracing` debug event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn record(&self, stage: &str, elapsed: Duration) {
        tracing::debug!("{stage}: {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    }
}

/// Figures from the most recent render plus running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Wall time of the last completed render.
    pub processing_time_ms: f64,
    /// `1000 / processing_time_ms`, or 0 before the first render.
    pub fps: f64,
    /// Particles composited by the last render.
    pub particles_rendered: usize,
    /// Successful renders since the engine was created.
    pub renders_completed: u64,
}

impl PerformanceStats {
    /// Fold one completed render into the figures.
    pub fn record_render(&mut self, elapsed: Duration, particles: usize) {
        self.processing_time_ms = elapsed.as_secs_f64() * 1000.0;
        self.fps = if self.processing_time_ms > 0.0 {
            1000.0 / self.processing_time_ms
        } else {
            0.0
        };
        self.particles_rendered = particles;
        self.renders_completed += 1;
    }
}
