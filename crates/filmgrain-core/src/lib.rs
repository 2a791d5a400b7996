//! Filmgrain Core: film grain synthesis and film-stock color response.
//!
//! This crate contains the film stock model and database, the tonal
//! response curves, particle-based grain generation and compositing, and
//! the engine that sequences them. No GPU, windowing or image codec
//! dependencies.

pub mod color_response;
pub mod config;
pub mod engine;
pub mod error;
pub mod film_stock;
pub mod grain;
pub mod image;
pub mod params;
pub mod telemetry;

// Re-exports for convenience.
pub use color_response::apply_color_response;
pub use config::EngineConfig;
pub use engine::{FilmGrainEngine, RenderHandle};
pub use error::{FilmGrainError, Result};
pub use film_stock::{FilmStock, FilmStockDatabase, FilmType, StockLookup};
pub use grain::{GrainGenerator, GrainParticle, GrainShape};
pub use image::Image;
pub use params::{GrainParams, ProcessingType, Quality};
pub use telemetry::{NullTelemetry, PerformanceStats, Telemetry, TracingTelemetry};
