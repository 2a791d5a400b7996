//! Render orchestration.
//!
//! A [`FilmGrainEngine`] owns the stock lookup, the generator settings and
//! the statistics for one embedding application. Several engines can live
//! side by side; nothing here is global.
//!
//! Every render runs the same strictly ordered stages on a private working
//! copy of the input:
//! ```text
//! check params → resolve stock → copy input
//!   → color response → grain → halation (optional)
//! ```
//! The input is never mutated, and a failed render leaves the caller's
//! output untouched.
//!
//! Asynchronous renders run on their own thread and are tracked by the
//! engine until they finish. [`FilmGrainEngine::shutdown`] and `Drop` join
//! every outstanding render.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::color_response::apply_color_response;
use crate::config::EngineConfig;
use crate::error::{FilmGrainError, Result};
use crate::film_stock::{FilmStock, FilmStockDatabase, StockLookup};
use crate::grain::{GrainGenerator, apply_grain, apply_halation, render_rng};
use crate::image::Image;
use crate::params::GrainParams;
use crate::telemetry::{NullTelemetry, PerformanceStats, Telemetry};

/// Explicit rendering context. Create one per application (or per test).
pub struct FilmGrainEngine {
    config: EngineConfig,
    context: Arc<RenderContext>,
    pending: Mutex<Vec<Arc<RenderJob>>>,
}

impl FilmGrainEngine {
    /// Build an engine with its own stock database.
    ///
    /// Loads the built-in stocks when `config.load_builtin_stocks` is set,
    /// then `config.stock_path` if given. A stock file that cannot be read
    /// or parsed is an error.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let mut db = if config.load_builtin_stocks {
            FilmStockDatabase::with_builtin()?
        } else {
            FilmStockDatabase::new()
        };
        if let Some(path) = &config.stock_path {
            db.load_from_file(path)?;
        }
        tracing::info!("Film grain engine ready with {} stocks", db.len());
        Ok(Self::with_database(config, Arc::new(db)))
    }

    /// Build an engine over an existing stock lookup.
    pub fn with_database(config: EngineConfig, stocks: Arc<dyn StockLookup>) -> Self {
        let context = RenderContext {
            stocks,
            generator: GrainGenerator::new(config.reference_dpi),
            default_seed: config.default_seed,
            telemetry: Arc::new(NullTelemetry),
            stats: Arc::new(Mutex::new(PerformanceStats::default())),
            gpu_notice_logged: Arc::new(AtomicBool::new(false)),
        };
        Self {
            config,
            context: Arc::new(context),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Replace the telemetry sink. Renders already in flight keep the old one.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        let mut context = (*self.context).clone();
        context.telemetry = telemetry;
        self.context = Arc::new(context);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Render `input` with the named stock and return the result.
    pub fn process(&self, input: &Image, stock_id: &str, params: &GrainParams) -> Result<Image> {
        self.context.render(input, stock_id, params, None)
    }

    /// Render into `output`, resizing it to match `input`.
    ///
    /// `output` is only written once the whole render has succeeded.
    pub fn process_into(
        &self,
        input: &Image,
        output: &mut Image,
        stock_id: &str,
        params: &GrainParams,
    ) -> Result<()> {
        *output = self.context.render(input, stock_id, params, None)?;
        Ok(())
    }

    /// Render on a worker thread and hand the result to `callback`.
    ///
    /// The callback runs on the worker, receives errors as well as images,
    /// and is skipped if the render is cancelled first. When
    /// `max_pending_jobs` renders are already unfinished this call blocks on
    /// the oldest one.
    pub fn process_async<F>(
        &self,
        input: Image,
        stock_id: impl Into<String>,
        params: GrainParams,
        callback: F,
    ) -> RenderHandle
    where
        F: FnOnce(Result<Image>) + Send + 'static,
    {
        self.make_room();

        let stock_id = stock_id.into();
        let job = Arc::new(RenderJob::default());
        let context = Arc::clone(&self.context);
        let worker_job = Arc::clone(&job);

        let spawned = std::thread::Builder::new()
            .name(format!("filmgrain-render-{stock_id}"))
            .spawn(move || {
                let result =
                    context.render(&input, &stock_id, &params, Some(&worker_job.cancelled));
                let cancelled = matches!(result, Err(FilmGrainError::Cancelled));
                let outcome = if cancelled || worker_job.is_cancelled() {
                    Err(FilmGrainError::Cancelled)
                } else {
                    if let Err(e) = &result {
                        tracing::debug!("Async render of {stock_id} failed: {e}");
                    }
                    callback(result);
                    Ok(())
                };
                worker_job.finish(outcome);
            });

        match spawned {
            Ok(thread) => {
                *job.thread.lock() = Some(thread);
                self.pending.lock().push(Arc::clone(&job));
            }
            Err(e) => {
                tracing::warn!("Failed to spawn render thread: {e}");
                job.finish(Err(FilmGrainError::Io(e)));
            }
        }

        RenderHandle { job }
    }

    /// Unfinished asynchronous renders.
    pub fn pending_jobs(&self) -> usize {
        let mut pending = self.pending.lock();
        pending.retain(|job| !job.is_finished());
        pending.len()
    }

    /// Block until every asynchronous render has finished.
    pub fn shutdown(&self) {
        let jobs: Vec<Arc<RenderJob>> = std::mem::take(&mut *self.pending.lock());
        if jobs.is_empty() {
            return;
        }
        tracing::info!("Waiting for {} async renders", jobs.len());
        for job in jobs {
            job.wait();
        }
    }

    /// Statistics of the most recent successful render.
    pub fn stats(&self) -> PerformanceStats {
        *self.context.stats.lock()
    }

    /// Every available stock, sorted by id.
    pub fn available_stocks(&self) -> Vec<Arc<FilmStock>> {
        let mut stocks = self.context.stocks.all();
        stocks.sort_by(|a, b| a.id.cmp(&b.id));
        stocks
    }

    pub fn stock(&self, id: &str) -> Option<Arc<FilmStock>> {
        self.context.stocks.get(id)
    }

    /// Drop finished jobs; if still at the limit, wait for the oldest.
    fn make_room(&self) {
        let limit = self.config.max_pending_jobs.max(1);
        let oldest = {
            let mut pending = self.pending.lock();
            pending.retain(|job| !job.is_finished());
            if pending.len() < limit {
                return;
            }
            pending.remove(0)
        };
        tracing::debug!("Render queue full ({limit}), waiting for the oldest job");
        oldest.wait();
    }
}

impl Drop for FilmGrainEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Everything a render needs, shared with worker threads.
#[derive(Clone)]
struct RenderContext {
    stocks: Arc<dyn StockLookup>,
    generator: GrainGenerator,
    default_seed: Option<u64>,
    telemetry: Arc<dyn Telemetry>,
    stats: Arc<Mutex<PerformanceStats>>,
    gpu_notice_logged: Arc<AtomicBool>,
}

impl RenderContext {
    fn render(
        &self,
        input: &Image,
        stock_id: &str,
        params: &GrainParams,
        cancel: Option<&AtomicBool>,
    ) -> Result<Image> {
        let started = Instant::now();
        let check_cancel = || match cancel {
            Some(flag) if flag.load(Ordering::Acquire) => Err(FilmGrainError::Cancelled),
            _ => Ok(()),
        };

        input.ensure_valid()?;
        params.validate()?;
        let params = &params.clamped();
        let stock = self
            .stocks
            .get(stock_id)
            .ok_or_else(|| FilmGrainError::StockNotFound(stock_id.to_string()))?;
        stock.validate()?;

        if params.use_gpu_acceleration && !self.gpu_notice_logged.swap(true, Ordering::Relaxed) {
            tracing::debug!("GPU rendering not available, using the CPU path");
        }

        let mut working = input.clone();

        check_cancel()?;
        let stage = Instant::now();
        apply_color_response(&mut working, &stock)?;
        self.telemetry.record("color_response", stage.elapsed());

        check_cancel()?;
        let stage = Instant::now();
        let mut rng = render_rng(params.seed.or(self.default_seed));
        let particles = apply_grain(&mut working, &stock, params, &self.generator, &mut rng);
        self.telemetry.record("grain", stage.elapsed());

        if params.enable_halation {
            check_cancel()?;
            let stage = Instant::now();
            if apply_halation(&mut working, &stock, params.halation_strength) {
                self.telemetry.record("halation", stage.elapsed());
            }
        }

        let elapsed = started.elapsed();
        self.telemetry.record("total", elapsed);
        self.stats.lock().record_render(elapsed, particles);
        tracing::debug!(
            "Rendered {stock_id} {}x{}: {particles} particles in {:.2}ms",
            working.width(),
            working.height(),
            as_millis(elapsed)
        );
        Ok(working)
    }
}

fn as_millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Completion state shared by a worker, its handle and the engine.
#[derive(Default)]
struct RenderJob {
    cancelled: AtomicBool,
    done: AtomicBool,
    outcome: Mutex<Option<Result<()>>>,
    finished: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RenderJob {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Record the outcome. Later calls are ignored.
    fn finish(&self, outcome: Result<()>) {
        let mut slot = self.outcome.lock();
        if self.done.load(Ordering::Acquire) {
            return;
        }
        *slot = Some(outcome);
        self.done.store(true, Ordering::Release);
        self.finished.notify_all();
    }

    /// Block until the worker has finished. Whoever takes the thread handle
    /// joins it, so a panicking worker still resolves the job.
    fn wait(&self) {
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                tracing::warn!("Render worker panicked");
                self.finish(Err(FilmGrainError::WorkerPanicked));
            }
        }

        let mut slot = self.outcome.lock();
        while !self.done.load(Ordering::Acquire) {
            self.finished.wait(&mut slot);
        }
    }

    fn take_outcome(&self) -> Option<Result<()>> {
        self.outcome.lock().take()
    }
}

/// Handle to one asynchronous render.
pub struct RenderHandle {
    job: Arc<RenderJob>,
}

impl RenderHandle {
    /// Ask the worker to stop at the next stage boundary. The callback is
    /// not invoked for a render that observes the cancellation.
    pub fn cancel(&self) {
        self.job.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.job.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.job.is_finished()
    }

    /// Wait for the render.
    ///
    /// `Ok` once the callback has run, whatever it was handed. Cancellation
    /// and a panicking worker are reported as errors.
    pub fn join(self) -> Result<()> {
        self.job.wait();
        self.job.take_outcome().unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    use crate::film_stock::FilmType;
    use crate::telemetry::TracingTelemetry;

    fn engine() -> FilmGrainEngine {
        FilmGrainEngine::new(EngineConfig::isolated()).unwrap()
    }

    fn gray(width: u32, height: u32) -> Image {
        Image::filled(width, height, 3, &[128, 128, 128])
    }

    /// A lookup holding one grainless black-and-white stock.
    struct SingleStock(Arc<FilmStock>);

    impl StockLookup for SingleStock {
        fn get(&self, id: &str) -> Option<Arc<FilmStock>> {
            (id == self.0.id).then(|| Arc::clone(&self.0))
        }

        fn all(&self) -> Vec<Arc<FilmStock>> {
            vec![Arc::clone(&self.0)]
        }
    }

    fn grainless_engine() -> FilmGrainEngine {
        let mut stock = FilmStock {
            id: "flat_pan".to_string(),
            film_type: FilmType::BlackAndWhite,
            ..FilmStock::default()
        };
        stock.grain_properties.density_per_mm2 = 0.0;
        FilmGrainEngine::with_database(EngineConfig::isolated(), Arc::new(SingleStock(Arc::new(stock))))
    }

    #[test]
    fn test_process_keeps_geometry_and_input() {
        let engine = engine();
        let input = gray(32, 24);
        let snapshot = input.clone();
        let params = GrainParams::default().with_seed(1);

        let out = engine.process(&input, "kodak_portra_400", &params).unwrap();
        assert_eq!(input, snapshot);
        assert_eq!((out.width(), out.height(), out.channels()), (32, 24, 3));
    }

    #[test]
    fn test_unknown_stock_fails() {
        let engine = engine();
        let err = engine
            .process(&gray(4, 4), "nonexistent-id", &GrainParams::default())
            .unwrap_err();
        assert!(matches!(err, FilmGrainError::StockNotFound(id) if id == "nonexistent-id"));
    }

    #[test]
    fn test_invalid_input_fails() {
        let engine = engine();
        let err = engine
            .process(&Image::default(), "kodak_tri_x_400", &GrainParams::default())
            .unwrap_err();
        assert!(matches!(err, FilmGrainError::InvalidImage { .. }));
    }

    #[test]
    fn test_non_finite_params_fail() {
        let engine = engine();
        for params in [
            GrainParams {
                density_multiplier: f32::INFINITY,
                ..GrainParams::default()
            },
            GrainParams {
                size_multiplier: f32::NAN,
                ..GrainParams::default()
            },
            GrainParams {
                halation_strength: f32::NEG_INFINITY,
                enable_halation: true,
                ..GrainParams::default()
            },
        ] {
            let result = engine.process(&Image::new(8, 8, 3), "kodak_tri_x_400", &params);
            assert!(matches!(result, Err(FilmGrainError::InvalidParams(_))), "{params:?}");
        }
    }

    #[test]
    fn test_huge_finite_multiplier_is_clamped() {
        let input = gray(16, 16);
        let params = GrainParams {
            density_multiplier: 1e6,
            size_multiplier: 1e9,
            ..GrainParams::default().with_seed(5)
        };
        let out = grainless_engine().process(&input, "flat_pan", &params).unwrap();
        assert_eq!(out.data().len(), input.data().len());

        let engine = engine();
        let capped = engine.process(&input, "kodak_tri_x_400", &params).unwrap();
        let rendered = engine.stats().particles_rendered;
        let at_limit = GrainParams {
            density_multiplier: 3.0,
            size_multiplier: 5.0,
            ..params.clone()
        };
        let expected = engine.process(&input, "kodak_tri_x_400", &at_limit).unwrap();
        assert_eq!(engine.stats().particles_rendered, rendered);
        assert_eq!(capped, expected);
    }

    #[test]
    fn test_process_into_leaves_output_on_failure() {
        let engine = engine();
        let mut output = Image::filled(2, 2, 1, &[9]);
        let before = output.clone();
        assert!(
            engine
                .process_into(&gray(4, 4), &mut output, "missing", &GrainParams::default())
                .is_err()
        );
        assert_eq!(output, before);

        engine
            .process_into(&gray(4, 4), &mut output, "kodak_tri_x_400", &GrainParams::default().with_seed(3))
            .unwrap();
        assert_eq!((output.width(), output.height(), output.channels()), (4, 4, 3));
    }

    #[test]
    fn test_seeded_renders_are_reproducible() {
        let engine = engine();
        let input = gray(40, 30);
        let params = GrainParams::default().with_seed(17);
        let a = engine.process(&input, "ilford_hp5_plus", &params).unwrap();
        let b = engine.process(&input, "ilford_hp5_plus", &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_config_seed_applies_without_params_seed() {
        let config = EngineConfig {
            default_seed: Some(5),
            ..EngineConfig::isolated()
        };
        let engine = FilmGrainEngine::new(config).unwrap();
        let input = gray(40, 30);
        let a = engine.process(&input, "kodak_gold_200", &GrainParams::default()).unwrap();
        let b = engine.process(&input, "kodak_gold_200", &GrainParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stats_track_renders() {
        let engine = grainless_engine();
        assert_eq!(engine.stats().renders_completed, 0);
        engine.process(&gray(4, 4), "flat_pan", &GrainParams::default()).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.renders_completed, 1);
        assert_eq!(stats.particles_rendered, 0);
    }

    #[test]
    fn test_async_delivers_result() {
        let engine = grainless_engine();
        let (tx, rx) = mpsc::channel();
        let handle = engine.process_async(gray(4, 4), "flat_pan", GrainParams::default(), move |r| {
            let _ = tx.send(r);
        });
        handle.join().unwrap();

        let image = rx.recv().unwrap().unwrap();
        assert!(image.data().iter().all(|&v| v == 137));
    }

    #[test]
    fn test_async_reports_unknown_stock() {
        let engine = grainless_engine();
        let (tx, rx) = mpsc::channel();
        let handle = engine.process_async(gray(4, 4), "missing", GrainParams::default(), move |r| {
            let _ = tx.send(r.is_err());
        });
        handle.join().unwrap();
        assert!(rx.recv().unwrap());
    }

    #[test]
    fn test_shutdown_joins_outstanding_work() {
        let engine = grainless_engine();
        let (tx, rx) = mpsc::channel();
        for _ in 0..4 {
            let tx = tx.clone();
            engine.process_async(gray(8, 8), "flat_pan", GrainParams::default(), move |r| {
                let _ = tx.send(r.is_ok());
            });
        }
        drop(tx);
        engine.shutdown();
        assert_eq!(engine.pending_jobs(), 0);
        assert_eq!(rx.iter().filter(|ok| *ok).count(), 4);
    }

    #[test]
    fn test_pending_jobs_are_bounded() {
        let config = EngineConfig {
            max_pending_jobs: 2,
            ..EngineConfig::isolated()
        };
        let stock = grainless_engine().stock("flat_pan").unwrap();
        let engine = FilmGrainEngine::with_database(config, Arc::new(SingleStock(stock)));
        for _ in 0..6 {
            engine.process_async(gray(8, 8), "flat_pan", GrainParams::default(), |_| {});
            assert!(engine.pending_jobs() <= 2);
        }
        engine.shutdown();
        assert_eq!(engine.pending_jobs(), 0);
    }

    #[test]
    fn test_cancelled_handle_reports_cancelled_or_finished() {
        let engine = engine();
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let handle = engine.process_async(
            gray(64, 64),
            "fuji_neopan_1600",
            GrainParams::default().with_seed(1),
            move |_| flag.store(true, Ordering::SeqCst),
        );
        handle.cancel();
        assert!(handle.is_cancelled());
        match handle.join() {
            Err(FilmGrainError::Cancelled) => assert!(!called.load(Ordering::SeqCst)),
            // The worker may have passed the last stage boundary already.
            Ok(()) => assert!(called.load(Ordering::SeqCst)),
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    #[derive(Default)]
    struct RecordingTelemetry(Mutex<Vec<String>>);

    impl Telemetry for RecordingTelemetry {
        fn record(&self, stage: &str, _elapsed: Duration) {
            self.0.lock().push(stage.to_string());
        }
    }

    #[test]
    fn test_telemetry_sees_stages_without_changing_pixels() {
        let sink = Arc::new(RecordingTelemetry::default());
        let plain = engine();
        let observed = engine().with_telemetry(sink.clone());
        let traced = engine().with_telemetry(Arc::new(TracingTelemetry));
        let params = GrainParams {
            enable_halation: true,
            ..GrainParams::default().with_seed(9)
        };
        let input = Image::filled(16, 16, 3, &[240, 240, 240]);

        let a = plain.process(&input, "cinestill_800t", &params).unwrap();
        let b = observed.process(&input, "cinestill_800t", &params).unwrap();
        let c = traced.process(&input, "cinestill_800t", &params).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(*sink.0.lock(), ["color_response", "grain", "halation", "total"]);
    }

    #[test]
    fn test_available_stocks_sorted() {
        let engine = engine();
        let ids: Vec<String> = engine.available_stocks().iter().map(|s| s.id.clone()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(engine.stock("cinestill_800t").is_some());
    }
}
