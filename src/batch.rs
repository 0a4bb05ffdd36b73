//! Running the engine over many images.
//!
//! Failures on one image are recorded and the batch moves on. Cancellation is
//! checked between images only; an image that has started is finished.

use crate::config::CompositionConfig;
use crate::error::WatermarkError;
use crate::output::Quality;
use crate::watermark::{RenderOutcome, WatermarkAsset, Watermarker};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Shared flag a caller sets to stop a batch between images.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for handing to a signal handler.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Written,
    SkippedExisting,
    Failed(WatermarkError),
    Cancelled,
}

impl From<Result<RenderOutcome, WatermarkError>> for ItemOutcome {
    fn from(result: Result<RenderOutcome, WatermarkError>) -> Self {
        match result {
            Ok(RenderOutcome::Written) => ItemOutcome::Written,
            Ok(RenderOutcome::SkippedExisting) => ItemOutcome::SkippedExisting,
            Err(e) => ItemOutcome::Failed(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub job: BatchJob,
    pub outcome: ItemOutcome,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }

    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Written))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::SkippedExisting))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Cancelled))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&BatchJob, &WatermarkError)> {
        self.items.iter().filter_map(|i| match &i.outcome {
            ItemOutcome::Failed(e) => Some((&i.job, e)),
            _ => None,
        })
    }
}

/// Processes `jobs` in order on the calling thread.
///
/// `progress` is called after each image with its index and outcome.
/// A configuration error aborts the batch since it would fail every image.
pub fn run_sequential(
    engine: &mut Watermarker,
    jobs: &[BatchJob],
    config: &CompositionConfig,
    cancel: &CancelToken,
    mut progress: impl FnMut(usize, &BatchItem),
) -> Result<BatchReport, WatermarkError> {
    config.validate()?;
    let mut report = BatchReport::default();

    for (index, job) in jobs.iter().enumerate() {
        let outcome = if cancel.is_cancelled() {
            ItemOutcome::Cancelled
        } else {
            process(engine, job, config)
        };
        let item = BatchItem {
            job: job.clone(),
            outcome,
        };
        progress(index, &item);
        report.items.push(item);
    }

    Ok(report)
}

/// Processes `jobs` on a rayon pool of `threads` workers (0 = one per core).
///
/// Every pool thread owns one [`Watermarker`] around the shared asset, so a
/// render cache is reused by all images that thread handles and is never
/// shared between threads. The report keeps the order of `jobs`.
pub fn run_parallel(
    asset: Arc<WatermarkAsset>,
    overwrite: bool,
    quality: Quality,
    jobs: &[BatchJob],
    config: &CompositionConfig,
    cancel: &CancelToken,
    threads: usize,
) -> Result<BatchReport, WatermarkError> {
    config.validate()?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| WatermarkError::config(format!("cannot start worker pool: {}", e)))?;
    let engines = WorkerEngines::new(pool.current_num_threads(), &asset, overwrite, quality);

    let items = pool.install(|| run_on_workers(&engines, jobs, config, cancel));
    Ok(BatchReport { items })
}

/// One engine per pool thread, indexed by `rayon::current_thread_index`.
struct WorkerEngines(Vec<Mutex<Watermarker>>);

impl WorkerEngines {
    fn new(count: usize, asset: &Arc<WatermarkAsset>, overwrite: bool, quality: Quality) -> Self {
        let engines = (0..count.max(1))
            .map(|_| {
                Mutex::new(Watermarker::with_asset(Arc::clone(asset), overwrite).with_quality(quality))
            })
            .collect();
        Self(engines)
    }

    fn process(&self, job: &BatchJob, config: &CompositionConfig) -> ItemOutcome {
        let slot = rayon::current_thread_index().unwrap_or(0) % self.0.len();
        // uncontended: only the owning thread ever locks its slot
        let mut engine = self.0[slot].lock().unwrap_or_else(PoisonError::into_inner);
        process(&mut engine, job, config)
    }
}

fn run_on_workers(
    engines: &WorkerEngines,
    jobs: &[BatchJob],
    config: &CompositionConfig,
    cancel: &CancelToken,
) -> Vec<BatchItem> {
    jobs.par_iter()
        .map(|job| {
            let outcome = if cancel.is_cancelled() {
                ItemOutcome::Cancelled
            } else {
                engines.process(job, config)
            };
            BatchItem {
                job: job.clone(),
                outcome,
            }
        })
        .collect()
}

fn process(engine: &mut Watermarker, job: &BatchJob, config: &CompositionConfig) -> ItemOutcome {
    let outcome = ItemOutcome::from(engine.render_to_disk(&job.input, &job.output, config));
    if let ItemOutcome::Failed(e) = &outcome {
        warn!(input = %job.input.display(), "skipping image: {}", e);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::path::Path;

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_report_counts() {
        let job = BatchJob {
            input: PathBuf::from("a.png"),
            output: PathBuf::from("b.png"),
        };
        let item = |outcome| BatchItem {
            job: job.clone(),
            outcome,
        };
        let report = BatchReport {
            items: vec![
                item(ItemOutcome::Written),
                item(ItemOutcome::Written),
                item(ItemOutcome::SkippedExisting),
                item(ItemOutcome::Failed(WatermarkError::config("x"))),
                item(ItemOutcome::Cancelled),
            ],
        };
        assert_eq!(report.written(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.cancelled(), 1);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_parallel_workers_reuse_their_cache() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let jobs: Vec<BatchJob> = (0..12)
            .map(|i| {
                let input = dir.path().join(format!("{:02}.png", i));
                RgbImage::from_pixel(60, 40, Rgb([10, 10, 10]))
                    .save(&input)
                    .unwrap();
                BatchJob {
                    output: out.join(format!("{:02}.png", i)),
                    input,
                }
            })
            .collect();

        let mark = image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 4, Rgba([255; 4])));
        let asset = Arc::new(WatermarkAsset::from_image(mark, Path::new("mark")).unwrap());
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let engines = WorkerEngines::new(2, &asset, false, Quality::default());
        let config = CompositionConfig::default();

        let items = pool.install(|| run_on_workers(&engines, &jobs, &config, &CancelToken::new()));
        assert!(items.iter().all(|i| i.outcome == ItemOutcome::Written));

        // same-size images: at most one render per pool thread
        let (hits, misses) = engines.0.iter().fold((0, 0), |(h, m), engine| {
            let stats = engine.lock().unwrap().cache().stats();
            (h + stats.hits, m + stats.misses)
        });
        assert!(misses <= 2, "{} cache misses", misses);
        assert_eq!(hits + misses, 12);
    }
}
