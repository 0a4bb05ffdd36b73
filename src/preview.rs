//! Live preview support.
//!
//! Settings changes are pushed to a [`PreviewScheduler`] as events. A
//! background thread coalesces them: the first event opens a window of one
//! interval, and the newest request seen when it closes is rendered. A slider
//! that keeps moving still gets a fresh preview every interval.

use crate::config::CompositionConfig;
use crate::error::WatermarkError;
use crate::watermark::{WatermarkAsset, Watermarker};
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

/// Minimum time between two preview renders.
pub const PREVIEW_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 780,
            height: 540,
        }
    }
}

/// Shrinks `image` to fit inside `viewport`, keeping its aspect ratio.
/// Images that already fit are returned unchanged.
pub fn fit_to_viewport(image: DynamicImage, viewport: Viewport) -> DynamicImage {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 {
        return image;
    }
    let scale = (viewport.width as f64 / w as f64).min(viewport.height as f64 / h as f64);
    if scale >= 1.0 {
        return image;
    }
    let new_w = ((w as f64 * scale) as u32).max(1);
    let new_h = ((h as f64 * scale) as u32).max(1);
    image.resize_exact(new_w, new_h, FilterType::Lanczos3)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRequest {
    pub input: PathBuf,
    pub config: CompositionConfig,
}

pub type PreviewResult = Result<DynamicImage, WatermarkError>;

/// Receives rendered previews on the scheduler's thread.
pub trait PreviewObserver: Send + 'static {
    fn on_preview(&mut self, request: &PreviewRequest, result: PreviewResult);
}

impl<F> PreviewObserver for F
where
    F: FnMut(&PreviewRequest, PreviewResult) + Send + 'static,
{
    fn on_preview(&mut self, request: &PreviewRequest, result: PreviewResult) {
        self(request, result)
    }
}

enum Event {
    Changed(PreviewRequest),
    Shutdown,
}

pub struct PreviewScheduler {
    events: Sender<Event>,
    worker: Option<JoinHandle<()>>,
}

impl PreviewScheduler {
    /// Starts the render thread. Results are scaled down to `viewport` when
    /// one is given.
    pub fn spawn(
        asset: Arc<WatermarkAsset>,
        interval: Duration,
        viewport: Option<Viewport>,
        mut observer: impl PreviewObserver,
    ) -> Self {
        let (events, rx) = unbounded::<Event>();

        let worker = std::thread::spawn(move || {
            let engine = Watermarker::with_asset(asset, false);
            loop {
                let mut latest = match rx.recv() {
                    Ok(Event::Changed(request)) => request,
                    Ok(Event::Shutdown) | Err(_) => return,
                };

                let deadline = Instant::now() + interval;
                loop {
                    match rx.recv_deadline(deadline) {
                        Ok(Event::Changed(request)) => latest = request,
                        Ok(Event::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
                        Err(RecvTimeoutError::Timeout) => break,
                    }
                }

                debug!(input = %latest.input.display(), "rendering preview");
                let result = engine
                    .render_preview(&latest.input, &latest.config)
                    .map(|image| match viewport {
                        Some(v) => fit_to_viewport(image, v),
                        None => image,
                    });
                observer.on_preview(&latest, result);
            }
        });

        Self {
            events,
            worker: Some(worker),
        }
    }

    /// Reports a settings or selection change.
    pub fn notify(&self, request: PreviewRequest) {
        if self.events.send(Event::Changed(request)).is_err() {
            debug!("preview thread has stopped");
        }
    }

    /// Stops the render thread, dropping any pending request.
    pub fn shutdown(self) {}
}

impl Drop for PreviewScheduler {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
