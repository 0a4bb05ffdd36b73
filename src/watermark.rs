//! The compositing engine.
//!
//! A [`Watermarker`] owns one loaded watermark and applies it to target images,
//! either writing the result to disk (batch) or returning it in memory
//! (preview). Disk renders reuse the last scaled/blended watermark while the
//! target size and settings stay the same.

use crate::config::CompositionConfig;
use crate::error::WatermarkError;
use crate::output::{self, Quality};
use crate::{geometry, opacity, scale, source};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbaImage};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// The watermark as loaded from disk. Never modified after construction.
#[derive(Debug)]
pub struct WatermarkAsset {
    image: RgbaImage,
    has_alpha: bool,
    /// width / height as loaded
    aspect: f64,
}

impl WatermarkAsset {
    pub fn open(path: &Path) -> Result<Self, WatermarkError> {
        if !path.is_file() {
            return Err(WatermarkError::asset_load(path, "watermark not found"));
        }
        let loaded = source::load_path(path)
            .map_err(|e| WatermarkError::asset_load(path, format!("incompatible image: {}", e)))?;
        Self::from_image(loaded.image, path)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, WatermarkError> {
        let origin = Path::new("<memory>");
        let loaded = source::load_bytes(data)
            .map_err(|e| WatermarkError::asset_load(origin, format!("incompatible image: {}", e)))?;
        Self::from_image(loaded.image, origin)
    }

    pub fn from_image(image: DynamicImage, origin: &Path) -> Result<Self, WatermarkError> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(WatermarkError::asset_load(origin, "watermark has no pixels"));
        }
        Ok(Self {
            has_alpha: image.color().has_alpha(),
            image: image.into_rgba8(),
            aspect: w as f64 / h as f64,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.aspect
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Scales and blends a fresh copy of the watermark for a target size.
    pub fn render(&self, target: (u32, u32), config: &CompositionConfig) -> CachedRender {
        let (w, h) = if config.auto_scale {
            scale::calc_size(
                target,
                self.image.width(),
                self.aspect,
                config.scale_x,
                config.scale_y,
            )
        } else {
            scale::intrinsic_size(self.dimensions(), config.scale_x, config.scale_y)
        };

        let resized = if (w, h) == self.dimensions() {
            self.image.clone()
        } else {
            imageops::resize(&self.image, w, h, FilterType::Lanczos3)
        };

        if config.opacity < 1.0 {
            CachedRender {
                image: opacity::change_opacity(&resized, config.opacity),
                has_alpha: true,
            }
        } else {
            CachedRender {
                image: resized,
                has_alpha: self.has_alpha,
            }
        }
    }
}

/// A watermark ready to paste.
#[derive(Debug)]
pub struct CachedRender {
    pub image: RgbaImage,
    /// Whether to paste through the alpha channel or as an opaque block.
    pub has_alpha: bool,
}

/// Everything a render depends on besides the asset itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderKey {
    pub target: (u32, u32),
    pub opacity: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub auto_scale: bool,
}

impl RenderKey {
    pub fn new(target: (u32, u32), config: &CompositionConfig) -> Self {
        Self {
            target,
            opacity: config.opacity,
            scale_x: config.scale_x,
            scale_y: config.scale_y,
            auto_scale: config.auto_scale,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Holds the most recent render. A key mismatch replaces the entry; renders
/// are shared out as `Arc` and never changed in place.
#[derive(Debug, Default)]
pub struct RenderCache {
    entry: Option<(RenderKey, Arc<CachedRender>)>,
    stats: CacheStats,
}

impl RenderCache {
    pub fn get_or_insert_with(
        &mut self,
        key: RenderKey,
        render: impl FnOnce() -> CachedRender,
    ) -> Arc<CachedRender> {
        if let Some((cached_key, cached)) = &self.entry {
            if *cached_key == key {
                self.stats.hits += 1;
                debug!(target_w = key.target.0, target_h = key.target.1, "render cache hit");
                return Arc::clone(cached);
            }
        }

        self.stats.misses += 1;
        debug!(target_w = key.target.0, target_h = key.target.1, "render cache miss");
        let fresh = Arc::new(render());
        self.entry = Some((key, Arc::clone(&fresh)));
        fresh
    }

    pub fn key(&self) -> Option<RenderKey> {
        self.entry.as_ref().map(|(key, _)| *key)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Written,
    /// Destination already existed and overwrite is off; nothing was written.
    SkippedExisting,
}

pub struct Watermarker {
    asset: Arc<WatermarkAsset>,
    overwrite: bool,
    quality: Quality,
    cache: RenderCache,
}

impl Watermarker {
    pub fn open(watermark_path: &Path, overwrite: bool) -> Result<Self, WatermarkError> {
        let asset = WatermarkAsset::open(watermark_path)?;
        Ok(Self::with_asset(Arc::new(asset), overwrite))
    }

    /// Builds an engine around an already loaded asset, e.g. one per worker.
    pub fn with_asset(asset: Arc<WatermarkAsset>, overwrite: bool) -> Self {
        Self {
            asset,
            overwrite,
            quality: Quality::default(),
            cache: RenderCache::default(),
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn asset(&self) -> &Arc<WatermarkAsset> {
        &self.asset
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    /// Watermarks `input` and saves it to `output`.
    ///
    /// With overwrite off, an existing `output` is left untouched and
    /// [`RenderOutcome::SkippedExisting`] is returned.
    pub fn render_to_disk(
        &mut self,
        input: &Path,
        output: &Path,
        config: &CompositionConfig,
    ) -> Result<RenderOutcome, WatermarkError> {
        config.validate()?;

        if !self.overwrite && output.is_file() {
            debug!(output = %output.display(), "output exists, skipping");
            return Ok(RenderOutcome::SkippedExisting);
        }

        let loaded = load_target(input)?;
        let target = loaded.image.dimensions();
        let asset = &self.asset;
        let render = self
            .cache
            .get_or_insert_with(RenderKey::new(target, config), || {
                asset.render(target, config)
            });

        let composed = apply(&loaded.image, &render, config);
        output::save_image(
            &composed,
            output,
            loaded.icc_profile.as_deref(),
            self.quality,
        )?;

        info!(input = %input.display(), output = %output.display(), "watermarked");
        Ok(RenderOutcome::Written)
    }

    /// Watermarks `input` in memory. Always renders the watermark fresh and
    /// never touches the render cache or the disk.
    pub fn render_preview(
        &self,
        input: &Path,
        config: &CompositionConfig,
    ) -> Result<DynamicImage, WatermarkError> {
        config.validate()?;
        let loaded = load_target(input)?;
        Ok(self.compose_fresh(&loaded.image, config))
    }

    /// Same as [`render_preview`](Self::render_preview) for an encoded image
    /// held in memory.
    pub fn preview_bytes(
        &self,
        data: &[u8],
        config: &CompositionConfig,
    ) -> Result<DynamicImage, WatermarkError> {
        config.validate()?;
        let loaded = source::load_bytes(data)
            .map_err(|e| WatermarkError::input_image(Path::new("<memory>"), e))?;
        Ok(self.compose_fresh(&loaded.image, config))
    }

    fn compose_fresh(&self, image: &DynamicImage, config: &CompositionConfig) -> DynamicImage {
        let render = self.asset.render(image.dimensions(), config);
        apply(image, &render, config)
    }
}

fn load_target(input: &Path) -> Result<source::LoadedImage, WatermarkError> {
    if !input.is_file() {
        return Err(WatermarkError::input_image(input, "file not found"));
    }
    source::load_path(input).map_err(|e| WatermarkError::input_image(input, e))
}

/// Pastes `render` onto a copy of `base` at the configured corner.
pub fn apply(base: &DynamicImage, render: &CachedRender, config: &CompositionConfig) -> DynamicImage {
    let mut canvas = base.to_rgba8();
    let (x, y) = geometry::watermark_position(
        canvas.dimensions(),
        render.image.dimensions(),
        config.position,
        config.pad_x,
        config.pad_y,
    );
    debug!(x, y, "placing watermark");

    if render.has_alpha {
        imageops::overlay(&mut canvas, &render.image, x, y);
    } else {
        imageops::replace(&mut canvas, &render.image, x, y);
    }

    if base.color().has_alpha() {
        DynamicImage::ImageRgba8(canvas)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).into_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Padding, Position};
    use image::{Rgb, RgbImage, Rgba};

    fn asset(w: u32, h: u32, pixel: Rgba<u8>) -> WatermarkAsset {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, pixel));
        WatermarkAsset::from_image(img, Path::new("test")).unwrap()
    }

    fn opaque_config() -> CompositionConfig {
        CompositionConfig {
            position: Position::NORTH_WEST,
            pad_x: Padding::px(0),
            pad_y: Padding::px(0),
            opacity: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_aspect_ratio_from_loaded_image() {
        let a = asset(300, 100, Rgba([0, 0, 0, 255]));
        assert_eq!(a.aspect_ratio(), 3.0);
        assert!(a.has_alpha());
    }

    #[test]
    fn test_render_size_and_alpha() {
        let a = asset(100, 50, Rgba([255, 255, 255, 255]));
        let config = CompositionConfig {
            opacity: 0.5,
            ..Default::default()
        };
        // square target 1000px: baseline 200 wide, 100 high
        let render = a.render((1000, 1000), &config);
        assert_eq!(render.image.dimensions(), (200, 100));
        assert!(render.has_alpha);
        let alpha = render.image.get_pixel(100, 50)[3];
        assert!((126..=128).contains(&alpha), "alpha {}", alpha);
    }

    #[test]
    fn test_render_without_auto_scale() {
        let a = asset(40, 20, Rgba([255, 255, 255, 255]));
        let config = CompositionConfig {
            auto_scale: false,
            scale_x: 2.0,
            ..opaque_config()
        };
        assert_eq!(a.render((5000, 5000), &config).image.dimensions(), (80, 20));
    }

    #[test]
    fn test_cache_replaces_on_key_change() {
        let a = asset(10, 10, Rgba([0, 0, 0, 255]));
        let config = opaque_config();
        let mut cache = RenderCache::default();

        let k1 = RenderKey::new((100, 100), &config);
        let first = cache.get_or_insert_with(k1, || a.render((100, 100), &config));
        let again = cache.get_or_insert_with(k1, || panic!("should be cached"));
        assert!(Arc::ptr_eq(&first, &again));

        let k2 = RenderKey::new((200, 100), &config);
        let other = cache.get_or_insert_with(k2, || a.render((200, 100), &config));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(cache.key(), Some(k2));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 2 });

        // the first render is still intact for anyone holding it
        assert_eq!(first.image.dimensions(), (10, 10));
    }

    #[test]
    fn test_apply_opaque_paste_without_alpha() {
        let wm = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 0, 0])));
        let a = WatermarkAsset::from_image(wm, Path::new("test")).unwrap();
        assert!(!a.has_alpha());

        let base = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([0, 0, 255])));
        let config = CompositionConfig {
            auto_scale: false,
            ..opaque_config()
        };
        let render = a.render(base.dimensions(), &config);
        assert!(!render.has_alpha);

        let out = apply(&base, &render, &config).into_rgb8();
        assert_eq!(*out.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(9, 9), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(10, 10), Rgb([0, 0, 255]));
    }

    #[test]
    fn test_apply_blends_through_alpha() {
        let a = asset(4, 4, Rgba([255, 255, 255, 255]));
        let base = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])));
        let config = CompositionConfig {
            auto_scale: false,
            opacity: 0.5,
            ..opaque_config()
        };
        let render = a.render(base.dimensions(), &config);
        let out = apply(&base, &render, &config);
        assert!(!out.color().has_alpha());

        let px = out.into_rgb8().get_pixel(1, 1).0;
        assert!((120..=135).contains(&px[0]), "blended value {:?}", px);
    }

    #[test]
    fn test_preview_bytes_garbage_is_input_error() {
        let engine = Watermarker::with_asset(Arc::new(asset(4, 4, Rgba([0, 0, 0, 255]))), false);
        let err = engine
            .preview_bytes(b"nope", &CompositionConfig::default())
            .unwrap_err();
        assert!(matches!(err, WatermarkError::InputImage { .. }));
    }
}
